//! Consistency enforcement: re-establish OHLC bounds after imputation.

use tracing::debug;

use crate::domain::{Candle, CandleSeries};

/// `high = max(high, open, close)`, `low = min(low, open, close)`,
/// `volume = max(volume, 0)`. Missing operands are ignored. Idempotent.
pub fn enforce(series: CandleSeries) -> CandleSeries {
    let mut adjusted = 0usize;
    let candles: Vec<Candle> = series
        .candles()
        .iter()
        .map(|c| {
            let fixed = enforce_candle(c);
            if fixed != *c {
                adjusted += 1;
            }
            fixed
        })
        .collect();
    debug!(adjusted, "enforced OHLC consistency");
    series.with_candles(candles)
}

fn enforce_candle(c: &Candle) -> Candle {
    let bodies = [c.open, c.close];
    let high = bodies
        .iter()
        .flatten()
        .fold(c.high, |acc, v| Some(acc.map_or(*v, |h| h.max(*v))));
    let low = bodies
        .iter()
        .flatten()
        .fold(c.low, |acc, v| Some(acc.map_or(*v, |l| l.min(*v))));
    Candle {
        high,
        low,
        volume: c.volume.map(|v| v.max(0.0)),
        ..*c
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TimeBasis;
    use chrono::NaiveDate;

    fn series(candles: Vec<Candle>) -> CandleSeries {
        CandleSeries::new(TimeBasis::Naive, candles)
    }

    fn candle(o: f64, h: f64, l: f64, c: f64, v: f64) -> Candle {
        let ts = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        Candle::new(ts, o, h, l, c, v)
    }

    #[test]
    fn widens_bounds_and_clamps_volume() {
        let out = enforce(series(vec![candle(100.0, 99.0, 101.0, 102.0, -5.0)]));
        let c = out.candles()[0];
        assert_eq!(c.high, Some(102.0));
        assert_eq!(c.low, Some(100.0));
        assert_eq!(c.volume, Some(0.0));
        assert!(c.is_sane());
    }

    #[test]
    fn is_idempotent() {
        let once = enforce(series(vec![candle(100.0, 99.0, 101.0, 102.0, -5.0)]));
        let twice = enforce(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn leaves_consistent_candles_alone() {
        let input = series(vec![candle(100.0, 105.0, 98.0, 103.0, 10.0)]);
        assert_eq!(enforce(input.clone()), input);
    }
}
