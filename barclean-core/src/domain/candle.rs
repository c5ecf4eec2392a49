//! One OHLCV bar and the ordered series the pipeline operates on.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::data::DataError;
use crate::error::SchemaError;

/// OHLCV bar. `None` marks a missing value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// UTC instant for zoned series; the raw reading for naive ones.
    pub timestamp: NaiveDateTime,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<f64>,
}

impl Candle {
    /// Fully populated candle.
    pub fn new(
        timestamp: NaiveDateTime,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            timestamp,
            open: Some(open),
            high: Some(high),
            low: Some(low),
            close: Some(close),
            volume: Some(volume),
        }
    }

    pub fn get(&self, field: Field) -> Option<f64> {
        match field {
            Field::Open => self.open,
            Field::High => self.high,
            Field::Low => self.low,
            Field::Close => self.close,
            Field::Volume => self.volume,
        }
    }

    pub fn set(&mut self, field: Field, value: Option<f64>) {
        match field {
            Field::Open => self.open = value,
            Field::High => self.high = value,
            Field::Low => self.low = value,
            Field::Close => self.close = value,
            Field::Volume => self.volume = value,
        }
    }

    /// Returns true if no numeric field is missing.
    pub fn is_complete(&self) -> bool {
        Field::ALL.iter().all(|f| self.get(*f).is_some())
    }

    /// Complete, `low <= open, close <= high`, non-negative volume.
    pub fn is_consistent(&self) -> bool {
        let (Some(open), Some(high), Some(low), Some(close), Some(volume)) =
            (self.open, self.high, self.low, self.close, self.volume)
        else {
            return false;
        };
        high >= low
            && high >= open
            && high >= close
            && low <= open
            && low <= close
            && volume >= 0.0
    }

    /// Every present price is strictly positive.
    pub fn has_positive_prices(&self) -> bool {
        Field::PRICES
            .iter()
            .filter_map(|f| self.get(*f))
            .all(|p| p > 0.0)
    }

    /// Consistent with positive prices.
    pub fn is_sane(&self) -> bool {
        self.is_consistent() && self.has_positive_prices()
    }
}

/// Numeric candle columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    Open,
    High,
    Low,
    Close,
    Volume,
}

impl Field {
    pub const ALL: [Field; 5] = [
        Field::Open,
        Field::High,
        Field::Low,
        Field::Close,
        Field::Volume,
    ];

    pub const PRICES: [Field; 4] = [Field::Open, Field::High, Field::Low, Field::Close];

    pub fn name(&self) -> &'static str {
        match self {
            Field::Open => "open",
            Field::High => "high",
            Field::Low => "low",
            Field::Close => "close",
            Field::Volume => "volume",
        }
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// How the timestamps of a series are to be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeBasis {
    /// Readings carry no zone information.
    Naive,
    /// Timestamps are UTC instants presented in the given zone.
    Zoned(Tz),
}

impl TimeBasis {
    pub fn zone(&self) -> Option<Tz> {
        match self {
            TimeBasis::Naive => None,
            TimeBasis::Zoned(tz) => Some(*tz),
        }
    }

    pub fn is_utc(&self) -> bool {
        matches!(self, TimeBasis::Zoned(Tz::UTC | Tz::Etc__UTC))
    }

    /// Zone name for reports; `"naive"` for unzoned series.
    pub fn label(&self) -> String {
        match self {
            TimeBasis::Naive => "naive".to_string(),
            TimeBasis::Zoned(tz) => tz.name().to_string(),
        }
    }
}

/// An ordered candle series with optional passthrough columns.
///
/// Timestamps are strictly increasing. Passthrough columns (anything that is
/// not OHLCV) hold exactly one value per candle and ride along untouched.
#[derive(Debug, Clone)]
pub struct CandleSeries {
    basis: TimeBasis,
    candles: Vec<Candle>,
    passthrough: Vec<Series>,
}

impl CandleSeries {
    /// Build a series, sorting by timestamp and keeping the first of any duplicates.
    pub fn new(basis: TimeBasis, candles: Vec<Candle>) -> Self {
        let order = canonical_order(&candles);
        let candles = order.iter().map(|&i| candles[i]).collect();
        Self {
            basis,
            candles,
            passthrough: Vec::new(),
        }
    }

    /// Build a series with passthrough columns aligned row-for-row with `candles`.
    pub fn with_passthrough(
        basis: TimeBasis,
        candles: Vec<Candle>,
        passthrough: Vec<Series>,
    ) -> Result<Self, DataError> {
        for column in &passthrough {
            if column.len() != candles.len() {
                return Err(SchemaError::LengthMismatch {
                    column: column.name().to_string(),
                    expected: candles.len(),
                    actual: column.len(),
                }
                .into());
            }
        }

        let order = canonical_order(&candles);
        let identity = order.len() == candles.len() && order.iter().enumerate().all(|(i, &j)| i == j);
        if identity {
            return Ok(Self {
                basis,
                candles,
                passthrough,
            });
        }

        let idx = IdxCa::from_vec(
            "idx".into(),
            order.iter().map(|&i| i as IdxSize).collect(),
        );
        let passthrough = passthrough
            .iter()
            .map(|s| s.take(&idx))
            .collect::<PolarsResult<Vec<_>>>()?;
        let candles = order.iter().map(|&i| candles[i]).collect();
        Ok(Self {
            basis,
            candles,
            passthrough,
        })
    }

    pub fn empty(basis: TimeBasis) -> Self {
        Self::new(basis, Vec::new())
    }

    pub fn basis(&self) -> TimeBasis {
        self.basis
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn passthrough(&self) -> &[Series] {
        &self.passthrough
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    /// Values of one numeric column, in row order.
    pub fn column(&self, field: Field) -> Vec<Option<f64>> {
        self.candles.iter().map(|c| c.get(field)).collect()
    }

    /// Number of missing cells across all numeric columns.
    pub fn missing_cells(&self) -> usize {
        self.candles
            .iter()
            .map(|c| Field::ALL.iter().filter(|f| c.get(**f).is_none()).count())
            .sum()
    }

    /// UTC instant of a candle. `None` for naive series.
    pub fn instant(&self, candle: &Candle) -> Option<DateTime<Utc>> {
        match self.basis {
            TimeBasis::Naive => None,
            TimeBasis::Zoned(_) => Some(Utc.from_utc_datetime(&candle.timestamp)),
        }
    }

    /// Local wall-clock reading of every candle in the presentation zone.
    /// `None` for naive series.
    pub fn local_times(&self) -> Option<Vec<DateTime<Tz>>> {
        let tz = self.basis.zone()?;
        Some(
            self.candles
                .iter()
                .map(|c| tz.from_utc_datetime(&c.timestamp))
                .collect(),
        )
    }

    pub fn first_timestamp(&self) -> Option<NaiveDateTime> {
        self.candles.first().map(|c| c.timestamp)
    }

    pub fn last_timestamp(&self) -> Option<NaiveDateTime> {
        self.candles.last().map(|c| c.timestamp)
    }

    pub(crate) fn into_parts(self) -> (TimeBasis, Vec<Candle>, Vec<Series>) {
        (self.basis, self.candles, self.passthrough)
    }

    /// Same rows, re-tagged with another time basis. Timestamps are untouched.
    pub(crate) fn with_basis(mut self, basis: TimeBasis) -> Self {
        self.basis = basis;
        self
    }

    /// Same rows and passthrough columns with replaced candle values.
    /// Timestamps must not change.
    pub(crate) fn with_candles(mut self, candles: Vec<Candle>) -> Self {
        debug_assert_eq!(candles.len(), self.candles.len());
        debug_assert!(self
            .candles
            .iter()
            .zip(&candles)
            .all(|(a, b)| a.timestamp == b.timestamp));
        self.candles = candles;
        self
    }

    /// Keep the rows where `keep[i]` is true, in candles and passthrough columns alike.
    pub(crate) fn retain_mask(self, keep: &[bool]) -> PolarsResult<Self> {
        debug_assert_eq!(keep.len(), self.candles.len());
        if keep.iter().all(|k| *k) {
            return Ok(self);
        }

        let mask = BooleanChunked::from_slice("keep".into(), keep);
        let passthrough = self
            .passthrough
            .iter()
            .map(|s| s.filter(&mask))
            .collect::<PolarsResult<Vec<_>>>()?;
        let candles = self
            .candles
            .into_iter()
            .zip(keep)
            .filter_map(|(c, k)| k.then_some(c))
            .collect();
        Ok(Self {
            basis: self.basis,
            candles,
            passthrough,
        })
    }
}

impl PartialEq for CandleSeries {
    fn eq(&self, other: &Self) -> bool {
        self.basis == other.basis
            && self.candles == other.candles
            && self.passthrough.len() == other.passthrough.len()
            && self
                .passthrough
                .iter()
                .zip(&other.passthrough)
                .all(|(a, b)| a.name() == b.name() && a.equals_missing(b))
    }
}

/// Row order after a stable sort by timestamp with first-wins deduplication.
fn canonical_order(candles: &[Candle]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..candles.len()).collect();
    order.sort_by_key(|&i| candles[i].timestamp);
    order.dedup_by_key(|i| candles[*i].timestamp);
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn sample_candle(h: u32) -> Candle {
        Candle::new(ts(h), 100.0, 105.0, 98.0, 103.0, 50_000.0)
    }

    #[test]
    fn candle_is_sane() {
        assert!(sample_candle(9).is_sane());
    }

    #[test]
    fn candle_with_missing_field_is_not_sane() {
        let mut candle = sample_candle(9);
        candle.close = None;
        assert!(!candle.is_complete());
        assert!(!candle.is_sane());
    }

    #[test]
    fn candle_detects_inverted_high_low() {
        let mut candle = sample_candle(9);
        candle.high = Some(97.0);
        assert!(!candle.is_sane());
    }

    #[test]
    fn zero_price_is_consistent_but_not_sane() {
        let mut candle = sample_candle(9);
        candle.low = Some(0.0);
        assert!(candle.is_consistent());
        assert!(!candle.has_positive_prices());
        assert!(!candle.is_sane());
    }

    #[test]
    fn series_sorts_and_keeps_first_duplicate() {
        let mut dup = sample_candle(10);
        dup.open = Some(101.0);
        let series = CandleSeries::new(
            TimeBasis::Naive,
            vec![sample_candle(11), sample_candle(10), dup, sample_candle(9)],
        );

        let hours: Vec<_> = series.candles().iter().map(|c| c.timestamp).collect();
        assert_eq!(hours, vec![ts(9), ts(10), ts(11)]);
        assert_eq!(series.candles()[1].open, Some(100.0));
    }

    #[test]
    fn passthrough_follows_sort_order() {
        let tags = Series::new("tag".into(), &["b", "a"]);
        let series = CandleSeries::with_passthrough(
            TimeBasis::Naive,
            vec![sample_candle(11), sample_candle(10)],
            vec![tags],
        )
        .unwrap();

        let tag = series.passthrough()[0].str().unwrap();
        assert_eq!(tag.get(0), Some("a"));
        assert_eq!(tag.get(1), Some("b"));
    }

    #[test]
    fn passthrough_length_mismatch_is_schema_error() {
        let tags = Series::new("tag".into(), &["a"]);
        let result = CandleSeries::with_passthrough(
            TimeBasis::Naive,
            vec![sample_candle(9), sample_candle(10)],
            vec![tags],
        );
        assert!(matches!(
            result,
            Err(DataError::Schema(SchemaError::LengthMismatch { .. }))
        ));
    }

    #[test]
    fn retain_mask_filters_passthrough() {
        let tags = Series::new("tag".into(), &["a", "b", "c"]);
        let series = CandleSeries::with_passthrough(
            TimeBasis::Naive,
            vec![sample_candle(9), sample_candle(10), sample_candle(11)],
            vec![tags],
        )
        .unwrap();

        let kept = series.retain_mask(&[true, false, true]).unwrap();
        assert_eq!(kept.len(), 2);
        let tag = kept.passthrough()[0].str().unwrap();
        assert_eq!(tag.get(1), Some("c"));
    }

    #[test]
    fn missing_cells_counts_every_null() {
        let mut candle = sample_candle(9);
        candle.open = None;
        candle.volume = None;
        let series = CandleSeries::new(TimeBasis::Naive, vec![candle, sample_candle(10)]);
        assert_eq!(series.missing_cells(), 2);
    }
}
