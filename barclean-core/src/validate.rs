//! Structural validation of OHLC bars. Counts only; never mutates.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::{CandleSeries, Field};

/// Independent counts of structural violations. A candle can add to several.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub high_below_low: usize,
    pub high_below_open_or_close: usize,
    pub low_above_open_or_close: usize,
    pub non_positive_price: usize,
    /// Candles with at least one missing field.
    pub missing_field: usize,
}

impl ValidationReport {
    pub fn total(&self) -> usize {
        self.high_below_low
            + self.high_below_open_or_close
            + self.low_above_open_or_close
            + self.non_positive_price
            + self.missing_field
    }

    pub fn is_clean(&self) -> bool {
        self.total() == 0
    }
}

/// Count OHLC violations. Comparisons with a missing operand are skipped.
pub fn validate(series: &CandleSeries) -> ValidationReport {
    let mut report = ValidationReport::default();

    for c in series.candles() {
        if let (Some(high), Some(low)) = (c.high, c.low) {
            if high < low {
                report.high_below_low += 1;
            }
        }
        if let Some(high) = c.high {
            if c.open.is_some_and(|o| high < o) || c.close.is_some_and(|cl| high < cl) {
                report.high_below_open_or_close += 1;
            }
        }
        if let Some(low) = c.low {
            if c.open.is_some_and(|o| low > o) || c.close.is_some_and(|cl| low > cl) {
                report.low_above_open_or_close += 1;
            }
        }
        if Field::PRICES
            .iter()
            .any(|f| c.get(*f).is_some_and(|p| p <= 0.0))
        {
            report.non_positive_price += 1;
        }
        if !c.is_complete() {
            report.missing_field += 1;
        }
    }

    if report.is_clean() {
        info!(candles = series.len(), "OHLC validation passed");
    } else {
        warn!(
            high_below_low = report.high_below_low,
            high_below_open_or_close = report.high_below_open_or_close,
            low_above_open_or_close = report.low_above_open_or_close,
            non_positive_price = report.non_positive_price,
            missing_field = report.missing_field,
            "OHLC validation found issues"
        );
    }
    report
}
