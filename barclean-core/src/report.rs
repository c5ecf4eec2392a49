//! Quality report produced once per pipeline run.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::diagnostics::{GapAnalysis, OutlierCounts};
use crate::domain::{CandleSeries, Field, Timeframe};
use crate::impute::ImputeMethod;
use crate::validate::ValidationReport;

/// A non-fatal condition met during a run. Collected, never raised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Degradation {
    /// No instrument profile: session filtering was skipped.
    MissingProfile,
    /// The iterative model was not used; values were forward/back filled.
    FallbackImputation { reason: String },
    GapAboveThreshold { gap_percent: f64, threshold: f64 },
    MissingAboveTolerance {
        column: Field,
        missing_percent: f64,
        tolerance: f64,
    },
    /// Flagged-date exclusion was requested without a loaded calendar.
    FlaggedDatesUnavailable,
    /// Local presentation was requested without a profile; output stays in UTC.
    LocalTimeUnavailable,
    /// Clean candles still carrying a zero or negative price. Kept for review.
    NonPositivePrices { count: usize },
}

impl fmt::Display for Degradation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Degradation::MissingProfile => {
                write!(f, "no instrument profile; session filter skipped")
            }
            Degradation::FallbackImputation { reason } => {
                write!(f, "fallback imputation (ffill/bfill): {reason}")
            }
            Degradation::GapAboveThreshold {
                gap_percent,
                threshold,
            } => write!(f, "gap rate {gap_percent:.1}% exceeds {threshold:.1}% threshold"),
            Degradation::MissingAboveTolerance {
                column,
                missing_percent,
                tolerance,
            } => write!(
                f,
                "{column}: {missing_percent:.1}% missing exceeds {tolerance:.1}% tolerance"
            ),
            Degradation::FlaggedDatesUnavailable => {
                write!(f, "flagged-date calendar not loaded; exclusion skipped")
            }
            Degradation::LocalTimeUnavailable => {
                write!(f, "no instrument profile; output kept in UTC")
            }
            Degradation::NonPositivePrices { count } => {
                write!(f, "{count} candle(s) with non-positive prices need review")
            }
        }
    }
}

/// Summary of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub instrument: String,
    pub timeframe: Timeframe,
    pub raw_count: usize,
    pub clean_count: usize,
    pub removed_by_session: usize,
    pub removed_by_flagged_dates: usize,
    /// Gap rate of the raw (UTC) series over its own span.
    pub raw_gap_percent: f64,
    /// Gap rate of the session-filtered series, the basis of the quality score.
    pub gap_percent: f64,
    pub gap: GapAnalysis,
    /// Missing percentage per column before imputation.
    pub missing_percent: BTreeMap<Field, f64>,
    pub outliers: BTreeMap<Field, OutlierCounts>,
    pub validation: ValidationReport,
    pub imputation: ImputeMethod,
    /// `100 - gap_percent`.
    pub quality_score: f64,
    pub degradations: Vec<Degradation>,
    /// Presentation zone of the clean series.
    pub timezone: String,
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
    /// BLAKE3 hex digest of the clean series.
    pub fingerprint: String,
}

impl QualityReport {
    /// Report for an empty input.
    pub fn empty(instrument: &str, timeframe: Timeframe, timezone: String) -> Self {
        Self {
            instrument: instrument.to_string(),
            timeframe,
            raw_count: 0,
            clean_count: 0,
            removed_by_session: 0,
            removed_by_flagged_dates: 0,
            raw_gap_percent: 0.0,
            gap_percent: 0.0,
            gap: GapAnalysis::InsufficientData,
            missing_percent: Field::ALL.iter().map(|f| (*f, 0.0)).collect(),
            outliers: BTreeMap::new(),
            validation: ValidationReport::default(),
            imputation: ImputeMethod::None,
            quality_score: 100.0,
            degradations: Vec::new(),
            timezone,
            start: None,
            end: None,
            fingerprint: blake3::hash(b"").to_hex().to_string(),
        }
    }

    pub fn is_degraded(&self) -> bool {
        !self.degradations.is_empty()
    }
}

impl fmt::Display for QualityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} {} ({})", self.instrument, self.timeframe, self.timezone)?;
        writeln!(
            f,
            "  candles: {} raw -> {} clean ({} outside session, {} flagged)",
            self.raw_count, self.clean_count, self.removed_by_session, self.removed_by_flagged_dates
        )?;
        writeln!(
            f,
            "  gaps: {:.2}% clean, {:.2}% raw",
            self.gap_percent, self.raw_gap_percent
        )?;
        let missing: Vec<String> = self
            .missing_percent
            .iter()
            .map(|(field, pct)| format!("{field}={pct:.2}%"))
            .collect();
        writeln!(f, "  missing: {}", missing.join(" "))?;
        let outliers: Vec<String> = self
            .outliers
            .iter()
            .filter(|(_, c)| c.combined > 0)
            .map(|(field, c)| format!("{field}={}", c.combined))
            .collect();
        if !outliers.is_empty() {
            writeln!(f, "  outliers: {}", outliers.join(" "))?;
        }
        writeln!(
            f,
            "  structural issues: {}, imputation: {}",
            self.validation.total(),
            self.imputation
        )?;
        for note in &self.degradations {
            writeln!(f, "  warning: {note}")?;
        }
        write!(f, "  data quality: {:.2}%", self.quality_score)
    }
}

/// BLAKE3 digest over timestamps and OHLCV values, in row order.
pub fn fingerprint(series: &CandleSeries) -> String {
    let mut hasher = blake3::Hasher::new();
    for candle in series.candles() {
        hasher.update(&candle.timestamp.and_utc().timestamp_micros().to_le_bytes());
        for field in Field::ALL {
            let bits = candle.get(field).map_or(u64::MAX, f64::to_bits);
            hasher.update(&bits.to_le_bytes());
        }
    }
    hasher.finalize().to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Candle, TimeBasis};
    use chrono::NaiveDate;

    fn series(close: f64) -> CandleSeries {
        let ts = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        CandleSeries::new(
            TimeBasis::Zoned(chrono_tz::UTC),
            vec![Candle::new(ts, 1.0, 2.0, 0.5, close, 10.0)],
        )
    }

    #[test]
    fn fingerprint_is_deterministic_and_value_sensitive() {
        assert_eq!(fingerprint(&series(1.5)), fingerprint(&series(1.5)));
        assert_ne!(fingerprint(&series(1.5)), fingerprint(&series(1.6)));
    }

    #[test]
    fn report_serializes_degradations_tagged() {
        let mut report = QualityReport::empty("eurusd", Timeframe::H1, "UTC".into());
        report.degradations.push(Degradation::GapAboveThreshold {
            gap_percent: 7.5,
            threshold: 5.0,
        });
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["degradations"][0]["kind"], "gap_above_threshold");
        assert_eq!(json["timeframe"], "h1");

        let back: QualityReport = serde_json::from_value(json).unwrap();
        assert_eq!(back, report);
    }

    #[test]
    fn display_mentions_quality_score() {
        let report = QualityReport::empty("eurusd", Timeframe::H1, "UTC".into());
        assert!(report.to_string().ends_with("data quality: 100.00%"));
    }
}
