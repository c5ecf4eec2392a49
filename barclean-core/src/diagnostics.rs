//! Diagnostics: gap rate, missingness, and outlier counts. Report-only.
//!
//! Gaps are measured against continuous coverage of the already
//! session-filtered series, so overnight and weekend closures are not
//! counted as missing candles.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::domain::{CandleSeries, Field, Timeframe};
use crate::report::Degradation;

/// Thresholds for the diagnostics pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    /// Multiplier on the median absolute deviation.
    pub mad_k: f64,
    /// Multiplier on the interquartile range.
    pub iqr_k: f64,
    /// Missing share (percent) above which a column is flagged.
    pub missing_tolerance_percent: f64,
    /// Gap rate (percent) above which the run is flagged.
    pub gap_warn_percent: f64,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            mad_k: 3.0,
            iqr_k: 1.5,
            missing_tolerance_percent: 30.0,
            gap_warn_percent: 5.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GapAnalysis {
    /// Fewer than two candles; the gap rate is reported as 0.
    InsufficientData,
    Measured {
        theoretical: f64,
        actual: usize,
        missing: f64,
        gap_percent: f64,
    },
}

impl GapAnalysis {
    pub fn gap_percent(&self) -> f64 {
        match self {
            GapAnalysis::InsufficientData => 0.0,
            GapAnalysis::Measured { gap_percent, .. } => *gap_percent,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MissingStat {
    pub count: usize,
    pub percent: f64,
    pub severity: Severity,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlierCounts {
    pub mad: usize,
    pub iqr: usize,
    /// Values flagged by either rule.
    pub combined: usize,
    /// Fewer than three observed values.
    pub skipped: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosticsReport {
    pub gap: GapAnalysis,
    pub missing: BTreeMap<Field, MissingStat>,
    pub outliers: BTreeMap<Field, OutlierCounts>,
    pub degradations: Vec<Degradation>,
}

impl DiagnosticsReport {
    pub fn missing_percent(&self) -> BTreeMap<Field, f64> {
        self.missing.iter().map(|(f, s)| (*f, s.percent)).collect()
    }
}

pub fn diagnose(
    series: &CandleSeries,
    timeframe: Timeframe,
    config: &DiagnosticsConfig,
) -> DiagnosticsReport {
    let mut degradations = Vec::new();

    let gap = analyze_gaps(series, timeframe);
    match gap {
        GapAnalysis::InsufficientData => warn!("not enough data to analyze gaps"),
        GapAnalysis::Measured {
            theoretical,
            actual,
            missing,
            gap_percent,
        } => {
            info!(
                %timeframe,
                theoretical = theoretical.round(),
                actual,
                missing = missing.round(),
                gap_percent,
                "gap analysis"
            );
            if gap_percent > config.gap_warn_percent {
                warn!(
                    gap_percent,
                    threshold = config.gap_warn_percent,
                    "gap rate exceeds threshold"
                );
                degradations.push(Degradation::GapAboveThreshold {
                    gap_percent,
                    threshold: config.gap_warn_percent,
                });
            }
        }
    }

    let missing = analyze_missing(series, config.missing_tolerance_percent);
    for (field, stat) in &missing {
        if stat.count > 0 {
            warn!(column = %field, percent = stat.percent, "missing data detected");
        }
        if stat.severity == Severity::Warning {
            warn!(
                column = %field,
                percent = stat.percent,
                tolerance = config.missing_tolerance_percent,
                "missing share exceeds tolerance"
            );
            degradations.push(Degradation::MissingAboveTolerance {
                column: *field,
                missing_percent: stat.percent,
                tolerance: config.missing_tolerance_percent,
            });
        }
    }

    let outliers: BTreeMap<Field, OutlierCounts> = Field::ALL
        .iter()
        .map(|f| {
            let values: Vec<f64> = series.candles().iter().filter_map(|c| c.get(*f)).collect();
            (*f, count_outliers(&values, config.mad_k, config.iqr_k))
        })
        .collect();
    for (field, counts) in &outliers {
        if counts.combined > 0 {
            warn!(column = %field, count = counts.combined, "outliers detected");
        }
    }

    DiagnosticsReport {
        gap,
        missing,
        outliers,
        degradations,
    }
}

/// `theoretical = span_minutes / spacing + 1`, `gap = (theoretical - actual) / theoretical`.
/// Clamped at zero when the series is denser than its nominal spacing.
pub fn analyze_gaps(series: &CandleSeries, timeframe: Timeframe) -> GapAnalysis {
    let (Some(first), Some(last)) = (series.first_timestamp(), series.last_timestamp()) else {
        return GapAnalysis::InsufficientData;
    };
    if series.len() < 2 {
        return GapAnalysis::InsufficientData;
    }

    let span_minutes = (last - first).num_seconds() as f64 / 60.0;
    let theoretical = span_minutes / timeframe.spacing_minutes() as f64 + 1.0;
    let actual = series.len();
    let missing = theoretical - actual as f64;
    let gap_percent = if theoretical > 0.0 {
        (missing / theoretical * 100.0).max(0.0)
    } else {
        0.0
    };

    GapAnalysis::Measured {
        theoretical,
        actual,
        missing,
        gap_percent,
    }
}

fn analyze_missing(series: &CandleSeries, tolerance: f64) -> BTreeMap<Field, MissingStat> {
    let n = series.len();
    Field::ALL
        .iter()
        .map(|f| {
            let count = series.candles().iter().filter(|c| c.get(*f).is_none()).count();
            let percent = if n == 0 {
                0.0
            } else {
                count as f64 / n as f64 * 100.0
            };
            let severity = if percent > tolerance {
                Severity::Warning
            } else {
                Severity::Info
            };
            (
                *f,
                MissingStat {
                    count,
                    percent,
                    severity,
                },
            )
        })
        .collect()
}

/// MAD rule `|x - median| > k_mad * MAD` OR IQR rule outside
/// `[q1 - k_iqr * iqr, q3 + k_iqr * iqr]`.
pub fn count_outliers(values: &[f64], mad_k: f64, iqr_k: f64) -> OutlierCounts {
    if values.len() < 3 {
        return OutlierCounts {
            skipped: true,
            ..Default::default()
        };
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let med = quantile_sorted(&sorted, 0.5);
    let mad = median_abs_deviation(&sorted, med);
    let q1 = quantile_sorted(&sorted, 0.25);
    let q3 = quantile_sorted(&sorted, 0.75);
    let iqr = q3 - q1;

    let mut counts = OutlierCounts::default();
    for &x in values {
        let by_mad = x < med - mad_k * mad || x > med + mad_k * mad;
        let by_iqr = x < q1 - iqr_k * iqr || x > q3 + iqr_k * iqr;
        counts.mad += usize::from(by_mad);
        counts.iqr += usize::from(by_iqr);
        counts.combined += usize::from(by_mad || by_iqr);
    }
    counts
}

/// Linear-interpolated quantile of sorted values.
pub fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let pos = q.clamp(0.0, 1.0) * (n - 1) as f64;
            let lo = pos.floor() as usize;
            let hi = pos.ceil() as usize;
            sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
        }
    }
}

pub fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    quantile_sorted(&sorted, 0.5)
}

fn median_abs_deviation(values: &[f64], center: f64) -> f64 {
    let deviations: Vec<f64> = values.iter().map(|x| (x - center).abs()).collect();
    median(&deviations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Candle, TimeBasis};
    use chrono::{Duration, NaiveDate, NaiveDateTime};

    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn hourly(n: i64) -> Vec<Candle> {
        (0..n)
            .map(|h| Candle::new(start() + Duration::hours(h), 10.0, 11.0, 9.0, 10.0, 1.0))
            .collect()
    }

    #[test]
    fn contiguous_hourly_series_has_no_gap() {
        let series = CandleSeries::new(TimeBasis::Zoned(chrono_tz::UTC), hourly(48));
        let gap = analyze_gaps(&series, Timeframe::H1);
        assert!(gap.gap_percent().abs() < 1e-9);
    }

    #[test]
    fn one_missing_candle_in_ten() {
        let mut candles = hourly(10);
        candles.remove(4);
        let series = CandleSeries::new(TimeBasis::Zoned(chrono_tz::UTC), candles);
        let gap = analyze_gaps(&series, Timeframe::H1);
        assert!((gap.gap_percent() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn single_candle_is_insufficient_data() {
        let series = CandleSeries::new(TimeBasis::Naive, hourly(1));
        assert_eq!(analyze_gaps(&series, Timeframe::H1), GapAnalysis::InsufficientData);
    }

    #[test]
    fn denser_than_nominal_is_clamped_at_zero() {
        // hourly data diagnosed as daily
        let series = CandleSeries::new(TimeBasis::Naive, hourly(30));
        assert_eq!(analyze_gaps(&series, Timeframe::D1).gap_percent(), 0.0);
    }

    #[test]
    fn gap_above_threshold_is_degradation() {
        let mut candles = hourly(20);
        candles.drain(5..10);
        let series = CandleSeries::new(TimeBasis::Zoned(chrono_tz::UTC), candles);
        let report = diagnose(&series, Timeframe::H1, &DiagnosticsConfig::default());
        assert!(matches!(
            report.degradations.as_slice(),
            [Degradation::GapAboveThreshold { .. }]
        ));
    }

    #[test]
    fn outlier_fifty_times_median_is_flagged_by_both_rules() {
        let mut values: Vec<f64> = (0..100).map(|i| 100.0 + (i % 10) as f64 * 0.1).collect();
        values.push(med_times(&values, 50.0));
        let counts = count_outliers(&values, 3.0, 1.5);
        assert_eq!(counts.mad, 1);
        assert_eq!(counts.iqr, 1);
        assert_eq!(counts.combined, 1);
    }

    fn med_times(values: &[f64], k: f64) -> f64 {
        median(values) * k
    }

    #[test]
    fn fewer_than_three_values_are_skipped() {
        let counts = count_outliers(&[1.0, 1000.0], 3.0, 1.5);
        assert!(counts.skipped);
        assert_eq!(counts.combined, 0);
    }

    #[test]
    fn quartiles_interpolate_linearly() {
        let sorted = [1.0, 2.0, 3.0, 4.0];
        assert!((quantile_sorted(&sorted, 0.25) - 1.75).abs() < 1e-12);
        assert!((quantile_sorted(&sorted, 0.5) - 2.5).abs() < 1e-12);
        assert!((quantile_sorted(&sorted, 0.75) - 3.25).abs() < 1e-12);
    }

    #[test]
    fn missing_share_above_tolerance_is_warning() {
        let mut candles = hourly(10);
        for c in candles.iter_mut().take(4) {
            c.volume = None;
        }
        let series = CandleSeries::new(TimeBasis::Naive, candles);
        let report = diagnose(&series, Timeframe::H1, &DiagnosticsConfig::default());
        let volume = report.missing[&Field::Volume];
        assert_eq!(volume.count, 4);
        assert!((volume.percent - 40.0).abs() < 1e-9);
        assert_eq!(volume.severity, Severity::Warning);
        assert_eq!(report.missing[&Field::Open].severity, Severity::Info);
    }
}
