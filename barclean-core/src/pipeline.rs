//! Pipeline orchestrator.
//!
//! Stages run strictly forward:
//!
//! 1. normalize to UTC
//! 2. present in the instrument's zone and filter to session hours
//! 3. structural validation (report only)
//! 4. diagnostics: gaps, missingness, outliers (report only)
//! 5. imputation
//! 6. consistency enforcement, then the consistency check
//! 7. optional flagged-date exclusion
//! 8. presentation: UTC by default, instrument-local on request
//!
//! A run either returns a series on which every candle satisfies
//! [`Candle::is_consistent`](crate::domain::Candle::is_consistent), or fails.
//! There is no partial success. Candles with non-positive prices are kept and
//! reported as [`Degradation::NonPositivePrices`] for review.

use rayon::prelude::*;
use tracing::{info, instrument, warn};

use crate::calendar::{ProfileLookup, ProfileRegistry};
use crate::config::PipelineConfig;
use crate::data::{FetchRequest, FlaggedDates, RowSource};
use crate::diagnostics::{analyze_gaps, diagnose};
use crate::domain::{CandleSeries, TimeBasis, Timeframe};
use crate::enforce::enforce;
use crate::error::PipelineError;
use crate::impute::impute;
use crate::report::{fingerprint, Degradation, QualityReport};
use crate::session::filter_session;
use crate::time::{to_local, to_utc};
use crate::validate::validate;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanOptions {
    /// Present the clean series in the instrument's local zone instead of UTC.
    pub convert_to_local: bool,
    /// Drop candles on dates in the flagged-date calendar.
    pub exclude_flagged_dates: bool,
}

#[derive(Debug, Clone)]
pub struct CleanOutput {
    pub series: CandleSeries,
    pub report: QualityReport,
}

/// One independent unit of work for [`Pipeline::clean_batch`].
#[derive(Debug, Clone)]
pub struct CleanRequest {
    pub raw: CandleSeries,
    pub instrument: String,
    pub timeframe: Timeframe,
    pub options: CleanOptions,
}

/// Immutable pipeline. Shareable across threads; holds no per-run state.
pub struct Pipeline<'a> {
    registry: &'a ProfileRegistry,
    config: PipelineConfig,
    flagged: Option<&'a FlaggedDates>,
}

impl<'a> Pipeline<'a> {
    pub fn new(registry: &'a ProfileRegistry, config: PipelineConfig) -> Self {
        Self {
            registry,
            config,
            flagged: None,
        }
    }

    pub fn with_flagged_dates(mut self, flagged: &'a FlaggedDates) -> Self {
        self.flagged = Some(flagged);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Clean one raw series.
    #[instrument(skip(self, raw, options), fields(candles = raw.len()))]
    pub fn clean(
        &self,
        raw: CandleSeries,
        instrument_id: &str,
        timeframe: Timeframe,
        options: &CleanOptions,
    ) -> Result<CleanOutput, PipelineError> {
        let lookup = self.registry.lookup(instrument_id);
        let raw_count = raw.len();

        if raw.is_empty() {
            warn!("input series is empty");
            let series = to_utc(raw);
            let report = QualityReport::empty(
                &instrument_id.to_ascii_lowercase(),
                timeframe,
                series.basis().label(),
            );
            return Ok(CleanOutput { series, report });
        }

        let mut degradations = Vec::new();

        let utc = to_utc(raw);
        let raw_gap_percent = analyze_gaps(&utc, timeframe).gap_percent();

        let working = match lookup.profile() {
            Some(profile) => {
                let local = to_local(utc, profile.timezone)?;
                info!(timezone = profile.timezone.name(), "converted to local timezone");
                local
            }
            None => utc,
        };

        let session = filter_session(working, lookup)?;
        degradations.extend(session.degraded);
        let removed_by_session = session.removed;
        let series = session.series;

        let validation = validate(&series);
        let diagnostics = diagnose(&series, timeframe, &self.config.diagnostics);
        degradations.extend(diagnostics.degradations.iter().cloned());

        let imputed = impute(series, &self.config.impute)?;
        degradations.extend(imputed.degraded);

        let series = enforce(imputed.series);
        check_consistency(&series)?;
        let non_positive = series
            .candles()
            .iter()
            .filter(|c| !c.has_positive_prices())
            .count();
        if non_positive > 0 {
            warn!(count = non_positive, "non-positive prices kept for review");
            degradations.push(Degradation::NonPositivePrices {
                count: non_positive,
            });
        }

        let (series, removed_by_flagged_dates) = if options.exclude_flagged_dates {
            match self.flagged {
                Some(flagged) => {
                    let (kept, removed) = flagged.exclude(series, instrument_id)?;
                    info!(removed, "filtered flagged dates");
                    (kept, removed)
                }
                None => {
                    warn!("flagged-date exclusion requested but no calendar is loaded");
                    degradations.push(Degradation::FlaggedDatesUnavailable);
                    (series, 0)
                }
            }
        } else {
            (series, 0)
        };

        let series = present(series, lookup, options, &mut degradations)?;

        let gap_percent = diagnostics.gap.gap_percent();
        let report = QualityReport {
            instrument: instrument_id.to_ascii_lowercase(),
            timeframe,
            raw_count,
            clean_count: series.len(),
            removed_by_session,
            removed_by_flagged_dates,
            raw_gap_percent,
            gap_percent,
            gap: diagnostics.gap,
            missing_percent: diagnostics.missing_percent(),
            outliers: diagnostics.outliers,
            validation,
            imputation: imputed.method,
            quality_score: 100.0 - gap_percent,
            degradations,
            timezone: series.basis().label(),
            start: series.first_timestamp(),
            end: series.last_timestamp(),
            fingerprint: fingerprint(&series),
        };

        info!(
            raw = report.raw_count,
            clean = report.clean_count,
            quality = report.quality_score,
            degraded = report.is_degraded(),
            "data processing complete"
        );

        Ok(CleanOutput { series, report })
    }

    /// Fetch from a row source, then clean.
    pub fn clean_from_source(
        &self,
        source: &dyn RowSource,
        request: &FetchRequest,
        options: &CleanOptions,
    ) -> Result<CleanOutput, PipelineError> {
        let raw = source.fetch(request)?;
        info!(source = source.name(), candles = raw.len(), "fetched raw series");
        self.clean(raw, &request.instrument, request.timeframe, options)
    }

    /// Clean independent series in parallel. Results keep request order.
    pub fn clean_batch(
        &self,
        requests: Vec<CleanRequest>,
    ) -> Vec<Result<CleanOutput, PipelineError>> {
        requests
            .into_par_iter()
            .map(|r| self.clean(r.raw, &r.instrument, r.timeframe, &r.options))
            .collect()
    }
}

/// Every candle complete and bounded with non-negative volume. Anything else is fatal.
fn check_consistency(series: &CandleSeries) -> Result<(), PipelineError> {
    let mut bad = series.candles().iter().filter(|c| !c.is_consistent());
    if let Some(first) = bad.next() {
        let count = 1 + bad.count();
        return Err(PipelineError::Unrecoverable(format!(
            "{count} candle(s) violate OHLC consistency after cleaning, first at {}",
            first.timestamp
        )));
    }
    Ok(())
}

fn present(
    series: CandleSeries,
    lookup: ProfileLookup<'_>,
    options: &CleanOptions,
    degradations: &mut Vec<Degradation>,
) -> Result<CandleSeries, PipelineError> {
    if !options.convert_to_local {
        return Ok(to_utc(series));
    }
    match lookup.profile() {
        Some(profile) if series.basis() == TimeBasis::Zoned(profile.timezone) => Ok(series),
        Some(profile) => to_local(to_utc(series), profile.timezone),
        None => {
            warn!("local time requested but no profile is configured, keeping UTC");
            degradations.push(Degradation::LocalTimeUnavailable);
            Ok(to_utc(series))
        }
    }
}
