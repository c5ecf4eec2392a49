//! Time normalization.
//!
//! Zoned series store UTC instants and carry their presentation zone in
//! [`TimeBasis`], so moving between UTC and local presentation never rewrites
//! a timestamp and the round trip is exact. Local wall-clock feeds go through
//! [`localize_naive`] or [`localize_candles`], which resolve DST edge cases by
//! [`DstPolicy`].
//!
//! - Nonexistent local times happen during "spring forward" when a wall time is skipped.
//! - Ambiguous local times happen during "fall back" when a wall time occurs twice.

use chrono::offset::LocalResult;
use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::{Candle, CandleSeries, TimeBasis};
use crate::error::PipelineError;

/// Policy for handling DST edge cases when mapping local readings to UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DstPolicy {
    /// Error on ambiguous (fall-back) or nonexistent (spring-forward) readings.
    #[default]
    Strict,
    /// Ambiguous readings take the earlier instant (the DST occurrence).
    PreferEarliest,
    /// Ambiguous readings take the later instant (the standard-time occurrence).
    PreferLatest,
    /// Nonexistent readings move forward minute by minute to the first valid
    /// instant (at most two hours).
    ShiftForward,
}

/// Interpret the series as UTC. Naive readings are taken as UTC readings;
/// zoned series keep their instants and are re-tagged.
pub fn to_utc(series: CandleSeries) -> CandleSeries {
    series.with_basis(TimeBasis::Zoned(Tz::UTC))
}

/// Present a UTC series in `tz`. Instants are unchanged.
///
/// Fails with [`PipelineError::Precision`] on naive input, or on a series
/// already presented in a zone other than UTC.
pub fn to_local(series: CandleSeries, tz: Tz) -> Result<CandleSeries, PipelineError> {
    match series.basis() {
        TimeBasis::Naive => Err(PipelineError::precision(
            "local conversion requires a UTC-zoned series, got naive timestamps",
        )),
        basis if !basis.is_utc() => Err(PipelineError::precision(format!(
            "local conversion requires a UTC-zoned series, got zone {}",
            basis.label()
        ))),
        _ => Ok(series.with_basis(TimeBasis::Zoned(tz))),
    }
}

/// Map one local reading in `tz` to its UTC instant.
pub fn resolve_local(
    naive: NaiveDateTime,
    tz: Tz,
    policy: DstPolicy,
) -> Result<DateTime<Utc>, PipelineError> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Ok(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(a, b) => match policy {
            DstPolicy::PreferEarliest => Ok(a.with_timezone(&Utc)),
            DstPolicy::PreferLatest => Ok(b.with_timezone(&Utc)),
            _ => Err(PipelineError::precision(format!(
                "ambiguous local time {naive} in {}",
                tz.name()
            ))),
        },
        LocalResult::None => match policy {
            DstPolicy::ShiftForward => {
                let mut t = naive;
                for _ in 0..120 {
                    t += Duration::minutes(1);
                    if let LocalResult::Single(dt) = tz.from_local_datetime(&t) {
                        return Ok(dt.with_timezone(&Utc));
                    }
                }
                Err(PipelineError::precision(format!(
                    "nonexistent local time {naive} in {}",
                    tz.name()
                )))
            }
            _ => Err(PipelineError::precision(format!(
                "nonexistent local time {naive} in {}",
                tz.name()
            ))),
        },
    }
}

/// Map local wall-clock candles, in arrival order, to UTC instants.
///
/// A fall-back reading that occurs twice in the feed resolves to the earlier
/// instant first and the later instant second, whatever the policy. A lone
/// ambiguous reading, and any nonexistent reading, is resolved by `policy`.
pub fn localize_candles(
    candles: Vec<Candle>,
    tz: Tz,
    policy: DstPolicy,
) -> Result<Vec<Candle>, PipelineError> {
    let mut occurrences: HashMap<NaiveDateTime, usize> = HashMap::new();
    for candle in &candles {
        *occurrences.entry(candle.timestamp).or_default() += 1;
    }

    let mut seen: HashMap<NaiveDateTime, usize> = HashMap::new();
    let mut resolved = Vec::with_capacity(candles.len());
    for mut candle in candles {
        let reading = candle.timestamp;
        let instant = match tz.from_local_datetime(&reading) {
            LocalResult::Ambiguous(a, b) if occurrences.get(&reading).copied().unwrap_or(0) > 1 => {
                let nth = seen.entry(reading).or_default();
                *nth += 1;
                let chosen = if *nth == 1 { a } else { b };
                chosen.with_timezone(&Utc)
            }
            _ => resolve_local(reading, tz, policy)?,
        };
        candle.timestamp = instant.naive_utc();
        resolved.push(candle);
    }
    Ok(resolved)
}

/// Read a naive series as wall-clock readings in `tz` and return it UTC-zoned.
/// Passthrough columns follow their rows.
///
/// A naive series is already deduplicated by reading, so ambiguous readings
/// here always follow `policy`.
pub fn localize_naive(
    series: CandleSeries,
    tz: Tz,
    policy: DstPolicy,
) -> Result<CandleSeries, PipelineError> {
    if series.basis() != TimeBasis::Naive {
        return Err(PipelineError::precision(format!(
            "wall-clock localization requires naive timestamps, got zone {}",
            series.basis().label()
        )));
    }
    let (_, candles, passthrough) = series.into_parts();
    let resolved = localize_candles(candles, tz, policy)?;
    Ok(CandleSeries::with_passthrough(
        TimeBasis::Zoned(Tz::UTC),
        resolved,
        passthrough,
    )?)
}
