//! Session filter: keep only candles inside an instrument's trading session.

use chrono::TimeZone;
use tracing::{info, warn};

use crate::calendar::ProfileLookup;
use crate::domain::CandleSeries;
use crate::error::PipelineError;
use crate::report::Degradation;

#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub series: CandleSeries,
    /// Candles dropped as weekend, holiday, or outside session hours.
    pub removed: usize,
    /// Set when no profile was configured and the series passed through.
    pub degraded: Option<Degradation>,
}

/// Drop candles whose local reading (in the profile's zone) falls on a
/// weekend, on a holiday, or outside `[open, close]`.
///
/// Continuous profiles take the same path with a `[00:00, 23:59]` window.
/// Requires a zoned series.
pub fn filter_session(
    series: CandleSeries,
    lookup: ProfileLookup<'_>,
) -> Result<SessionOutcome, PipelineError> {
    if series.basis().zone().is_none() {
        return Err(PipelineError::precision(
            "session filtering requires zoned timestamps",
        ));
    }

    let profile = match lookup {
        ProfileLookup::Found(profile) => profile,
        ProfileLookup::NotConfigured => {
            warn!(
                candles = series.len(),
                "no instrument profile configured, skipping session filter"
            );
            return Ok(SessionOutcome {
                series,
                removed: 0,
                degraded: Some(Degradation::MissingProfile),
            });
        }
    };

    let keep: Vec<bool> = series
        .candles()
        .iter()
        .map(|c| profile.in_session(&profile.timezone.from_utc_datetime(&c.timestamp)))
        .collect();
    let removed = keep.iter().filter(|k| !**k).count();
    let series = series.retain_mask(&keep)?;

    info!(
        instrument = %profile.id,
        removed,
        kept = series.len(),
        "filtered to market hours"
    );

    Ok(SessionOutcome {
        series,
        removed,
        degraded: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AssetClass, Candle, InstrumentProfile, TimeBasis};
    use chrono::{Duration, NaiveDate, NaiveTime};

    fn dax() -> InstrumentProfile {
        InstrumentProfile {
            id: "deuidxeur".into(),
            name: "DAX Index".into(),
            timezone: chrono_tz::Europe::Berlin,
            session_open: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            session_close: NaiveTime::from_hms_opt(17, 30, 0).unwrap(),
            asset_class: AssetClass::SessionBound,
            holidays: Default::default(),
        }
    }

    fn hourly_utc(days: i64) -> CandleSeries {
        let start = NaiveDate::from_ymd_opt(2024, 6, 3)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let candles = (0..days * 24)
            .map(|h| Candle::new(start + Duration::hours(h), 10.0, 11.0, 9.0, 10.0, 1.0))
            .collect();
        CandleSeries::new(TimeBasis::Zoned(chrono_tz::UTC), candles)
    }

    #[test]
    fn naive_series_is_rejected() {
        let series = CandleSeries::new(TimeBasis::Naive, vec![]);
        let profile = dax();
        let err = filter_session(series, ProfileLookup::Found(&profile)).unwrap_err();
        assert!(matches!(err, PipelineError::Precision(_)));
    }

    #[test]
    fn berlin_summer_weekday_keeps_07_to_15_utc() {
        // CEST is UTC+2, so 09:00-17:30 local is 07:00-15:30 UTC: 07..=15 on the hour.
        let profile = dax();
        let outcome = filter_session(hourly_utc(1), ProfileLookup::Found(&profile)).unwrap();
        assert_eq!(outcome.series.len(), 9);
        assert_eq!(outcome.removed, 15);
        assert!(outcome.degraded.is_none());
    }

    #[test]
    fn missing_profile_passes_through_degraded() {
        let outcome = filter_session(hourly_utc(1), ProfileLookup::NotConfigured).unwrap();
        assert_eq!(outcome.series.len(), 24);
        assert_eq!(outcome.removed, 0);
        assert_eq!(outcome.degraded, Some(Degradation::MissingProfile));
    }

    #[test]
    fn continuous_profile_still_drops_weekends() {
        let mut profile = dax();
        profile.asset_class = AssetClass::Continuous;
        // Monday through Sunday
        let outcome = filter_session(hourly_utc(7), ProfileLookup::Found(&profile)).unwrap();
        let local = outcome.series.local_times().unwrap();
        assert!(local.iter().all(|t| profile.in_session(&t.with_timezone(&profile.timezone))));
        assert!(outcome.removed >= 48);
    }
}
