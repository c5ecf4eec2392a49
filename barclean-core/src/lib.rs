//! Barclean Core — candle data quality pipeline.
//!
//! Turns raw OHLCV series into analysis-ready ones:
//! - Timezone normalization (UTC storage, instrument-local presentation)
//! - Session filtering against per-instrument market hours and holidays
//! - Structural validation and diagnostics (gaps, missingness, outliers)
//! - Multivariate iterative imputation with a fill-forward fallback
//! - OHLC consistency enforcement and a hard clean-candle invariant
//! - Optional exclusion of flagged (news) dates
//! - A quality report per run, with degradations collected rather than raised

pub mod calendar;
pub mod config;
pub mod data;
pub mod diagnostics;
pub mod domain;
pub mod enforce;
pub mod error;
pub mod impute;
pub mod pipeline;
pub mod report;
pub mod session;
pub mod time;
pub mod validate;

pub use calendar::{ProfileLookup, ProfileRegistry};
pub use config::PipelineConfig;
pub use domain::{Candle, CandleSeries, Field, InstrumentProfile, TimeBasis, Timeframe};
pub use error::{FailureKind, PipelineError, SchemaError};
pub use pipeline::{CleanOptions, CleanOutput, CleanRequest, Pipeline};
pub use report::{Degradation, QualityReport};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: everything a batch run shares across rayon
    /// workers is Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<CandleSeries>();
        require_sync::<CandleSeries>();
        require_send::<ProfileRegistry>();
        require_sync::<ProfileRegistry>();
        require_send::<PipelineConfig>();
        require_sync::<PipelineConfig>();
        require_send::<data::FlaggedDates>();
        require_sync::<data::FlaggedDates>();
        require_send::<Pipeline<'static>>();
        require_sync::<Pipeline<'static>>();
        require_send::<QualityReport>();
        require_sync::<QualityReport>();
        require_send::<PipelineError>();
    }

    /// Sources are shared behind `&dyn RowSource` across threads.
    #[test]
    fn row_source_is_object_safe() {
        fn name_of(source: &dyn data::RowSource) -> &str {
            source.name()
        }
        assert_eq!(name_of(&data::MemorySource::new()), "memory");
    }
}
