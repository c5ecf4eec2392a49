//! Row sources and structured data errors.
//!
//! The [`RowSource`] trait abstracts over where raw candles come from (a
//! Parquet store, CSV exports, in-memory fixtures) so the pipeline can be
//! driven from any of them and mocked in tests.
//!
//! File-backed sources share one naming scheme: `{root}/{instrument}_{timeframe}.{ext}`.

use chrono::NaiveDate;
use polars::prelude::*;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::frame;
use crate::domain::{CandleSeries, Timeframe};
use crate::error::SchemaError;

/// Structured error types for data operations.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("no data for {instrument} {timeframe} at {path}")]
    NotFound {
        instrument: String,
        timeframe: Timeframe,
        path: PathBuf,
    },

    #[error("I/O error: {0}")]
    Io(String),

    #[error("frame error: {0}")]
    Frame(String),

    #[error("csv error: {0}")]
    Csv(String),

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

impl From<PolarsError> for DataError {
    fn from(err: PolarsError) -> Self {
        DataError::Frame(err.to_string())
    }
}

impl From<csv::Error> for DataError {
    fn from(err: csv::Error) -> Self {
        DataError::Csv(err.to_string())
    }
}

/// What to fetch. Date bounds are inclusive and compare against the stored
/// timestamp's calendar date (UTC for zoned data).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub instrument: String,
    pub timeframe: Timeframe,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl FetchRequest {
    pub fn new(instrument: impl Into<String>, timeframe: Timeframe) -> Self {
        Self {
            instrument: instrument.into(),
            timeframe,
            start: None,
            end: None,
        }
    }

    pub fn between(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.start = Some(start);
        self.end = Some(end);
        self
    }

    fn file_name(&self, ext: &str) -> String {
        format!(
            "{}_{}.{ext}",
            self.instrument.to_ascii_lowercase(),
            self.timeframe
        )
    }
}

/// Trait for raw candle sources.
pub trait RowSource: Send + Sync {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    /// Fetch the raw series for one instrument and timeframe.
    fn fetch(&self, request: &FetchRequest) -> Result<CandleSeries, DataError>;
}

/// One Parquet file per instrument and timeframe under a root directory.
pub struct ParquetSource {
    root: PathBuf,
}

impl ParquetSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, request: &FetchRequest) -> PathBuf {
        self.root.join(request.file_name("parquet"))
    }
}

impl RowSource for ParquetSource {
    fn name(&self) -> &str {
        "parquet"
    }

    fn fetch(&self, request: &FetchRequest) -> Result<CandleSeries, DataError> {
        let path = self.path_for(request);
        if !path.exists() {
            return Err(not_found(request, path));
        }
        let df = read_parquet(&path)?;
        let series = frame::series_from_frame(&df)?;
        filter_range(series, request)
    }
}

/// One CSV file per instrument and timeframe under a root directory.
pub struct CsvSource {
    root: PathBuf,
}

impl CsvSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, request: &FetchRequest) -> PathBuf {
        self.root.join(request.file_name("csv"))
    }
}

impl RowSource for CsvSource {
    fn name(&self) -> &str {
        "csv"
    }

    fn fetch(&self, request: &FetchRequest) -> Result<CandleSeries, DataError> {
        let path = self.path_for(request);
        if !path.exists() {
            return Err(not_found(request, path));
        }
        let df = read_csv(&path)?;
        let series = frame::series_from_frame(&df)?;
        filter_range(series, request)
    }
}

/// In-memory source keyed by `(instrument, timeframe)`.
#[derive(Default)]
pub struct MemorySource {
    series: HashMap<(String, Timeframe), CandleSeries>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, instrument: &str, timeframe: Timeframe, series: CandleSeries) {
        self.series
            .insert((instrument.to_ascii_lowercase(), timeframe), series);
    }
}

impl RowSource for MemorySource {
    fn name(&self) -> &str {
        "memory"
    }

    fn fetch(&self, request: &FetchRequest) -> Result<CandleSeries, DataError> {
        let key = (request.instrument.to_ascii_lowercase(), request.timeframe);
        let series = self
            .series
            .get(&key)
            .cloned()
            .ok_or_else(|| not_found(request, PathBuf::from("<memory>")))?;
        filter_range(series, request)
    }
}

/// Read a whole Parquet file.
pub fn read_parquet(path: &Path) -> Result<DataFrame, DataError> {
    let file = fs::File::open(path).map_err(|e| DataError::Io(format!("open {}: {e}", path.display())))?;
    Ok(ParquetReader::new(file).finish()?)
}

/// Read a CSV file with a header row, parsing date-like columns.
pub fn read_csv(path: &Path) -> Result<DataFrame, DataError> {
    let df = LazyCsvReader::new(path)
        .with_has_header(true)
        .with_try_parse_dates(true)
        .finish()?
        .collect()?;
    Ok(df)
}

fn not_found(request: &FetchRequest, path: PathBuf) -> DataError {
    DataError::NotFound {
        instrument: request.instrument.clone(),
        timeframe: request.timeframe,
        path,
    }
}

fn filter_range(series: CandleSeries, request: &FetchRequest) -> Result<CandleSeries, DataError> {
    if request.start.is_none() && request.end.is_none() {
        return Ok(series);
    }
    let keep: Vec<bool> = series
        .candles()
        .iter()
        .map(|c| {
            let date = c.timestamp.date();
            request.start.map_or(true, |s| date >= s) && request.end.map_or(true, |e| date <= e)
        })
        .collect();
    Ok(series.retain_mask(&keep)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Candle, TimeBasis};

    fn day(d: u32) -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, d)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn memory() -> MemorySource {
        let candles = (4..=8)
            .map(|d| Candle::new(day(d), 10.0, 11.0, 9.0, 10.5, 100.0))
            .collect();
        let mut source = MemorySource::new();
        source.insert(
            "EURUSD",
            Timeframe::H1,
            CandleSeries::new(TimeBasis::Zoned(chrono_tz::UTC), candles),
        );
        source
    }

    #[test]
    fn memory_source_is_case_insensitive() {
        let series = memory().fetch(&FetchRequest::new("eurusd", Timeframe::H1)).unwrap();
        assert_eq!(series.len(), 5);
    }

    #[test]
    fn fetch_applies_inclusive_date_range() {
        let request = FetchRequest::new("eurusd", Timeframe::H1).between(
            NaiveDate::from_ymd_opt(2024, 3, 5).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 7).unwrap(),
        );
        let series = memory().fetch(&request).unwrap();
        assert_eq!(series.len(), 3);
        assert_eq!(series.first_timestamp(), Some(day(5)));
        assert_eq!(series.last_timestamp(), Some(day(7)));
    }

    #[test]
    fn unknown_key_is_not_found() {
        let err = memory()
            .fetch(&FetchRequest::new("gbpusd", Timeframe::H1))
            .unwrap_err();
        assert!(matches!(err, DataError::NotFound { .. }));
    }

    #[test]
    fn file_name_uses_lowercase_instrument_and_timeframe() {
        let source = ParquetSource::new("/data");
        let path = source.path_for(&FetchRequest::new("DEUIDXEUR", Timeframe::M15));
        assert_eq!(path, PathBuf::from("/data/deuidxeur_m15.parquet"));
    }
}
