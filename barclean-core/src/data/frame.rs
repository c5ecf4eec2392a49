//! DataFrame ⇄ [`CandleSeries`] conversion.
//!
//! Required columns: `timestamp, open, high, low, close, volume`. Anything
//! else rides along as a passthrough column.

use chrono::{DateTime, NaiveDateTime};
use chrono_tz::Tz;
use polars::prelude::*;

use super::source::DataError;
use crate::domain::{Candle, CandleSeries, Field, TimeBasis};
use crate::error::SchemaError;

pub const TIMESTAMP: &str = "timestamp";

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
];

/// Check required columns and their types. Returns the time basis the
/// timestamp column implies.
pub fn validate_schema(df: &DataFrame) -> Result<TimeBasis, SchemaError> {
    let schema = df.schema();
    for name in std::iter::once(TIMESTAMP).chain(Field::ALL.iter().map(|f| f.name())) {
        if !schema.contains(name) {
            return Err(SchemaError::MissingColumn(name.to_string()));
        }
    }

    for field in Field::ALL {
        let dtype = schema
            .get(field.name())
            .ok_or_else(|| SchemaError::MissingColumn(field.name().to_string()))?;
        if !is_numeric(dtype) {
            return Err(type_mismatch(field.name(), "numeric", dtype));
        }
    }

    let dtype = schema
        .get(TIMESTAMP)
        .ok_or_else(|| SchemaError::MissingColumn(TIMESTAMP.to_string()))?;
    match dtype {
        DataType::Datetime(_, Some(zone)) => parse_zone(zone.as_str()).map(TimeBasis::Zoned),
        DataType::Datetime(_, None) | DataType::Date | DataType::String => Ok(TimeBasis::Naive),
        other => Err(type_mismatch(TIMESTAMP, "datetime", other)),
    }
}

/// Convert a raw frame into a series. Rows are canonicalized (sorted,
/// first-wins dedup) with passthrough columns kept aligned.
pub fn series_from_frame(df: &DataFrame) -> Result<CandleSeries, DataError> {
    let basis = validate_schema(df)?;
    let (basis, timestamps) = read_timestamps(df, basis)?;

    let columns = Field::ALL
        .iter()
        .map(|f| read_numeric(df, *f))
        .collect::<Result<Vec<_>, _>>()?;

    let candles = timestamps
        .iter()
        .enumerate()
        .map(|(i, ts)| Candle {
            timestamp: *ts,
            open: columns[0][i],
            high: columns[1][i],
            low: columns[2][i],
            close: columns[3][i],
            volume: columns[4][i],
        })
        .collect();

    let passthrough = df
        .get_columns()
        .iter()
        .filter(|c| !is_required(c.name().as_str()))
        .map(|c| c.as_materialized_series().clone())
        .collect();

    CandleSeries::with_passthrough(basis, candles, passthrough)
}

/// Convert a series into a frame with a microsecond `timestamp` column.
/// Zoned series carry their presentation zone on the column dtype.
pub fn series_to_frame(series: &CandleSeries) -> Result<DataFrame, DataError> {
    let micros: Vec<i64> = series
        .candles()
        .iter()
        .map(|c| c.timestamp.and_utc().timestamp_micros())
        .collect();
    let zone = series.basis().zone().map(|tz| PlSmallStr::from(tz.name()));
    let timestamp = Column::new(TIMESTAMP.into(), micros)
        .cast(&DataType::Datetime(TimeUnit::Microseconds, zone))?;

    let mut columns = Vec::with_capacity(6 + series.passthrough().len());
    columns.push(timestamp);
    for field in Field::ALL {
        columns.push(Column::new(field.name().into(), series.column(field)));
    }
    for extra in series.passthrough() {
        columns.push(Column::from(extra.clone()));
    }
    Ok(DataFrame::new(columns)?)
}

fn is_required(name: &str) -> bool {
    name == TIMESTAMP || Field::ALL.iter().any(|f| f.name() == name)
}

fn is_numeric(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Float64
            | DataType::Float32
            | DataType::Int64
            | DataType::Int32
            | DataType::UInt64
            | DataType::UInt32
            | DataType::Null
    )
}

fn type_mismatch(column: &str, expected: &str, actual: &DataType) -> SchemaError {
    SchemaError::TypeMismatch {
        column: column.to_string(),
        expected: expected.to_string(),
        actual: actual.to_string(),
    }
}

fn parse_zone(name: &str) -> Result<Tz, SchemaError> {
    name.parse::<Tz>()
        .map_err(|_| SchemaError::UnknownTimezone(name.to_string()))
}

/// NaN is read as missing.
fn read_numeric(df: &DataFrame, field: Field) -> Result<Vec<Option<f64>>, DataError> {
    let column = df
        .column(field.name())
        .map_err(|_| SchemaError::MissingColumn(field.name().to_string()))?
        .cast(&DataType::Float64)?;
    Ok(column
        .f64()?
        .into_iter()
        .map(|v| v.filter(|x| !x.is_nan()))
        .collect())
}

fn read_timestamps(
    df: &DataFrame,
    basis: TimeBasis,
) -> Result<(TimeBasis, Vec<NaiveDateTime>), DataError> {
    let column = df
        .column(TIMESTAMP)
        .map_err(|_| SchemaError::MissingColumn(TIMESTAMP.to_string()))?;

    match column.dtype().clone() {
        DataType::Datetime(unit, _) => {
            let raw = column.cast(&DataType::Int64)?;
            let values = raw
                .i64()?
                .into_iter()
                .enumerate()
                .map(|(i, v)| {
                    let v = v.ok_or(SchemaError::NullTimestamp(i))?;
                    from_epoch(v, unit).ok_or_else(|| {
                        type_mismatch(TIMESTAMP, "datetime in range", &DataType::Int64)
                    })
                })
                .collect::<Result<Vec<_>, SchemaError>>()?;
            Ok((basis, values))
        }
        DataType::Date => {
            let raw = column.cast(&DataType::Int32)?;
            let epoch = DateTime::UNIX_EPOCH.date_naive();
            let values = raw
                .i32()?
                .into_iter()
                .enumerate()
                .map(|(i, v)| {
                    let days = v.ok_or(SchemaError::NullTimestamp(i))?;
                    let date = epoch + chrono::Duration::days(days as i64);
                    Ok(date.and_time(chrono::NaiveTime::MIN))
                })
                .collect::<Result<Vec<_>, SchemaError>>()?;
            Ok((TimeBasis::Naive, values))
        }
        DataType::String => parse_text_timestamps(column.str()?),
        other => Err(type_mismatch(TIMESTAMP, "datetime", &other).into()),
    }
}

fn from_epoch(value: i64, unit: TimeUnit) -> Option<NaiveDateTime> {
    let per_second: i64 = match unit {
        TimeUnit::Nanoseconds => 1_000_000_000,
        TimeUnit::Microseconds => 1_000_000,
        TimeUnit::Milliseconds => 1_000,
    };
    let nanos_per_tick = 1_000_000_000 / per_second;
    let secs = value.div_euclid(per_second);
    let sub = (value.rem_euclid(per_second) * nanos_per_tick) as u32;
    DateTime::from_timestamp(secs, sub).map(|dt| dt.naive_utc())
}

/// Text timestamps: either all carry a UTC offset (read as UTC instants) or
/// none do (read as naive readings).
fn parse_text_timestamps(
    text: &StringChunked,
) -> Result<(TimeBasis, Vec<NaiveDateTime>), DataError> {
    let mut offsets = 0usize;
    let mut values = Vec::with_capacity(text.len());
    for (i, raw) in text.into_iter().enumerate() {
        let raw = raw.ok_or(SchemaError::NullTimestamp(i))?.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw)
            .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%:z"))
        {
            offsets += 1;
            values.push(dt.naive_utc());
            continue;
        }
        let naive = NAIVE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
            .ok_or_else(|| type_mismatch(TIMESTAMP, "datetime", &DataType::String))?;
        values.push(naive);
    }

    match offsets {
        0 => Ok((TimeBasis::Naive, values)),
        n if n == values.len() => Ok((TimeBasis::Zoned(Tz::UTC), values)),
        _ => Err(SchemaError::TypeMismatch {
            column: TIMESTAMP.to_string(),
            expected: "consistently zoned or naive timestamps".to_string(),
            actual: "mixed".to_string(),
        }
        .into()),
    }
}
