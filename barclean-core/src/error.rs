//! Pipeline error taxonomy.
//!
//! Fatal conditions abort a pipeline run and are returned as [`PipelineError`].
//! Non-fatal conditions never surface here: they are collected as
//! [`Degradation`](crate::report::Degradation) notes on the quality report.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::DataError;

/// Required columns absent or unusable at the DataFrame boundary.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("missing required column: {0}")]
    MissingColumn(String),

    #[error("type mismatch in column {column}: expected {expected}, got {actual}")]
    TypeMismatch {
        column: String,
        expected: String,
        actual: String,
    },

    #[error("column '{column}' has {actual} rows, expected {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        actual: usize,
    },

    #[error("null timestamp at row {0}")]
    NullTimestamp(usize),

    #[error("unknown timezone in timestamp column: {0}")]
    UnknownTimezone(String),
}

/// Fatal pipeline failure. No clean series is produced alongside one of these.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// A stage received data in a state it must never see (caller bug).
    #[error("precision error: {0}")]
    Precision(String),

    /// The clean-series invariant cannot be guaranteed for this input.
    #[error("unrecoverable data: {0}")]
    Unrecoverable(String),

    #[error("data error: {0}")]
    Data(DataError),
}

/// Coarse classification of a [`PipelineError`], for callers that branch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    Schema,
    Precision,
    Unrecoverable,
    Data,
}

impl PipelineError {
    pub fn kind(&self) -> FailureKind {
        match self {
            PipelineError::Schema(_) => FailureKind::Schema,
            PipelineError::Precision(_) => FailureKind::Precision,
            PipelineError::Unrecoverable(_) => FailureKind::Unrecoverable,
            PipelineError::Data(_) => FailureKind::Data,
        }
    }

    pub(crate) fn precision(msg: impl Into<String>) -> Self {
        PipelineError::Precision(msg.into())
    }
}

impl From<DataError> for PipelineError {
    fn from(err: DataError) -> Self {
        match err {
            DataError::Schema(schema) => PipelineError::Schema(schema),
            other => PipelineError::Data(other),
        }
    }
}

impl From<polars::error::PolarsError> for PipelineError {
    fn from(err: polars::error::PolarsError) -> Self {
        PipelineError::Data(DataError::from(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_follows_variant() {
        let err = PipelineError::precision("naive series");
        assert_eq!(err.kind(), FailureKind::Precision);

        let err: PipelineError = SchemaError::MissingColumn("open".into()).into();
        assert_eq!(err.kind(), FailureKind::Schema);
        assert_eq!(err.to_string(), "schema error: missing required column: open");
    }

    #[test]
    fn schema_failures_from_sources_stay_schema_errors() {
        let err: PipelineError = DataError::Schema(SchemaError::NullTimestamp(3)).into();
        assert_eq!(err.kind(), FailureKind::Schema);

        let err: PipelineError = DataError::Io("disk gone".into()).into();
        assert_eq!(err.kind(), FailureKind::Data);
    }
}
