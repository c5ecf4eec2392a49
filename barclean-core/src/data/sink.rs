//! Writing clean series to disk.

use polars::prelude::*;
use std::fs;
use std::path::Path;

use super::frame::series_to_frame;
use super::source::DataError;
use crate::domain::CandleSeries;

/// Write a series to a Parquet file.
///
/// Writes are atomic: the frame goes to `{path}.tmp` and is renamed into place.
pub fn write_parquet(series: &CandleSeries, path: &Path) -> Result<(), DataError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| DataError::Io(format!("failed to create dir: {e}")))?;
    }

    let mut df = series_to_frame(series)?;
    let tmp_path = path.with_extension("parquet.tmp");
    let file = fs::File::create(&tmp_path)
        .map_err(|e| DataError::Io(format!("create {}: {e}", tmp_path.display())))?;
    if let Err(e) = ParquetWriter::new(file).finish(&mut df) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e.into());
    }

    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        DataError::Io(format!("atomic rename failed: {e}"))
    })
}
