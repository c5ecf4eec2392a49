pub mod flagged;
pub mod frame;
pub mod sink;
pub mod source;

pub use flagged::FlaggedDates;
pub use frame::{series_from_frame, series_to_frame, validate_schema};
pub use sink::write_parquet;
pub use source::{
    read_csv, read_parquet, CsvSource, DataError, FetchRequest, MemorySource, ParquetSource,
    RowSource,
};
