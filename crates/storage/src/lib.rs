//! Storage Layer
//!
//! Persists decision records as comma-delimited rows. Records are buffered in
//! memory and written in batches, either when the batch fills up or when it has
//! been sitting for longer than the auto-flush interval.

mod record;
mod sink;

pub use record::{format_row, DelimitedRecord};
pub use sink::{spawn_auto_flush, BatchStatus, BatchedSink, SinkConfig};

use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Write failed after retry, {buffered} records kept in memory: {message}")]
    WriteFailed { message: String, buffered: usize },
    #[error("Lock error: {0}")]
    LockError(String),
    #[error("Invalid sink configuration: {0}")]
    InvalidConfig(String),
}
