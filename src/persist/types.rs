use std::path::PathBuf;

use arrow::error::ArrowError;
use parquet::errors::ParquetError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("arrow error: {0}")]
    Arrow(#[from] ArrowError),
    #[error("parquet error: {0}")]
    Parquet(#[from] ParquetError),
    #[error("schema mismatch: {0}")]
    Schema(String),
    #[error("batch {}: {source}", path.display())]
    BatchFile {
        path: PathBuf,
        #[source]
        source: Box<PersistError>,
    },
    #[error("background write task failed: {0}")]
    Task(String),
}

pub type PersistResult<T> = Result<T, PersistError>;

/// A flush that did not reach storage. The records travel back with the error
/// so the caller can decide whether to keep them.
#[derive(Debug)]
pub struct FailedBatch<R> {
    pub error: PersistError,
    pub records: Vec<R>,
}
