pub mod types;
pub use types::*;
pub mod buffer;
pub mod codec;
pub mod loader;
pub mod store;

use std::path::PathBuf;

use async_trait::async_trait;

use crate::persist::codec::StoredRecord;

pub use buffer::{BatchBuffer, WriteFailurePolicy};
pub use loader::DatasetLoader;
pub use store::ColumnarStore;

/// Where a stream client hands its flushed batches.
#[async_trait]
pub trait BatchSink<R: StoredRecord>: Send + Sync {
    /// Publish one batch; returns its location. On failure the records come back.
    async fn write(&self, records: Vec<R>) -> Result<PathBuf, FailedBatch<R>>;
}
