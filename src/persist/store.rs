//! File-per-batch columnar store.
//!
//! Every flush becomes one immutable parquet file `<kind>_<suffix>.parquet`. The file is
//! written under a dot-prefixed temp name, synced, then renamed into place, so a reader
//! listing the directory sees a batch completely or not at all.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use tracing::{debug, error, instrument, warn};

use crate::market_data::types::{unix_millis, StreamKind};
use crate::persist::codec::StoredRecord;
use crate::persist::types::{FailedBatch, PersistError, PersistResult};
use crate::persist::BatchSink;

const BATCH_EXTENSION: &str = ".parquet";

pub fn batch_file_name(kind: StreamKind, suffix: i64) -> String {
    format!("{}_{}{}", kind.as_str(), suffix, BATCH_EXTENSION)
}

/// Discovery only needs the family prefix and the extension. Temp files start with '.'.
pub fn is_batch_file(kind: StreamKind, file_name: &str) -> bool {
    file_name.starts_with(kind.as_str())
        && file_name[kind.as_str().len()..].starts_with('_')
        && file_name.ends_with(BATCH_EXTENSION)
}

#[derive(Clone)]
pub struct ColumnarStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    dir: PathBuf,
    last_suffix: Mutex<i64>,
}

impl ColumnarStore {
    /// The directory is created on first write, not here.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(StoreInner { dir: dir.into(), last_suffix: Mutex::new(0) }),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.inner.dir
    }

    #[instrument(level = "debug", skip_all, fields(rows = records.len()))]
    pub fn write_batch<R: StoredRecord>(&self, records: &[R]) -> PersistResult<PathBuf> {
        fs::create_dir_all(&self.inner.dir)?;
        let batch = R::encode(records)?;

        let final_path = self.allocate_path(R::KIND);
        let tmp_path = temp_path_for(&final_path);

        let dir = &self.inner.dir;
        let published = write_parquet(&tmp_path, &batch)
            .and_then(|_| publish(&tmp_path, &final_path, || sync_dir(dir)));
        if let Err(e) = published {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }

        let kind = R::KIND;
        debug!(stream = %kind, rows = records.len(), path = %final_path.display(), "Wrote batch");
        Ok(final_path)
    }

    // Suffix is epoch ms, bumped so it strictly increases and never reuses an existing name.
    fn allocate_path(&self, kind: StreamKind) -> PathBuf {
        let mut last = self.inner.last_suffix.lock();
        let mut suffix = unix_millis().max(*last + 1);
        let mut path = self.inner.dir.join(batch_file_name(kind, suffix));
        while path.exists() {
            suffix += 1;
            path = self.inner.dir.join(batch_file_name(kind, suffix));
        }
        *last = suffix;
        debug!(stream = %kind, suffix, "Allocated batch name");
        path
    }
}

#[async_trait::async_trait]
impl<R: StoredRecord> BatchSink<R> for ColumnarStore {
    async fn write(&self, records: Vec<R>) -> Result<PathBuf, FailedBatch<R>> {
        let store = self.clone();
        let records = Arc::new(records);
        let shared = Arc::clone(&records);
        // parquet encoding + fsync are blocking; keep them off the runtime threads
        let joined = tokio::task::spawn_blocking(move || store.write_batch(shared.as_slice())).await;

        // the blocking closure has been dropped by now, panicked or not
        let records = Arc::try_unwrap(records).unwrap_or_else(|still_shared| {
            error!(rows = still_shared.len(), "batch still referenced after write task ended, rows lost");
            Vec::new()
        });
        match joined {
            Ok(Ok(path)) => Ok(path),
            Ok(Err(error)) => Err(FailedBatch { error, records }),
            Err(e) => Err(FailedBatch { error: PersistError::Task(e.to_string()), records }),
        }
    }
}

/// Rename is the commit point. Once it succeeds the batch is visible to readers, so a
/// failed directory sync afterwards is logged and the write still counts as done.
fn publish(
    tmp_path: &Path,
    final_path: &Path,
    sync: impl FnOnce() -> PersistResult<()>,
) -> PersistResult<()> {
    fs::rename(tmp_path, final_path)?;
    if let Err(e) = sync() {
        warn!(path = %final_path.display(), error = %e, "batch published but directory sync failed");
    }
    Ok(())
}

fn temp_path_for(final_path: &Path) -> PathBuf {
    let name = final_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    final_path.with_file_name(format!(".{name}.tmp"))
}

fn write_parquet(path: &Path, batch: &arrow::record_batch::RecordBatch) -> PersistResult<()> {
    let file = File::create(path)?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))?;
    writer.write(batch)?;
    let file = writer.into_inner()?;
    file.sync_all()?;
    Ok(())
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> PersistResult<()> {
    File::open(dir)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> PersistResult<()> {
    Ok(())
}
