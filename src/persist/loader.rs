//! Read side: rebuild the logical dataset of one family from its batch files.
//!
//! Every call lists the directory and re-reads every batch. Cost grows linearly with
//! history; there is no merged index to keep consistent with concurrent writers.

use std::fs::{self, File};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use tracing::debug;

use crate::market_data::types::{DepthSnapshot, StreamKind, TradeRecord};
use crate::persist::codec::StoredRecord;
use crate::persist::store::is_batch_file;
use crate::persist::types::{PersistError, PersistResult};

#[derive(Debug, Clone)]
pub struct DatasetLoader {
    dir: PathBuf,
}

impl DatasetLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `Ok(None)` means no batch has been published yet.
    pub fn load_trades(&self) -> PersistResult<Option<Vec<TradeRecord>>> {
        self.load::<TradeRecord>()
    }

    pub fn load_depth(&self) -> PersistResult<Option<Vec<DepthSnapshot>>> {
        self.load::<DepthSnapshot>()
    }

    /// Concatenate every batch of `R`'s family and sort by its ordering key.
    /// Batches overlap in time (flush boundaries, clock drift), so the sort is always needed.
    pub fn load<R: StoredRecord>(&self) -> PersistResult<Option<Vec<R>>> {
        let files = self.batch_files(R::KIND)?;
        if files.is_empty() {
            return Ok(None);
        }

        let mut records = Vec::new();
        for path in &files {
            let batch = read_batch_file::<R>(path).map_err(|e| PersistError::BatchFile {
                path: path.clone(),
                source: Box::new(e),
            })?;
            records.extend(batch);
        }
        // stable: equal keys keep file + arrival order
        records.sort_by_key(|r| r.ordering_key());

        let kind = R::KIND;
        debug!(stream = %kind, files = files.len(), rows = records.len(), "Loaded dataset");
        Ok(Some(records))
    }

    /// Published batch files of one family, in name order. A missing directory is a cold start.
    pub fn batch_files(&self, kind: StreamKind) -> PersistResult<Vec<PathBuf>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            if is_batch_file(kind, &name.to_string_lossy()) {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files)
    }
}

pub fn read_batch_file<R: StoredRecord>(path: &Path) -> PersistResult<Vec<R>> {
    let file = File::open(path)?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;
    let mut out = Vec::new();
    for batch in reader {
        out.extend(R::decode(&batch?)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::types::Level;
    use crate::persist::store::ColumnarStore;

    fn trade(trade_time: i64, price: f64) -> TradeRecord {
        TradeRecord { event_time: trade_time + 1, trade_time, price, qty: 0.5, is_buyer_maker: trade_time % 2 == 0 }
    }

    #[test]
    fn missing_directory_is_absent_not_error() {
        let tmp = tempfile::tempdir().unwrap();
        let loader = DatasetLoader::new(tmp.path().join("nope"));
        assert!(loader.load_trades().unwrap().is_none());
        assert!(loader.load_depth().unwrap().is_none());
    }

    #[test]
    fn write_then_load_returns_every_record_sorted() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ColumnarStore::new(tmp.path());
        let batch = vec![trade(30, 101.0), trade(10, 100.0), trade(20, 100.5)];
        store.write_batch(&batch).unwrap();

        let loaded = DatasetLoader::new(tmp.path()).load_trades().unwrap().unwrap();
        assert_eq!(loaded, vec![trade(10, 100.0), trade(20, 100.5), trade(30, 101.0)]);
    }

    #[test]
    fn overlapping_batches_merge_into_one_timeline() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ColumnarStore::new(tmp.path());
        // second flush carries trades older than the tail of the first
        store.write_batch(&[trade(1, 1.0), trade(5, 5.0), trade(9, 9.0)]).unwrap();
        store.write_batch(&[trade(4, 4.0), trade(7, 7.0), trade(12, 12.0)]).unwrap();

        let loaded = DatasetLoader::new(tmp.path()).load_trades().unwrap().unwrap();
        let times: Vec<i64> = loaded.iter().map(|t| t.trade_time).collect();
        assert_eq!(times, vec![1, 4, 5, 7, 9, 12]);
    }

    #[test]
    fn families_do_not_leak_into_each_other() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ColumnarStore::new(tmp.path());
        store.write_batch(&[trade(1, 1.0)]).unwrap();
        let loader = DatasetLoader::new(tmp.path());
        assert!(loader.load_depth().unwrap().is_none());

        store
            .write_batch(&[
                DepthSnapshot { event_time: 9, bids: vec![Level::new(1.0, 1.0)], asks: vec![] },
                DepthSnapshot { event_time: 3, bids: vec![], asks: vec![Level::new(2.0, 1.0)] },
            ])
            .unwrap();
        let depth = loader.load_depth().unwrap().unwrap();
        assert_eq!(depth.iter().map(|d| d.event_time).collect::<Vec<_>>(), vec![3, 9]);
        assert_eq!(loader.load_trades().unwrap().unwrap().len(), 1);
    }

    #[test]
    fn temp_files_are_invisible() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join(".trades_1.parquet.tmp"), b"half written").unwrap();
        assert!(DatasetLoader::new(tmp.path()).load_trades().unwrap().is_none());
    }

    #[test]
    fn corrupt_batch_names_the_file() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("trades_1.parquet"), b"garbage").unwrap();
        let err = DatasetLoader::new(tmp.path()).load_trades().unwrap_err();
        assert!(matches!(err, PersistError::BatchFile { .. }));
        assert!(err.to_string().contains("trades_1.parquet"));
    }
}
