//! Append-only log that grades past direction calls against the realised tape.
//!
//! Best-effort artifact: one CSV file, rewritten atomically on save.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::analytics::predict::Direction;
use crate::market_data::types::TradeRecord;

pub const DEFAULT_HORIZON_SECS: f64 = 5.0;
pub const DEFAULT_MIN_INTERVAL_SECS: f64 = 1.0;
const ROLLING_WINDOW: usize = 10;
const HEADER: [&str; 6] = ["timestamp", "start_price", "prediction", "actual_price", "actual_dir", "is_correct"];

#[derive(Debug, Error)]
pub enum AccuracyLogError {
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("I/O failure: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionLogRow {
    pub timestamp: f64, // epoch seconds
    pub start_price: f64,
    pub prediction: Direction,
    pub actual_price: Option<f64>,
    pub actual_dir: Option<Direction>,
    pub is_correct: Option<bool>,
}

impl PredictionLogRow {
    pub fn is_pending(&self) -> bool {
        self.is_correct.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RollingPoint {
    pub timestamp: f64,
    pub accuracy: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccuracySummary {
    pub graded: usize,
    pub correct: usize,
    pub accuracy: Option<f64>,
    pub rolling: Vec<RollingPoint>,
}

pub struct AccuracyLog {
    path: PathBuf,
    rows: Vec<PredictionLogRow>,
    horizon_secs: f64,
    min_interval_secs: f64,
    dirty: bool,
}

impl AccuracyLog {
    /// Missing file means an empty log; it is created on first save.
    pub fn open(path: impl Into<PathBuf>, horizon_secs: f64, min_interval_secs: f64) -> Result<Self, AccuracyLogError> {
        let path = path.into();
        let rows = match fs::File::open(&path) {
            Ok(file) => csv::Reader::from_reader(file)
                .into_deserialize()
                .collect::<Result<Vec<PredictionLogRow>, _>>()?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self { path, rows, horizon_secs, min_interval_secs, dirty: false })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn rows(&self) -> &[PredictionLogRow] {
        &self.rows
    }

    /// Append a pending call unless the previous one is too recent.
    pub fn record(&mut self, now_secs: f64, start_price: f64, prediction: Direction) -> bool {
        if let Some(last) = self.rows.last() {
            if now_secs - last.timestamp <= self.min_interval_secs {
                return false;
            }
        }
        self.rows.push(PredictionLogRow {
            timestamp: now_secs,
            start_price,
            prediction,
            actual_price: None,
            actual_dir: None,
            is_correct: None,
        });
        self.dirty = true;
        true
    }

    /// Grade pending calls whose horizon has passed, using the first trade at or after
    /// `timestamp + horizon`. `trades` must be the logical (time-sorted) dataset.
    pub fn grade(&mut self, trades: &[TradeRecord], now_secs: f64) -> usize {
        let mut graded = 0;
        for row in self.rows.iter_mut().filter(|r| r.is_pending()) {
            let target = row.timestamp + self.horizon_secs;
            if now_secs <= target {
                continue;
            }
            let idx = trades.partition_point(|t| (t.trade_time as f64) / 1000.0 < target);
            let Some(realised) = trades.get(idx) else {
                continue;
            };
            let actual = Direction::of_move(row.start_price, realised.price);
            row.actual_price = Some(realised.price);
            row.actual_dir = Some(actual);
            row.is_correct = Some(actual == row.prediction);
            graded += 1;
        }
        if graded > 0 {
            self.dirty = true;
            debug!(graded, "Graded predictions");
        }
        graded
    }

    pub fn summary(&self) -> AccuracySummary {
        let outcomes: Vec<(f64, bool)> = self
            .rows
            .iter()
            .filter_map(|r| r.is_correct.map(|c| (r.timestamp, c)))
            .collect();
        let correct = outcomes.iter().filter(|(_, c)| *c).count();
        let rolling = outcomes
            .iter()
            .enumerate()
            .map(|(i, &(timestamp, _))| {
                let accuracy = (i + 1 >= ROLLING_WINDOW).then(|| {
                    let window = &outcomes[i + 1 - ROLLING_WINDOW..=i];
                    window.iter().filter(|(_, c)| *c).count() as f64 / ROLLING_WINDOW as f64
                });
                RollingPoint { timestamp, accuracy }
            })
            .collect();
        AccuracySummary {
            graded: outcomes.len(),
            correct,
            accuracy: (!outcomes.is_empty()).then(|| correct as f64 / outcomes.len() as f64),
            rolling,
        }
    }

    /// Rewrite the file if anything changed since open/last save.
    pub fn save(&mut self) -> Result<(), AccuracyLogError> {
        if !self.dirty {
            return Ok(());
        }
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "prediction_log.csv".to_string());
        let tmp = self.path.with_file_name(format!(".{name}.tmp"));

        let mut writer = csv::WriterBuilder::new().has_headers(false).from_path(&tmp)?;
        writer.write_record(HEADER)?;
        for row in &self.rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        drop(writer);
        fs::rename(&tmp, &self.path)?;

        self.dirty = false;
        Ok(())
    }
}
