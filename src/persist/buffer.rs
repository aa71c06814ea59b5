//! In-memory batching with a time-based flush policy.
//!
//! The buffer is owned by exactly one stream client. Appends and the swap-out
//! happen through `&mut self`, so a record is either in the batch handed to the
//! store or in the fresh buffer, never both and never neither.

use std::mem;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(5);

/// What to do with a batch the store refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WriteFailurePolicy {
    /// Put the records back at the front of the buffer and try again next cycle.
    #[default]
    Retain,
    /// Drop them; the flush cycle is lost.
    Discard,
}

#[derive(Debug)]
pub struct BatchBuffer<T> {
    records: Vec<T>,
    interval: Duration,
    last_flush: Instant,
}

impl<T> BatchBuffer<T> {
    pub fn new(interval: Duration) -> Self {
        Self::starting_at(interval, Instant::now())
    }

    pub fn starting_at(interval: Duration, now: Instant) -> Self {
        Self { records: Vec::new(), interval, last_flush: now }
    }

    pub fn push(&mut self, record: T) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_due(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_flush) >= self.interval
    }

    /// Timer check. When the interval has elapsed the clock resets, and the
    /// current contents are swapped out unless there are none.
    pub fn poll_flush(&mut self, now: Instant) -> Option<Vec<T>> {
        if !self.is_due(now) {
            return None;
        }
        self.drain(now)
    }

    /// Swap out whatever is buffered regardless of the clock (disconnect, shutdown).
    pub fn drain(&mut self, now: Instant) -> Option<Vec<T>> {
        self.last_flush = now;
        if self.records.is_empty() {
            return None;
        }
        Some(mem::take(&mut self.records))
    }

    /// Re-queue a batch that failed to persist ahead of anything that arrived since.
    pub fn restore(&mut self, mut batch: Vec<T>) {
        batch.append(&mut self.records);
        self.records = batch;
    }
}
