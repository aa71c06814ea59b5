// Long-lived websocket client for one stream type.
//
// One task owns the socket, the batching buffer and the flush timer, so the
// receive loop and the flush are sequential: a frame is either pushed before
// the swap or after it, never during.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, instrument, warn};

use crate::backoff::Backoff;
use crate::config::AppConfig;
use crate::market_data::adapters::{FeedError, VenueAdapter};
use crate::market_data::types::{unix_millis, StreamKind};
use crate::persist::buffer::DEFAULT_FLUSH_INTERVAL;
use crate::persist::codec::StoredRecord;
use crate::persist::{BatchBuffer, BatchSink, FailedBatch, WriteFailurePolicy};

#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub flush_interval: Duration,
    pub on_write_failure: WriteFailurePolicy,
    pub reconnect_min: Duration,
    pub reconnect_max: Duration,
    pub reconnect_jitter: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            on_write_failure: WriteFailurePolicy::Retain,
            reconnect_min: Duration::from_millis(500),
            reconnect_max: Duration::from_secs(30),
            reconnect_jitter: Duration::from_millis(250),
        }
    }
}

impl ClientSettings {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            flush_interval: cfg.flush.interval(),
            on_write_failure: cfg.storage.on_write_failure,
            reconnect_min: Duration::from_millis(cfg.feed.reconnect_min_ms),
            reconnect_max: Duration::from_millis(cfg.feed.reconnect_max_ms),
            reconnect_jitter: Duration::from_millis(cfg.feed.reconnect_jitter_ms),
        }
    }
}

/// Counters kept for the lifetime of a client; returned when it stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClientStats {
    pub messages: u64,
    pub dropped: u64,
    pub batches_written: u64,
    pub rows_written: u64,
    pub flush_failures: u64,
    pub rows_discarded: u64,
    pub reconnects: u64,
}

pub struct StreamClient<A, S>
where
    A: VenueAdapter,
    S: BatchSink<A::Record>,
{
    adapter: A,
    sink: S,
    buffer: BatchBuffer<A::Record>,
    on_write_failure: WriteFailurePolicy,
    backoff: Backoff,
    stats: ClientStats,
}

impl<A, S> StreamClient<A, S>
where
    A: VenueAdapter,
    S: BatchSink<A::Record>,
{
    pub fn new(adapter: A, sink: S, settings: ClientSettings) -> Self {
        Self {
            adapter,
            sink,
            buffer: BatchBuffer::new(settings.flush_interval),
            on_write_failure: settings.on_write_failure,
            backoff: Backoff::new(settings.reconnect_min, settings.reconnect_max)
                .with_jitter(settings.reconnect_jitter),
            stats: ClientStats::default(),
        }
    }

    pub fn kind(&self) -> StreamKind {
        <A::Record as StoredRecord>::KIND
    }

    pub fn stats(&self) -> ClientStats {
        self.stats
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Parse one text frame and append it. Bad frames are counted and dropped.
    pub fn ingest_text(&mut self, text: &str, received_ms: i64) -> bool {
        let kind = self.kind().as_str();
        match self.adapter.parse(text, received_ms) {
            Ok(record) => {
                self.buffer.push(record);
                self.stats.messages += 1;
                metrics::counter!("tapex_messages_total", "stream" => kind).increment(1);
                true
            }
            Err(e) => {
                self.stats.dropped += 1;
                metrics::counter!("tapex_parse_errors_total", "stream" => kind).increment(1);
                warn!(stream = kind, error = %e, "dropping malformed message");
                false
            }
        }
    }

    /// Timer hook: publishes the buffer when the interval has elapsed and it is non-empty.
    pub async fn flush_if_due(&mut self, now: Instant) -> Option<PathBuf> {
        let batch = self.buffer.poll_flush(now)?;
        self.persist(batch).await
    }

    /// Publish whatever is buffered now (disconnect, shutdown).
    pub async fn flush_now(&mut self) -> Option<PathBuf> {
        let batch = self.buffer.drain(Instant::now())?;
        self.persist(batch).await
    }

    async fn persist(&mut self, batch: Vec<A::Record>) -> Option<PathBuf> {
        let kind = self.kind().as_str();
        let rows = batch.len();
        let outcome = self.sink.write(batch).await;
        let published = match outcome {
            Ok(path) => {
                self.stats.batches_written += 1;
                self.stats.rows_written += rows as u64;
                metrics::counter!("tapex_rows_flushed_total", "stream" => kind).increment(rows as u64);
                info!(stream = kind, rows, path = %path.display(), "batch published");
                Some(path)
            }
            Err(FailedBatch { error, records }) => {
                self.stats.flush_failures += 1;
                metrics::counter!("tapex_flush_failures_total", "stream" => kind).increment(1);
                match self.on_write_failure {
                    WriteFailurePolicy::Retain if !records.is_empty() => {
                        warn!(stream = kind, rows, error = %error, "batch write failed, retaining rows for next flush");
                        self.buffer.restore(records);
                    }
                    _ => {
                        self.stats.rows_discarded += rows as u64;
                        error!(stream = kind, rows, error = %error, "batch write failed, rows discarded");
                    }
                }
                None
            }
        };
        metrics::gauge!("tapex_buffer_rows", "stream" => kind).set(self.buffer.len() as f64);
        published
    }

    /// Connect, stream and reconnect until `shutdown` flips to true (or its sender goes away).
    /// The buffer is flushed on every disconnect and once more on the way out.
    #[instrument(level = "info", skip_all)]
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> ClientStats {
        let url = self.adapter.ws_url();
        let kind = self.kind().as_str();

        while !stop_requested(&shutdown) {
            match self.run_connection(&url, &mut shutdown).await {
                Ok(()) => break,
                Err(e) => warn!(stream = kind, error = %e, "connection lost"),
            }

            self.flush_now().await;
            if stop_requested(&shutdown) {
                break;
            }

            let delay = self.backoff.next_delay();
            self.stats.reconnects += 1;
            metrics::counter!("tapex_reconnects_total", "stream" => kind).increment(1);
            info!(stream = kind, delay_ms = delay.as_millis() as u64, "reconnecting");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => {}
            }
        }

        self.flush_now().await;
        info!(stream = kind, stats = ?self.stats, "stream client stopped");
        self.stats
    }

    // Ok(()) only when asked to stop; any other exit is a dropped connection.
    async fn run_connection(
        &mut self,
        url: &str,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<(), FeedError> {
        let kind = self.kind().as_str();
        info!(stream = kind, %url, "connecting");

        let ws = tokio::select! {
            res = connect_async(url) => res?.0,
            _ = shutdown.changed() => return Ok(()),
        };
        self.backoff.reset();
        info!(stream = kind, "connected");

        let (mut write, mut read) = ws.split();
        let period = self.buffer.interval();
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        self.ingest_text(&text, unix_millis());
                    }
                    Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                        Ok(text) => {
                            self.ingest_text(text, unix_millis());
                        }
                        Err(_) => {
                            self.stats.dropped += 1;
                            debug!(stream = kind, len = bytes.len(), "ignoring non-utf8 binary frame");
                        }
                    },
                    Some(Ok(Message::Ping(payload))) => {
                        write.send(Message::Pong(payload)).await?;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        info!(stream = kind, ?frame, "server closed the stream");
                        return Err(FeedError::Closed);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e.into()),
                    None => return Err(FeedError::Closed),
                },
                scheduled = ticker.tick() => {
                    // the tick's deadline, not the wake-up time, keeps the flush clock on the ticker grid
                    self.flush_if_due(scheduled.into_std()).await;
                }
                _ = shutdown.changed() => {
                    if stop_requested(shutdown) {
                        let _ = write.send(Message::Close(None)).await;
                        return Ok(());
                    }
                }
            }
        }
    }
}

fn stop_requested(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow() || shutdown.has_changed().is_err()
}
