//! Keeps exactly one ingest worker alive per stream type.
//!
//! Workers are either tasks on this runtime or child `tapex ingest <kind>`
//! processes. Liveness checks never block; a dead worker is replaced
//! immediately or after an exponential delay depending on [`RestartMode`].

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::backoff::Backoff;
use crate::config::SupervisorConfig;
use crate::market_data::types::StreamKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RestartMode {
    /// Replace a dead worker on the next poll.
    Immediate,
    /// Wait `restart_min`, doubling up to `restart_max`, between consecutive restarts.
    #[default]
    Backoff,
}

/// Builds the future for one in-process worker. It should return once the receiver reads `true`.
pub type TaskFactory =
    Arc<dyn Fn(StreamKind, watch::Receiver<bool>) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

pub enum Launcher {
    Tasks(TaskFactory),
    /// `program args... <kind>`
    Processes { program: PathBuf, args: Vec<String> },
}

impl Launcher {
    pub fn tasks<F>(factory: F) -> Self
    where
        F: Fn(StreamKind, watch::Receiver<bool>) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync + 'static,
    {
        Launcher::Tasks(Arc::new(factory))
    }

    /// Child processes running this same binary's `ingest` command.
    pub fn current_exe(extra_args: Vec<String>) -> anyhow::Result<Self> {
        let program = std::env::current_exe().context("locating the tapex binary")?;
        let mut args = extra_args;
        args.push("ingest".to_string());
        Ok(Launcher::Processes { program, args })
    }

    fn spawn(&self, kind: StreamKind, shutdown: watch::Receiver<bool>) -> anyhow::Result<Worker> {
        match self {
            Launcher::Tasks(factory) => Ok(Worker::Task(tokio::spawn(factory(kind, shutdown)))),
            Launcher::Processes { program, args } => {
                let child = Command::new(program)
                    .args(args)
                    .arg(kind.as_str())
                    .stdin(Stdio::null())
                    .kill_on_drop(true)
                    .spawn()
                    .with_context(|| format!("spawning {} worker", kind))?;
                Ok(Worker::Process(child))
            }
        }
    }
}

enum Worker {
    Task(JoinHandle<anyhow::Result<()>>),
    Process(Child),
}

impl Worker {
    /// `None` while alive; otherwise how it ended.
    fn try_exit(&mut self) -> Option<Result<(), String>> {
        match self {
            Worker::Task(handle) => {
                if !handle.is_finished() {
                    return None;
                }
                match handle.now_or_never()? {
                    Ok(Ok(())) => Some(Ok(())),
                    Ok(Err(e)) => Some(Err(format!("{e:#}"))),
                    Err(join) => Some(Err(join.to_string())),
                }
            }
            Worker::Process(child) => match child.try_wait() {
                Ok(None) => None,
                Ok(Some(status)) if status.success() => Some(Ok(())),
                Ok(Some(status)) => Some(Err(status.to_string())),
                Err(e) => Some(Err(e.to_string())),
            },
        }
    }

    async fn stop(self, grace: Duration) {
        match self {
            Worker::Task(mut handle) => {
                if tokio::time::timeout(grace, &mut handle).await.is_err() {
                    handle.abort();
                }
            }
            Worker::Process(mut child) => {
                if tokio::time::timeout(grace, child.wait()).await.is_err() {
                    let _ = child.start_kill();
                    let _ = child.wait().await;
                }
            }
        }
    }
}

struct Slot {
    worker: Option<Worker>,
    started_at: Option<Instant>,
    restart_at: Option<Instant>,
    backoff: Backoff,
    starts: u64,
}

impl Slot {
    fn new(restart_min: Duration, restart_max: Duration) -> Self {
        Self {
            worker: None,
            started_at: None,
            restart_at: None,
            backoff: Backoff::new(restart_min, restart_max),
            starts: 0,
        }
    }
}

pub struct Supervisor {
    launcher: Launcher,
    mode: RestartMode,
    restart_min: Duration,
    restart_max: Duration,
    slots: HashMap<StreamKind, Slot>,
    shutdown_tx: watch::Sender<bool>,
}

impl Supervisor {
    pub fn new(launcher: Launcher, cfg: &SupervisorConfig) -> Self {
        let restart_min = Duration::from_millis(cfg.restart_min_ms);
        let restart_max = Duration::from_millis(cfg.restart_max_ms);
        let slots = StreamKind::ALL
            .into_iter()
            .map(|kind| (kind, Slot::new(restart_min, restart_max)))
            .collect();
        let (shutdown_tx, _) = watch::channel(false);
        Self { launcher, mode: cfg.restart, restart_min, restart_max, slots, shutdown_tx }
    }

    /// Non-blocking liveness check. Reaps the worker if it has exited.
    pub fn is_running(&mut self, kind: StreamKind) -> bool {
        let now = Instant::now();
        self.reap(kind, now);
        self.slot(kind).worker.is_some()
    }

    /// Starts a worker for `kind` unless a live one exists. Returns whether one was started.
    pub fn ensure_running(&mut self, kind: StreamKind) -> anyhow::Result<bool> {
        if self.is_running(kind) {
            return Ok(false);
        }
        self.start(kind, Instant::now())?;
        Ok(true)
    }

    /// How many times a worker for `kind` has been started.
    pub fn starts(&self, kind: StreamKind) -> u64 {
        self.slots.get(&kind).map_or(0, |s| s.starts)
    }

    /// One supervision pass: reap exited workers and start those whose restart time has come.
    pub fn poll(&mut self, now: Instant) -> anyhow::Result<()> {
        for kind in StreamKind::ALL {
            self.reap(kind, now);
            let slot = self.slot(kind);
            let due = slot.worker.is_none() && slot.restart_at.map_or(true, |at| at <= now);
            if due {
                if slot.starts > 0 {
                    metrics::counter!("tapex_worker_restarts_total", "stream" => kind.as_str()).increment(1);
                    info!(stream = %kind, restarts = slot.starts, "restarting worker");
                }
                self.start(kind, now)?;
            }
        }
        Ok(())
    }

    /// Supervise until `stop` reads true, then stop every worker.
    pub async fn run(
        mut self,
        mut stop: watch::Receiver<bool>,
        poll_interval: Duration,
    ) -> anyhow::Result<()> {
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.poll(Instant::now())?,
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
            }
        }
        self.shutdown(Duration::from_secs(10)).await;
        Ok(())
    }

    /// Signal every worker to stop and wait up to `grace` for each before killing it.
    pub async fn shutdown(&mut self, grace: Duration) {
        let _ = self.shutdown_tx.send(true);
        for kind in StreamKind::ALL {
            if let Some(worker) = self.slot(kind).worker.take() {
                info!(stream = %kind, "stopping worker");
                worker.stop(grace).await;
            }
        }
    }

    fn slot(&mut self, kind: StreamKind) -> &mut Slot {
        let (min, max) = (self.restart_min, self.restart_max);
        self.slots.entry(kind).or_insert_with(|| Slot::new(min, max))
    }

    fn start(&mut self, kind: StreamKind, now: Instant) -> anyhow::Result<()> {
        let worker = self.launcher.spawn(kind, self.shutdown_tx.subscribe())?;
        let slot = self.slot(kind);
        slot.worker = Some(worker);
        slot.started_at = Some(now);
        slot.restart_at = None;
        slot.starts += 1;
        info!(stream = %kind, starts = slot.starts, "worker started");
        Ok(())
    }

    fn reap(&mut self, kind: StreamKind, now: Instant) {
        let mode = self.mode;
        let healthy_after = self.restart_max;
        let slot = self.slot(kind);
        let Some(worker) = slot.worker.as_mut() else { return };
        let Some(outcome) = worker.try_exit() else { return };
        slot.worker = None;

        match &outcome {
            Ok(()) => warn!(stream = %kind, "worker exited"),
            Err(e) => error!(stream = %kind, error = %e, "worker failed"),
        }

        // a worker that stayed up for a full max-delay period counts as healthy
        let lived = slot.started_at.map_or(Duration::ZERO, |s| now.saturating_duration_since(s));
        if lived >= healthy_after {
            slot.backoff.reset();
        }
        slot.restart_at = Some(match mode {
            RestartMode::Immediate => now,
            RestartMode::Backoff => now + slot.backoff.next_delay(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn config(mode: RestartMode) -> SupervisorConfig {
        SupervisorConfig { restart: mode, restart_min_ms: 60_000, restart_max_ms: 120_000, poll_interval_ms: 10 }
    }

    /// Workers that run until told to stop.
    fn long_lived(count: Arc<AtomicUsize>) -> Launcher {
        Launcher::tasks(move |_kind, mut shutdown| {
            count.fetch_add(1, Ordering::SeqCst);
            async move {
                while !*shutdown.borrow() {
                    if shutdown.changed().await.is_err() {
                        break;
                    }
                }
                anyhow::Ok(())
            }
            .boxed()
        })
    }

    /// Workers that fail as soon as they start.
    fn crashing(count: Arc<AtomicUsize>) -> Launcher {
        Launcher::tasks(move |kind, _shutdown| {
            count.fetch_add(1, Ordering::SeqCst);
            async move { Err::<(), _>(anyhow::anyhow!("{kind} feed unavailable")) }.boxed()
        })
    }

    async fn let_tasks_run() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn never_spawns_duplicates() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut sup = Supervisor::new(long_lived(count.clone()), &config(RestartMode::Immediate));

        assert!(sup.ensure_running(StreamKind::Trades).unwrap());
        assert!(!sup.ensure_running(StreamKind::Trades).unwrap());
        sup.poll(Instant::now()).unwrap();
        sup.poll(Instant::now()).unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert!(sup.is_running(StreamKind::Trades));
        assert!(sup.is_running(StreamKind::Depth));
        assert_eq!(sup.starts(StreamKind::Trades), 1);

        sup.shutdown(Duration::from_secs(1)).await;
        assert!(!sup.is_running(StreamKind::Trades));
        assert!(!sup.is_running(StreamKind::Depth));
    }

    #[tokio::test]
    async fn immediate_mode_replaces_a_dead_worker_on_next_poll() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut sup = Supervisor::new(crashing(count.clone()), &config(RestartMode::Immediate));

        sup.ensure_running(StreamKind::Depth).unwrap();
        let_tasks_run().await;
        assert!(!sup.is_running(StreamKind::Depth));

        sup.poll(Instant::now()).unwrap();
        assert_eq!(sup.starts(StreamKind::Depth), 2);
    }

    #[tokio::test]
    async fn backoff_mode_waits_before_restarting() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut sup = Supervisor::new(crashing(count.clone()), &config(RestartMode::Backoff));

        sup.ensure_running(StreamKind::Trades).unwrap();
        let_tasks_run().await;

        let now = Instant::now();
        sup.poll(now).unwrap();
        // depth had never started, so it comes up; trades is held back
        assert_eq!(sup.starts(StreamKind::Trades), 1);
        assert_eq!(sup.starts(StreamKind::Depth), 1);

        sup.poll(now + Duration::from_secs(61)).unwrap();
        assert_eq!(sup.starts(StreamKind::Trades), 2);
    }

    #[tokio::test]
    async fn run_returns_after_stop_signal() {
        let count = Arc::new(AtomicUsize::new(0));
        let sup = Supervisor::new(long_lived(count.clone()), &config(RestartMode::Backoff));
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(sup.run(rx, Duration::from_millis(5)));
        let_tasks_run().await;
        tx.send(true).unwrap();

        handle.await.unwrap().unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
