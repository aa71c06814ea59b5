use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use futures::FutureExt;
use tokio::sync::watch;
use tracing::{info, warn};

use tapex_rs::analytics::accuracy::AccuracyLog;
use tapex_rs::analytics::report::MarketReport;
use tapex_rs::config::AppConfig;
use tapex_rs::market_data::router::run_stream;
use tapex_rs::market_data::types::unix_millis;
use tapex_rs::market_data::{DepthSnapshot, StreamKind, TradeRecord};
use tapex_rs::persist::DatasetLoader;
use tapex_rs::supervisor::{Launcher, Supervisor};
use tapex_rs::telemetry;

#[derive(Parser, Debug)]
#[command(name = "tapex", version, about = "Trade/depth tape recorder and market metrics")]
struct Cli {
    /// Config file (toml/yaml/json). Defaults to ./tapex.* when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log: String,
    /// Prometheus listener (only with the `metrics-exporter` feature)
    #[arg(long, global = true, default_value = "0.0.0.0:9000")]
    metrics_addr: SocketAddr,
    /// Do not start the Prometheus listener
    #[arg(long, global = true)]
    no_metrics: bool,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Record one stream into the batch store until Ctrl-C
    Ingest {
        /// trades | depth
        kind: StreamKind,
    },
    /// Keep one ingest worker per stream alive
    Run {
        /// Workers are child `tapex ingest` processes instead of in-process tasks
        #[arg(long)]
        processes: bool,
    },
    /// Print metrics, regime and prediction from everything recorded so far
    Report {
        #[arg(long)]
        json: bool,
        /// Refresh every N milliseconds until Ctrl-C
        #[arg(long, value_name = "MS")]
        watch: Option<u64>,
        /// Record predictions and grade them against later trades
        #[arg(long)]
        track: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok(); // load .env

    let cli = Cli::parse();
    telemetry::init_tracing(&cli.log);
    let cfg = AppConfig::load(cli.config.as_deref())?;

    match cli.cmd {
        Cmd::Ingest { kind } => {
            if !cli.no_metrics {
                telemetry::init_metrics(cli.metrics_addr)?;
            }
            let shutdown = shutdown_on_ctrl_c();
            let stats = run_stream(kind, &cfg, shutdown).await;
            info!(stream = %kind, ?stats, "ingest finished");
        }
        Cmd::Run { processes } => {
            if !cli.no_metrics {
                telemetry::init_metrics(cli.metrics_addr)?;
            }
            let launcher = if processes {
                Launcher::current_exe(child_args(&cli))?
            } else {
                let shared = Arc::new(cfg.clone());
                Launcher::tasks(move |kind, shutdown| {
                    let cfg = Arc::clone(&shared);
                    async move {
                        let stats = run_stream(kind, &cfg, shutdown).await;
                        info!(stream = %kind, ?stats, "worker stopped");
                        anyhow::Ok(())
                    }
                    .boxed()
                })
            };
            let supervisor = Supervisor::new(launcher, &cfg.supervisor);
            let poll = Duration::from_millis(cfg.supervisor.poll_interval_ms.max(1));
            supervisor.run(shutdown_on_ctrl_c(), poll).await?;
        }
        Cmd::Report { json, watch, track } => report(&cfg, json, watch, track).await?,
    }
    Ok(())
}

// The parent owns the metrics listener; children would collide on its address.
fn child_args(cli: &Cli) -> Vec<String> {
    let mut args = Vec::new();
    if let Some(path) = &cli.config {
        args.push("--config".to_string());
        args.push(path.display().to_string());
    }
    args.push("--log".to_string());
    args.push(cli.log.clone());
    args.push("--no-metrics".to_string());
    args
}

/// Flips to `true` on the first Ctrl-C.
fn shutdown_on_ctrl_c() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("ctrl-c received, shutting down"),
            Err(e) => warn!(error = %e, "cannot listen for ctrl-c"),
        }
        let _ = tx.send(true);
        // keep the sender alive so receivers see the value, not a closed channel
        std::future::pending::<()>().await;
    });
    rx
}

async fn report(cfg: &AppConfig, json: bool, watch_ms: Option<u64>, track: bool) -> anyhow::Result<()> {
    let loader = DatasetLoader::new(&cfg.storage.data_dir);
    let mut tracker = if track {
        let a = &cfg.accuracy;
        Some(AccuracyLog::open(&a.log_path, a.horizon_secs, a.min_interval_secs)?)
    } else {
        None
    };
    let mut stop = shutdown_on_ctrl_c();

    loop {
        let (trades, depth) = load_both(loader.clone()).await?;
        let now_ms = unix_millis();
        let report = MarketReport::build(trades.as_deref(), depth.as_deref(), &cfg.signals, now_ms);

        if let Some(log) = tracker.as_mut() {
            track_prediction(log, &report, trades.as_deref(), now_ms)?;
        }

        if json {
            let accuracy = tracker.as_ref().map(|log| log.summary());
            let out = serde_json::json!({ "report": report, "accuracy": accuracy });
            println!("{}", serde_json::to_string_pretty(&out)?);
        } else if report.is_cold() {
            println!("Waiting for data in {} ...", loader.dir().display());
        } else {
            println!("{report}");
            if let Some(log) = &tracker {
                let s = log.summary();
                match s.accuracy {
                    Some(acc) => println!("Prediction accuracy: {:.1}% over {} graded", acc * 100.0, s.graded),
                    None => println!("Prediction accuracy: no graded predictions yet"),
                }
            }
        }

        let Some(ms) = watch_ms else { break };
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(ms)) => {}
            _ = stop.changed() => break,
        }
    }
    Ok(())
}

type Datasets = (Option<Vec<TradeRecord>>, Option<Vec<DepthSnapshot>>);

// full re-scan of the store; keep it off the runtime threads
async fn load_both(loader: DatasetLoader) -> anyhow::Result<Datasets> {
    tokio::task::spawn_blocking(move || -> anyhow::Result<Datasets> {
        let trades = loader.load_trades().context("loading trades")?;
        let depth = loader.load_depth().context("loading depth")?;
        Ok((trades, depth))
    })
    .await
    .context("dataset loader task")?
}

fn track_prediction(
    log: &mut AccuracyLog,
    report: &MarketReport,
    trades: Option<&[TradeRecord]>,
    now_ms: i64,
) -> anyhow::Result<()> {
    let now_secs = now_ms as f64 / 1000.0;
    if let (Some(prediction), Some(flow)) = (&report.prediction, &report.trades) {
        log.record(now_secs, flow.last_price, prediction.direction);
    }
    if let Some(trades) = trades {
        let graded = log.grade(trades, now_secs);
        if graded > 0 {
            info!(graded, "graded predictions");
        }
    }
    log.save().with_context(|| format!("writing {}", log.path().display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_processes_never_open_the_metrics_listener() {
        let cli = Cli::try_parse_from(["tapex", "--config", "tapex.toml", "--log", "debug", "run", "--processes"]).unwrap();
        let args = child_args(&cli);
        assert_eq!(args, ["--config", "tapex.toml", "--log", "debug", "--no-metrics"]);

        // what a child sees once the launcher appends `ingest <kind>`
        let mut argv = vec!["tapex".to_string()];
        argv.extend(args);
        argv.extend(["ingest".to_string(), "depth".to_string()]);
        let child = Cli::try_parse_from(argv).unwrap();
        assert!(child.no_metrics);
        assert!(matches!(child.cmd, Cmd::Ingest { kind: StreamKind::Depth }));
    }

    #[test]
    fn metrics_listener_is_on_by_default() {
        let cli = Cli::try_parse_from(["tapex", "ingest", "trades"]).unwrap();
        assert!(!cli.no_metrics);
        assert!(child_args(&cli).contains(&"--no-metrics".to_string()));
    }
}
