//! Layered configuration: built-in defaults, then an optional file, then `TAPEX_*` env vars.
//!
//! `TAPEX_FEED__SYMBOL=ethusdt` overrides `feed.symbol`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::analytics::SignalConfig;
use crate::persist::WriteFailurePolicy;
use crate::supervisor::RestartMode;

pub const ENV_PREFIX: &str = "TAPEX";
pub const DEFAULT_CONFIG_FILE: &str = "tapex";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub feed: FeedConfig,
    pub flush: FlushConfig,
    pub supervisor: SupervisorConfig,
    pub signals: SignalConfig,
    pub accuracy: AccuracyConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding every batch file of both families
    pub data_dir: PathBuf,
    pub on_write_failure: WriteFailurePolicy,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { data_dir: PathBuf::from("data/raw"), on_write_failure: WriteFailurePolicy::Retain }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub ws_base_url: String,
    pub symbol: String,
    pub depth_levels: usize,
    pub depth_update_ms: u64,
    pub reconnect_min_ms: u64,
    pub reconnect_max_ms: u64,
    pub reconnect_jitter_ms: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            ws_base_url: crate::market_data::adapters::binance::DEFAULT_WS_BASE_URL.to_string(),
            symbol: "btcusdt".to_string(),
            depth_levels: 5,
            depth_update_ms: 100,
            reconnect_min_ms: 500,
            reconnect_max_ms: 30_000,
            reconnect_jitter_ms: 250,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlushConfig {
    pub interval_secs: u64,
}

impl Default for FlushConfig {
    fn default() -> Self {
        Self { interval_secs: 5 }
    }
}

impl FlushConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    pub restart: RestartMode,
    pub restart_min_ms: u64,
    pub restart_max_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self { restart: RestartMode::Backoff, restart_min_ms: 1_000, restart_max_ms: 60_000, poll_interval_ms: 1_000 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccuracyConfig {
    pub log_path: PathBuf,
    pub horizon_secs: f64,
    pub min_interval_secs: f64,
}

impl Default for AccuracyConfig {
    fn default() -> Self {
        Self {
            log_path: PathBuf::from("data/prediction_log.csv"),
            horizon_secs: crate::analytics::accuracy::DEFAULT_HORIZON_SECS,
            min_interval_secs: crate::analytics::accuracy::DEFAULT_MIN_INTERVAL_SECS,
        }
    }
}

impl AppConfig {
    /// `path` must exist when given; otherwise `tapex.{toml,yaml,json}` is used if present.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let defaults = config::Config::try_from(&AppConfig::default()).context("serialising defaults")?;
        let file = match path {
            Some(p) => config::File::from(p).required(true),
            None => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };
        let built = config::Config::builder()
            .add_source(defaults)
            .add_source(file)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("building configuration")?;
        built.try_deserialize().context("invalid configuration")
    }
}
