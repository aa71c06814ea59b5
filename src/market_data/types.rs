use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The two record families the feed produces. Also the filename prefix of their batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    Trades,
    Depth,
}

impl StreamKind {
    pub const ALL: [StreamKind; 2] = [StreamKind::Trades, StreamKind::Depth];

    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::Trades => "trades",
            StreamKind::Depth => "depth",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StreamKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trades" | "trade" => Ok(StreamKind::Trades),
            "depth" => Ok(StreamKind::Depth),
            other => Err(format!("unknown stream kind '{other}' (expected trades|depth)")),
        }
    }
}

// One executed trade, as delivered by the trade stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub event_time: i64, // ms
    pub trade_time: i64, // ms, ordering key
    pub price: f64,
    pub qty: f64,
    /// true = the buyer was the resting side, i.e. an aggressive sell
    pub is_buyer_maker: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Level {
    pub price: f64,
    pub size: f64,
}

impl Level {
    pub fn new(price: f64, size: f64) -> Self {
        Self { price, size }
    }
}

/// Top-N book snapshot. Bids descending, asks ascending, exactly as the exchange sends them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthSnapshot {
    pub event_time: i64, // ms, ordering key
    pub bids: Vec<Level>,
    pub asks: Vec<Level>,
}

impl DepthSnapshot {
    pub fn best_bid(&self) -> Option<Level> {
        self.bids.first().copied()
    }

    pub fn best_ask(&self) -> Option<Level> {
        self.asks.first().copied()
    }
}

/// Wall clock in epoch milliseconds.
pub fn unix_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
