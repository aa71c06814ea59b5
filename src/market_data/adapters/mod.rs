// Shared trait + errors for market data adapters

use thiserror::Error;

use crate::persist::codec::StoredRecord;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("invalid number '{value}' in field '{field}'")]
    InvalidNumber { field: &'static str, value: String },
    #[error("websocket error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("stream ended")]
    Closed,
}

impl FeedError {
    /// Per-message failures are dropped; everything else tears the connection down.
    pub fn is_message_local(&self) -> bool {
        matches!(self, FeedError::Malformed(_) | FeedError::InvalidNumber { .. })
    }
}

/// A venue stream that yields one record type. The client owns the connection;
/// the adapter only knows where to connect and how to read one text frame.
pub trait VenueAdapter: Send + Sync + 'static {
    type Record: StoredRecord;

    fn ws_url(&self) -> String;

    // `received_ms` is the local wall clock at frame receipt
    fn parse(&self, text: &str, received_ms: i64) -> Result<Self::Record, FeedError>;
}

// Make the Binance adapters visible
pub mod binance;
pub mod binance_types;
