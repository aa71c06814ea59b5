// Market data module entrypoint
pub mod types;          // trade / depth records shared by every layer
pub mod adapters;       // venue-specific wire formats (e.g. Binance)
pub mod normaliser;     // converts wire strings -> f64
pub mod client;         // long-lived websocket client feeding the batching buffer
pub mod router;         // wires adapter + client + store for one stream

pub use types::{DepthSnapshot, Level, StreamKind, TradeRecord};
