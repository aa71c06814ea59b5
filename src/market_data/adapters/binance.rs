// Binance spot adapters: one raw stream per record type, no subscription handshake needed.

use super::binance_types::{WsPartialDepth, WsTrade};
use super::{FeedError, VenueAdapter};
use crate::market_data::normaliser::Normaliser;
use crate::market_data::types::{DepthSnapshot, TradeRecord};

pub const DEFAULT_WS_BASE_URL: &str = "wss://stream.binance.com:9443/ws";

pub struct BinanceTradeAdapter {
    pub symbol: String,      // e.g. "btcusdt"
    pub ws_base_url: String, // "wss://stream.binance.com:9443/ws"
    normaliser: Normaliser,
}

impl BinanceTradeAdapter {
    pub fn new(symbol: &str, ws_base_url: &str) -> Self {
        Self {
            symbol: symbol.to_lowercase(),
            ws_base_url: ws_base_url.trim_end_matches('/').to_string(),
            normaliser: Normaliser::new(0),
        }
    }
}

impl VenueAdapter for BinanceTradeAdapter {
    type Record = TradeRecord;

    fn ws_url(&self) -> String {
        format!("{}/{}@trade", self.ws_base_url, self.symbol)
    }

    fn parse(&self, text: &str, _received_ms: i64) -> Result<TradeRecord, FeedError> {
        let msg: WsTrade = serde_json::from_str(text)?;
        Ok(TradeRecord {
            event_time: msg.event_time,
            trade_time: msg.trade_time,
            price: self.normaliser.price("p", &msg.price)?,
            qty: self.normaliser.size("q", &msg.qty)?,
            is_buyer_maker: msg.is_buyer_maker,
        })
    }
}

pub struct BinanceDepthAdapter {
    pub symbol: String,
    pub ws_base_url: String,
    pub update_ms: u64, // server push cadence, 100 or 1000
    normaliser: Normaliser,
}

impl BinanceDepthAdapter {
    pub fn new(symbol: &str, ws_base_url: &str, levels: usize, update_ms: u64) -> Self {
        Self {
            symbol: symbol.to_lowercase(),
            ws_base_url: ws_base_url.trim_end_matches('/').to_string(),
            update_ms,
            normaliser: Normaliser::new(levels),
        }
    }
}

impl VenueAdapter for BinanceDepthAdapter {
    type Record = DepthSnapshot;

    fn ws_url(&self) -> String {
        format!(
            "{}/{}@depth{}@{}ms",
            self.ws_base_url, self.symbol, self.normaliser.max_levels, self.update_ms
        )
    }

    // The partial depth payload has no event time; stamp it with receipt time.
    fn parse(&self, text: &str, received_ms: i64) -> Result<DepthSnapshot, FeedError> {
        let msg: WsPartialDepth = serde_json::from_str(text)?;
        Ok(DepthSnapshot {
            event_time: received_ms,
            bids: self.normaliser.levels("bids", &msg.bids)?,
            asks: self.normaliser.levels("asks", &msg.asks)?,
        })
    }
}
