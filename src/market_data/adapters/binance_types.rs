// Source: wss://stream.binance.com:9443/ws/<symbol>@trade
// {"e":"trade","E":1672515782136,"s":"BTCUSDT","t":12345,"p":"0.001","q":"100","T":1672515782136,"m":true,"M":true}
#[derive(Debug, serde::Deserialize)]
pub struct WsTrade {
    #[serde(rename = "E")]
    pub event_time: i64,
    #[serde(rename = "T")]
    pub trade_time: i64,
    #[serde(rename = "p")]
    pub price: String,
    #[serde(rename = "q")]
    pub qty: String,
    #[serde(rename = "m")]
    pub is_buyer_maker: bool,
}

// Source: wss://stream.binance.com:9443/ws/<symbol>@depth<levels>@<speed>ms
// {"lastUpdateId":160,"bids":[["0.0024","10"]],"asks":[["0.0026","100"]]}
#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsPartialDepth {
    #[serde(default)]
    pub last_update_id: Option<u64>,
    pub bids: Vec<WsLevel>,
    pub asks: Vec<WsLevel>,
}

pub type WsLevel = (String, String); // (price, size)
