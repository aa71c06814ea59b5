//! Trade-flow statistics over a logical trade dataset (sorted by `trade_time`).

use serde::Serialize;

use crate::market_data::types::TradeRecord;

pub const ONE_MINUTE_SECS: u64 = 60;
pub const FIVE_MINUTES_SECS: u64 = 300;

/// Aggressor counts. `is_buyer_maker == false` is an aggressive buy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FlowCounts {
    pub buys: usize,
    pub sells: usize,
    pub ratio: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PricePoint {
    pub ts_ms: i64,
    pub price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeMetrics {
    pub vwap: Option<f64>,
    pub buys: usize,
    pub sells: usize,
    pub buy_sell_ratio: f64,
    pub volatility_1m: Option<f64>,
    pub volatility_5m: Option<f64>,
    pub last_price: f64,
    pub trade_count: usize,
}

/// Σ(price·qty) / Σ(qty). `None` when there is no volume.
pub fn vwap(trades: &[TradeRecord]) -> Option<f64> {
    let (notional, volume) = trades
        .iter()
        .fold((0.0, 0.0), |(n, v), t| (n + t.price * t.qty, v + t.qty));
    (volume > 0.0).then(|| notional / volume)
}

/// buys / max(sells, 1); with no sells the ratio is the buy count.
pub fn buy_sell_ratio(trades: &[TradeRecord]) -> FlowCounts {
    let sells = trades.iter().filter(|t| t.is_buyer_maker).count();
    let buys = trades.len() - sells;
    FlowCounts { buys, sells, ratio: buys as f64 / sells.max(1) as f64 }
}

/// Sample standard deviation of absolute returns between consecutive trades inside
/// the last `window_secs` (relative to the newest trade). `None` with fewer than two returns.
pub fn volatility(trades: &[TradeRecord], window_secs: u64) -> Option<f64> {
    let window = in_window(trades, window_secs);
    let returns: Vec<f64> = window
        .windows(2)
        .map(|pair| ((pair[1].price - pair[0].price) / pair[0].price).abs())
        .filter(|r| r.is_finite())
        .collect();
    sample_std(&returns)
}

/// `(timestamp, price)` for the last `window_secs`, ordered by timestamp. `None` if empty.
pub fn windowed_price_series(trades: &[TradeRecord], window_secs: u64) -> Option<Vec<PricePoint>> {
    let mut points: Vec<PricePoint> = in_window(trades, window_secs)
        .into_iter()
        .map(|t| PricePoint { ts_ms: t.trade_time, price: t.price })
        .collect();
    if points.is_empty() {
        return None;
    }
    points.sort_by_key(|p| p.ts_ms);
    Some(points)
}

/// The bundle a dashboard refresh needs. `None` for an empty dataset.
pub fn summarize_trades(trades: &[TradeRecord]) -> Option<TradeMetrics> {
    let last = trades.last()?;
    let flow = buy_sell_ratio(trades);
    Some(TradeMetrics {
        vwap: vwap(trades),
        buys: flow.buys,
        sells: flow.sells,
        buy_sell_ratio: flow.ratio,
        volatility_1m: volatility(trades, ONE_MINUTE_SECS),
        volatility_5m: volatility(trades, FIVE_MINUTES_SECS),
        last_price: last.price,
        trade_count: trades.len(),
    })
}

/// Lower (exclusive) bound of a window ending at `latest_ms`.
pub(crate) fn window_start(latest_ms: i64, window_secs: u64) -> i64 {
    latest_ms.saturating_sub((window_secs as i64).saturating_mul(1000))
}

fn in_window(trades: &[TradeRecord], window_secs: u64) -> Vec<&TradeRecord> {
    let Some(latest) = trades.iter().map(|t| t.trade_time).max() else {
        return Vec::new();
    };
    let cutoff = window_start(latest, window_secs);
    trades.iter().filter(|t| t.trade_time > cutoff).collect()
}

fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Some(var.sqrt())
}
