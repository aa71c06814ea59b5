//! Top-of-book derived quantities over depth snapshots.

use serde::Serialize;

use crate::analytics::trades::window_start;
use crate::market_data::types::{DepthSnapshot, Level};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TopOfBook {
    pub bid: Level,
    pub ask: Level,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OrderBookMetrics {
    pub bid_price: f64,
    pub ask_price: f64,
    pub bid_size: f64,
    pub ask_size: f64,
    pub spread: f64,
    pub mid_price: f64,
    pub microprice: f64,
    pub imbalance: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ImbalancePoint {
    pub ts_ms: i64,
    pub imbalance: f64,
    pub spread: f64,
}

/// One price row of the heatmap. Norm columns are presentation weights in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HeatmapRow {
    pub price: f64,
    pub bid_size: f64,
    pub ask_size: f64,
    pub bid_norm: f64,
    pub ask_norm: f64,
}

/// Element 0 of each side. `None` if either side is empty.
pub fn top_of_book(snapshot: &DepthSnapshot) -> Option<TopOfBook> {
    Some(TopOfBook { bid: snapshot.best_bid()?, ask: snapshot.best_ask()? })
}

/// Spread, mid, microprice and imbalance of the best levels.
/// Undefined when a side is missing or the best levels hold no size.
pub fn orderbook_metrics(snapshot: &DepthSnapshot) -> Option<OrderBookMetrics> {
    let TopOfBook { bid, ask } = top_of_book(snapshot)?;
    let total = bid.size + ask.size;
    if total == 0.0 {
        return None;
    }
    Some(OrderBookMetrics {
        bid_price: bid.price,
        ask_price: ask.price,
        bid_size: bid.size,
        ask_size: ask.size,
        spread: ask.price - bid.price,
        mid_price: (bid.price + ask.price) / 2.0,
        microprice: (ask.price * bid.size + bid.price * ask.size) / total,
        imbalance: (bid.size - ask.size) / total,
    })
}

/// Metrics of the newest snapshot in a depth dataset.
pub fn latest_orderbook_metrics(depth: &[DepthSnapshot]) -> Option<OrderBookMetrics> {
    orderbook_metrics(latest(depth)?)
}

/// `(imbalance, spread)` per snapshot in the last `window_secs`. Snapshots without a
/// usable top of book are skipped; `None` if nothing qualifies.
pub fn imbalance_series(depth: &[DepthSnapshot], window_secs: u64) -> Option<Vec<ImbalancePoint>> {
    let latest = depth.iter().map(|d| d.event_time).max()?;
    let cutoff = window_start(latest, window_secs);

    let mut points: Vec<ImbalancePoint> = depth
        .iter()
        .filter(|d| d.event_time > cutoff)
        .filter_map(|d| {
            let m = orderbook_metrics(d)?;
            Some(ImbalancePoint { ts_ms: d.event_time, imbalance: m.imbalance, spread: m.spread })
        })
        .collect();
    if points.is_empty() {
        return None;
    }
    points.sort_by_key(|p| p.ts_ms);
    Some(points)
}

/// Top `levels` per side, each side normalised by its own largest size, sorted by price.
pub fn orderbook_heatmap(snapshot: &DepthSnapshot, levels: usize) -> Vec<HeatmapRow> {
    let bids = &snapshot.bids[..snapshot.bids.len().min(levels)];
    let asks = &snapshot.asks[..snapshot.asks.len().min(levels)];
    let max_bid = side_max(bids);
    let max_ask = side_max(asks);

    let mut rows: Vec<HeatmapRow> = bids
        .iter()
        .map(|l| HeatmapRow {
            price: l.price,
            bid_size: l.size,
            ask_size: 0.0,
            bid_norm: normalise(l.size, max_bid),
            ask_norm: 0.0,
        })
        .chain(asks.iter().map(|l| HeatmapRow {
            price: l.price,
            bid_size: 0.0,
            ask_size: l.size,
            bid_norm: 0.0,
            ask_norm: normalise(l.size, max_ask),
        }))
        .collect();
    rows.sort_by(|a, b| a.price.total_cmp(&b.price));
    rows
}

pub fn latest_heatmap(depth: &[DepthSnapshot], levels: usize) -> Option<Vec<HeatmapRow>> {
    Some(orderbook_heatmap(latest(depth)?, levels))
}

// last of the maxima, i.e. the tail of a sorted dataset
fn latest(depth: &[DepthSnapshot]) -> Option<&DepthSnapshot> {
    depth.iter().max_by_key(|d| d.event_time)
}

fn side_max(levels: &[Level]) -> f64 {
    levels.iter().map(|l| l.size).fold(0.0, f64::max)
}

fn normalise(size: f64, max: f64) -> f64 {
    if max > 0.0 { size / max } else { 0.0 }
}
