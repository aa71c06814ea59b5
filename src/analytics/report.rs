// Everything one dashboard refresh shows, computed from the two logical datasets.

use std::fmt;

use serde::Serialize;

use crate::analytics::orderbook::{
    imbalance_series, latest_heatmap, latest_orderbook_metrics, HeatmapRow, ImbalancePoint, OrderBookMetrics,
};
use crate::analytics::predict::Prediction;
use crate::analytics::regime::Regime;
use crate::analytics::trades::{summarize_trades, windowed_price_series, PricePoint, TradeMetrics};
use crate::analytics::{SignalConfig, Signals};
use crate::market_data::types::{DepthSnapshot, TradeRecord};

pub const CHART_WINDOW_SECS: u64 = 300;
pub const HEATMAP_LEVELS: usize = 5;

#[derive(Debug, Clone, Serialize)]
pub struct MarketReport {
    pub generated_at_ms: i64,
    pub trades: Option<TradeMetrics>,
    pub orderbook: Option<OrderBookMetrics>,
    pub heatmap: Option<Vec<HeatmapRow>>,
    pub price_series: Option<Vec<PricePoint>>,
    pub imbalance_series: Option<Vec<ImbalancePoint>>,
    pub signals: Option<Signals>,
    pub regime: Option<Regime>,
    pub prediction: Option<Prediction>,
}

impl MarketReport {
    /// Absent datasets stay absent in the report; regime and prediction need both.
    pub fn build(
        trades: Option<&[TradeRecord]>,
        depth: Option<&[DepthSnapshot]>,
        config: &SignalConfig,
        generated_at_ms: i64,
    ) -> Self {
        let trade_metrics = trades.and_then(summarize_trades);
        let book_metrics = depth.and_then(latest_orderbook_metrics);
        let signals = match (&trade_metrics, &book_metrics) {
            (Some(t), Some(b)) => Some(Signals::from_metrics(t, b)),
            _ => None,
        };

        Self {
            generated_at_ms,
            heatmap: depth.and_then(|d| latest_heatmap(d, HEATMAP_LEVELS)),
            price_series: trades.and_then(|t| windowed_price_series(t, CHART_WINDOW_SECS)),
            imbalance_series: depth.and_then(|d| imbalance_series(d, CHART_WINDOW_SECS)),
            regime: signals.map(|s| s.regime(&config.regime)),
            prediction: signals.map(|s| s.predict(&config.prediction)),
            signals,
            trades: trade_metrics,
            orderbook: book_metrics,
        }
    }

    pub fn is_cold(&self) -> bool {
        self.trades.is_none() && self.orderbook.is_none()
    }
}

fn opt(v: Option<f64>, precision: usize) -> String {
    v.map(|x| format!("{x:.precision$}")).unwrap_or_else(|| "N/A".to_string())
}

impl fmt::Display for MarketReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== TRADE FLOW ===")?;
        match &self.trades {
            Some(t) => {
                writeln!(f, "Trades        : {}", t.trade_count)?;
                writeln!(f, "VWAP          : {}", opt(t.vwap, 2))?;
                writeln!(f, "Buy / Sell    : {} / {} (ratio {:.3})", t.buys, t.sells, t.buy_sell_ratio)?;
                writeln!(f, "Volatility 1m : {}", opt(t.volatility_1m, 6))?;
                writeln!(f, "Volatility 5m : {}", opt(t.volatility_5m, 6))?;
            }
            None => writeln!(f, "No trade data yet.")?,
        }

        writeln!(f, "\n=== ORDER BOOK ===")?;
        match &self.orderbook {
            Some(b) => {
                writeln!(f, "Bid           : {:.2} x {:.4}", b.bid_price, b.bid_size)?;
                writeln!(f, "Ask           : {:.2} x {:.4}", b.ask_price, b.ask_size)?;
                writeln!(f, "Spread        : {:.4}", b.spread)?;
                writeln!(f, "Mid           : {:.4}", b.mid_price)?;
                writeln!(f, "Microprice    : {:.4}", b.microprice)?;
                writeln!(f, "Imbalance     : {:.3}", b.imbalance)?;
            }
            None => writeln!(f, "No depth data yet.")?,
        }
        if let Some(rows) = &self.heatmap {
            writeln!(f, "\n{:>12} {:>12} {:>12}", "price", "bid", "ask")?;
            for row in rows.iter().rev() {
                let (size, norm, mark) = if row.bid_size > 0.0 {
                    (row.bid_size, row.bid_norm, '+')
                } else {
                    (row.ask_size, row.ask_norm, '-')
                };
                let bar: String = std::iter::repeat(mark).take((norm * 20.0).round() as usize).collect();
                if row.bid_size > 0.0 {
                    writeln!(f, "{:>12.2} {:>12.4} {:>12} {}", row.price, size, "", bar)?;
                } else {
                    writeln!(f, "{:>12.2} {:>12} {:>12.4} {}", row.price, "", size, bar)?;
                }
            }
        }

        writeln!(f, "\n=== REGIME ===")?;
        match self.regime {
            Some(r) => writeln!(f, "{r}")?,
            None => writeln!(f, "Regime requires both trades and depth data.")?,
        }

        writeln!(f, "\n=== SHORT-TERM PREDICTION ===")?;
        match &self.prediction {
            Some(p) => writeln!(f, "{} ({:.1}% confidence, p_up {:.3})", p.direction, p.confidence, p.prob_up),
            None => writeln!(f, "Prediction requires both trades and depth data."),
        }
    }
}
