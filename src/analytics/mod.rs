//! Metrics engine. Everything here is a pure function of the dataset snapshot passed in.

pub mod accuracy;
pub mod orderbook;
pub mod predict;
pub mod regime;
pub mod report;
pub mod trades;

use serde::{Deserialize, Serialize};

use crate::analytics::orderbook::OrderBookMetrics;
use crate::analytics::predict::{Prediction, PredictionWeights};
use crate::analytics::regime::{Regime, RegimeThresholds};
use crate::analytics::trades::TradeMetrics;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    pub regime: RegimeThresholds,
    pub prediction: PredictionWeights,
}

/// Inputs shared by the regime label and the direction call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Signals {
    pub imbalance: f64,
    pub microprice: f64,
    pub mid_price: f64,
    pub buy_sell_ratio: f64,
    pub spread: f64,
    pub vol_1m: Option<f64>,
}

impl Signals {
    pub fn from_metrics(trades: &TradeMetrics, book: &OrderBookMetrics) -> Self {
        Self {
            imbalance: book.imbalance,
            microprice: book.microprice,
            mid_price: book.mid_price,
            buy_sell_ratio: trades.buy_sell_ratio,
            spread: book.spread,
            vol_1m: trades.volatility_1m,
        }
    }

    pub fn regime(&self, t: &RegimeThresholds) -> Regime {
        regime::regime(self.imbalance, self.microprice, self.mid_price, self.buy_sell_ratio, self.vol_1m, t)
    }

    pub fn predict(&self, w: &PredictionWeights) -> Prediction {
        predict::predict(
            self.microprice,
            self.mid_price,
            self.imbalance,
            self.buy_sell_ratio,
            self.spread,
            self.vol_1m,
            w,
        )
    }
}
