//! Coarse directional-pressure label from combined microstructure signals.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Regime {
    #[serde(rename = "STRONGLY BEARISH")]
    StronglyBearish,
    #[serde(rename = "BEARISH")]
    Bearish,
    #[serde(rename = "NEUTRAL")]
    Neutral,
    #[serde(rename = "BULLISH")]
    Bullish,
    #[serde(rename = "STRONGLY BULLISH")]
    StronglyBullish,
}

impl fmt::Display for Regime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Regime::StronglyBearish => "STRONGLY BEARISH",
            Regime::Bearish => "BEARISH",
            Regime::Neutral => "NEUTRAL",
            Regime::Bullish => "BULLISH",
            Regime::StronglyBullish => "STRONGLY BULLISH",
        };
        f.write_str(label)
    }
}

/// Hand-tuned cut-offs and weights. Defaults are the production values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegimeThresholds {
    pub strong_imbalance: f64,
    pub mild_imbalance: f64,
    pub strong_imbalance_weight: f64,
    pub mild_imbalance_weight: f64,
    pub microprice_weight: f64,
    pub flow_high: f64,
    pub flow_low: f64,
    pub flow_weight: f64,
    pub high_volatility: f64,
    pub high_volatility_factor: f64,
    pub low_volatility: f64,
    pub low_volatility_factor: f64,
    pub strong_score: f64,
    pub score: f64,
}

impl Default for RegimeThresholds {
    fn default() -> Self {
        Self {
            strong_imbalance: 0.4,
            mild_imbalance: 0.1,
            strong_imbalance_weight: 2.0,
            mild_imbalance_weight: 1.0,
            microprice_weight: 1.0,
            flow_high: 1.2,
            flow_low: 0.8,
            flow_weight: 1.0,
            high_volatility: 0.0008,
            high_volatility_factor: 0.5,
            low_volatility: 0.0002,
            low_volatility_factor: 1.2,
            strong_score: 2.5,
            score: 1.0,
        }
    }
}

pub fn regime_score(
    imbalance: f64,
    microprice: f64,
    mid_price: f64,
    buy_sell_ratio: f64,
    vol_1m: Option<f64>,
    t: &RegimeThresholds,
) -> f64 {
    let mut score = 0.0;

    // book imbalance dominates
    if imbalance > t.strong_imbalance {
        score += t.strong_imbalance_weight;
    } else if imbalance > t.mild_imbalance {
        score += t.mild_imbalance_weight;
    } else if imbalance < -t.strong_imbalance {
        score -= t.strong_imbalance_weight;
    } else if imbalance < -t.mild_imbalance {
        score -= t.mild_imbalance_weight;
    }

    if microprice > mid_price {
        score += t.microprice_weight;
    } else if microprice < mid_price {
        score -= t.microprice_weight;
    }

    if buy_sell_ratio > t.flow_high {
        score += t.flow_weight;
    } else if buy_sell_ratio < t.flow_low {
        score -= t.flow_weight;
    }

    // unknown volatility leaves the score alone
    if let Some(vol) = vol_1m {
        if vol > t.high_volatility {
            score *= t.high_volatility_factor;
        } else if vol < t.low_volatility {
            score *= t.low_volatility_factor;
        }
    }
    score
}

pub fn label(score: f64, t: &RegimeThresholds) -> Regime {
    if score >= t.strong_score {
        Regime::StronglyBullish
    } else if score >= t.score {
        Regime::Bullish
    } else if score <= -t.strong_score {
        Regime::StronglyBearish
    } else if score <= -t.score {
        Regime::Bearish
    } else {
        Regime::Neutral
    }
}

pub fn regime(
    imbalance: f64,
    microprice: f64,
    mid_price: f64,
    buy_sell_ratio: f64,
    vol_1m: Option<f64>,
    t: &RegimeThresholds,
) -> Regime {
    label(regime_score(imbalance, microprice, mid_price, buy_sell_ratio, vol_1m, t), t)
}
