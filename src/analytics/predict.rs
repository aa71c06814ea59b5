//! Short-horizon direction call: weighted linear score squashed through a logistic.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Up,
    Down,
    Neutral,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Up => "UP",
            Direction::Down => "DOWN",
            Direction::Neutral => "NEUTRAL",
        }
    }

    /// Realised direction of a price move.
    pub fn of_move(start: f64, end: f64) -> Self {
        if end > start {
            Direction::Up
        } else if end < start {
            Direction::Down
        } else {
            Direction::Neutral
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "UP" => Ok(Direction::Up),
            "DOWN" => Ok(Direction::Down),
            "NEUTRAL" => Ok(Direction::Neutral),
            other => Err(format!("unknown direction '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictionWeights {
    pub microprice: f64,
    pub imbalance: f64,
    pub flow: f64,
    pub spread: f64,
    pub volatility: f64,
    pub volatility_scale: f64,
    pub volatility_cap: f64,
    pub up_probability: f64,
    pub down_probability: f64,
}

impl Default for PredictionWeights {
    fn default() -> Self {
        Self {
            microprice: 2.2,
            imbalance: 3.0,
            flow: 1.8,
            spread: 1.2,
            volatility: 0.5,
            volatility_scale: 5000.0,
            volatility_cap: 1.5,
            up_probability: 0.55,
            down_probability: 0.45,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Prediction {
    pub direction: Direction,
    pub prob_up: f64,
    /// 0..=100, distance of `prob_up` from a coin flip
    pub confidence: f64,
    pub score: f64,
}

pub fn logistic(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

pub fn prediction_score(
    microprice: f64,
    mid_price: f64,
    imbalance: f64,
    buy_sell_ratio: f64,
    spread: f64,
    vol_1m: Option<f64>,
    w: &PredictionWeights,
) -> f64 {
    let vol_factor = (vol_1m.unwrap_or(0.0) * w.volatility_scale).min(w.volatility_cap);
    w.microprice * (microprice - mid_price) + w.imbalance * imbalance + w.flow * (buy_sell_ratio - 1.0)
        - w.spread * spread
        - w.volatility * vol_factor
}

pub fn direction_for(prob_up: f64, w: &PredictionWeights) -> Direction {
    if prob_up > w.up_probability {
        Direction::Up
    } else if prob_up < w.down_probability {
        Direction::Down
    } else {
        Direction::Neutral
    }
}

pub fn confidence(prob_up: f64) -> f64 {
    ((prob_up - 0.5).abs() * 200.0).clamp(0.0, 100.0)
}

pub fn predict(
    microprice: f64,
    mid_price: f64,
    imbalance: f64,
    buy_sell_ratio: f64,
    spread: f64,
    vol_1m: Option<f64>,
    w: &PredictionWeights,
) -> Prediction {
    let score = prediction_score(microprice, mid_price, imbalance, buy_sell_ratio, spread, vol_1m, w);
    let prob_up = logistic(score);
    Prediction { direction: direction_for(prob_up, w), prob_up, confidence: confidence(prob_up), score }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn score_matches_weights() {
        let w = PredictionWeights::default();
        let s = prediction_score(100.83, 100.5, 0.5, 1.5, 1.0, Some(0.0001), &w);
        let expected = 2.2 * (100.83 - 100.5) + 3.0 * 0.5 + 1.8 * 0.5 - 1.2 * 1.0 - 0.5 * 0.5;
        assert!((s - expected).abs() < 1e-12);
    }

    #[test]
    fn volatility_term_is_capped() {
        let w = PredictionWeights::default();
        let wild = prediction_score(0.0, 0.0, 0.0, 1.0, 0.0, Some(1.0), &w);
        assert_eq!(wild, -0.5 * 1.5);
        assert_eq!(prediction_score(0.0, 0.0, 0.0, 1.0, 0.0, None, &w), 0.0);
    }

    #[test]
    fn coin_flip_has_zero_confidence() {
        let p = predict(100.0, 100.0, 0.0, 1.0, 0.0, None, &PredictionWeights::default());
        assert_eq!(p.prob_up, 0.5);
        assert_eq!(p.confidence, 0.0);
        assert_eq!(p.direction, Direction::Neutral);
    }

    #[test]
    fn deterministic() {
        let w = PredictionWeights::default();
        let a = predict(100.83, 100.5, 0.667, 1.1, 1.0, Some(0.0003), &w);
        let b = predict(100.83, 100.5, 0.667, 1.1, 1.0, Some(0.0003), &w);
        assert_eq!(a.prob_up.to_bits(), b.prob_up.to_bits());
        assert_eq!(a, b);
    }

    #[test]
    fn direction_passes_through_neutral() {
        let w = PredictionWeights::default();
        let mut seen = Vec::new();
        for i in 0..=200 {
            let imbalance = 1.0 - i as f64 / 100.0;
            let d = predict(100.0, 100.0, imbalance, 1.0, 0.0, None, &w).direction;
            if seen.last() != Some(&d) {
                seen.push(d);
            }
        }
        assert_eq!(seen, vec![Direction::Up, Direction::Neutral, Direction::Down]);
    }

    #[test]
    fn realised_direction() {
        assert_eq!(Direction::of_move(100.0, 100.5), Direction::Up);
        assert_eq!(Direction::of_move(100.0, 99.5), Direction::Down);
        assert_eq!(Direction::of_move(100.0, 100.0), Direction::Neutral);
        assert_eq!("down".parse::<Direction>().unwrap(), Direction::Down);
    }

    proptest! {
        #[test]
        fn confidence_grows_with_distance_from_half(a in 0.0f64..=1.0, b in 0.0f64..=1.0) {
            let (near, far) = if (a - 0.5).abs() <= (b - 0.5).abs() { (a, b) } else { (b, a) };
            prop_assert!(confidence(near) <= confidence(far));
            prop_assert!((0.0..=100.0).contains(&confidence(a)));
        }

        #[test]
        fn logistic_is_monotone(x in -50.0f64..50.0, dx in 0.0f64..10.0) {
            prop_assert!(logistic(x) <= logistic(x + dx));
        }
    }
}
