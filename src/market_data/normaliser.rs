// Convert wire strings into f64 prices/sizes.
// Binance sends every number as a decimal string ("27000.01000000").

use crate::market_data::adapters::FeedError;
use crate::market_data::types::Level;

pub struct Normaliser {
    pub max_levels: usize, // book depth kept per side
}

impl Normaliser {
    pub fn new(max_levels: usize) -> Self {
        Self { max_levels }
    }

    pub fn price(&self, field: &'static str, s: &str) -> Result<f64, FeedError> {
        let value = parse_number(field, s)?;
        if value <= 0.0 {
            return Err(FeedError::InvalidNumber { field, value: s.to_string() });
        }
        Ok(value)
    }

    pub fn size(&self, field: &'static str, s: &str) -> Result<f64, FeedError> {
        let value = parse_number(field, s)?;
        if value < 0.0 {
            return Err(FeedError::InvalidNumber { field, value: s.to_string() });
        }
        Ok(value)
    }

    /// Normalise one book side, keeping the exchange ordering and at most `max_levels` entries.
    pub fn levels(&self, field: &'static str, side: &[(String, String)]) -> Result<Vec<Level>, FeedError> {
        side.iter()
            .take(self.max_levels)
            .map(|(px, sz)| Ok(Level::new(self.price(field, px)?, self.size(field, sz)?)))
            .collect()
    }
}

fn parse_number(field: &'static str, s: &str) -> Result<f64, FeedError> {
    match s.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(FeedError::InvalidNumber { field, value: s.to_string() }),
    }
}
