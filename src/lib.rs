pub mod analytics;
pub mod backoff;
pub mod config;
pub mod market_data;
pub mod persist;
pub mod supervisor;
pub mod telemetry;
