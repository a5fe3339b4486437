// =============================================================================
// Coin Screener — universe selection by hard filters + weighted factor scores
// =============================================================================

pub mod cache;
pub mod coingecko;
pub mod engine;
pub mod filters;
pub mod models;
pub mod scoring;

pub use engine::CoinScreener;
pub use models::{CoinMetrics, ScreeningResult};
