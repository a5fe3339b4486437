// =============================================================================
// Technical Indicators — pure functions over OHLCV slices
// =============================================================================
//
// Every function takes oldest-first data and returns either a series aligned
// to the tail of the input or the most recent value. Insufficient data yields
// an empty series / `None`, never a panic.
// =============================================================================

pub mod adx;
pub mod atr;
pub mod donchian;
pub mod ema;
pub mod macd;
pub mod pivot;
pub mod rsi;

pub use adx::calculate_adx;
pub use atr::{calculate_atr, calculate_atr_series};
pub use donchian::calculate_donchian;
pub use ema::{calculate_ema, calculate_sma};
pub use macd::calculate_macd;
pub use pivot::{calculate_pivot_points, PivotPoints};
pub use rsi::calculate_rsi;
