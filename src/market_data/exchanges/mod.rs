// =============================================================================
// External exchange ticker providers — one small module per venue
// =============================================================================

pub mod binance;
pub mod bingx;
pub mod bitget;
pub mod bybit;
pub mod crypto_com;
pub mod gate;
pub mod htx;
pub mod kraken;
pub mod kucoin;
pub mod mexc;
pub mod okx;
