// =============================================================================
// Market data provider contract
// =============================================================================
//
// Every external exchange exposes the same minimal capability set: an
// availability check (keys present, endpoint usable) and a single-symbol
// ticker fetch normalized into `MarketTicker`. Providers take the engine's
// base symbol ("BTC") and do their own pair mapping internally.
// =============================================================================

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

/// Normalized ticker from one venue.
#[derive(Debug, Clone, Serialize)]
pub struct MarketTicker {
    pub price: f64,
    /// 24h volume; quote-denominated where the venue provides it.
    pub volume_24h: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub funding_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_interest: Option<f64>,
    /// Short venue tag, e.g. "bybit_linear".
    pub source: &'static str,
}

#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Registry name — what MARKET_DATA_PROVIDERS refers to.
    fn name(&self) -> &'static str;

    /// Whether the provider is configured and usable. Public endpoints are
    /// always available barring IP blocks.
    fn check_availability(&self) -> bool {
        true
    }

    async fn get_market_data(&self, symbol: &str) -> Result<MarketTicker>;
}

// ---------------------------------------------------------------------------
// Shared parse helpers for the Value-shaped ticker bodies
// ---------------------------------------------------------------------------

/// Read a numeric field that may be a JSON string or number; 0.0 if absent.
pub(crate) fn num(value: &Value, key: &str) -> f64 {
    match value.get(key) {
        Some(Value::String(s)) => s.parse().unwrap_or(0.0),
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Like `num` but `None` when the field is missing or unparsable.
pub(crate) fn opt_num(value: &Value, key: &str) -> Option<f64> {
    match value.get(key) {
        Some(Value::String(s)) => s.parse().ok(),
        Some(Value::Number(n)) => n.as_f64(),
        _ => None,
    }
}
