// =============================================================================
// Kraken spot ticker provider
// =============================================================================
//
// Kraken's result map keys are venue-internal pair codes (BTCUSD comes back
// as XXBTZUSD), so the first entry of the result map is taken rather than a
// key lookup.
// =============================================================================

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::Value;

use super::super::provider::{MarketDataProvider, MarketTicker};

const BASE_URL: &str = "https://api.kraken.com";

pub struct KrakenProvider {
    http: reqwest::Client,
}

impl KrakenProvider {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl MarketDataProvider for KrakenProvider {
    fn name(&self) -> &'static str {
        "kraken"
    }

    async fn get_market_data(&self, symbol: &str) -> Result<MarketTicker> {
        let pair = format!("{symbol}USD");

        let body: Value = self
            .http
            .get(format!("{BASE_URL}/0/public/Ticker"))
            .query(&[("pair", pair.as_str())])
            .send()
            .await
            .context("kraken ticker request failed")?
            .error_for_status()?
            .json()
            .await
            .context("kraken ticker body is not JSON")?;

        if body
            .get("error")
            .and_then(Value::as_array)
            .is_some_and(|e| !e.is_empty())
        {
            bail!("kraken error for {pair}: {:?}", body["error"]);
        }

        let ticker = body["result"]
            .as_object()
            .and_then(|m| m.values().next())
            .with_context(|| format!("kraken result empty for {pair}"))?;

        // c = [last trade price, lot volume], v = [today, last 24h].
        let price: f64 = ticker["c"][0]
            .as_str()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0.0);
        let volume_24h: f64 = ticker["v"][1]
            .as_str()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0.0);

        Ok(MarketTicker {
            price,
            volume_24h,
            funding_rate: None,
            open_interest: None,
            source: "kraken_spot",
        })
    }
}
