// =============================================================================
// Crypto.com exchange ticker provider
// =============================================================================

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::Value;

use super::super::provider::{num, MarketDataProvider, MarketTicker};

const BASE_URL: &str = "https://api.crypto.com";

pub struct CryptoComProvider {
    http: reqwest::Client,
}

impl CryptoComProvider {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl MarketDataProvider for CryptoComProvider {
    fn name(&self) -> &'static str {
        "crypto_com"
    }

    async fn get_market_data(&self, symbol: &str) -> Result<MarketTicker> {
        let instrument = format!("{symbol}_USDT");

        let body: Value = self
            .http
            .get(format!("{BASE_URL}/v2/public/get-ticker"))
            .query(&[("instrument_name", instrument.as_str())])
            .send()
            .await
            .context("crypto.com ticker request failed")?
            .error_for_status()?
            .json()
            .await
            .context("crypto.com ticker body is not JSON")?;

        if body.get("code").and_then(Value::as_i64) != Some(0) {
            bail!("crypto.com error for {instrument}: {body}");
        }

        let ticker = body["result"]["data"]
            .as_array()
            .and_then(|d| d.first())
            .with_context(|| format!("crypto.com data empty for {instrument}"))?;

        // a = latest trade price, v = 24h traded volume.
        Ok(MarketTicker {
            price: num(ticker, "a"),
            volume_24h: num(ticker, "v"),
            funding_rate: None,
            open_interest: None,
            source: "cryptocom_spot",
        })
    }
}
