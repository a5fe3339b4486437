// =============================================================================
// OKX V5 perpetual-swap ticker provider
// =============================================================================
//
// Funding would need a second endpoint (/public/funding-rate); the snapshot
// only carries price and quote volume from the ticker.
// =============================================================================

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::Value;

use super::super::provider::{num, MarketDataProvider, MarketTicker};

const BASE_URL: &str = "https://www.okx.com";

pub struct OkxProvider {
    http: reqwest::Client,
}

impl OkxProvider {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl MarketDataProvider for OkxProvider {
    fn name(&self) -> &'static str {
        "okx"
    }

    async fn get_market_data(&self, symbol: &str) -> Result<MarketTicker> {
        let inst_id = format!("{symbol}-USDT-SWAP");

        let body: Value = self
            .http
            .get(format!("{BASE_URL}/api/v5/market/ticker"))
            .query(&[("instId", inst_id.as_str())])
            .send()
            .await
            .context("okx ticker request failed")?
            .error_for_status()?
            .json()
            .await
            .context("okx ticker body is not JSON")?;

        if body.get("code").and_then(Value::as_str) != Some("0") {
            bail!("okx error code for {inst_id}: {body}");
        }

        let ticker = body["data"]
            .as_array()
            .and_then(|d| d.first())
            .with_context(|| format!("okx data array empty for {inst_id}"))?;

        Ok(MarketTicker {
            price: num(ticker, "last"),
            // volCcy24h is quote-currency volume.
            volume_24h: num(ticker, "volCcy24h"),
            funding_rate: None,
            open_interest: None,
            source: "okx_swap",
        })
    }
}
