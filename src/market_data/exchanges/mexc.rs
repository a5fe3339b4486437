// =============================================================================
// MEXC contract ticker provider
// =============================================================================

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::Value;

use super::super::provider::{num, opt_num, MarketDataProvider, MarketTicker};

const BASE_URL: &str = "https://contract.mexc.com";

pub struct MexcProvider {
    http: reqwest::Client,
}

impl MexcProvider {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl MarketDataProvider for MexcProvider {
    fn name(&self) -> &'static str {
        "mexc"
    }

    async fn get_market_data(&self, symbol: &str) -> Result<MarketTicker> {
        let pair = format!("{symbol}_USDT");

        let body: Value = self
            .http
            .get(format!("{BASE_URL}/api/v1/contract/ticker"))
            .query(&[("symbol", pair.as_str())])
            .send()
            .await
            .context("mexc ticker request failed")?
            .error_for_status()?
            .json()
            .await
            .context("mexc ticker body is not JSON")?;

        if body.get("success").and_then(Value::as_bool) != Some(true) {
            bail!("mexc request unsuccessful for {pair}: {body}");
        }

        let ticker = body
            .get("data")
            .filter(|d| !d.is_null())
            .with_context(|| format!("mexc data missing for {pair}"))?;

        Ok(MarketTicker {
            price: num(ticker, "lastPrice"),
            // volume24 is base-asset denominated on MEXC.
            volume_24h: num(ticker, "volume24"),
            funding_rate: opt_num(ticker, "fundingRate"),
            open_interest: None,
            source: "mexc_futures",
        })
    }
}
