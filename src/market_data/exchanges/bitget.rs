// =============================================================================
// Bitget USDT-M futures ticker provider
// =============================================================================

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;

use super::super::provider::{num, opt_num, MarketDataProvider, MarketTicker};

const BASE_URL: &str = "https://api.bitget.com";

pub struct BitgetProvider {
    http: reqwest::Client,
}

impl BitgetProvider {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl MarketDataProvider for BitgetProvider {
    fn name(&self) -> &'static str {
        "bitget"
    }

    async fn get_market_data(&self, symbol: &str) -> Result<MarketTicker> {
        // UMCBL suffix = USDT-margined perpetual.
        let pair = format!("{symbol}USDT_UMCBL");

        let body: Value = self
            .http
            .get(format!("{BASE_URL}/api/mix/v1/market/ticker"))
            .query(&[("symbol", pair.as_str())])
            .send()
            .await
            .context("bitget ticker request failed")?
            .error_for_status()?
            .json()
            .await
            .context("bitget ticker body is not JSON")?;

        let ticker = body
            .get("data")
            .filter(|d| !d.is_null())
            .with_context(|| format!("bitget data missing for {pair}"))?;

        Ok(MarketTicker {
            price: num(ticker, "last"),
            volume_24h: num(ticker, "usdtVolume"),
            funding_rate: opt_num(ticker, "fundingRate"),
            open_interest: None,
            source: "bitget_futures",
        })
    }
}
