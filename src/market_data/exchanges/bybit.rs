// =============================================================================
// Bybit V5 linear-perpetual ticker provider
// =============================================================================

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::Value;

use super::super::provider::{num, opt_num, MarketDataProvider, MarketTicker};

const BASE_URL: &str = "https://api.bybit.com";

pub struct BybitProvider {
    http: reqwest::Client,
}

impl BybitProvider {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl MarketDataProvider for BybitProvider {
    fn name(&self) -> &'static str {
        "bybit"
    }

    async fn get_market_data(&self, symbol: &str) -> Result<MarketTicker> {
        let pair = format!("{symbol}USDT");

        let body: Value = self
            .http
            .get(format!("{BASE_URL}/v5/market/tickers"))
            .query(&[("category", "linear"), ("symbol", pair.as_str())])
            .send()
            .await
            .context("bybit ticker request failed")?
            .error_for_status()?
            .json()
            .await
            .context("bybit ticker body is not JSON")?;

        if body.get("retCode").and_then(Value::as_i64) != Some(0) {
            bail!("bybit retCode != 0 for {pair}: {body}");
        }

        let ticker = body["result"]["list"]
            .as_array()
            .and_then(|l| l.first())
            .with_context(|| format!("bybit ticker list empty for {pair}"))?;

        Ok(MarketTicker {
            price: num(ticker, "lastPrice"),
            // turnover24h is the quote-denominated volume.
            volume_24h: num(ticker, "turnover24h"),
            funding_rate: opt_num(ticker, "fundingRate"),
            open_interest: opt_num(ticker, "openInterestValue"),
            source: "bybit_linear",
        })
    }
}
