// =============================================================================
// BingX swap ticker provider
// =============================================================================

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::Value;

use super::super::provider::{num, opt_num, MarketDataProvider, MarketTicker};

const BASE_URL: &str = "https://open-api.bingx.com";

pub struct BingxProvider {
    http: reqwest::Client,
}

impl BingxProvider {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl MarketDataProvider for BingxProvider {
    fn name(&self) -> &'static str {
        "bingx"
    }

    async fn get_market_data(&self, symbol: &str) -> Result<MarketTicker> {
        let pair = format!("{symbol}-USDT");

        let body: Value = self
            .http
            .get(format!("{BASE_URL}/openApi/swap/v2/quote/ticker"))
            .query(&[("symbol", pair.as_str())])
            .send()
            .await
            .context("bingx ticker request failed")?
            .error_for_status()?
            .json()
            .await
            .context("bingx ticker body is not JSON")?;

        if body.get("code").and_then(Value::as_i64) != Some(0) {
            bail!("bingx error for {pair}: {body}");
        }

        let ticker = body
            .get("data")
            .filter(|d| !d.is_null())
            .with_context(|| format!("bingx data missing for {pair}"))?;

        Ok(MarketTicker {
            price: num(ticker, "lastPrice"),
            volume_24h: num(ticker, "volume24h"),
            funding_rate: opt_num(ticker, "fundingRate"),
            open_interest: None,
            source: "bingx_swap",
        })
    }
}
