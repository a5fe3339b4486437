// =============================================================================
// Gate.io USDT-margined futures ticker provider
// =============================================================================

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;

use super::super::provider::{num, opt_num, MarketDataProvider, MarketTicker};

const BASE_URL: &str = "https://api.gateio.ws";

pub struct GateProvider {
    http: reqwest::Client,
}

impl GateProvider {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl MarketDataProvider for GateProvider {
    fn name(&self) -> &'static str {
        "gate"
    }

    async fn get_market_data(&self, symbol: &str) -> Result<MarketTicker> {
        let contract = format!("{symbol}_USDT");

        // Gate answers with a list even for a single contract filter.
        let body: Value = self
            .http
            .get(format!("{BASE_URL}/api/v4/futures/usdt/tickers"))
            .query(&[("contract", contract.as_str())])
            .send()
            .await
            .context("gate ticker request failed")?
            .error_for_status()?
            .json()
            .await
            .context("gate ticker body is not JSON")?;

        let ticker = body
            .as_array()
            .and_then(|l| l.first())
            .with_context(|| format!("gate ticker list empty for {contract}"))?;

        Ok(MarketTicker {
            price: num(ticker, "last"),
            volume_24h: num(ticker, "volume_24h_quote"),
            funding_rate: opt_num(ticker, "funding_rate"),
            open_interest: opt_num(ticker, "total_size"),
            source: "gate_futures",
        })
    }
}
