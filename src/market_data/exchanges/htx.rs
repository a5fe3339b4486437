// =============================================================================
// HTX (Huobi) linear-swap ticker provider
// =============================================================================

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::Value;

use super::super::provider::{num, opt_num, MarketDataProvider, MarketTicker};

const BASE_URL: &str = "https://api.hbdm.com";

pub struct HtxProvider {
    http: reqwest::Client,
}

impl HtxProvider {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl MarketDataProvider for HtxProvider {
    fn name(&self) -> &'static str {
        "htx"
    }

    async fn get_market_data(&self, symbol: &str) -> Result<MarketTicker> {
        let contract = format!("{symbol}-USDT");

        let body: Value = self
            .http
            .get(format!("{BASE_URL}/linear-swap-ex/market/detail/merged"))
            .query(&[("contract_code", contract.as_str())])
            .send()
            .await
            .context("htx ticker request failed")?
            .error_for_status()?
            .json()
            .await
            .context("htx ticker body is not JSON")?;

        if body.get("status").and_then(Value::as_str) != Some("ok") {
            bail!("htx status != ok for {contract}: {body}");
        }

        let tick = body
            .get("tick")
            .filter(|t| !t.is_null())
            .with_context(|| format!("htx tick missing for {contract}"))?;

        Ok(MarketTicker {
            price: num(tick, "close"),
            volume_24h: num(tick, "vol"),
            funding_rate: None,
            open_interest: opt_num(tick, "amount"),
            source: "htx_swap",
        })
    }
}
