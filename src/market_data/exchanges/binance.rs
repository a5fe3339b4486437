// =============================================================================
// Binance USDT-M futures ticker provider
// =============================================================================
//
// Public endpoints, no API key. Two calls per snapshot: 24h ticker for price
// and quote volume, premium index for the funding rate.
// =============================================================================

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;

use super::super::provider::{num, opt_num, MarketDataProvider, MarketTicker};

const BASE_URL: &str = "https://fapi.binance.com";

pub struct BinanceProvider {
    http: reqwest::Client,
}

impl BinanceProvider {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// Funding comes from the premium index; losing it only costs the
    /// optional field, never the ticker.
    async fn funding_rate(&self, pair: &str) -> Option<f64> {
        let resp = self
            .http
            .get(format!("{BASE_URL}/fapi/v1/premiumIndex"))
            .query(&[("symbol", pair)])
            .send()
            .await
            .ok()?;
        if !resp.status().is_success() {
            return None;
        }
        let body: Value = resp.json().await.ok()?;
        opt_num(&body, "lastFundingRate")
    }
}

#[async_trait]
impl MarketDataProvider for BinanceProvider {
    fn name(&self) -> &'static str {
        "binance"
    }

    async fn get_market_data(&self, symbol: &str) -> Result<MarketTicker> {
        let pair = format!("{symbol}USDT");

        let ticker: Value = self
            .http
            .get(format!("{BASE_URL}/fapi/v1/ticker/24hr"))
            .query(&[("symbol", pair.as_str())])
            .send()
            .await
            .context("binance ticker request failed")?
            .error_for_status()
            .context("binance ticker returned an error status")?
            .json()
            .await
            .context("binance ticker body is not JSON")?;

        Ok(MarketTicker {
            price: num(&ticker, "lastPrice"),
            volume_24h: num(&ticker, "quoteVolume"),
            funding_rate: self.funding_rate(&pair).await,
            open_interest: None,
            source: "binance_futures",
        })
    }
}
