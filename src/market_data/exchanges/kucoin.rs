// =============================================================================
// KuCoin futures ticker provider
// =============================================================================

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::Value;

use super::super::provider::{num, MarketDataProvider, MarketTicker};

const BASE_URL: &str = "https://api-futures.kucoin.com";

pub struct KucoinProvider {
    http: reqwest::Client,
}

impl KucoinProvider {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// KuCoin futures names bitcoin XBT, and perp contracts end in M.
    fn pair_for(symbol: &str) -> String {
        let base = if symbol == "BTC" { "XBT" } else { symbol };
        format!("{base}USDTM")
    }
}

#[async_trait]
impl MarketDataProvider for KucoinProvider {
    fn name(&self) -> &'static str {
        "kucoin"
    }

    async fn get_market_data(&self, symbol: &str) -> Result<MarketTicker> {
        let pair = Self::pair_for(symbol);

        let body: Value = self
            .http
            .get(format!("{BASE_URL}/api/v1/ticker"))
            .query(&[("symbol", pair.as_str())])
            .send()
            .await
            .context("kucoin ticker request failed")?
            .error_for_status()?
            .json()
            .await
            .context("kucoin ticker body is not JSON")?;

        if body.get("code").and_then(Value::as_str) != Some("200000") {
            bail!("kucoin error for {pair}: {body}");
        }

        let ticker = body
            .get("data")
            .filter(|d| !d.is_null())
            .with_context(|| format!("kucoin data missing for {pair}"))?;

        Ok(MarketTicker {
            price: num(ticker, "price"),
            volume_24h: num(ticker, "volume"),
            funding_rate: None,
            open_interest: None,
            source: "kucoin_futures",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn btc_maps_to_xbt() {
        assert_eq!(KucoinProvider::pair_for("BTC"), "XBTUSDTM");
        assert_eq!(KucoinProvider::pair_for("ETH"), "ETHUSDTM");
    }
}
