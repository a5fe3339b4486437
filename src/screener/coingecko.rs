// =============================================================================
// CoinGecko market-cap oracle
// =============================================================================
//
// The venue knows nothing about market caps, so the screener merges them in
// from CoinGecko's /coins/markets endpoint. Symbols are mapped to CoinGecko
// ids through a static table; unmapped symbols simply keep a zero market cap
// and fall out at the hard filters.
// =============================================================================

use std::collections::HashMap;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, info};

const BASE_URL: &str = "https://api.coingecko.com/api/v3";

/// symbol -> CoinGecko id, for the liquid perp universe.
const SYMBOL_TO_ID: &[(&str, &str)] = &[
    ("BTC", "bitcoin"),
    ("ETH", "ethereum"),
    ("BNB", "binancecoin"),
    ("SOL", "solana"),
    ("XRP", "ripple"),
    ("ADA", "cardano"),
    ("DOGE", "dogecoin"),
    ("DOT", "polkadot"),
    ("MATIC", "polygon-ecosystem-token"),
    ("AVAX", "avalanche-2"),
    ("LINK", "chainlink"),
    ("UNI", "uniswap"),
    ("ATOM", "cosmos"),
    ("LTC", "litecoin"),
    ("BCH", "bitcoin-cash"),
    ("NEAR", "near"),
    ("APT", "aptos"),
    ("ARB", "arbitrum"),
    ("OP", "optimism"),
    ("SUI", "sui"),
    ("FIL", "filecoin"),
    ("AAVE", "aave"),
    ("MKR", "maker"),
    ("SNX", "synthetix-network-token"),
    ("CRV", "curve-dao-token"),
    ("LDO", "lido-dao"),
    ("PEPE", "pepe"),
    ("SHIB", "shiba-inu"),
    ("WIF", "dogwifcoin"),
    ("BONK", "bonk"),
    ("INJ", "injective-protocol"),
    ("TIA", "celestia"),
    ("SEI", "sei-network"),
    ("RUNE", "thorchain"),
    ("HYPE", "hyperliquid"),
];

/// Market data CoinGecko contributes per symbol.
#[derive(Debug, Clone, Default)]
pub struct OracleMarketData {
    pub market_cap_usd: f64,
    pub volume_24h_usd: f64,
}

#[derive(Deserialize)]
struct MarketRow {
    id: String,
    #[serde(default)]
    market_cap: Option<f64>,
    #[serde(default)]
    total_volume: Option<f64>,
}

pub struct CoinGeckoOracle {
    http: reqwest::Client,
    api_key: Option<String>,
}

impl CoinGeckoOracle {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .expect("failed to build coingecko HTTP client"),
            api_key: std::env::var("COINGECKO_API_KEY").ok().filter(|k| !k.is_empty()),
        }
    }

    pub fn coin_id(symbol: &str) -> Option<&'static str> {
        SYMBOL_TO_ID
            .iter()
            .find(|(s, _)| *s == symbol)
            .map(|(_, id)| *id)
    }

    /// Market caps and volumes for every mappable symbol, batched into one
    /// request per 250 ids.
    pub async fn market_data(&self, symbols: &[String]) -> Result<HashMap<String, OracleMarketData>> {
        let mut id_to_symbol = HashMap::new();
        for symbol in symbols {
            if let Some(id) = Self::coin_id(symbol) {
                id_to_symbol.insert(id.to_string(), symbol.clone());
            } else {
                debug!(symbol = %symbol, "no coingecko id mapping");
            }
        }

        let mut result = HashMap::new();
        let ids: Vec<&String> = id_to_symbol.keys().collect();

        for batch in ids.chunks(250) {
            let joined = batch
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(",");

            let mut request = self
                .http
                .get(format!("{BASE_URL}/coins/markets"))
                .query(&[
                    ("vs_currency", "usd"),
                    ("ids", joined.as_str()),
                    ("order", "market_cap_desc"),
                    ("per_page", "250"),
                    ("page", "1"),
                    ("sparkline", "false"),
                ]);

            if let Some(key) = &self.api_key {
                // Demo keys (CG-*) and pro keys use different query params.
                let param = if key.starts_with("CG-") {
                    "x_cg_demo_api_key"
                } else {
                    "x_cg_pro_api_key"
                };
                request = request.query(&[(param, key.as_str())]);
            }

            let rows: Vec<MarketRow> = request
                .send()
                .await
                .context("coingecko markets request failed")?
                .error_for_status()
                .context("coingecko returned an error status")?
                .json()
                .await
                .context("coingecko markets body is not JSON")?;

            for row in rows {
                if let Some(symbol) = id_to_symbol.get(&row.id) {
                    result.insert(
                        symbol.clone(),
                        OracleMarketData {
                            market_cap_usd: row.market_cap.unwrap_or(0.0),
                            volume_24h_usd: row.total_volume.unwrap_or(0.0),
                        },
                    );
                }
            }
        }

        info!(
            mapped = result.len(),
            requested = symbols.len(),
            "coingecko market data fetched"
        );
        Ok(result)
    }
}

impl Default for CoinGeckoOracle {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_mapping() {
        assert_eq!(CoinGeckoOracle::coin_id("BTC"), Some("bitcoin"));
        assert_eq!(CoinGeckoOracle::coin_id("AVAX"), Some("avalanche-2"));
        assert_eq!(CoinGeckoOracle::coin_id("NOPE"), None);
    }
}
