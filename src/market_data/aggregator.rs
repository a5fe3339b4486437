// =============================================================================
// Market Aggregator — concurrent cross-venue snapshot with per-provider
// isolation
// =============================================================================
//
// One snapshot request fans out to the primary venue and every enabled
// external provider at once. A provider failure is recorded in its own slot
// and never sinks the snapshot; the aggregates are computed over whichever
// sources answered.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use futures_util::future::join_all;
use serde::Serialize;
use tracing::{debug, warn};

use crate::hyperliquid::HyperliquidClient;

use super::provider::{MarketDataProvider, MarketTicker};

/// Outcome of one provider's fetch: the ticker or its error text.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ProviderOutcome {
    Ok(MarketTicker),
    Err { error: String },
}

/// Cross-venue aggregates over all successful sources.
#[derive(Debug, Clone, Serialize)]
pub struct GlobalAggregates {
    pub average_price: f64,
    pub min_price: f64,
    pub max_price: f64,
    pub price_spread_pct: f64,
    pub total_volume_global: f64,
    pub average_funding_rate: f64,
    pub sources_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hyperliquid_deviation_pct: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_hyperliquid_premium: Option<bool>,
}

/// Full snapshot for one symbol.
#[derive(Debug, Clone, Serialize)]
pub struct MarketSnapshot {
    pub timestamp: String,
    pub symbol: String,
    /// `None` when no source returned a price (insufficient data).
    pub global_market: Option<GlobalAggregates>,
    pub hyperliquid: Option<MarketTicker>,
    pub providers: HashMap<String, ProviderOutcome>,
}

pub struct MarketAggregator {
    venue: Arc<HyperliquidClient>,
    providers: Vec<Arc<dyn MarketDataProvider>>,
}

impl MarketAggregator {
    pub fn new(
        venue: Arc<HyperliquidClient>,
        providers: Vec<Arc<dyn MarketDataProvider>>,
    ) -> Self {
        Self { venue, providers }
    }

    /// Fetch the primary-venue ticker and all external tickers concurrently
    /// and reduce them into cross-venue aggregates.
    pub async fn fetch_market_snapshot(&self, symbol: &str) -> MarketSnapshot {
        let hl_future = self.fetch_hyperliquid(symbol);
        let provider_futures = self.providers.iter().map(|p| {
            let provider = p.clone();
            let sym = symbol.to_string();
            async move {
                let outcome = match provider.get_market_data(&sym).await {
                    Ok(ticker) => ProviderOutcome::Ok(ticker),
                    Err(e) => {
                        warn!(provider = provider.name(), symbol = %sym, error = %e, "provider fetch failed");
                        ProviderOutcome::Err {
                            error: e.to_string(),
                        }
                    }
                };
                (provider.name().to_string(), outcome)
            }
        });

        let (hl_result, provider_results) =
            tokio::join!(hl_future, join_all(provider_futures));

        let hyperliquid = match hl_result {
            Ok(ticker) => Some(ticker),
            Err(e) => {
                warn!(symbol, error = %e, "hyperliquid snapshot arm failed");
                None
            }
        };

        let providers: HashMap<String, ProviderOutcome> = provider_results.into_iter().collect();

        let global_market = Self::calculate_aggregates(hyperliquid.as_ref(), &providers);

        debug!(
            symbol,
            sources = global_market.as_ref().map(|g| g.sources_count).unwrap_or(0),
            "market snapshot assembled"
        );

        MarketSnapshot {
            timestamp: Utc::now().to_rfc3339(),
            symbol: symbol.to_string(),
            global_market,
            hyperliquid,
            providers,
        }
    }

    /// Primary-venue ticker out of the asset-context table.
    async fn fetch_hyperliquid(&self, symbol: &str) -> anyhow::Result<MarketTicker> {
        let (meta, ctxs) = self.venue.meta_and_asset_ctxs().await?;
        let idx = meta
            .asset_index(symbol)
            .ok_or_else(|| anyhow::anyhow!("{symbol} not listed on hyperliquid"))?;
        let ctx = ctxs
            .get(idx as usize)
            .ok_or_else(|| anyhow::anyhow!("no asset context for {symbol}"))?;

        let price = ctx
            .mark_px
            .or(ctx.mid_px)
            .ok_or_else(|| anyhow::anyhow!("no price in asset context for {symbol}"))?;

        Ok(MarketTicker {
            price,
            volume_24h: ctx.day_ntl_vlm.unwrap_or(0.0),
            funding_rate: ctx.funding,
            open_interest: ctx.open_interest.map(|oi| oi * price),
            source: "hyperliquid",
        })
    }

    fn calculate_aggregates(
        hyperliquid: Option<&MarketTicker>,
        providers: &HashMap<String, ProviderOutcome>,
    ) -> Option<GlobalAggregates> {
        let mut prices = Vec::new();
        let mut volumes = Vec::new();
        let mut funding_rates = Vec::new();

        let provider_tickers = providers.values().filter_map(|o| match o {
            ProviderOutcome::Ok(t) => Some(t),
            ProviderOutcome::Err { .. } => None,
        });

        for ticker in hyperliquid.into_iter().chain(provider_tickers) {
            if ticker.price > 0.0 {
                prices.push(ticker.price);
            }
            if ticker.volume_24h > 0.0 {
                volumes.push(ticker.volume_24h);
            }
            if let Some(f) = ticker.funding_rate {
                funding_rates.push(f);
            }
        }

        if prices.is_empty() {
            return None;
        }

        let average_price = prices.iter().sum::<f64>() / prices.len() as f64;
        let min_price = prices.iter().copied().fold(f64::MAX, f64::min);
        let max_price = prices.iter().copied().fold(f64::MIN, f64::max);
        let price_spread_pct = if min_price > 0.0 {
            (max_price - min_price) / min_price * 100.0
        } else {
            0.0
        };
        let average_funding_rate = if funding_rates.is_empty() {
            0.0
        } else {
            funding_rates.iter().sum::<f64>() / funding_rates.len() as f64
        };

        // Signed deviation of the primary venue from the cross-venue mean.
        let hyperliquid_deviation_pct = hyperliquid.and_then(|t| {
            (average_price > 0.0).then(|| (t.price - average_price) / average_price * 100.0)
        });

        Some(GlobalAggregates {
            average_price,
            min_price,
            max_price,
            price_spread_pct,
            total_volume_global: volumes.iter().sum(),
            average_funding_rate,
            sources_count: prices.len(),
            hyperliquid_deviation_pct,
            is_hyperliquid_premium: hyperliquid_deviation_pct.map(|d| d > 0.0),
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn ticker(price: f64, volume: f64, funding: Option<f64>, source: &'static str) -> MarketTicker {
        MarketTicker {
            price,
            volume_24h: volume,
            funding_rate: funding,
            open_interest: None,
            source,
        }
    }

    #[test]
    fn aggregates_over_mixed_outcomes() {
        let hl = ticker(101.0, 1000.0, Some(0.0001), "hyperliquid");
        let mut providers = HashMap::new();
        providers.insert(
            "bybit".to_string(),
            ProviderOutcome::Ok(ticker(100.0, 500.0, Some(0.0003), "bybit_linear")),
        );
        providers.insert(
            "okx".to_string(),
            ProviderOutcome::Err {
                error: "timeout".into(),
            },
        );

        let agg = MarketAggregator::calculate_aggregates(Some(&hl), &providers).unwrap();
        assert_eq!(agg.sources_count, 2);
        assert!((agg.average_price - 100.5).abs() < 1e-9);
        assert_eq!(agg.min_price, 100.0);
        assert_eq!(agg.max_price, 101.0);
        assert!((agg.price_spread_pct - 1.0).abs() < 1e-9);
        assert_eq!(agg.total_volume_global, 1500.0);
        assert!((agg.average_funding_rate - 0.0002).abs() < 1e-12);

        // HL above the mean => positive deviation, premium flag set.
        let dev = agg.hyperliquid_deviation_pct.unwrap();
        assert!(dev > 0.0);
        assert_eq!(agg.is_hyperliquid_premium, Some(true));
    }

    #[test]
    fn aggregates_without_primary_venue() {
        let mut providers = HashMap::new();
        providers.insert(
            "kraken".to_string(),
            ProviderOutcome::Ok(ticker(99.0, 10.0, None, "kraken_spot")),
        );

        let agg = MarketAggregator::calculate_aggregates(None, &providers).unwrap();
        assert_eq!(agg.sources_count, 1);
        assert!(agg.hyperliquid_deviation_pct.is_none());
        assert!(agg.is_hyperliquid_premium.is_none());
        assert_eq!(agg.average_funding_rate, 0.0);
    }

    #[test]
    fn no_prices_means_insufficient_data() {
        let mut providers = HashMap::new();
        providers.insert(
            "bybit".to_string(),
            ProviderOutcome::Err {
                error: "down".into(),
            },
        );
        assert!(MarketAggregator::calculate_aggregates(None, &providers).is_none());
    }
}
