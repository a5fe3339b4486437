// =============================================================================
// Market data — external providers and the cross-venue aggregator
// =============================================================================

pub mod aggregator;
pub mod exchanges;
pub mod provider;

pub use aggregator::MarketAggregator;
pub use provider::MarketDataProvider;

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use exchanges::{
    binance::BinanceProvider, bingx::BingxProvider, bitget::BitgetProvider, bybit::BybitProvider,
    crypto_com::CryptoComProvider, gate::GateProvider, htx::HtxProvider, kraken::KrakenProvider,
    kucoin::KucoinProvider, mexc::MexcProvider, okx::OkxProvider,
};

/// Per-provider HTTP timeout. External venues are best-effort context; a slow
/// one must not stall the snapshot.
const PROVIDER_TIMEOUT: Duration = Duration::from_secs(5);

/// Instantiate the enabled providers from an explicit name registry.
///
/// Unknown names are logged and skipped — a typo in MARKET_DATA_PROVIDERS
/// degrades the snapshot, it does not kill the engine. Providers reporting
/// themselves unavailable are skipped the same way.
pub fn build_providers(enabled: &[String]) -> Vec<Arc<dyn MarketDataProvider>> {
    let http = reqwest::Client::builder()
        .timeout(PROVIDER_TIMEOUT)
        .build()
        .expect("failed to build provider HTTP client");

    let mut providers: Vec<Arc<dyn MarketDataProvider>> = Vec::new();

    for name in enabled {
        let provider: Option<Arc<dyn MarketDataProvider>> =
            match name.to_ascii_lowercase().as_str() {
                "binance" => Some(Arc::new(BinanceProvider::new(http.clone()))),
                "bybit" => Some(Arc::new(BybitProvider::new(http.clone()))),
                "okx" => Some(Arc::new(OkxProvider::new(http.clone()))),
                "kraken" => Some(Arc::new(KrakenProvider::new(http.clone()))),
                "kucoin" => Some(Arc::new(KucoinProvider::new(http.clone()))),
                "gate" => Some(Arc::new(GateProvider::new(http.clone()))),
                "mexc" => Some(Arc::new(MexcProvider::new(http.clone()))),
                "bitget" => Some(Arc::new(BitgetProvider::new(http.clone()))),
                "bingx" => Some(Arc::new(BingxProvider::new(http.clone()))),
                "htx" => Some(Arc::new(HtxProvider::new(http.clone()))),
                "crypto_com" => Some(Arc::new(CryptoComProvider::new(http.clone()))),
                other => {
                    warn!(provider = other, "unknown market data provider — skipping");
                    None
                }
            };

        if let Some(p) = provider {
            if p.check_availability() {
                info!(provider = p.name(), "market data provider enabled");
                providers.push(p);
            } else {
                warn!(provider = p.name(), "provider unavailable — skipping");
            }
        }
    }

    providers
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_skips_unknown_names() {
        let providers = build_providers(&[
            "binance".to_string(),
            "no_such_venue".to_string(),
            "BYBIT".to_string(),
        ]);
        let names: Vec<_> = providers.iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["binance", "bybit"]);
    }

    #[test]
    fn registry_empty_list() {
        assert!(build_providers(&[]).is_empty());
    }
}
