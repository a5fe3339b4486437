// =============================================================================
// Hard filters — liquidity and maturity gates applied before scoring
// =============================================================================

use tracing::debug;

use super::models::{CoinMetrics, HardFilterConfig};

/// Split `coins` into those passing every rule and the excluded symbols.
pub fn apply_filters(
    coins: Vec<CoinMetrics>,
    config: &HardFilterConfig,
) -> (Vec<CoinMetrics>, Vec<String>) {
    let mut passing = Vec::with_capacity(coins.len());
    let mut excluded = Vec::new();

    for coin in coins {
        match first_failed_rule(&coin, config) {
            None => passing.push(coin),
            Some(rule) => {
                debug!(symbol = %coin.symbol, rule, "coin excluded by hard filter");
                excluded.push(coin.symbol);
            }
        }
    }

    (passing, excluded)
}

/// Name of the first rule the coin fails, or `None` if it passes all.
fn first_failed_rule(coin: &CoinMetrics, config: &HardFilterConfig) -> Option<&'static str> {
    if config.exclude_stablecoins && (coin.is_stablecoin || config.is_stablecoin(&coin.symbol)) {
        return Some("stablecoin");
    }
    if coin.volume_24h_usd < config.min_volume_24h_usd {
        return Some("volume_24h");
    }
    if coin.market_cap_usd < config.min_market_cap_usd {
        return Some("market_cap");
    }
    if coin.days_listed < config.min_days_listed {
        return Some("days_listed");
    }
    if coin.open_interest_usd < config.min_open_interest_usd {
        return Some("open_interest");
    }
    if coin.spread_pct > config.max_spread_pct {
        return Some("spread");
    }
    None
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn passing_coin(symbol: &str) -> CoinMetrics {
        CoinMetrics {
            symbol: symbol.to_string(),
            price: 100.0,
            volume_24h_usd: 60_000_000.0,
            market_cap_usd: 300_000_000.0,
            open_interest_usd: 20_000_000.0,
            funding_rate: 0.0001,
            spread_pct: 0.1,
            days_listed: 90,
            price_7d_ago: None,
            price_30d_ago: None,
            volume_7d_avg: None,
            volume_30d_avg: None,
            oi_7d_ago: None,
            atr_14: None,
            atr_sma_20: None,
            adx_14: None,
            plus_di: None,
            minus_di: None,
            ema_20: None,
            ema_50: None,
            ema_200: None,
            donchian_upper_20: None,
            donchian_lower_20: None,
            donchian_position: None,
            is_stablecoin: false,
        }
    }

    #[test]
    fn clean_coin_passes() {
        let (passing, excluded) =
            apply_filters(vec![passing_coin("BTC")], &HardFilterConfig::default());
        assert_eq!(passing.len(), 1);
        assert!(excluded.is_empty());
    }

    #[test]
    fn each_rule_excludes() {
        let config = HardFilterConfig::default();

        let mut thin = passing_coin("A");
        thin.volume_24h_usd = 1_000_000.0;
        let mut small = passing_coin("B");
        small.market_cap_usd = 1_000_000.0;
        let mut young = passing_coin("C");
        young.days_listed = 5;
        let mut no_oi = passing_coin("D");
        no_oi.open_interest_usd = 0.0;
        let mut wide = passing_coin("E");
        wide.spread_pct = 1.2;
        let stable = {
            let mut c = passing_coin("USDC");
            c.is_stablecoin = true;
            c
        };

        let (passing, excluded) = apply_filters(
            vec![thin, small, young, no_oi, wide, stable, passing_coin("SOL")],
            &config,
        );
        assert_eq!(passing.len(), 1);
        assert_eq!(passing[0].symbol, "SOL");
        assert_eq!(excluded.len(), 6);
    }

    #[test]
    fn boundary_values_pass() {
        let config = HardFilterConfig::default();
        let mut coin = passing_coin("EDGE");
        coin.volume_24h_usd = config.min_volume_24h_usd;
        coin.market_cap_usd = config.min_market_cap_usd;
        coin.days_listed = config.min_days_listed;
        coin.open_interest_usd = config.min_open_interest_usd;
        coin.spread_pct = config.max_spread_pct;

        let (passing, excluded) = apply_filters(vec![coin], &config);
        assert_eq!(passing.len(), 1, "thresholds are inclusive: {excluded:?}");
    }
}
