// =============================================================================
// Factor scoring — eleven normalized factors combined linearly
// =============================================================================
//
// Every factor maps into [0, 1] with 0.5 as the "no data / no edge" neutral
// point, so a coin missing an input is neither rewarded nor punished.
// Composite score = 100 * Σ wᵢ·fᵢ.
// =============================================================================

use std::collections::BTreeMap;

use chrono::Utc;
use tracing::info;

use super::models::{CoinMetrics, CoinScore, ScoringWeights};

pub struct CoinScorer {
    weights: ScoringWeights,
}

impl CoinScorer {
    pub fn new(weights: ScoringWeights) -> Self {
        Self { weights }
    }

    /// Score and rank `coins`. Ranks are assigned by descending score with a
    /// stable symbol tie-break, so equal scores order deterministically.
    pub fn score_coins(
        &self,
        coins: &[CoinMetrics],
        btc_price: Option<f64>,
        btc_price_7d: Option<f64>,
    ) -> Vec<CoinScore> {
        if coins.is_empty() {
            return Vec::new();
        }

        let now = Utc::now();
        let mut scored: Vec<CoinScore> = coins
            .iter()
            .map(|coin| {
                let factors = self.factors_for(coin, coins, btc_price, btc_price_7d);
                let score = self.composite(&factors);
                CoinScore {
                    symbol: coin.symbol.clone(),
                    score,
                    rank: 0,
                    factors,
                    metrics: coin.clone(),
                    last_updated: now,
                }
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.symbol.cmp(&b.symbol))
        });
        for (i, coin) in scored.iter_mut().enumerate() {
            coin.rank = (i + 1) as u32;
        }

        info!(count = scored.len(), "coins scored");
        scored
    }

    fn factors_for(
        &self,
        coin: &CoinMetrics,
        peers: &[CoinMetrics],
        btc_price: Option<f64>,
        btc_price_7d: Option<f64>,
    ) -> BTreeMap<String, f64> {
        let mut factors = BTreeMap::new();
        factors.insert("momentum_7d".into(), momentum_percentile(coin, peers, 7));
        factors.insert("momentum_30d".into(), momentum_percentile(coin, peers, 30));
        factors.insert("volatility_regime".into(), volatility_regime(coin));
        factors.insert("volume_trend".into(), volume_trend(coin));
        factors.insert("oi_trend".into(), oi_trend(coin));
        factors.insert("funding_stability".into(), funding_stability(coin));
        factors.insert("liquidity_score".into(), liquidity_score(coin));
        factors.insert(
            "relative_strength".into(),
            relative_strength(coin, btc_price, btc_price_7d),
        );
        factors.insert("adx_strength".into(), adx_strength(coin));
        factors.insert("ema_alignment".into(), ema_alignment(coin));
        factors.insert("donchian_position".into(), donchian_trend(coin));
        factors
    }

    fn composite(&self, factors: &BTreeMap<String, f64>) -> f64 {
        let w = &self.weights;
        let get = |key: &str| factors.get(key).copied().unwrap_or(0.0);

        let weighted = get("momentum_7d") * w.momentum_7d
            + get("momentum_30d") * w.momentum_30d
            + get("volatility_regime") * w.volatility_regime
            + get("volume_trend") * w.volume_trend
            + get("oi_trend") * w.oi_trend
            + get("funding_stability") * w.funding_stability
            + get("liquidity_score") * w.liquidity_score
            + get("relative_strength") * w.relative_strength
            + get("adx_strength") * w.adx_strength
            + get("ema_alignment") * w.ema_alignment
            + get("donchian_position") * w.donchian_position;

        weighted * 100.0
    }
}

// ---------------------------------------------------------------------------
// Factors
// ---------------------------------------------------------------------------

fn lagged_return(coin: &CoinMetrics, days: u32) -> Option<f64> {
    let past = match days {
        7 => coin.price_7d_ago,
        30 => coin.price_30d_ago,
        _ => None,
    }?;
    (past > 0.0).then(|| (coin.price - past) / past)
}

/// Percentile rank of the coin's lagged return against the peer set.
fn momentum_percentile(coin: &CoinMetrics, peers: &[CoinMetrics], days: u32) -> f64 {
    let Some(own) = lagged_return(coin, days) else {
        return 0.5;
    };

    let peer_returns: Vec<f64> = peers.iter().filter_map(|c| lagged_return(c, days)).collect();
    if peer_returns.is_empty() {
        return 0.5;
    }

    let below = peer_returns.iter().filter(|&&r| r < own).count();
    below as f64 / peer_returns.len() as f64
}

/// 1.0 in an expanding-volatility regime (ATR14 above its 20-period mean).
fn volatility_regime(coin: &CoinMetrics) -> f64 {
    match (coin.atr_14, coin.atr_sma_20) {
        (Some(atr), Some(sma)) if atr > sma => 1.0,
        (Some(_), Some(_)) => 0.5,
        _ => 0.5,
    }
}

/// min(vol_7d / vol_30d, 2) / 2 — recent volume vs the monthly base rate,
/// capped so one outlier week cannot dominate.
fn volume_trend(coin: &CoinMetrics) -> f64 {
    match (coin.volume_7d_avg, coin.volume_30d_avg) {
        (Some(week), Some(month)) if month > 0.0 => (week / month).min(2.0) / 2.0,
        _ => 0.5,
    }
}

/// Growing open interest reads 1.0, shrinking or unknown reads 0.5.
fn oi_trend(coin: &CoinMetrics) -> f64 {
    match coin.oi_7d_ago {
        Some(past) if past > 0.0 => {
            if coin.open_interest_usd - past > 0.0 {
                1.0
            } else {
                0.5
            }
        }
        _ => 0.5,
    }
}

/// Near-zero funding (balanced market) scores high; |funding| >= 1% floors.
fn funding_stability(coin: &CoinMetrics) -> f64 {
    1.0 - (coin.funding_rate.abs() / 0.01).min(1.0)
}

/// Tight spreads score high; spreads >= 0.5% floor at zero.
fn liquidity_score(coin: &CoinMetrics) -> f64 {
    1.0 - (coin.spread_pct / 0.5).min(1.0)
}

/// 7d performance vs BTC, mapped so ±50% relative performance spans [0, 1].
fn relative_strength(coin: &CoinMetrics, btc_price: Option<f64>, btc_price_7d: Option<f64>) -> f64 {
    let (Some(btc_now), Some(btc_past)) = (btc_price, btc_price_7d) else {
        return 0.5;
    };
    if btc_past <= 0.0 {
        return 0.5;
    }
    let Some(own) = lagged_return(coin, 7) else {
        return 0.5;
    };

    let btc_return = (btc_now - btc_past) / btc_past;
    (own - btc_return + 0.5).clamp(0.0, 1.0)
}

/// Step function over ADX(14): ranging 0.3, emerging 0.5, strong 0.8,
/// very strong 1.0.
fn adx_strength(coin: &CoinMetrics) -> f64 {
    let Some(adx) = coin.adx_14 else {
        return 0.5;
    };
    if adx < 20.0 {
        0.3
    } else if adx < 25.0 {
        0.5
    } else if adx < 40.0 {
        0.8
    } else {
        1.0
    }
}

/// Base 0.5, plus 0.2 for EMA20>EMA50, 0.2 for EMA50>EMA200 (when known),
/// 0.1 for price above EMA20; capped at 1.0.
fn ema_alignment(coin: &CoinMetrics) -> f64 {
    let (Some(ema_20), Some(ema_50)) = (coin.ema_20, coin.ema_50) else {
        return 0.5;
    };

    let mut score: f64 = 0.5;
    if ema_20 > ema_50 {
        score += 0.2;
    }
    if let Some(ema_200) = coin.ema_200 {
        if ema_50 > ema_200 {
            score += 0.2;
        }
    }
    if coin.price > ema_20 {
        score += 0.1;
    }
    score.min(1.0)
}

/// Step function over the Donchian position: upper band 1.0, mid-high 0.7,
/// consolidation 0.3, lower half neutral 0.5.
fn donchian_trend(coin: &CoinMetrics) -> f64 {
    let Some(pos) = coin.donchian_position else {
        return 0.5;
    };
    if pos > 0.8 {
        1.0
    } else if pos > 0.6 {
        0.7
    } else if pos > 0.4 {
        0.3
    } else {
        0.5
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn coin(symbol: &str) -> CoinMetrics {
        CoinMetrics {
            symbol: symbol.to_string(),
            price: 100.0,
            volume_24h_usd: 60_000_000.0,
            market_cap_usd: 300_000_000.0,
            open_interest_usd: 20_000_000.0,
            funding_rate: 0.0,
            spread_pct: 0.0,
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
    fn adx_step_boundaries() {
        let mut c = coin("A");
        for (adx, expected) in [
            (19.99, 0.3),
            (20.0, 0.5),
            (24.99, 0.5),
            (25.0, 0.8),
            (39.99, 0.8),
            (40.0, 1.0),
        ] {
            c.adx_14 = Some(adx);
            assert_eq!(adx_strength(&c), expected, "adx = {adx}");
        }
        c.adx_14 = None;
        assert_eq!(adx_strength(&c), 0.5);
    }

    #[test]
    fn donchian_step_boundaries() {
        let mut c = coin("A");
        for (pos, expected) in [(0.9, 1.0), (0.7, 0.7), (0.5, 0.3), (0.2, 0.5), (0.4, 0.5)] {
            c.donchian_position = Some(pos);
            assert_eq!(donchian_trend(&c), expected, "pos = {pos}");
        }
    }

    #[test]
    fn ema_alignment_accumulates() {
        let mut c = coin("A");
        assert_eq!(ema_alignment(&c), 0.5);

        c.ema_20 = Some(110.0);
        c.ema_50 = Some(100.0);
        // +0.2 for 20>50; price (100) not above ema20 (110).
        assert!((ema_alignment(&c) - 0.7).abs() < 1e-12);

        c.ema_200 = Some(90.0);
        c.price = 120.0;
        // Full bullish stack: 0.5 + 0.2 + 0.2 + 0.1 = 1.0 (capped).
        assert_eq!(ema_alignment(&c), 1.0);
    }

    #[test]
    fn funding_and_liquidity_normalization() {
        let mut c = coin("A");
        c.funding_rate = 0.0;
        assert_eq!(funding_stability(&c), 1.0);
        c.funding_rate = 0.02;
        assert_eq!(funding_stability(&c), 0.0);
        c.funding_rate = -0.005;
        assert!((funding_stability(&c) - 0.5).abs() < 1e-12);

        c.spread_pct = 0.0;
        assert_eq!(liquidity_score(&c), 1.0);
        c.spread_pct = 0.25;
        assert!((liquidity_score(&c) - 0.5).abs() < 1e-12);
        c.spread_pct = 2.0;
        assert_eq!(liquidity_score(&c), 0.0);
    }

    #[test]
    fn volume_trend_caps_at_double() {
        let mut c = coin("A");
        c.volume_7d_avg = Some(500.0);
        c.volume_30d_avg = Some(100.0);
        assert_eq!(volume_trend(&c), 1.0);
        c.volume_7d_avg = Some(100.0);
        assert_eq!(volume_trend(&c), 0.5);
    }

    #[test]
    fn relative_strength_clamps() {
        let mut c = coin("A");
        c.price = 200.0;
        c.price_7d_ago = Some(100.0); // +100% vs BTC +0% => clamp to 1.0
        assert_eq!(relative_strength(&c, Some(100.0), Some(100.0)), 1.0);

        c.price = 40.0; // -60% vs BTC flat => clamp to 0.0
        assert_eq!(relative_strength(&c, Some(100.0), Some(100.0)), 0.0);

        assert_eq!(relative_strength(&c, None, None), 0.5);
    }

    #[test]
    fn ranks_are_dense_and_tie_broken_by_symbol() {
        let scorer = CoinScorer::new(ScoringWeights::default());
        // Identical metrics => identical scores => symbol order decides.
        let coins = vec![coin("ETH"), coin("BTC"), coin("SOL")];
        let scored = scorer.score_coins(&coins, None, None);

        let ranks: Vec<u32> = scored.iter().map(|c| c.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3]);
        let symbols: Vec<&str> = scored.iter().map(|c| c.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["BTC", "ETH", "SOL"]);
    }

    #[test]
    fn higher_momentum_outranks() {
        let scorer = CoinScorer::new(ScoringWeights::default());
        let mut strong = coin("UP");
        strong.price_7d_ago = Some(80.0); // +25%
        let mut weak = coin("DOWN");
        weak.price_7d_ago = Some(120.0); // -16%

        let scored = scorer.score_coins(&[strong, weak], None, None);
        assert_eq!(scored[0].symbol, "UP");
        assert!(scored[0].score > scored[1].score);
    }

    #[test]
    fn factors_stay_normalized() {
        let scorer = CoinScorer::new(ScoringWeights::default());
        let mut c = coin("X");
        c.price_7d_ago = Some(50.0);
        c.price_30d_ago = Some(40.0);
        c.adx_14 = Some(55.0);
        c.donchian_position = Some(0.95);
        c.atr_14 = Some(5.0);
        c.atr_sma_20 = Some(3.0);

        let scored = scorer.score_coins(&[c], Some(100.0), Some(90.0));
        for (name, value) in &scored[0].factors {
            assert!(
                (0.0..=1.0).contains(value),
                "factor {name} = {value} out of range"
            );
        }
        assert!(scored[0].score <= 100.0);
    }
}
