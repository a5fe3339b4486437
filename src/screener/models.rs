// =============================================================================
// Screening data model
// =============================================================================

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Full weekly rebalance vs the cheaper daily rescore of the current set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScreeningType {
    FullRebalance,
    DailyUpdate,
}

impl std::fmt::Display for ScreeningType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FullRebalance => write!(f, "full_rebalance"),
            Self::DailyUpdate => write!(f, "daily_update"),
        }
    }
}

/// Snapshot of one asset's screening inputs at one instant. Never mutated
/// after construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoinMetrics {
    pub symbol: String,
    pub price: f64,
    pub volume_24h_usd: f64,
    pub market_cap_usd: f64,
    pub open_interest_usd: f64,
    pub funding_rate: f64,
    pub spread_pct: f64,
    pub days_listed: u32,

    // Lagged history for momentum and volume-trend factors.
    #[serde(default)]
    pub price_7d_ago: Option<f64>,
    #[serde(default)]
    pub price_30d_ago: Option<f64>,
    #[serde(default)]
    pub volume_7d_avg: Option<f64>,
    #[serde(default)]
    pub volume_30d_avg: Option<f64>,
    #[serde(default)]
    pub oi_7d_ago: Option<f64>,

    // Volatility regime inputs.
    #[serde(default)]
    pub atr_14: Option<f64>,
    #[serde(default)]
    pub atr_sma_20: Option<f64>,

    // Daily-timeframe trend indicators.
    #[serde(default)]
    pub adx_14: Option<f64>,
    #[serde(default)]
    pub plus_di: Option<f64>,
    #[serde(default)]
    pub minus_di: Option<f64>,
    #[serde(default)]
    pub ema_20: Option<f64>,
    #[serde(default)]
    pub ema_50: Option<f64>,
    #[serde(default)]
    pub ema_200: Option<f64>,
    #[serde(default)]
    pub donchian_upper_20: Option<f64>,
    #[serde(default)]
    pub donchian_lower_20: Option<f64>,
    /// Close position inside the Donchian channel, in [0, 1].
    #[serde(default)]
    pub donchian_position: Option<f64>,

    #[serde(default)]
    pub is_stablecoin: bool,
}

/// A scored coin. Ranks are dense, 1-based, and unique within one screening.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoinScore {
    pub symbol: String,
    /// Composite score in [0, 100].
    pub score: f64,
    pub rank: u32,
    /// Per-factor breakdown, each in [0, 1].
    pub factors: BTreeMap<String, f64>,
    pub metrics: CoinMetrics,
    pub last_updated: DateTime<Utc>,
}

/// Result of one screening pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreeningResult {
    /// Top-N selection ordered by rank.
    pub selected_coins: Vec<CoinScore>,
    /// Symbols removed by the hard filters.
    pub excluded_coins: Vec<String>,
    pub screening_timestamp: DateTime<Utc>,
    /// Next Sunday 00:00 UTC strictly after `screening_timestamp`.
    pub next_rebalance: DateTime<Utc>,
    pub screening_type: ScreeningType,
}

impl ScreeningResult {
    pub fn selected_symbols(&self) -> Vec<String> {
        self.selected_coins.iter().map(|c| c.symbol.clone()).collect()
    }
}

// ---------------------------------------------------------------------------
// Hard filters
// ---------------------------------------------------------------------------

/// A coin failing any rule is excluded before scoring.
#[derive(Debug, Clone)]
pub struct HardFilterConfig {
    pub min_volume_24h_usd: f64,
    pub min_market_cap_usd: f64,
    pub min_days_listed: u32,
    pub min_open_interest_usd: f64,
    pub max_spread_pct: f64,
    pub exclude_stablecoins: bool,
    pub stablecoin_symbols: Vec<&'static str>,
}

impl Default for HardFilterConfig {
    fn default() -> Self {
        Self {
            min_volume_24h_usd: 50_000_000.0,
            min_market_cap_usd: 250_000_000.0,
            min_days_listed: 30,
            min_open_interest_usd: 10_000_000.0,
            max_spread_pct: 0.5,
            exclude_stablecoins: true,
            stablecoin_symbols: vec![
                "USDT", "USDC", "DAI", "BUSD", "TUSD", "USDD", "FRAX", "USDP", "GUSD", "LUSD",
                "SUSD",
            ],
        }
    }
}

impl HardFilterConfig {
    pub fn is_stablecoin(&self, symbol: &str) -> bool {
        self.stablecoin_symbols.contains(&symbol)
    }
}

// ---------------------------------------------------------------------------
// Scoring weights
// ---------------------------------------------------------------------------

/// Linear factor weights. Must sum to 1.0; `new` enforces it so a bad edit
/// fails loudly at startup instead of silently skewing scores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub momentum_7d: f64,
    pub momentum_30d: f64,
    pub volatility_regime: f64,
    pub volume_trend: f64,
    pub oi_trend: f64,
    pub funding_stability: f64,
    pub liquidity_score: f64,
    pub relative_strength: f64,
    pub adx_strength: f64,
    pub ema_alignment: f64,
    pub donchian_position: f64,
}

impl ScoringWeights {
    pub fn new() -> anyhow::Result<Self> {
        let weights = Self::default();
        weights.validate()?;
        Ok(weights)
    }

    pub fn sum(&self) -> f64 {
        self.momentum_7d
            + self.momentum_30d
            + self.volatility_regime
            + self.volume_trend
            + self.oi_trend
            + self.funding_stability
            + self.liquidity_score
            + self.relative_strength
            + self.adx_strength
            + self.ema_alignment
            + self.donchian_position
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let total = self.sum();
        if (total - 1.0).abs() >= 1e-3 {
            anyhow::bail!("scoring weights must sum to 1.0, got {total}");
        }
        Ok(())
    }
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            momentum_7d: 0.15,
            momentum_30d: 0.10,
            volatility_regime: 0.10,
            volume_trend: 0.10,
            oi_trend: 0.08,
            funding_stability: 0.07,
            liquidity_score: 0.05,
            relative_strength: 0.05,
            adx_strength: 0.12,
            ema_alignment: 0.10,
            donchian_position: 0.08,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_weights_sum_to_one() {
        let w = ScoringWeights::new().unwrap();
        assert!((w.sum() - 1.0).abs() < 1e-3);
    }

    #[test]
    fn skewed_weights_rejected() {
        let mut w = ScoringWeights::default();
        w.momentum_7d = 0.5;
        assert!(w.validate().is_err());
    }

    #[test]
    fn stablecoin_lookup() {
        let cfg = HardFilterConfig::default();
        assert!(cfg.is_stablecoin("USDT"));
        assert!(!cfg.is_stablecoin("BTC"));
    }

    #[test]
    fn screening_type_display() {
        assert_eq!(ScreeningType::FullRebalance.to_string(), "full_rebalance");
        assert_eq!(ScreeningType::DailyUpdate.to_string(), "daily_update");
    }
}
