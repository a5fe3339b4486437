// =============================================================================
// Settings — environment-driven configuration for the Meridian engine
// =============================================================================
//
// Everything tunable is read once at startup from the process environment
// (populated from `.env` by dotenv in main). Missing credentials are fatal:
// the process exits with a descriptive log line rather than trading blind.
// =============================================================================

use anyhow::{bail, Result};
use tracing::{info, warn};

/// Per-trade risk limits consumed by the risk manager.
#[derive(Debug, Clone)]
pub struct RiskSettings {
    /// Maximum cumulative daily loss in USD before the breaker trips.
    pub max_daily_loss_usd: f64,
    /// Maximum cumulative daily loss as a percentage of balance.
    pub max_daily_loss_pct: f64,
    /// Maximum single-position size as a percentage of balance.
    pub max_position_pct: f64,
    pub default_stop_loss_pct: f64,
    pub default_take_profit_pct: f64,
    /// Consecutive losing trades before the cooldown engages.
    pub max_consecutive_losses: u32,
    /// Cooldown length after max consecutive losses, minutes.
    pub cooldown_after_losses_minutes: i64,
}

impl Default for RiskSettings {
    fn default() -> Self {
        Self {
            max_daily_loss_usd: 500.0,
            max_daily_loss_pct: 5.0,
            max_position_pct: 30.0,
            default_stop_loss_pct: 2.0,
            default_take_profit_pct: 5.0,
            max_consecutive_losses: 3,
            cooldown_after_losses_minutes: 30,
        }
    }
}

/// Trend-confirmation gate thresholds.
#[derive(Debug, Clone)]
pub struct TrendSettings {
    pub enabled: bool,
    pub min_confidence: f64,
    pub adx_threshold: f64,
    pub rsi_overbought: f64,
    pub rsi_oversold: f64,
    /// Skip entries whose 15m timing quality is "wait".
    pub skip_poor_entry: bool,
    /// Allow entries even when the trend gate says no (scalping mode).
    pub allow_scalping: bool,
}

impl Default for TrendSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            min_confidence: 0.6,
            adx_threshold: 25.0,
            rsi_overbought: 70.0,
            rsi_oversold: 30.0,
            skip_poor_entry: true,
            allow_scalping: false,
        }
    }
}

/// Universe-selection settings.
#[derive(Debug, Clone)]
pub struct ScreeningSettings {
    pub enabled: bool,
    /// Size of the ranked candidate pool.
    pub top_n_coins: usize,
    /// Scout symbols handed to the LLM per cycle.
    pub analysis_batch_size: usize,
    /// Directory for the on-disk screening cache.
    pub cache_dir: String,
}

impl Default for ScreeningSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            top_n_coins: 20,
            analysis_batch_size: 5,
            cache_dir: "cache".to_string(),
        }
    }
}

/// Top-level engine settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Sandbox endpoints and credentials when true.
    pub testnet: bool,

    /// Master account address — owns the funds, used for every read call.
    pub master_account_address: String,
    /// API wallet address — the signer identity, used for every write call.
    pub wallet_address: String,
    /// API wallet private key (hex).
    pub private_key: String,

    /// Static universe used when screening is disabled or fails without cache.
    pub fallback_tickers: Vec<String>,

    pub cycle_interval_minutes: u64,
    /// Execution gate: decisions below this confidence are not executed.
    pub min_confidence: f64,

    pub screening: ScreeningSettings,
    pub trend: TrendSettings,
    pub risk: RiskSettings,

    /// Key of the preferred LLM in the model registry.
    pub default_ai_model: String,

    /// External market-data providers to enable, by registry name.
    pub market_data_providers: Vec<String>,

    /// SQLite database path (e.g. `sqlite://data/meridian.db`).
    pub database_url: String,

    /// Telegram notifier credentials; notifications are skipped when absent.
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,

    /// Bind address for the read-only status API.
    pub bind_addr: String,
}

impl Settings {
    /// Assemble settings from the environment.
    ///
    /// Credentials are mandatory: the engine refuses to start without a
    /// master account, an API wallet address, and its private key.
    pub fn from_env() -> Result<Self> {
        let testnet = env_flag("TESTNET", true);

        // Testnet-specific credential variables win when TESTNET is set so a
        // single .env can carry both environments.
        let (master_key, wallet_key, pk_key) = if testnet {
            (
                "TESTNET_MASTER_ACCOUNT_ADDRESS",
                "TESTNET_WALLET_ADDRESS",
                "TESTNET_PRIVATE_KEY",
            )
        } else {
            ("MASTER_ACCOUNT_ADDRESS", "WALLET_ADDRESS", "PRIVATE_KEY")
        };

        let master_account_address = env_either(master_key, "MASTER_ACCOUNT_ADDRESS");
        let wallet_address = env_either(wallet_key, "WALLET_ADDRESS");
        let private_key = env_either(pk_key, "PRIVATE_KEY");

        let master_account_address = match master_account_address {
            Some(v) if !v.is_empty() => v,
            _ => bail!("MASTER_ACCOUNT_ADDRESS is not set — refusing to start"),
        };
        let wallet_address = match wallet_address {
            Some(v) if !v.is_empty() => v,
            _ => bail!("WALLET_ADDRESS is not set — refusing to start"),
        };
        let private_key = match private_key {
            Some(v) if !v.is_empty() => v,
            _ => bail!("PRIVATE_KEY is not set — refusing to start"),
        };

        let fallback_tickers = env_list("TICKERS")
            .or_else(|| env_list("FALLBACK_TICKERS"))
            .unwrap_or_else(|| vec!["BTC".into(), "ETH".into(), "SOL".into()]);

        let screening = ScreeningSettings {
            enabled: env_flag("SCREENING_ENABLED", true),
            top_n_coins: env_parse("TOP_N_COINS", 20),
            analysis_batch_size: env_parse("ANALYSIS_BATCH_SIZE", 5),
            cache_dir: env_string("SCREENER_CACHE_DIR", "cache"),
        };

        let trend = TrendSettings {
            enabled: env_flag("TREND_CONFIRMATION_ENABLED", true),
            min_confidence: env_parse("MIN_TREND_CONFIDENCE", 0.6),
            adx_threshold: env_parse("ADX_THRESHOLD", 25.0),
            rsi_overbought: env_parse("RSI_OVERBOUGHT", 70.0),
            rsi_oversold: env_parse("RSI_OVERSOLD", 30.0),
            skip_poor_entry: env_flag("SKIP_POOR_ENTRY", true),
            allow_scalping: env_flag("ALLOW_SCALPING", false),
        };

        let risk = RiskSettings {
            max_daily_loss_usd: env_parse("MAX_DAILY_LOSS_USD", 500.0),
            max_daily_loss_pct: env_parse("MAX_DAILY_LOSS_PCT", 5.0),
            max_position_pct: env_parse("MAX_POSITION_PCT", 30.0),
            default_stop_loss_pct: env_parse("DEFAULT_STOP_LOSS_PCT", 2.0),
            default_take_profit_pct: env_parse("DEFAULT_TAKE_PROFIT_PCT", 5.0),
            max_consecutive_losses: env_parse("MAX_CONSECUTIVE_LOSSES", 3),
            cooldown_after_losses_minutes: env_parse("COOLDOWN_AFTER_LOSSES_MINUTES", 30),
        };

        let settings = Self {
            testnet,
            master_account_address,
            wallet_address,
            private_key,
            fallback_tickers,
            cycle_interval_minutes: env_parse("CYCLE_INTERVAL_MINUTES", 5),
            min_confidence: env_parse("MIN_CONFIDENCE", 0.4),
            screening,
            trend,
            risk,
            default_ai_model: env_string("DEFAULT_AI_MODEL", "deepseek"),
            market_data_providers: env_list("MARKET_DATA_PROVIDERS").unwrap_or_default(),
            database_url: env_string("DATABASE_URL", "sqlite://data/meridian.db"),
            telegram_bot_token: std::env::var("TELEGRAM_BOT_TOKEN").ok().filter(|v| !v.is_empty()),
            telegram_chat_id: std::env::var("TELEGRAM_CHAT_ID").ok().filter(|v| !v.is_empty()),
            bind_addr: env_string("BIND_ADDR", "0.0.0.0:3001"),
        };

        info!(
            testnet = settings.testnet,
            cycle_interval_minutes = settings.cycle_interval_minutes,
            screening_enabled = settings.screening.enabled,
            trend_enabled = settings.trend.enabled,
            providers = ?settings.market_data_providers,
            model = %settings.default_ai_model,
            "settings loaded"
        );

        if settings.telegram_bot_token.is_none() {
            warn!("TELEGRAM_BOT_TOKEN not set — notifications disabled");
        }

        Ok(settings)
    }
}

// ---------------------------------------------------------------------------
// Env helpers
// ---------------------------------------------------------------------------

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// First non-empty value among the primary and fallback variable names.
fn env_either(primary: &str, fallback: &str) -> Option<String> {
    std::env::var(primary)
        .ok()
        .filter(|v| !v.is_empty())
        .or_else(|| std::env::var(fallback).ok().filter(|v| !v.is_empty()))
}

fn env_flag(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(v) => matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Comma-separated list, trimmed and upper-cased entries, `None` if unset.
fn env_list(key: &str) -> Option<Vec<String>> {
    let raw = std::env::var(key).ok()?;
    let items: Vec<String> = raw
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if items.is_empty() {
        None
    } else {
        Some(items)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let risk = RiskSettings::default();
        assert_eq!(risk.max_daily_loss_usd, 500.0);
        assert_eq!(risk.max_consecutive_losses, 3);

        let trend = TrendSettings::default();
        assert!(trend.enabled);
        assert_eq!(trend.min_confidence, 0.6);
        assert_eq!(trend.adx_threshold, 25.0);

        let screening = ScreeningSettings::default();
        assert_eq!(screening.top_n_coins, 20);
        assert_eq!(screening.analysis_batch_size, 5);
    }

    #[test]
    fn env_list_parsing() {
        std::env::set_var("MERIDIAN_TEST_LIST", "binance, bybit ,okx,,");
        let list = env_list("MERIDIAN_TEST_LIST").unwrap();
        assert_eq!(list, vec!["binance", "bybit", "okx"]);
        std::env::remove_var("MERIDIAN_TEST_LIST");
        assert!(env_list("MERIDIAN_TEST_LIST").is_none());
    }

    #[test]
    fn env_flag_parsing() {
        std::env::set_var("MERIDIAN_TEST_FLAG", "false");
        assert!(!env_flag("MERIDIAN_TEST_FLAG", true));
        std::env::set_var("MERIDIAN_TEST_FLAG", "1");
        assert!(env_flag("MERIDIAN_TEST_FLAG", false));
        std::env::remove_var("MERIDIAN_TEST_FLAG");
        assert!(env_flag("MERIDIAN_TEST_FLAG", true));
    }
}
