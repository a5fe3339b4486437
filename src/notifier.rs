// =============================================================================
// Telegram notifier — outbound-only, best-effort
// =============================================================================
//
// Sends trade opens/closes, circuit-breaker activations, and critical errors
// to a Telegram chat. Missing credentials disable it silently; a send
// failure is logged and dropped, never propagated into the cycle.
// =============================================================================

use tracing::{debug, info, warn};

pub struct Notifier {
    http: reqwest::Client,
    bot_token: Option<String>,
    chat_id: Option<String>,
}

impl Notifier {
    pub fn new(bot_token: Option<String>, chat_id: Option<String>) -> Self {
        if bot_token.is_some() && chat_id.is_some() {
            info!("telegram notifier enabled");
        } else {
            info!("telegram notifier disabled (missing credentials)");
        }
        Self {
            http: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .expect("failed to build notifier HTTP client"),
            bot_token,
            chat_id,
        }
    }

    pub fn enabled(&self) -> bool {
        self.bot_token.is_some() && self.chat_id.is_some()
    }

    /// Fire-and-forget send.
    pub async fn send(&self, text: &str) {
        let (Some(token), Some(chat_id)) = (&self.bot_token, &self.chat_id) else {
            debug!("notification skipped (notifier disabled)");
            return;
        };

        let url = format!("https://api.telegram.org/bot{token}/sendMessage");
        let result = self
            .http
            .post(&url)
            .json(&serde_json::json!({
                "chat_id": chat_id,
                "text": text,
                "parse_mode": "HTML",
                "disable_web_page_preview": true,
            }))
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().is_success() => debug!("notification sent"),
            Ok(resp) => warn!(status = %resp.status(), "telegram rejected notification"),
            Err(e) => warn!(error = %e, "notification send failed"),
        }
    }

    pub async fn notify_startup(&self, testnet: bool, balance: f64) {
        self.send(&format!(
            "🚀 <b>Meridian started</b>\nNetwork: {}\nBalance: ${balance:.2}",
            if testnet { "testnet" } else { "mainnet" }
        ))
        .await;
    }

    pub async fn notify_trade_opened(&self, symbol: &str, direction: &str, size_usd: f64, leverage: u32) {
        self.send(&format!(
            "📈 <b>Opened</b> {symbol} {direction}\nSize: ${size_usd:.2} @ {leverage}x"
        ))
        .await;
    }

    pub async fn notify_trade_closed(&self, symbol: &str, reason: &str, pnl_usd: f64) {
        let emoji = if pnl_usd >= 0.0 { "✅" } else { "🔻" };
        self.send(&format!(
            "{emoji} <b>Closed</b> {symbol} ({reason})\nPnL: ${pnl_usd:.2}"
        ))
        .await;
    }

    pub async fn notify_circuit_breaker(&self, daily_pnl: f64) {
        self.send(&format!(
            "🛑 <b>Circuit breaker active</b>\nDaily PnL: ${daily_pnl:.2}\nNo new positions until UTC midnight."
        ))
        .await;
    }

    pub async fn notify_critical(&self, message: &str) {
        self.send(&format!("⚠️ <b>Critical</b>: {message}")).await;
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("enabled", &self.enabled())
            .finish()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_without_credentials() {
        assert!(!Notifier::new(None, None).enabled());
        assert!(!Notifier::new(Some("t".into()), None).enabled());
        assert!(Notifier::new(Some("t".into()), Some("c".into())).enabled());
    }

    #[tokio::test]
    async fn disabled_send_is_a_noop() {
        // Must not attempt any network call (no panic, returns immediately).
        Notifier::new(None, None).send("hello").await;
    }
}
