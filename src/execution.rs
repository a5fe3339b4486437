// =============================================================================
// Execution Adapter — risk-aware order routing with idempotent close
// =============================================================================
//
// Wraps the venue client behind the decision semantics:
//   hold  → no-op
//   close → position lookup (exact or substring), reduce-only market close,
//           alternate close via an opposite-side order when the venue answers
//           ambiguously, risk tracking cleared only on confirmed success
//   open  → risk admission, fixed-fractional sizing, leverage set + grace
//           pause, floor-rounded market order, position registration
//
// The engine holds non-owning handles to the venue and the risk manager;
// the risk manager stays the single owner of position state.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::hyperliquid::HyperliquidClient;
use crate::llm::{Decision, OpenOrder};
use crate::risk::{Position, PositionSizing, RiskManager};

/// Bounded slippage for market-style orders (1 %).
const DEFAULT_SLIPPAGE: f64 = 0.01;
/// Pause after a leverage update so the venue applies it before the order.
const LEVERAGE_GRACE: Duration = Duration::from_millis(500);

/// Outcome of routing one decision.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionResult {
    /// Hold decision — nothing sent.
    Hold,
    /// Close requested but no live position matched; tracking cleaned up.
    Skipped { message: String },
    /// Open refused by risk admission.
    Rejected { reason: String },
    /// Decision stopped by an orchestrator gate (trend, confidence, phase)
    /// before any order was built.
    Blocked { reason: String },
    /// Open confirmed; position registered.
    Executed {
        response: Value,
        position: Position,
        sizing: PositionSizing,
    },
    /// Close confirmed ("market_close" or "alternate").
    Closed {
        method: &'static str,
        symbol: String,
    },
    /// Venue error; internal state untouched.
    Error { message: String },
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Executed { .. } | Self::Closed { .. } | Self::Hold)
    }
}

impl std::fmt::Display for ExecutionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hold => write!(f, "Hold"),
            Self::Skipped { message } => write!(f, "Skipped({message})"),
            Self::Rejected { reason } => write!(f, "Rejected({reason})"),
            Self::Blocked { reason } => write!(f, "Blocked({reason})"),
            Self::Executed { position, .. } => {
                write!(f, "Executed({} {})", position.symbol, position.direction)
            }
            Self::Closed { method, symbol } => write!(f, "Closed({symbol} via {method})"),
            Self::Error { message } => write!(f, "Error({message})"),
        }
    }
}

/// Shape of the venue's bulk-order acknowledgment.
enum OrderAck {
    Filled,
    Failed(String),
    /// No recognizable status — the venue answered but said nothing usable.
    Ambiguous,
}

pub struct ExecutionEngine {
    venue: Arc<HyperliquidClient>,
    risk: Arc<RiskManager>,
}

impl ExecutionEngine {
    pub fn new(venue: Arc<HyperliquidClient>, risk: Arc<RiskManager>) -> Self {
        Self { venue, risk }
    }

    /// Route one decision through risk checks and the venue.
    #[instrument(skip_all, fields(operation = decision.operation_name()))]
    pub async fn execute_decision(&self, decision: &Decision, balance_usd: f64) -> ExecutionResult {
        match decision {
            Decision::Hold { .. } => ExecutionResult::Hold,
            Decision::Close { symbol, .. } => self.close_position(symbol).await,
            Decision::Open { order, .. } => self.open_position(order, balance_usd).await,
        }
    }

    // -------------------------------------------------------------------------
    // Close path
    // -------------------------------------------------------------------------

    /// Close the live position for `symbol`. Safe to call for symbols with
    /// no position: that is a skipped no-op, and stale risk tracking for the
    /// symbol is dropped either way.
    pub async fn close_position(&self, symbol: &str) -> ExecutionResult {
        // Resolve the exact venue symbol; venues occasionally rename (a
        // substring match catches e.g. "kPEPE" vs "PEPE").
        let matched = match self.venue.account_status().await {
            Ok(status) => status
                .open_positions
                .iter()
                .find(|p| {
                    p.symbol == symbol || p.symbol.contains(symbol) || symbol.contains(&p.symbol)
                })
                .cloned(),
            Err(e) => {
                warn!(symbol, error = %e, "could not verify position before close");
                return ExecutionResult::Error {
                    message: format!("position lookup failed for {symbol}: {e}"),
                };
            }
        };

        let Some(position) = matched else {
            // Nothing live: clear tracking so the registry cannot drift.
            self.risk.remove_position(symbol);
            return ExecutionResult::Skipped {
                message: format!("no open position for {symbol} to close"),
            };
        };

        let exact_symbol = position.symbol.clone();
        info!(
            requested = symbol,
            exact = %exact_symbol,
            size = position.size,
            side = %position.side,
            "closing position"
        );

        match self.venue.market_close(&exact_symbol).await {
            Ok(response) => match classify_order_ack(&response) {
                OrderAck::Filled => {
                    self.risk.remove_position(symbol);
                    ExecutionResult::Closed {
                        method: "market_close",
                        symbol: exact_symbol,
                    }
                }
                OrderAck::Failed(message) => ExecutionResult::Error {
                    message: format!("close failed for {exact_symbol}: {message}"),
                },
                OrderAck::Ambiguous => {
                    warn!(
                        symbol = %exact_symbol,
                        "ambiguous close acknowledgment — attempting alternate close"
                    );
                    self.alternate_close(&exact_symbol, symbol).await
                }
            },
            Err(e) => ExecutionResult::Error {
                message: format!("close failed for {exact_symbol}: {e}"),
            },
        }
    }

    /// Fallback close: open the opposite side with the exact observed size.
    /// This is a forced close — it reduces exposure, so risk admission is
    /// deliberately not consulted; the log line carries a forced-close flag.
    async fn alternate_close(&self, exact_symbol: &str, tracked_symbol: &str) -> ExecutionResult {
        let position = match self.venue.account_status().await {
            Ok(status) => status
                .open_positions
                .into_iter()
                .find(|p| p.symbol == exact_symbol),
            Err(e) => {
                return ExecutionResult::Error {
                    message: format!("alternate close lookup failed: {e}"),
                }
            }
        };

        let Some(position) = position else {
            // The first attempt evidently went through after all.
            self.risk.remove_position(tracked_symbol);
            return ExecutionResult::Closed {
                method: "market_close",
                symbol: exact_symbol.to_string(),
            };
        };

        let is_buy = position.side == "short";
        info!(
            symbol = exact_symbol,
            side = if is_buy { "BUY" } else { "SELL" },
            size = position.size,
            forced_close = true,
            "alternate close order"
        );

        match self
            .venue
            .market_open(exact_symbol, is_buy, position.size, DEFAULT_SLIPPAGE)
            .await
        {
            Ok(response) => match classify_order_ack(&response) {
                OrderAck::Filled => {
                    self.risk.remove_position(tracked_symbol);
                    ExecutionResult::Closed {
                        method: "alternate",
                        symbol: exact_symbol.to_string(),
                    }
                }
                OrderAck::Failed(message) => ExecutionResult::Error {
                    message: format!("alternate close rejected: {message}"),
                },
                OrderAck::Ambiguous => ExecutionResult::Error {
                    message: format!(
                        "alternate close unconfirmed for {exact_symbol} — position may still be open"
                    ),
                },
            },
            Err(e) => ExecutionResult::Error {
                message: format!("alternate close failed: {e}"),
            },
        }
    }

    // -------------------------------------------------------------------------
    // Open path
    // -------------------------------------------------------------------------

    async fn open_position(&self, order: &OpenOrder, balance_usd: f64) -> ExecutionResult {
        let admission = self.risk.can_open_position(balance_usd);
        if !admission.allowed {
            warn!(symbol = %order.symbol, reason = %admission.reason, "open rejected by risk");
            return ExecutionResult::Rejected {
                reason: admission.reason,
            };
        }

        // Fixed-fractional sizing overrides the model's requested portion.
        let sizing = self.risk.calculate_position_size(
            balance_usd,
            order.target_portion_of_balance,
            order.stop_loss_pct,
            order.leverage,
        );

        // Cross-margin leverage first, then a short grace pause so the order
        // is margined at the requested multiple.
        if let Err(e) = self
            .venue
            .update_leverage(&order.symbol, order.leverage, true)
            .await
        {
            warn!(symbol = %order.symbol, error = %e, "leverage update failed — continuing");
        }
        tokio::time::sleep(LEVERAGE_GRACE).await;

        let mark_price = match self.venue.current_prices(&[order.symbol.clone()]).await {
            Ok(prices) => match prices.get(&order.symbol) {
                Some(&px) if px > 0.0 => px,
                _ => {
                    return ExecutionResult::Error {
                        message: format!("{} has no mark price", order.symbol),
                    }
                }
            },
            Err(e) => {
                return ExecutionResult::Error {
                    message: format!("mark price fetch failed: {e}"),
                }
            }
        };

        let notional = balance_usd * sizing.effective_portion * order.leverage as f64;
        let raw_size = notional / mark_price;
        let (size, _wire) = match self.venue.round_order_size(&order.symbol, raw_size) {
            Ok(rounded) => rounded,
            Err(e) => {
                return ExecutionResult::Error {
                    message: format!("size rounding failed: {e}"),
                }
            }
        };

        info!(
            symbol = %order.symbol,
            direction = %order.direction,
            mark_price,
            notional = format!("{notional:.2}"),
            size,
            leverage = order.leverage,
            "submitting open order"
        );

        match self
            .venue
            .market_open(&order.symbol, order.direction.is_buy(), size, DEFAULT_SLIPPAGE)
            .await
        {
            Ok(response) => match classify_order_ack(&response) {
                OrderAck::Filled | OrderAck::Ambiguous => {
                    let entry_price = fill_price(&response).unwrap_or(mark_price);
                    let position = self.risk.register_position(
                        &order.symbol,
                        order.direction,
                        entry_price,
                        size,
                        order.leverage,
                        order.stop_loss_pct,
                        order.take_profit_pct,
                    );
                    ExecutionResult::Executed {
                        response,
                        position,
                        sizing,
                    }
                }
                OrderAck::Failed(message) => ExecutionResult::Error {
                    message: format!("open failed for {}: {message}", order.symbol),
                },
            },
            Err(e) => ExecutionResult::Error {
                message: format!("open failed for {}: {e}", order.symbol),
            },
        }
    }
}

impl std::fmt::Debug for ExecutionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionEngine")
            .field("venue", &"<HyperliquidClient>")
            .field("risk", &self.risk)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Venue acknowledgment parsing
// ---------------------------------------------------------------------------

/// Interpret a bulk-order response:
/// `{"status":"ok","response":{"data":{"statuses":[{"filled":...}]}}}` on
/// success, `{"status":"err",...}` or per-order `{"error":...}` entries on
/// failure, anything else is ambiguous.
fn classify_order_ack(response: &Value) -> OrderAck {
    match response.get("status").and_then(Value::as_str) {
        Some("err") => OrderAck::Failed(message_of(response)),
        Some("ok") => {
            let statuses = response
                .pointer("/response/data/statuses")
                .and_then(Value::as_array);
            match statuses {
                Some(entries) => {
                    for entry in entries {
                        if let Some(err) = entry.get("error").and_then(Value::as_str) {
                            return OrderAck::Failed(err.to_string());
                        }
                    }
                    OrderAck::Filled
                }
                None => OrderAck::Ambiguous,
            }
        }
        _ => OrderAck::Ambiguous,
    }
}

/// Average fill price from the first filled status, when present.
fn fill_price(response: &Value) -> Option<f64> {
    response
        .pointer("/response/data/statuses")
        .and_then(Value::as_array)?
        .iter()
        .find_map(|entry| entry.pointer("/filled/avgPx"))
        .and_then(|px| match px {
            Value::String(s) => s.parse().ok(),
            Value::Number(n) => n.as_f64(),
            _ => None,
        })
}

fn message_of(response: &Value) -> String {
    response
        .get("response")
        .map(|r| match r {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .unwrap_or_else(|| response.to_string())
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ack_classification() {
        let ok = json!({
            "status": "ok",
            "response": {"type": "order", "data": {"statuses": [
                {"filled": {"totalSz": "0.01", "avgPx": "50001.5", "oid": 1}}
            ]}}
        });
        assert!(matches!(classify_order_ack(&ok), OrderAck::Filled));
        assert_eq!(fill_price(&ok), Some(50001.5));

        let per_order_err = json!({
            "status": "ok",
            "response": {"type": "order", "data": {"statuses": [
                {"error": "Insufficient margin"}
            ]}}
        });
        match classify_order_ack(&per_order_err) {
            OrderAck::Failed(msg) => assert!(msg.contains("Insufficient margin")),
            _ => panic!("expected Failed"),
        }

        let hard_err = json!({"status": "err", "response": "order rejected"});
        match classify_order_ack(&hard_err) {
            OrderAck::Failed(msg) => assert_eq!(msg, "order rejected"),
            _ => panic!("expected Failed"),
        }

        let weird = json!({"something": "else"});
        assert!(matches!(classify_order_ack(&weird), OrderAck::Ambiguous));
    }

    #[test]
    fn fill_price_absent() {
        let resting = json!({
            "status": "ok",
            "response": {"type": "order", "data": {"statuses": [
                {"resting": {"oid": 5}}
            ]}}
        });
        assert_eq!(fill_price(&resting), None);
        assert!(matches!(classify_order_ack(&resting), OrderAck::Filled));
    }

    #[test]
    fn result_display_and_success() {
        assert!(ExecutionResult::Hold.is_success());
        assert!(ExecutionResult::Closed {
            method: "market_close",
            symbol: "BTC".into()
        }
        .is_success());
        assert!(!ExecutionResult::Error {
            message: "nope".into()
        }
        .is_success());
        assert!(!ExecutionResult::Rejected {
            reason: "breaker".into()
        }
        .is_success());

        let s = ExecutionResult::Skipped {
            message: "no position".into(),
        }
        .to_string();
        assert!(s.contains("no position"));
    }
}
