// =============================================================================
// Trade decision — schema, parsing, and the tagged variant the engine uses
// =============================================================================
//
// On the wire the decision is a flat JSON object with an `operation` tag;
// internally it becomes {Hold, Open, Close} so a malformed mix of fields is
// a parse error instead of a latent bug. Range violations are parse errors;
// the softer sanity checks (reward/risk, exposure) only warn.
// =============================================================================

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::warn;

use crate::types::Direction;

/// Parameters of an `open` decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpenOrder {
    pub symbol: String,
    pub direction: Direction,
    /// Fraction of balance to commit, in [0, 1].
    pub target_portion_of_balance: f64,
    /// Leverage multiplier, 1..=10.
    pub leverage: u32,
    /// Stop-loss distance from entry, percent, [0.5, 10].
    pub stop_loss_pct: f64,
    /// Take-profit distance from entry, percent, [1, 50].
    pub take_profit_pct: f64,
}

/// A validated model decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "operation", rename_all = "lowercase")]
pub enum Decision {
    Hold {
        reason: String,
        confidence: f64,
    },
    Open {
        #[serde(flatten)]
        order: OpenOrder,
        reason: String,
        confidence: f64,
    },
    Close {
        symbol: String,
        reason: String,
        confidence: f64,
    },
}

impl Decision {
    pub fn operation_name(&self) -> &'static str {
        match self {
            Self::Hold { .. } => "hold",
            Self::Open { .. } => "open",
            Self::Close { .. } => "close",
        }
    }

    pub fn symbol(&self) -> Option<&str> {
        match self {
            Self::Hold { .. } => None,
            Self::Open { order, .. } => Some(&order.symbol),
            Self::Close { symbol, .. } => Some(symbol),
        }
    }

    pub fn confidence(&self) -> f64 {
        match self {
            Self::Hold { confidence, .. }
            | Self::Open { confidence, .. }
            | Self::Close { confidence, .. } => *confidence,
        }
    }

    pub fn reason(&self) -> &str {
        match self {
            Self::Hold { reason, .. }
            | Self::Open { reason, .. }
            | Self::Close { reason, .. } => reason,
        }
    }

    /// The stand-down decision returned when every model attempt failed.
    pub fn safe_default(error: &str) -> Self {
        let mut reason = format!("Falling back to HOLD after model failure: {error}");
        reason.truncate(500);
        Self::Hold {
            reason,
            confidence: 0.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

/// The flat object every provider must emit.
#[derive(Debug, Deserialize)]
struct RawDecision {
    operation: String,
    symbol: String,
    direction: String,
    target_portion_of_balance: f64,
    leverage: i64,
    stop_loss_pct: f64,
    take_profit_pct: f64,
    reason: String,
    confidence: f64,
}

/// Parse and range-check a provider response body (the message content).
pub fn parse_decision(content: &str) -> Result<Decision> {
    let raw: RawDecision =
        serde_json::from_str(content).context("decision is not valid JSON for the schema")?;

    if !(0.0..=1.0).contains(&raw.confidence) {
        bail!("confidence {} outside [0, 1]", raw.confidence);
    }
    if !(0.0..=1.0).contains(&raw.target_portion_of_balance) {
        bail!(
            "target_portion_of_balance {} outside [0, 1]",
            raw.target_portion_of_balance
        );
    }
    if !(1..=10).contains(&raw.leverage) {
        bail!("leverage {} outside [1, 10]", raw.leverage);
    }
    if !(0.5..=10.0).contains(&raw.stop_loss_pct) {
        bail!("stop_loss_pct {} outside [0.5, 10]", raw.stop_loss_pct);
    }
    if !(1.0..=50.0).contains(&raw.take_profit_pct) {
        bail!("take_profit_pct {} outside [1, 50]", raw.take_profit_pct);
    }
    if raw.reason.len() < 10 || raw.reason.len() > 500 {
        bail!("reason length {} outside [10, 500]", raw.reason.len());
    }

    let direction = Direction::parse(&raw.direction)
        .with_context(|| format!("direction '{}' is not long/short", raw.direction))?;

    log_risk_warnings(&raw);

    let decision = match raw.operation.as_str() {
        "hold" => Decision::Hold {
            reason: raw.reason,
            confidence: raw.confidence,
        },
        "close" => Decision::Close {
            symbol: raw.symbol,
            reason: raw.reason,
            confidence: raw.confidence,
        },
        "open" => Decision::Open {
            order: OpenOrder {
                symbol: raw.symbol,
                direction,
                target_portion_of_balance: raw.target_portion_of_balance,
                leverage: raw.leverage as u32,
                stop_loss_pct: raw.stop_loss_pct,
                take_profit_pct: raw.take_profit_pct,
            },
            reason: raw.reason,
            confidence: raw.confidence,
        },
        other => bail!("operation '{other}' is not open/close/hold"),
    };

    Ok(decision)
}

/// Non-fatal sanity checks; the orchestrator applies its own hard gates.
fn log_risk_warnings(raw: &RawDecision) {
    if raw.stop_loss_pct > 0.0 {
        let rr = raw.take_profit_pct / raw.stop_loss_pct;
        if rr < 1.0 {
            warn!(
                rr_ratio = format!("{rr:.2}"),
                tp_pct = raw.take_profit_pct,
                sl_pct = raw.stop_loss_pct,
                "decision has reward below risk"
            );
        }
    }
    if raw.confidence < 0.3 {
        warn!(confidence = raw.confidence, "low-confidence decision");
    }
    let exposure = raw.target_portion_of_balance * raw.leverage as f64;
    if exposure > 0.5 {
        warn!(
            exposure = format!("{:.1}%", exposure * 100.0),
            portion = raw.target_portion_of_balance,
            leverage = raw.leverage,
            "high effective exposure"
        );
    }
}

/// Strict JSON schema enforced on schema-capable providers.
pub fn decision_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "operation": {
                "type": "string",
                "enum": ["open", "close", "hold"],
                "description": "Trading operation to perform"
            },
            "symbol": {
                "type": "string",
                "description": "Asset ticker to act on (e.g. BTC, ETH, SOL)"
            },
            "direction": {
                "type": "string",
                "enum": ["long", "short"],
                "description": "long (price up) or short (price down)"
            },
            "target_portion_of_balance": {
                "type": "number",
                "minimum": 0,
                "maximum": 1,
                "description": "Fraction of balance to commit (0.0-1.0)"
            },
            "leverage": {
                "type": "integer",
                "minimum": 1,
                "maximum": 10,
                "description": "Leverage from 1x to 10x"
            },
            "stop_loss_pct": {
                "type": "number",
                "minimum": 0.5,
                "maximum": 10,
                "description": "Stop-loss distance from entry, percent"
            },
            "take_profit_pct": {
                "type": "number",
                "minimum": 1,
                "maximum": 50,
                "description": "Take-profit distance from entry, percent"
            },
            "reason": {
                "type": "string",
                "minLength": 10,
                "maxLength": 500,
                "description": "Explanation of the decision"
            },
            "confidence": {
                "type": "number",
                "minimum": 0,
                "maximum": 1,
                "description": "Confidence level (0-1)"
            }
        },
        "required": [
            "operation", "symbol", "direction", "target_portion_of_balance",
            "leverage", "stop_loss_pct", "take_profit_pct", "reason", "confidence"
        ],
        "additionalProperties": false
    })
}

/// Schema description embedded in the system prompt for providers without
/// strict schema support.
pub fn schema_prompt_block() -> &'static str {
    r#"Respond EXCLUSIVELY with a valid JSON object in this exact format:

{
  "operation": "open|close|hold",
  "symbol": "COIN_SYMBOL",
  "direction": "long|short",
  "target_portion_of_balance": 0.1,
  "leverage": 3,
  "stop_loss_pct": 2.0,
  "take_profit_pct": 5.0,
  "reason": "Detailed explanation of the decision",
  "confidence": 0.7
}

IMPORTANT:
- operation must be one of: "open", "close", "hold"
- symbol must be the ticker of the analyzed coin (e.g. "BTC", "ETH", "SOL")
- direction must be "long" or "short"
- target_portion_of_balance: number between 0.0 and 1.0
- leverage: integer between 1 and 10
- stop_loss_pct: number between 0.5 and 10
- take_profit_pct: number between 1 and 50
- confidence: number between 0.0 and 1.0
- Respond ONLY with the JSON, without additional text."#
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn payload(operation: &str) -> Value {
        json!({
            "operation": operation,
            "symbol": "BTC",
            "direction": "long",
            "target_portion_of_balance": 0.1,
            "leverage": 3,
            "stop_loss_pct": 2.0,
            "take_profit_pct": 5.0,
            "reason": "Momentum and sentiment both align upward.",
            "confidence": 0.7
        })
    }

    #[test]
    fn parses_open_into_tagged_variant() {
        let decision = parse_decision(&payload("open").to_string()).unwrap();
        match decision {
            Decision::Open {
                order,
                confidence,
                ..
            } => {
                assert_eq!(order.symbol, "BTC");
                assert_eq!(order.direction, Direction::Long);
                assert_eq!(order.leverage, 3);
                assert_eq!(confidence, 0.7);
            }
            other => panic!("expected Open, got {other:?}"),
        }
    }

    #[test]
    fn parses_hold_and_close() {
        assert_eq!(
            parse_decision(&payload("hold").to_string())
                .unwrap()
                .operation_name(),
            "hold"
        );
        let close = parse_decision(&payload("close").to_string()).unwrap();
        assert_eq!(close.operation_name(), "close");
        assert_eq!(close.symbol(), Some("BTC"));
    }

    #[test]
    fn rejects_out_of_range_fields() {
        let mut bad = payload("open");
        bad["leverage"] = json!(25);
        assert!(parse_decision(&bad.to_string()).is_err());

        let mut bad = payload("open");
        bad["stop_loss_pct"] = json!(0.1);
        assert!(parse_decision(&bad.to_string()).is_err());

        let mut bad = payload("open");
        bad["confidence"] = json!(1.5);
        assert!(parse_decision(&bad.to_string()).is_err());

        let mut bad = payload("open");
        bad["reason"] = json!("short");
        assert!(parse_decision(&bad.to_string()).is_err());
    }

    #[test]
    fn rejects_unknown_operation_and_direction() {
        let mut bad = payload("open");
        bad["operation"] = json!("buy");
        assert!(parse_decision(&bad.to_string()).is_err());

        let mut bad = payload("open");
        bad["direction"] = json!("up");
        assert!(parse_decision(&bad.to_string()).is_err());
    }

    #[test]
    fn rejects_non_json() {
        assert!(parse_decision("I think you should buy BTC").is_err());
        assert!(parse_decision("{\"operation\": \"open\"}").is_err());
    }

    #[test]
    fn safe_default_is_zero_confidence_hold() {
        let d = Decision::safe_default("connection refused");
        assert_eq!(d.operation_name(), "hold");
        assert_eq!(d.confidence(), 0.0);
        assert!(d.reason().contains("connection refused"));
    }

    #[test]
    fn schema_is_strict() {
        let schema = decision_schema();
        assert_eq!(schema["additionalProperties"], json!(false));
        assert_eq!(schema["required"].as_array().unwrap().len(), 9);
    }

    #[test]
    fn decision_serializes_with_operation_tag() {
        let d = Decision::Hold {
            reason: "No edge in current conditions.".into(),
            confidence: 0.5,
        };
        let v = serde_json::to_value(&d).unwrap();
        assert_eq!(v["operation"], "hold");
    }
}
