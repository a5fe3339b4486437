// =============================================================================
// Exchange action signing — msgpack action hash + EIP-712 agent signature
// =============================================================================
//
// Hyperliquid L1 actions are not RLP-signed like ordinary EVM transactions.
// The flow is:
//   1. Serialize the type-tagged action with MessagePack (named maps — field
//      order must match the reference SDK exactly or the hash diverges).
//   2. Append the nonce (big-endian u64) and a vault byte (0x00 — no vault).
//   3. keccak256 => "connection id".
//   4. Wrap in Agent { source, connection_id } where source is "a" on mainnet
//      and "b" on testnet, and sign its EIP-712 hash under the Exchange
//      domain (version 1, chain id 1337, zero verifying contract).
// =============================================================================

use alloy::primitives::{keccak256, B256, U256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::Signer;
use alloy::sol_types::{eip712_domain, Eip712Domain};
use serde::Serialize;

use super::error::VenueError;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// A single order on the exchange wire format.
///
/// Field names are the venue's single-letter keys; declaration order is the
/// serialization order and is part of the signed payload.
#[derive(Debug, Clone, Serialize)]
pub struct OrderRequest {
    #[serde(rename = "a")]
    pub asset: u32,
    #[serde(rename = "b")]
    pub is_buy: bool,
    #[serde(rename = "p")]
    pub limit_px: String,
    #[serde(rename = "s")]
    pub sz: String,
    #[serde(rename = "r")]
    pub reduce_only: bool,
    #[serde(rename = "t")]
    pub order_type: OrderType,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum OrderType {
    Limit(LimitOrder),
}

#[derive(Debug, Clone, Serialize)]
pub struct LimitOrder {
    /// Time-in-force: "Ioc" for the market-style orders this engine sends.
    pub tif: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkOrder {
    pub orders: Vec<OrderRequest>,
    pub grouping: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLeverage {
    pub asset: u32,
    pub is_cross: bool,
    pub leverage: u32,
}

/// Every action this engine signs, tagged the way the venue expects.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
#[serde(rename_all = "camelCase")]
pub enum ExchangeAction {
    Order(BulkOrder),
    UpdateLeverage(UpdateLeverage),
}

/// r/s/v triple in the shape the exchange endpoint wants.
#[derive(Debug, Clone)]
pub struct ActionSignature {
    pub r: U256,
    pub s: U256,
    pub v: u64,
}

impl ActionSignature {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "r": format!("0x{:064x}", self.r),
            "s": format!("0x{:064x}", self.s),
            "v": self.v,
        })
    }
}

// ---------------------------------------------------------------------------
// Hashing & signing
// ---------------------------------------------------------------------------

/// keccak256 over msgpack(action) ++ nonce_be ++ 0x00 (no vault).
pub fn action_hash(action: &ExchangeAction, nonce: u64) -> Result<B256, VenueError> {
    let mut bytes = rmp_serde::to_vec_named(action)
        .map_err(|e| VenueError::Signing(format!("msgpack serialization failed: {e}")))?;
    bytes.extend_from_slice(&nonce.to_be_bytes());
    bytes.push(0);
    Ok(keccak256(bytes))
}

fn exchange_domain() -> Eip712Domain {
    eip712_domain! {
        name: "Exchange",
        version: "1",
        chain_id: 1337u64,
        verifying_contract: alloy::primitives::address!("0000000000000000000000000000000000000000"),
    }
}

/// EIP-712 struct hash of `Agent(string source,bytes32 connectionId)`.
fn agent_struct_hash(source: &str, connection_id: B256) -> B256 {
    let type_hash = keccak256("Agent(string source,bytes32 connectionId)".as_bytes());
    let mut encoded = Vec::with_capacity(96);
    encoded.extend_from_slice(&type_hash[..]);
    encoded.extend_from_slice(&keccak256(source.as_bytes())[..]);
    encoded.extend_from_slice(&connection_id[..]);
    keccak256(encoded)
}

fn agent_signing_hash(source: &str, connection_id: B256) -> B256 {
    let separator = exchange_domain().separator();
    let struct_hash = agent_struct_hash(source, connection_id);

    let mut buf = Vec::with_capacity(66);
    buf.push(0x19);
    buf.push(0x01);
    buf.extend_from_slice(&separator[..]);
    buf.extend_from_slice(&struct_hash[..]);
    keccak256(buf)
}

/// Sign an L1 action with the API wallet key.
pub async fn sign_l1_action(
    signer: &PrivateKeySigner,
    action: &ExchangeAction,
    nonce: u64,
    testnet: bool,
) -> Result<ActionSignature, VenueError> {
    let connection_id = action_hash(action, nonce)?;
    let source = if testnet { "b" } else { "a" };
    let hash = agent_signing_hash(source, connection_id);

    let sig = signer
        .sign_hash(&hash)
        .await
        .map_err(|e| VenueError::Signing(e.to_string()))?;

    Ok(ActionSignature {
        r: sig.r(),
        s: sig.s(),
        v: if sig.v() { 28 } else { 27 },
    })
}

// ---------------------------------------------------------------------------
// Number formatting
// ---------------------------------------------------------------------------

/// Floor `size` to `sz_decimals` and render the exact decimal string the
/// venue expects (no exponent, no trailing zeros).
pub fn format_size(size: f64, sz_decimals: u32) -> String {
    let scale = 10f64.powi(sz_decimals as i32);
    let floored = (size * scale).floor() / scale;
    trim_decimal(format!("{floored:.prec$}", prec = sz_decimals as usize))
}

/// Floor `size` to the symbol's size step.
pub fn round_size_down(size: f64, sz_decimals: u32) -> f64 {
    let scale = 10f64.powi(sz_decimals as i32);
    (size * scale).floor() / scale
}

/// Render a perp price: at most 5 significant figures and at most
/// `6 - sz_decimals` decimal places, whichever is tighter.
pub fn format_price(px: f64, sz_decimals: u32) -> String {
    if px <= 0.0 || !px.is_finite() {
        return "0".to_string();
    }

    let max_decimals = 6u32.saturating_sub(sz_decimals);

    // Round to 5 significant figures first.
    let magnitude = px.abs().log10().floor() as i32;
    let sig_decimals = (4 - magnitude).max(0) as u32;
    let decimals = sig_decimals.min(max_decimals);

    let scale = 10f64.powi(decimals as i32);
    let rounded = (px * scale).round() / scale;
    trim_decimal(format!("{rounded:.prec$}", prec = decimals as usize))
}

fn trim_decimal(mut s: String) -> String {
    if s.contains('.') {
        while s.ends_with('0') {
            s.pop();
        }
        if s.ends_with('.') {
            s.pop();
        }
    }
    s
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_hash_is_deterministic_and_nonce_sensitive() {
        let action = ExchangeAction::UpdateLeverage(UpdateLeverage {
            asset: 3,
            is_cross: true,
            leverage: 5,
        });
        let a = action_hash(&action, 1_700_000_000_000).unwrap();
        let b = action_hash(&action, 1_700_000_000_000).unwrap();
        let c = action_hash(&action, 1_700_000_000_001).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn order_serializes_with_wire_keys() {
        let action = ExchangeAction::Order(BulkOrder {
            orders: vec![OrderRequest {
                asset: 0,
                is_buy: true,
                limit_px: "50000".into(),
                sz: "0.01".into(),
                reduce_only: false,
                order_type: OrderType::Limit(LimitOrder { tif: "Ioc".into() }),
            }],
            grouping: "na".into(),
        });
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["type"], "order");
        assert_eq!(json["grouping"], "na");
        let order = &json["orders"][0];
        assert_eq!(order["a"], 0);
        assert_eq!(order["b"], true);
        assert_eq!(order["p"], "50000");
        assert_eq!(order["s"], "0.01");
        assert_eq!(order["r"], false);
        assert_eq!(order["t"]["limit"]["tif"], "Ioc");
    }

    #[test]
    fn agent_type_hash_matches_reference() {
        let expected = keccak256("Agent(string source,bytes32 connectionId)");
        // Recompute through the struct hash with a zero connection id: the
        // first 32 bytes of the preimage are the type hash.
        let h1 = agent_struct_hash("a", B256::ZERO);
        let mut preimage = Vec::new();
        preimage.extend_from_slice(&expected[..]);
        preimage.extend_from_slice(&keccak256("a".as_bytes())[..]);
        preimage.extend_from_slice(&B256::ZERO[..]);
        assert_eq!(h1, keccak256(preimage));
    }

    #[test]
    fn testnet_and_mainnet_hashes_differ() {
        let id = B256::repeat_byte(7);
        assert_ne!(agent_signing_hash("a", id), agent_signing_hash("b", id));
    }

    #[test]
    fn size_formatting_floors() {
        assert_eq!(format_size(0.123456, 3), "0.123");
        assert_eq!(format_size(0.1299, 2), "0.12");
        assert_eq!(format_size(5.0, 2), "5");
        assert_eq!(format_size(0.999999, 0), "0");
    }

    #[test]
    fn size_rounding_is_idempotent() {
        let once = round_size_down(0.123456789, 4);
        let twice = round_size_down(once, 4);
        assert_eq!(once, twice);
    }

    #[test]
    fn price_formatting_sig_figs() {
        // 5 significant figures dominate for large prices.
        assert_eq!(format_price(50123.456, 3), "50123");
        // Decimal cap (6 - szDecimals) dominates for small prices.
        assert_eq!(format_price(0.123456789, 2), "0.1235");
        assert_eq!(format_price(1.23456789, 0), "1.2346");
        assert_eq!(format_price(0.0, 2), "0");
    }
}
