// =============================================================================
// Hyperliquid wire types — the subset of /info responses the engine consumes
// =============================================================================
//
// The venue serializes most numbers as strings; `de_str_f64` tolerates both
// forms so response-shape drift does not break parsing.
// =============================================================================

use serde::{Deserialize, Deserializer, Serialize};

use crate::types::Candle;

/// Deserialize a numeric field that may arrive as a string or a number.
pub fn de_str_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StrOrNum {
        Str(String),
        Num(f64),
    }

    match StrOrNum::deserialize(deserializer)? {
        StrOrNum::Str(s) => s.parse().map_err(serde::de::Error::custom),
        StrOrNum::Num(n) => Ok(n),
    }
}

fn de_opt_str_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Num(f64),
        None,
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Str(s)) => s.parse().ok(),
        Some(Raw::Num(n)) => Some(n),
        _ => None,
    })
}

// ---------------------------------------------------------------------------
// Meta / universe
// ---------------------------------------------------------------------------

/// Static listing data for one perp asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetMeta {
    pub name: String,
    pub sz_decimals: u32,
    #[serde(default = "default_max_leverage")]
    pub max_leverage: u32,
    /// Minimum order size; absent in some responses, venue default applies.
    #[serde(default, deserialize_with = "de_opt_str_f64")]
    pub min_sz: Option<f64>,
    #[serde(default)]
    pub only_isolated: bool,
}

fn default_max_leverage() -> u32 {
    50
}

impl AssetMeta {
    pub fn min_size(&self) -> f64 {
        self.min_sz.unwrap_or(0.001)
    }
}

/// The perp universe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Meta {
    pub universe: Vec<AssetMeta>,
}

impl Meta {
    pub fn asset(&self, symbol: &str) -> Option<&AssetMeta> {
        self.universe.iter().find(|a| a.name == symbol)
    }

    /// Index of `symbol` in the universe — the wire `asset` id for orders.
    pub fn asset_index(&self, symbol: &str) -> Option<u32> {
        self.universe
            .iter()
            .position(|a| a.name == symbol)
            .map(|i| i as u32)
    }
}

/// Rolling per-asset market context (paired with the universe by index in
/// the `metaAndAssetCtxs` response).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetContext {
    #[serde(default, deserialize_with = "de_opt_str_f64")]
    pub funding: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_str_f64")]
    pub open_interest: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_str_f64")]
    pub day_ntl_vlm: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_str_f64")]
    pub mark_px: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_str_f64")]
    pub mid_px: Option<f64>,
}

// ---------------------------------------------------------------------------
// Candles
// ---------------------------------------------------------------------------

/// Raw candle row from `candleSnapshot`.
#[derive(Debug, Deserialize)]
pub struct RawCandle {
    pub t: i64,
    #[serde(rename = "T")]
    pub t_close: i64,
    #[serde(deserialize_with = "de_str_f64")]
    pub o: f64,
    #[serde(deserialize_with = "de_str_f64")]
    pub h: f64,
    #[serde(deserialize_with = "de_str_f64")]
    pub l: f64,
    #[serde(deserialize_with = "de_str_f64")]
    pub c: f64,
    #[serde(deserialize_with = "de_str_f64")]
    pub v: f64,
}

impl From<RawCandle> for Candle {
    fn from(raw: RawCandle) -> Self {
        Candle::new(raw.t, raw.o, raw.h, raw.l, raw.c, raw.v, raw.t_close)
    }
}

// ---------------------------------------------------------------------------
// Order book
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct BookLevel {
    #[serde(deserialize_with = "de_str_f64")]
    pub px: f64,
    #[serde(deserialize_with = "de_str_f64")]
    pub sz: f64,
}

/// L2 snapshot: `levels[0]` bids, `levels[1]` asks.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderBook {
    pub levels: Vec<Vec<BookLevel>>,
}

impl OrderBook {
    pub fn bids(&self) -> &[BookLevel] {
        self.levels.first().map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn asks(&self) -> &[BookLevel] {
        self.levels.get(1).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Total resting size on each side: (bid_volume, ask_volume).
    pub fn side_totals(&self) -> (f64, f64) {
        let bid: f64 = self.bids().iter().map(|l| l.sz).sum();
        let ask: f64 = self.asks().iter().map(|l| l.sz).sum();
        (bid, ask)
    }
}

// ---------------------------------------------------------------------------
// Fills
// ---------------------------------------------------------------------------

/// One entry from `userFills`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fill {
    pub coin: String,
    #[serde(deserialize_with = "de_str_f64")]
    pub px: f64,
    #[serde(deserialize_with = "de_str_f64")]
    pub sz: f64,
    /// "Open Long", "Close Short", "Long > Short", ...
    #[serde(default)]
    pub dir: String,
    pub time: i64,
    #[serde(default, deserialize_with = "de_opt_str_f64")]
    pub closed_pnl: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_str_f64")]
    pub fee: Option<f64>,
    #[serde(default)]
    pub oid: Option<u64>,
}

// ---------------------------------------------------------------------------
// Account state (derived)
// ---------------------------------------------------------------------------

/// One live position extracted from `assetPositions`.
#[derive(Debug, Clone, Serialize)]
pub struct VenuePosition {
    pub symbol: String,
    /// "long" or "short".
    pub side: String,
    pub size: f64,
    pub entry_price: f64,
    pub mark_price: f64,
    pub pnl_usd: f64,
    pub leverage: String,
}

/// Balance + positions view produced by `HyperliquidClient::account_status`.
#[derive(Debug, Clone, Serialize)]
pub struct AccountStatus {
    /// Total equity after the fallback chain (cross → perps+spot →
    /// withdrawable).
    pub balance_usd: f64,
    pub perps_balance_usd: f64,
    pub spot_balance_usd: f64,
    pub open_positions: Vec<VenuePosition>,
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_asset_lookup() {
        let meta: Meta = serde_json::from_value(serde_json::json!({
            "universe": [
                {"name": "BTC", "szDecimals": 5, "maxLeverage": 50},
                {"name": "ETH", "szDecimals": 4, "maxLeverage": 50, "minSz": "0.01"},
            ]
        }))
        .unwrap();

        assert_eq!(meta.asset_index("BTC"), Some(0));
        assert_eq!(meta.asset_index("ETH"), Some(1));
        assert_eq!(meta.asset_index("DOGE"), None);
        assert_eq!(meta.asset("ETH").unwrap().min_size(), 0.01);
        // Default minimum when the field is absent.
        assert_eq!(meta.asset("BTC").unwrap().min_size(), 0.001);
    }

    #[test]
    fn raw_candle_parses_string_numbers() {
        let raw: RawCandle = serde_json::from_value(serde_json::json!({
            "t": 1700000000000i64, "T": 1700000900000i64,
            "o": "100.5", "h": "101", "l": "99.5", "c": "100.9", "v": "1234.5",
            "n": 42, "s": "BTC", "i": "15m"
        }))
        .unwrap();
        let candle: Candle = raw.into();
        assert_eq!(candle.open, 100.5);
        assert_eq!(candle.close, 100.9);
        assert_eq!(candle.close_time, 1700000900000);
    }

    #[test]
    fn orderbook_side_totals() {
        let book: OrderBook = serde_json::from_value(serde_json::json!({
            "levels": [
                [{"px": "100", "sz": "2", "n": 1}, {"px": "99", "sz": "3", "n": 1}],
                [{"px": "101", "sz": "1.5", "n": 1}]
            ]
        }))
        .unwrap();
        let (bid, ask) = book.side_totals();
        assert_eq!(bid, 5.0);
        assert_eq!(ask, 1.5);
    }

    #[test]
    fn fill_parses() {
        let fill: Fill = serde_json::from_value(serde_json::json!({
            "coin": "SOL", "px": "150.0", "sz": "10", "dir": "Open Long",
            "time": 1700000000000i64, "closedPnl": "0.0", "fee": "0.05",
            "oid": 991, "side": "B", "hash": "0xabc", "crossed": true
        }))
        .unwrap();
        assert_eq!(fill.coin, "SOL");
        assert_eq!(fill.sz, 10.0);
        assert_eq!(fill.oid, Some(991));
        assert_eq!(fill.closed_pnl, Some(0.0));
    }
}
