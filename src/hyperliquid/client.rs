// =============================================================================
// Hyperliquid REST client — typed façade over /info and /exchange
// =============================================================================
//
// Two addresses, two roles:
//   - master account: owns the funds; every read call quotes it.
//   - API wallet:     the signer; every write call is signed by its key.
//
// Reads retry transparently on 429 (10 s base, 120 s cap, 10 attempts — the
// venue throttles cold clients, including the constructor's meta fetch).
// Writes never retry: a duplicated market order is worse than a failed one.
// =============================================================================

use std::collections::HashMap;

use alloy::signers::local::PrivateKeySigner;
use parking_lot::RwLock;
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};

use crate::config::Settings;
use crate::types::Candle;

use super::error::VenueError;
use super::retry::with_backoff;
use super::signing::{
    self, format_price, format_size, round_size_down, BulkOrder, ExchangeAction, LimitOrder,
    OrderRequest, OrderType, UpdateLeverage,
};
use super::types::{AccountStatus, AssetContext, Fill, Meta, OrderBook, RawCandle, VenuePosition};

const MAINNET_API_URL: &str = "https://api.hyperliquid.xyz";
const TESTNET_API_URL: &str = "https://api.hyperliquid-testnet.xyz";

/// Candle interval to milliseconds-per-bar.
pub fn interval_to_ms(interval: &str) -> Option<i64> {
    match interval {
        "1m" => Some(60_000),
        "5m" => Some(5 * 60_000),
        "15m" => Some(15 * 60_000),
        "1h" => Some(60 * 60_000),
        "4h" => Some(4 * 60 * 60_000),
        "1d" => Some(24 * 60 * 60_000),
        _ => None,
    }
}

pub struct HyperliquidClient {
    http: reqwest::Client,
    base_url: String,
    testnet: bool,
    /// Read identity — owns the funds.
    master_account: String,
    /// Write identity — signs exchange actions.
    signer: PrivateKeySigner,
    /// Universe cache; refreshed on demand when a symbol is missing.
    meta: RwLock<Meta>,
}

impl HyperliquidClient {
    // -------------------------------------------------------------------------
    // Construction
    // -------------------------------------------------------------------------

    /// Build the client and prime the universe cache.
    ///
    /// The meta fetch runs under the standard backoff regime; a cold client
    /// being throttled on its very first call is a known venue behavior.
    pub async fn connect(settings: &Settings) -> Result<Self, VenueError> {
        let base_url = if settings.testnet {
            TESTNET_API_URL
        } else {
            MAINNET_API_URL
        };

        let signer: PrivateKeySigner = settings
            .private_key
            .trim_start_matches("0x")
            .parse()
            .map_err(|e| VenueError::Signing(format!("invalid PRIVATE_KEY: {e}")))?;

        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| VenueError::Transport(e.to_string()))?;

        let client = Self {
            http,
            base_url: base_url.to_string(),
            testnet: settings.testnet,
            master_account: settings.master_account_address.clone(),
            signer,
            meta: RwLock::new(Meta { universe: vec![] }),
        };

        let meta = client.fetch_meta().await?;
        info!(
            assets = meta.universe.len(),
            base_url,
            testnet = settings.testnet,
            "hyperliquid client connected"
        );
        *client.meta.write() = meta;

        Ok(client)
    }

    // -------------------------------------------------------------------------
    // Raw request plumbing
    // -------------------------------------------------------------------------

    async fn post_json(&self, path: &str, body: &Value) -> Result<Value, VenueError> {
        let url = format!("{}{path}", self.base_url);
        let resp = self.http.post(&url).json(body).send().await?;

        let status = resp.status();
        if status.as_u16() == 429 {
            return Err(VenueError::RateLimited);
        }

        let text = resp.text().await?;
        if !status.is_success() {
            return Err(VenueError::Api {
                status: status.as_u16(),
                body: text,
            });
        }

        serde_json::from_str(&text).map_err(|e| VenueError::Parse(e.to_string()))
    }

    /// POST /info with transparent rate-limit backoff.
    async fn info_request(&self, body: Value) -> Result<Value, VenueError> {
        let op = body
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("info")
            .to_string();
        with_backoff(&op, || self.post_json("/info", &body)).await
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    async fn fetch_meta(&self) -> Result<Meta, VenueError> {
        let raw = self.info_request(json!({"type": "meta"})).await?;
        serde_json::from_value(raw).map_err(|e| VenueError::Parse(e.to_string()))
    }

    /// Universe plus per-asset market context, index-aligned.
    #[instrument(skip(self), name = "hl::meta_and_asset_ctxs")]
    pub async fn meta_and_asset_ctxs(&self) -> Result<(Meta, Vec<AssetContext>), VenueError> {
        let raw = self.info_request(json!({"type": "metaAndAssetCtxs"})).await?;
        let pair = raw
            .as_array()
            .ok_or_else(|| VenueError::Parse("metaAndAssetCtxs is not a pair".into()))?;
        if pair.len() < 2 {
            return Err(VenueError::Parse("metaAndAssetCtxs missing context arm".into()));
        }

        let meta: Meta = serde_json::from_value(pair[0].clone())
            .map_err(|e| VenueError::Parse(e.to_string()))?;
        let ctxs: Vec<AssetContext> = serde_json::from_value(pair[1].clone())
            .map_err(|e| VenueError::Parse(e.to_string()))?;

        *self.meta.write() = meta.clone();
        Ok((meta, ctxs))
    }

    /// Mid prices for every listed symbol.
    #[instrument(skip(self), name = "hl::all_mids")]
    pub async fn all_mids(&self) -> Result<HashMap<String, f64>, VenueError> {
        let raw = self.info_request(json!({"type": "allMids"})).await?;
        let map = raw
            .as_object()
            .ok_or_else(|| VenueError::Parse("allMids is not an object".into()))?;

        let mut mids = HashMap::with_capacity(map.len());
        for (symbol, px) in map {
            if let Some(px) = px.as_str().and_then(|s| s.parse::<f64>().ok()) {
                mids.insert(symbol.clone(), px);
            }
        }
        Ok(mids)
    }

    /// Mid prices for a specific symbol set; missing symbols are omitted.
    pub async fn current_prices(
        &self,
        symbols: &[String],
    ) -> Result<HashMap<String, f64>, VenueError> {
        let mids = self.all_mids().await?;
        Ok(symbols
            .iter()
            .filter_map(|s| mids.get(s).map(|&px| (s.clone(), px)))
            .collect())
    }

    /// OHLCV candles, oldest first. `limit` bounds the time window.
    #[instrument(skip(self), name = "hl::candles")]
    pub async fn candles(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, VenueError> {
        let step = interval_to_ms(interval)
            .ok_or_else(|| VenueError::Parse(format!("unsupported interval {interval}")))?;
        let end = chrono::Utc::now().timestamp_millis();
        let start = end - step * limit as i64;

        let raw = self
            .info_request(json!({
                "type": "candleSnapshot",
                "req": {
                    "coin": symbol,
                    "interval": interval,
                    "startTime": start,
                    "endTime": end,
                }
            }))
            .await?;

        let rows: Vec<RawCandle> =
            serde_json::from_value(raw).map_err(|e| VenueError::Parse(e.to_string()))?;
        let mut candles: Vec<Candle> = rows.into_iter().map(Into::into).collect();
        candles.sort_by_key(|c| c.open_time);

        debug!(symbol, interval, count = candles.len(), "candles fetched");
        Ok(candles)
    }

    /// L2 order-book snapshot.
    #[instrument(skip(self), name = "hl::l2_snapshot")]
    pub async fn l2_snapshot(&self, symbol: &str) -> Result<OrderBook, VenueError> {
        let raw = self
            .info_request(json!({"type": "l2Book", "coin": symbol}))
            .await?;
        serde_json::from_value(raw).map_err(|e| VenueError::Parse(e.to_string()))
    }

    /// Raw clearinghouse state for the master account.
    #[instrument(skip(self), name = "hl::user_state")]
    pub async fn user_state(&self) -> Result<Value, VenueError> {
        self.info_request(json!({
            "type": "clearinghouseState",
            "user": self.master_account,
        }))
        .await
    }

    /// Raw spot balances for the master account.
    #[instrument(skip(self), name = "hl::spot_user_state")]
    pub async fn spot_user_state(&self) -> Result<Value, VenueError> {
        self.info_request(json!({
            "type": "spotClearinghouseState",
            "user": self.master_account,
        }))
        .await
    }

    /// Recent fills for the master account, venue order (newest first).
    #[instrument(skip(self), name = "hl::user_fills")]
    pub async fn user_fills(&self) -> Result<Vec<Fill>, VenueError> {
        let raw = self
            .info_request(json!({
                "type": "userFills",
                "user": self.master_account,
            }))
            .await?;
        serde_json::from_value(raw).map_err(|e| VenueError::Parse(e.to_string()))
    }

    // -------------------------------------------------------------------------
    // Derived account view
    // -------------------------------------------------------------------------

    /// Balance and open positions with the full fallback chain applied:
    /// cross equity → perps + spot → withdrawable. The chain is applied here
    /// and nowhere else so every consumer sees the same number.
    #[instrument(skip(self), name = "hl::account_status")]
    pub async fn account_status(&self) -> Result<AccountStatus, VenueError> {
        let state = self.user_state().await?;

        let perps_balance = num_at(&state, &["marginSummary", "accountValue"]);
        let mut total_equity = num_at(&state, &["crossMarginSummary", "accountValue"]);

        // Spot balances are additive context; a failure here must not sink
        // the whole account read.
        let spot_balance = match self.spot_user_state().await {
            Ok(spot) => spot
                .get("balances")
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter(|b| {
                            matches!(
                                b.get("coin").and_then(Value::as_str),
                                Some("USDC") | Some("USD")
                            )
                        })
                        .map(|b| num_in(b, "total"))
                        .sum()
                })
                .unwrap_or(0.0),
            Err(e) => {
                debug!(error = %e, "spot state unavailable — continuing without it");
                0.0
            }
        };

        if total_equity == 0.0 {
            total_equity = perps_balance + spot_balance;
        }
        let withdrawable = num_in(&state, "withdrawable");
        if total_equity == 0.0 && withdrawable > 0.0 {
            info!(withdrawable, "using withdrawable as balance fallback");
            total_equity = withdrawable;
        }

        if total_equity == 0.0 {
            warn!(
                master_account = %self.master_account,
                base_url = %self.base_url,
                "account balance reads zero — check MASTER_ACCOUNT_ADDRESS and funding"
            );
        }

        let mids = self.all_mids().await.unwrap_or_default();
        let mut positions = Vec::new();

        if let Some(asset_positions) = state.get("assetPositions").and_then(Value::as_array) {
            for entry in asset_positions {
                let pos = entry.get("position").unwrap_or(entry);
                let coin = pos.get("coin").and_then(Value::as_str).unwrap_or_default();
                if coin.is_empty() {
                    continue;
                }

                let szi = num_in(pos, "szi");
                if szi == 0.0 {
                    continue;
                }

                let entry_px = num_in(pos, "entryPx");
                let mark = mids.get(coin).copied().unwrap_or(entry_px);
                let pnl = (mark - entry_px) * szi;

                let lev_value = pos
                    .get("leverage")
                    .and_then(|l| l.get("value"))
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| "?".into());
                let lev_type = pos
                    .get("leverage")
                    .and_then(|l| l.get("type"))
                    .and_then(Value::as_str)
                    .unwrap_or("unknown");

                positions.push(VenuePosition {
                    symbol: coin.to_string(),
                    side: if szi > 0.0 { "long" } else { "short" }.to_string(),
                    size: szi.abs(),
                    entry_price: entry_px,
                    mark_price: mark,
                    pnl_usd: (pnl * 10_000.0).round() / 10_000.0,
                    leverage: format!("{lev_value}x ({lev_type})"),
                });
            }
        }

        Ok(AccountStatus {
            balance_usd: total_equity,
            perps_balance_usd: perps_balance,
            spot_balance_usd: spot_balance,
            open_positions: positions,
        })
    }

    // -------------------------------------------------------------------------
    // Size rounding
    // -------------------------------------------------------------------------

    /// Floor `raw_size` to the symbol's size decimals and clamp to its
    /// minimum order size. Returns the rounded size and its wire string.
    pub fn round_order_size(&self, symbol: &str, raw_size: f64) -> Result<(f64, String), VenueError> {
        let meta = self.meta.read();
        let asset = meta
            .asset(symbol)
            .ok_or_else(|| VenueError::UnknownSymbol(symbol.to_string()))?;

        let mut size = round_size_down(raw_size, asset.sz_decimals);
        let min_size = asset.min_size();
        if size < min_size {
            warn!(
                symbol,
                raw_size,
                rounded = size,
                min_size,
                "size below venue minimum — clamping up"
            );
            size = min_size;
        }
        let wire = format_size(size, asset.sz_decimals);
        Ok((size, wire))
    }

    // -------------------------------------------------------------------------
    // Writes (signed, never retried)
    // -------------------------------------------------------------------------

    async fn post_exchange(&self, action: ExchangeAction) -> Result<Value, VenueError> {
        let nonce = chrono::Utc::now().timestamp_millis() as u64;
        let signature = signing::sign_l1_action(&self.signer, &action, nonce, self.testnet).await?;

        let payload = json!({
            "action": serde_json::to_value(&action)
                .map_err(|e| VenueError::Signing(e.to_string()))?,
            "nonce": nonce,
            "signature": signature.to_json(),
            "vaultAddress": Value::Null,
        });

        self.post_json("/exchange", &payload).await
    }

    /// Set leverage for a symbol (cross margin by default upstream).
    #[instrument(skip(self), name = "hl::update_leverage")]
    pub async fn update_leverage(
        &self,
        symbol: &str,
        leverage: u32,
        is_cross: bool,
    ) -> Result<Value, VenueError> {
        let asset = self.asset_index(symbol)?;

        {
            let meta = self.meta.read();
            if let Some(info) = meta.asset(symbol) {
                if leverage > info.max_leverage {
                    warn!(
                        symbol,
                        requested = leverage,
                        max = info.max_leverage,
                        "requested leverage exceeds symbol maximum"
                    );
                }
            }
        }

        let result = self
            .post_exchange(ExchangeAction::UpdateLeverage(UpdateLeverage {
                asset,
                is_cross,
                leverage,
            }))
            .await?;

        debug!(symbol, leverage, is_cross, "leverage update submitted");
        Ok(result)
    }

    /// Aggressive IOC order that behaves like a market order with bounded
    /// slippage. `slippage` is a fraction (0.01 = 1 %).
    #[instrument(skip(self), name = "hl::market_open")]
    pub async fn market_open(
        &self,
        symbol: &str,
        is_buy: bool,
        size: f64,
        slippage: f64,
    ) -> Result<Value, VenueError> {
        let asset = self.asset_index(symbol)?;
        let sz_decimals = self.sz_decimals(symbol)?;

        let mids = self.all_mids().await?;
        let mid = *mids
            .get(symbol)
            .ok_or_else(|| VenueError::UnknownSymbol(symbol.to_string()))?;

        let px = if is_buy {
            mid * (1.0 + slippage)
        } else {
            mid * (1.0 - slippage)
        };

        let order = OrderRequest {
            asset,
            is_buy,
            limit_px: format_price(px, sz_decimals),
            sz: format_size(size, sz_decimals),
            reduce_only: false,
            order_type: OrderType::Limit(LimitOrder { tif: "Ioc".into() }),
        };

        info!(
            symbol,
            side = if is_buy { "BUY" } else { "SELL" },
            size,
            limit_px = %order.limit_px,
            "submitting market-style order"
        );

        self.post_exchange(ExchangeAction::Order(BulkOrder {
            orders: vec![order],
            grouping: "na".into(),
        }))
        .await
    }

    /// Close the live position on `symbol` with a reduce-only IOC order of
    /// the full observed size.
    #[instrument(skip(self), name = "hl::market_close")]
    pub async fn market_close(&self, symbol: &str) -> Result<Value, VenueError> {
        let asset = self.asset_index(symbol)?;
        let sz_decimals = self.sz_decimals(symbol)?;

        let status = self.account_status().await?;
        let Some(position) = status.open_positions.iter().find(|p| p.symbol == symbol) else {
            return Ok(json!({
                "status": "err",
                "response": format!("no open position for {symbol}"),
            }));
        };

        // Closing a long means selling; price through the book by 1 %.
        let is_buy = position.side == "short";
        let px = if is_buy {
            position.mark_price * 1.01
        } else {
            position.mark_price * 0.99
        };

        let order = OrderRequest {
            asset,
            is_buy,
            limit_px: format_price(px, sz_decimals),
            sz: format_size(position.size, sz_decimals),
            reduce_only: true,
            order_type: OrderType::Limit(LimitOrder { tif: "Ioc".into() }),
        };

        info!(
            symbol,
            side = %position.side,
            size = position.size,
            "submitting reduce-only close"
        );

        self.post_exchange(ExchangeAction::Order(BulkOrder {
            orders: vec![order],
            grouping: "na".into(),
        }))
        .await
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn asset_index(&self, symbol: &str) -> Result<u32, VenueError> {
        self.meta
            .read()
            .asset_index(symbol)
            .ok_or_else(|| VenueError::UnknownSymbol(symbol.to_string()))
    }

    fn sz_decimals(&self, symbol: &str) -> Result<u32, VenueError> {
        self.meta
            .read()
            .asset(symbol)
            .map(|a| a.sz_decimals)
            .ok_or_else(|| VenueError::UnknownSymbol(symbol.to_string()))
    }
}

impl std::fmt::Debug for HyperliquidClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HyperliquidClient")
            .field("base_url", &self.base_url)
            .field("master_account", &self.master_account)
            .field("signer", &"<redacted>")
            .finish()
    }
}

// ---------------------------------------------------------------------------
// JSON helpers
// ---------------------------------------------------------------------------

/// Numeric field that may be a string or a number; 0.0 when absent.
fn num_in(value: &Value, key: &str) -> f64 {
    match value.get(key) {
        Some(Value::String(s)) => s.parse().unwrap_or(0.0),
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// `num_in` through a key path.
fn num_at(value: &Value, path: &[&str]) -> f64 {
    let mut cursor = value;
    for key in &path[..path.len() - 1] {
        match cursor.get(key) {
            Some(next) => cursor = next,
            None => return 0.0,
        }
    }
    num_in(cursor, path[path.len() - 1])
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_mapping() {
        assert_eq!(interval_to_ms("15m"), Some(900_000));
        assert_eq!(interval_to_ms("1d"), Some(86_400_000));
        assert_eq!(interval_to_ms("3w"), None);
    }

    #[test]
    fn num_helpers_tolerate_shapes() {
        let v = json!({
            "marginSummary": {"accountValue": "123.5"},
            "withdrawable": 7.25,
        });
        assert_eq!(num_at(&v, &["marginSummary", "accountValue"]), 123.5);
        assert_eq!(num_in(&v, "withdrawable"), 7.25);
        assert_eq!(num_in(&v, "missing"), 0.0);
        assert_eq!(num_at(&v, &["nope", "nothing"]), 0.0);
    }
}
