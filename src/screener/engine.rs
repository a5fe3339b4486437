// =============================================================================
// Screening engine — weekly full rebalance, daily rescore, cached fallback
// =============================================================================
//
// Failure policy: a screening pass that cannot complete falls back to the
// last cached result, however stale; with no cache at all the engine serves
// the configured static ticker list. The universe degrades, it never empties.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Duration as ChronoDuration, Timelike, Utc};
use parking_lot::RwLock;
use tracing::{info, instrument, warn};

use crate::config::Settings;
use crate::hyperliquid::types::AssetContext;
use crate::hyperliquid::HyperliquidClient;
use crate::indicators::{
    calculate_adx, calculate_atr_series, calculate_donchian, calculate_ema, calculate_sma,
};
use crate::types::closes;

use super::cache::ScreenerCache;
use super::coingecko::CoinGeckoOracle;
use super::filters::apply_filters;
use super::models::{
    CoinMetrics, HardFilterConfig, ScoringWeights, ScreeningResult, ScreeningType,
};
use super::scoring::CoinScorer;

const CACHE_KEY: &str = "last_screening";
/// A cached screening is considered fresh for a day.
const CACHE_TTL_SECS: i64 = 86_400;
/// Pause between per-symbol venue fetches during a sweep.
const SYMBOL_PACING_MS: u64 = 250;

/// Next Sunday 00:00 UTC strictly after `now` (a Sunday maps to the one
/// after it).
pub fn next_rebalance_after(now: DateTime<Utc>) -> DateTime<Utc> {
    let mut days_ahead = (6 - now.weekday().num_days_from_monday() as i64).rem_euclid(7);
    if days_ahead == 0 {
        days_ahead = 7;
    }
    (now + ChronoDuration::days(days_ahead))
        .with_hour(0)
        .and_then(|t| t.with_minute(0))
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .expect("midnight is always a valid time")
}

pub struct CoinScreener {
    venue: Arc<HyperliquidClient>,
    oracle: CoinGeckoOracle,
    cache: ScreenerCache,
    filter_config: HardFilterConfig,
    scorer: CoinScorer,
    top_n: usize,
    fallback_tickers: Vec<String>,
    last_screening: RwLock<Option<ScreeningResult>>,
}

impl CoinScreener {
    pub fn new(venue: Arc<HyperliquidClient>, settings: &Settings) -> Result<Self> {
        let weights = ScoringWeights::new().context("invalid scoring weights")?;
        Ok(Self {
            venue,
            oracle: CoinGeckoOracle::new(),
            cache: ScreenerCache::new(&settings.screening.cache_dir),
            filter_config: HardFilterConfig::default(),
            scorer: CoinScorer::new(weights),
            top_n: settings.screening.top_n_coins,
            fallback_tickers: settings.fallback_tickers.clone(),
            last_screening: RwLock::new(None),
        })
    }

    // -------------------------------------------------------------------------
    // Universe queries (orchestrator-facing)
    // -------------------------------------------------------------------------

    /// Last known result: memory, then fresh cache, then stale cache.
    pub fn cached_result(&self) -> Option<ScreeningResult> {
        if let Some(result) = self.last_screening.read().clone() {
            return Some(result);
        }
        if let Some(result) = self
            .cache
            .get::<ScreeningResult>(CACHE_KEY, CACHE_TTL_SECS)
            .or_else(|| self.cache.get_stale::<ScreeningResult>(CACHE_KEY))
        {
            *self.last_screening.write() = Some(result.clone());
            return Some(result);
        }
        None
    }

    /// `true` when no screening exists yet or the rebalance deadline passed.
    pub fn should_rebalance(&self) -> bool {
        match self.cached_result() {
            Some(result) => Utc::now() >= result.next_rebalance,
            None => true,
        }
    }

    /// Ranked candidate symbols, or the static fallback list when no
    /// screening result is available at all.
    pub fn candidate_symbols(&self) -> Vec<String> {
        match self.cached_result() {
            Some(result) if !result.selected_coins.is_empty() => result.selected_symbols(),
            _ => {
                warn!("no screening result available — using fallback tickers");
                self.fallback_tickers.clone()
            }
        }
    }

    /// Candidates minus the symbols already held, preserving rank order.
    pub fn scout_candidates(&self, held: &[String]) -> Vec<String> {
        self.candidate_symbols()
            .into_iter()
            .filter(|s| !held.contains(s))
            .collect()
    }

    // -------------------------------------------------------------------------
    // Screening passes
    // -------------------------------------------------------------------------

    /// Full rebalance: filter and score the entire venue universe.
    #[instrument(skip(self), name = "screener::full")]
    pub async fn run_full_screening(&self) -> Result<ScreeningResult> {
        info!("starting full coin screening");

        let (meta, ctxs) = self
            .venue
            .meta_and_asset_ctxs()
            .await
            .context("failed to fetch venue universe")?;

        let symbols: Vec<String> = meta.universe.iter().map(|a| a.name.clone()).collect();
        let ctx_by_symbol: HashMap<String, AssetContext> = symbols
            .iter()
            .cloned()
            .zip(ctxs.into_iter())
            .collect();

        let mut metrics = self.collect_metrics(&symbols, &ctx_by_symbol).await;
        if metrics.is_empty() {
            anyhow::bail!("no metrics collected for any symbol");
        }

        self.merge_oracle_data(&mut metrics).await;

        let (passing, excluded) = apply_filters(metrics.clone(), &self.filter_config);
        info!(
            passed = passing.len(),
            excluded = excluded.len(),
            "hard filters applied"
        );
        if passing.is_empty() {
            anyhow::bail!("no coins passed hard filters");
        }

        let (btc_price, btc_price_7d) = btc_reference(&metrics);
        let scored = self.scorer.score_coins(&passing, btc_price, btc_price_7d);

        let now = Utc::now();
        let result = ScreeningResult {
            selected_coins: scored.into_iter().take(self.top_n).collect(),
            excluded_coins: excluded,
            screening_timestamp: now,
            next_rebalance: next_rebalance_after(now),
            screening_type: ScreeningType::FullRebalance,
        };

        for coin in &result.selected_coins {
            info!(
                rank = coin.rank,
                symbol = %coin.symbol,
                score = format!("{:.2}", coin.score),
                "selected"
            );
        }

        self.store_result(&result);
        Ok(result)
    }

    /// Daily update: rescore only the current selection.
    #[instrument(skip(self), name = "screener::daily")]
    pub async fn update_scores(&self) -> Result<ScreeningResult> {
        let Some(previous) = self.cached_result() else {
            info!("no previous screening — daily update promotes to full rebalance");
            return self.run_full_screening().await;
        };

        let symbols = previous.selected_symbols();
        if symbols.is_empty() {
            return self.run_full_screening().await;
        }

        let (meta, ctxs) = self
            .venue
            .meta_and_asset_ctxs()
            .await
            .context("failed to fetch venue universe")?;
        let ctx_by_symbol: HashMap<String, AssetContext> = meta
            .universe
            .iter()
            .map(|a| a.name.clone())
            .zip(ctxs.into_iter())
            .collect();

        let mut metrics = self.collect_metrics(&symbols, &ctx_by_symbol).await;
        if metrics.is_empty() {
            warn!("daily update collected no metrics — keeping previous result");
            return Ok(previous);
        }
        self.merge_oracle_data(&mut metrics).await;

        let (btc_price, btc_price_7d) = btc_reference(&metrics);
        let scored = self.scorer.score_coins(&metrics, btc_price, btc_price_7d);

        let result = ScreeningResult {
            selected_coins: scored.into_iter().take(self.top_n).collect(),
            excluded_coins: previous.excluded_coins,
            screening_timestamp: Utc::now(),
            next_rebalance: previous.next_rebalance,
            screening_type: ScreeningType::DailyUpdate,
        };

        info!(count = result.selected_coins.len(), "daily rescore complete");
        self.store_result(&result);
        Ok(result)
    }

    fn store_result(&self, result: &ScreeningResult) {
        if let Err(e) = self.cache.set(CACHE_KEY, result) {
            warn!(error = %e, "failed to cache screening result");
        }
        *self.last_screening.write() = Some(result.clone());
    }

    // -------------------------------------------------------------------------
    // Metric collection
    // -------------------------------------------------------------------------

    /// Fetch metrics for each symbol, pacing requests so a full-universe
    /// sweep does not trip the venue rate limiter more than necessary.
    async fn collect_metrics(
        &self,
        symbols: &[String],
        ctx_by_symbol: &HashMap<String, AssetContext>,
    ) -> Vec<CoinMetrics> {
        let mut out = Vec::with_capacity(symbols.len());

        for (i, symbol) in symbols.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(std::time::Duration::from_millis(SYMBOL_PACING_MS)).await;
            }

            match self.coin_metrics(symbol, ctx_by_symbol.get(symbol)).await {
                Ok(Some(metrics)) => out.push(metrics),
                Ok(None) => {}
                Err(e) => warn!(symbol = %symbol, error = %e, "metric fetch failed"),
            }
        }

        info!(collected = out.len(), requested = symbols.len(), "metrics collected");
        out
    }

    /// Build one symbol's metrics from daily candles, the order book, and
    /// the live asset context (real funding and open interest).
    async fn coin_metrics(
        &self,
        symbol: &str,
        ctx: Option<&AssetContext>,
    ) -> Result<Option<CoinMetrics>> {
        // 250 daily bars cover EMA200, the 30d lags, and the ATR SMA window.
        let candles = self.venue.candles(symbol, "1d", 250).await?;
        if candles.len() < 2 {
            return Ok(None);
        }

        let close_series = closes(&candles);
        let last_close = *close_series.last().expect("candles non-empty");

        let price = ctx
            .and_then(|c| c.mark_px.or(c.mid_px))
            .unwrap_or(last_close);

        // Spread from the top of the book; the max-allowed default on any
        // failure keeps the coin borderline instead of artificially clean.
        let spread_pct = match self.venue.l2_snapshot(symbol).await {
            Ok(book) => {
                let best_bid = book.bids().first().map(|l| l.px).unwrap_or(0.0);
                let best_ask = book.asks().first().map(|l| l.px).unwrap_or(0.0);
                if best_bid > 0.0 && best_ask > 0.0 {
                    (best_ask - best_bid) / best_bid * 100.0
                } else {
                    0.5
                }
            }
            Err(_) => 0.5,
        };

        let lagged_close = |days: usize| {
            (candles.len() > days)
                .then(|| close_series[close_series.len() - 1 - days])
                .filter(|p| *p > 0.0)
        };
        let avg_volume_usd = |days: usize| {
            (candles.len() >= days).then(|| {
                let window = &candles[candles.len() - days..];
                window.iter().map(|c| c.volume).sum::<f64>() / days as f64 * price
            })
        };

        let atr_series = calculate_atr_series(&candles, 14);
        let atr_14 = atr_series.last().copied();
        let atr_sma_20 = calculate_sma(&atr_series, 20);

        let di = calculate_adx(&candles, 14);
        let donchian = calculate_donchian(&candles, 20);

        let ema_at = |period: usize| calculate_ema(&close_series, period).last().copied();

        let funding_rate = ctx.and_then(|c| c.funding).unwrap_or(0.0);
        let open_interest_usd = ctx
            .and_then(|c| c.open_interest)
            .map(|oi| oi * price)
            .unwrap_or(0.0);
        let volume_24h_usd = ctx
            .and_then(|c| c.day_ntl_vlm)
            .unwrap_or_else(|| candles.last().map(|c| c.volume * price).unwrap_or(0.0));

        Ok(Some(CoinMetrics {
            symbol: symbol.to_string(),
            price,
            volume_24h_usd,
            market_cap_usd: 0.0, // filled by the oracle merge
            open_interest_usd,
            funding_rate,
            spread_pct,
            days_listed: candles.len() as u32,
            price_7d_ago: lagged_close(7),
            price_30d_ago: lagged_close(30),
            volume_7d_avg: avg_volume_usd(7),
            volume_30d_avg: avg_volume_usd(30),
            oi_7d_ago: None,
            atr_14,
            atr_sma_20,
            adx_14: di.map(|d| d.adx),
            plus_di: di.map(|d| d.plus_di),
            minus_di: di.map(|d| d.minus_di),
            ema_20: ema_at(20),
            ema_50: ema_at(50),
            ema_200: ema_at(200),
            donchian_upper_20: donchian.map(|d| d.upper),
            donchian_lower_20: donchian.map(|d| d.lower),
            donchian_position: donchian.map(|d| d.position),
            is_stablecoin: self.filter_config.is_stablecoin(symbol),
        }))
    }

    /// Merge market caps (and better volume numbers) from CoinGecko.
    async fn merge_oracle_data(&self, metrics: &mut [CoinMetrics]) {
        let symbols: Vec<String> = metrics.iter().map(|m| m.symbol.clone()).collect();
        match self.oracle.market_data(&symbols).await {
            Ok(oracle_data) => {
                for m in metrics.iter_mut() {
                    if let Some(data) = oracle_data.get(&m.symbol) {
                        m.market_cap_usd = data.market_cap_usd;
                        if data.volume_24h_usd > 0.0 {
                            m.volume_24h_usd = data.volume_24h_usd;
                        }
                    }
                }
            }
            Err(e) => warn!(error = %e, "coingecko merge failed — market caps stay zero"),
        }
    }
}

fn btc_reference(metrics: &[CoinMetrics]) -> (Option<f64>, Option<f64>) {
    metrics
        .iter()
        .find(|m| m.symbol == "BTC")
        .map(|btc| (Some(btc.price), btc.price_7d_ago))
        .unwrap_or((None, None))
}
