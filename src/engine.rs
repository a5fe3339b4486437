// =============================================================================
// Trading Orchestrator — the per-cycle state machine
// =============================================================================
//
// One cycle: SelectUniverse → FetchContext → AccountSync → RiskSweep →
// Manage → Scout, with every LLM decision persisted as a bot operation.
// Phase ordering is strict; each phase sits in its own recovery boundary so
// a single failure ends this cycle without poisoning the next. The only lock
// held across await points is never the risk manager's (its calls are short
// and synchronous).
// =============================================================================

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::{Context as AnyhowContext, Result};
use chrono::Utc;
use tracing::{error, info, warn};

use crate::analysis::{MarketAnalyzer, TickerAnalysis};
use crate::app_state::AppState;
use crate::execution::{ExecutionEngine, ExecutionResult};
use crate::feeds::{ContextFeeds, FeedContext};
use crate::hyperliquid::AccountStatus;
use crate::llm::client::CallContext;
use crate::llm::{Decision, DecisionClient};
use crate::market_data::MarketAggregator;
use crate::persistence::records::{BotOperationRow, TradeOpenRow};
use crate::screener::{CoinMetrics, CoinScreener};
use crate::trend::{EntryQuality, TrendEngine};
use crate::types::ExitReason;

/// Everything gathered for one cycle's prompts.
struct CycleContext {
    indicators_text: String,
    payloads: Vec<TickerAnalysis>,
    feeds: FeedContext,
    cross_venue_text: String,
}

impl CycleContext {
    /// Indicator blocks restricted to `symbols`.
    fn indicators_for(&self, symbols: &[String]) -> String {
        self.payloads
            .iter()
            .filter(|p| symbols.contains(&p.ticker))
            .map(|p| p.format_prompt())
            .collect()
    }

    /// Price carried by the indicator payload, if the symbol was analyzed.
    fn price_of(&self, symbol: &str) -> Option<f64> {
        self.payloads
            .iter()
            .find(|p| p.ticker == symbol)
            .map(|p| p.last_price())
            .filter(|px| *px > 0.0)
    }
}

/// Releases the in-flight flag even when a phase panics through unwind.
struct CycleGuard<'a>(&'a std::sync::atomic::AtomicBool);

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct TradingEngine {
    state: Arc<AppState>,
    screener: Arc<CoinScreener>,
    analyzer: MarketAnalyzer,
    aggregator: MarketAggregator,
    feeds: ContextFeeds,
    trend: TrendEngine,
    llm: DecisionClient,
    execution: ExecutionEngine,
    notifier: Arc<crate::notifier::Notifier>,
}

impl TradingEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        state: Arc<AppState>,
        screener: Arc<CoinScreener>,
        analyzer: MarketAnalyzer,
        aggregator: MarketAggregator,
        feeds: ContextFeeds,
        trend: TrendEngine,
        llm: DecisionClient,
        execution: ExecutionEngine,
        notifier: Arc<crate::notifier::Notifier>,
    ) -> Self {
        Self {
            state,
            screener,
            analyzer,
            aggregator,
            feeds,
            trend,
            llm,
            execution,
            notifier,
        }
    }

    // -------------------------------------------------------------------------
    // Cycle entry point
    // -------------------------------------------------------------------------

    /// Run one trading cycle. Never more than one runs at a time; a cycle
    /// arriving while another is in flight is dropped (coalesced).
    pub async fn run_cycle(&self) {
        if self
            .state
            .cycle_in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("cycle already in flight — skipping this tick");
            return;
        }
        let _guard = CycleGuard(&self.state.cycle_in_flight);

        let number = self.state.cycle_count.fetch_add(1, Ordering::SeqCst) + 1;
        let cycle_id = format!("cycle-{}", Utc::now().format("%Y%m%dT%H%M%S%.3fZ"));
        *self.state.last_cycle_at.write() = Some(Utc::now().to_rfc3339());

        info!(number, cycle_id = %cycle_id, "── trading cycle started ──");
        let started = std::time::Instant::now();

        match self.cycle_inner(&cycle_id).await {
            Ok(()) => {
                *self.state.last_cycle_error.write() = None;
                info!(
                    number,
                    elapsed_s = started.elapsed().as_secs(),
                    "── trading cycle completed ──"
                );
            }
            Err(e) => {
                let message = format!("cycle {number} failed: {e:#}");
                error!(number, error = %message, "── trading cycle aborted ──");
                self.state.push_error(message.clone());
                *self.state.last_cycle_error.write() = Some(message);
            }
        }
    }

    async fn cycle_inner(&self, cycle_id: &str) -> Result<()> {
        // ── 1. SelectUniverse ───────────────────────────────────────────
        let (manage, scout) = self.select_universe().await;
        if manage.is_empty() && scout.is_empty() {
            info!("universe empty — nothing to do this cycle");
            return Ok(());
        }
        info!(manage = ?manage, scout = ?scout, "universe selected");

        // ── 2. FetchContext ─────────────────────────────────────────────
        let union: Vec<String> = manage
            .iter()
            .chain(scout.iter())
            .cloned()
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .collect();
        let context = self.fetch_context(&union).await;

        // ── 3. AccountSync ──────────────────────────────────────────────
        let account = self.account_sync().await.context("account sync failed")?;

        // ── 4. RiskSweep ────────────────────────────────────────────────
        self.risk_sweep(&context).await;

        // ── 5. Manage ───────────────────────────────────────────────────
        if !manage.is_empty() {
            self.manage_phase(&manage, &context, &account, cycle_id).await;
        }

        // ── 6. Scout ────────────────────────────────────────────────────
        if !scout.is_empty() {
            self.scout_phase(&scout, &context, &account, cycle_id).await;
        }

        Ok(())
    }

    // -------------------------------------------------------------------------
    // Phase 1 — universe selection
    // -------------------------------------------------------------------------

    async fn select_universe(&self) -> (Vec<String>, Vec<String>) {
        let held = self.state.risk.tracked_symbols();

        if self.state.settings.screening.enabled {
            self.refresh_screening().await;
        }

        let candidates = self.screener.scout_candidates(&held);
        let scout = self
            .state
            .next_scout_batch(&candidates, self.state.settings.screening.analysis_batch_size);

        (held, scout)
    }

    /// Weekly full rebalance when due, daily rescore otherwise. Failures are
    /// swallowed: the screener serves its cache and the cycle proceeds.
    async fn refresh_screening(&self) {
        let result = if self.screener.should_rebalance() {
            self.screener.run_full_screening().await
        } else {
            let stale = self
                .screener
                .cached_result()
                .map(|r| (Utc::now() - r.screening_timestamp).num_hours() >= 24)
                .unwrap_or(true);
            if !stale {
                return;
            }
            self.screener.update_scores().await
        };

        match result {
            Ok(screening) => {
                if let Some(db) = &self.state.db {
                    if let Err(e) = db.insert_screening(&screening).await {
                        warn!(error = %e, "screening persist failed");
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "screening refresh failed — serving cached universe");
                self.state.push_error(format!("screening refresh failed: {e:#}"));
            }
        }
    }

    // -------------------------------------------------------------------------
    // Phase 2 — context gathering
    // -------------------------------------------------------------------------

    /// Best-effort: whatever fails here degrades the prompt, never the cycle.
    async fn fetch_context(&self, symbols: &[String]) -> CycleContext {
        let (analysis, feeds) = tokio::join!(
            self.analyzer.analyze_many(symbols),
            self.feeds.gather(symbols),
        );
        let (indicators_text, payloads) = analysis;

        // Cross-venue snapshots, one compact line per symbol.
        let mut cross_venue_text = String::new();
        for symbol in symbols {
            let snapshot = self.aggregator.fetch_market_snapshot(symbol).await;
            match &snapshot.global_market {
                Some(agg) => {
                    cross_venue_text.push_str(&format!(
                        "{symbol}: avg ${:.4} over {} venues, spread {:.2}%, funding {:.5}%, HL {}\n",
                        agg.average_price,
                        agg.sources_count,
                        agg.price_spread_pct,
                        agg.average_funding_rate * 100.0,
                        match agg.hyperliquid_deviation_pct {
                            Some(d) => format!("{d:+.3}% vs mean"),
                            None => "n/a".to_string(),
                        }
                    ));
                }
                None => cross_venue_text.push_str(&format!("{symbol}: insufficient cross-venue data\n")),
            }
        }

        CycleContext {
            indicators_text,
            payloads,
            feeds,
            cross_venue_text,
        }
    }

    // -------------------------------------------------------------------------
    // Phase 3 — account sync
    // -------------------------------------------------------------------------

    async fn account_sync(&self) -> Result<AccountStatus> {
        let status = self.state.venue.account_status().await?;

        if let Some(db) = &self.state.db {
            if let Err(e) = db.insert_account_snapshot(&status).await {
                warn!(error = %e, "account snapshot persist failed");
            }
        }

        // Ghost trades: symbols tracked internally that no longer exist on
        // the venue (closed manually, liquidated, or lost to a crash).
        let live: Vec<&str> = status
            .open_positions
            .iter()
            .map(|p| p.symbol.as_str())
            .collect();
        let ghosts: Vec<String> = self
            .state
            .active_trades
            .read()
            .keys()
            .filter(|s| !live.contains(&s.as_str()))
            .cloned()
            .collect();
        for symbol in ghosts {
            warn!(symbol = %symbol, "ghost trade — tracked internally but not on venue");
            self.state.active_trades.write().remove(&symbol);
            self.state.risk.remove_position(&symbol);
        }

        info!(
            balance = format!("{:.2}", status.balance_usd),
            positions = status.open_positions.len(),
            "account synced"
        );
        *self.state.last_snapshot.write() = Some(status.clone());
        Ok(status)
    }

    // -------------------------------------------------------------------------
    // Phase 4 — SL/TP sweep
    // -------------------------------------------------------------------------

    async fn risk_sweep(&self, context: &CycleContext) {
        let tracked = self.state.risk.tracked_symbols();
        if tracked.is_empty() {
            return;
        }

        // Prefer prices already fetched for the prompt; fill the gaps with
        // one mids call.
        let mut prices: HashMap<String, f64> = tracked
            .iter()
            .filter_map(|s| context.price_of(s).map(|px| (s.clone(), px)))
            .collect();
        let missing: Vec<String> = tracked
            .iter()
            .filter(|s| !prices.contains_key(*s))
            .cloned()
            .collect();
        if !missing.is_empty() {
            match self.state.venue.current_prices(&missing).await {
                Ok(more) => prices.extend(more),
                Err(e) => warn!(error = %e, "price fill for risk sweep failed"),
            }
        }

        for event in self.state.risk.check_positions(&prices) {
            info!(
                symbol = %event.symbol,
                reason = %event.reason,
                pnl = format!("{:.2}", event.pnl_usd),
                "executing triggered exit"
            );

            let result = self.execution.close_position(&event.symbol).await;
            match &result {
                ExecutionResult::Closed { .. } | ExecutionResult::Skipped { .. } => {
                    self.state.risk.record_trade_result(event.pnl_usd);
                    let pnl_pct = if event.entry_price > 0.0 {
                        event.direction.sign() * (event.exit_price - event.entry_price)
                            / event.entry_price
                            * 100.0
                    } else {
                        0.0
                    };
                    self.settle_trade_row(
                        &event.symbol,
                        event.exit_price,
                        event.reason,
                        event.pnl_usd,
                        pnl_pct,
                    )
                    .await;
                    self.notifier
                        .notify_trade_closed(
                            &event.symbol,
                            &event.reason.to_string(),
                            event.pnl_usd,
                        )
                        .await;

                    let risk_status = self.state.risk.status();
                    if risk_status.circuit_breaker_active {
                        self.notifier
                            .notify_circuit_breaker(risk_status.daily_pnl)
                            .await;
                    }
                }
                other => {
                    let message = format!("exit execution failed for {}: {other}", event.symbol);
                    warn!("{message}");
                    self.state.push_error(message);
                }
            }
        }
    }

    /// Close the executed_trades row tied to a symbol, if this process
    /// opened it. The caller computes pnl_pct (the position is already gone
    /// from the risk registry by the time this runs).
    async fn settle_trade_row(
        &self,
        symbol: &str,
        exit_price: f64,
        reason: ExitReason,
        pnl_usd: f64,
        pnl_pct: f64,
    ) {
        let trade_id = self.state.active_trades.write().remove(symbol);
        let (Some(db), Some(trade_id)) = (&self.state.db, trade_id) else {
            return;
        };

        if let Err(e) = db
            .close_trade(trade_id, exit_price, reason, pnl_usd, pnl_pct, Utc::now(), 0.0)
            .await
        {
            warn!(symbol, trade_id, error = %e, "trade row close failed");
        }
    }

    // -------------------------------------------------------------------------
    // Phase 5 — manage held positions
    // -------------------------------------------------------------------------

    async fn manage_phase(
        &self,
        held: &[String],
        context: &CycleContext,
        account: &AccountStatus,
        cycle_id: &str,
    ) {
        let instruction = "You are managing EXISTING positions. For the positions listed, decide \
                           whether to CLOSE or HOLD each one. Do NOT open new positions.";
        let prompt = self.build_prompt(held, context, account, "held positions under management");

        let decision = self
            .llm
            .decide(
                instruction,
                &prompt,
                &CallContext {
                    purpose: "manage_decision".into(),
                    ticker: held.first().cloned(),
                    cycle_id: Some(cycle_id.to_string()),
                },
            )
            .await;

        let result = match &decision {
            Decision::Close { symbol, .. } if held.contains(symbol) => {
                // Capture the tracked position before the close wipes it.
                let tracked = self.state.risk.position(symbol);
                let exit_price = context.price_of(symbol).unwrap_or(0.0);
                let (pnl, pnl_pct) = match &tracked {
                    Some(p) if exit_price > 0.0 && p.entry_price > 0.0 => (
                        p.unrealized_pnl(exit_price),
                        p.direction.sign() * (exit_price - p.entry_price) / p.entry_price * 100.0,
                    ),
                    _ => (0.0, 0.0),
                };

                let result = self.execution.close_position(symbol).await;
                if let ExecutionResult::Closed { .. } = &result {
                    self.state.risk.record_trade_result(pnl);
                    self.settle_trade_row(symbol, exit_price, ExitReason::Signal, pnl, pnl_pct)
                        .await;
                    self.notifier.notify_trade_closed(symbol, "signal", pnl).await;
                }
                result
            }
            Decision::Close { symbol, .. } => ExecutionResult::Blocked {
                reason: format!("{symbol} is not a held position"),
            },
            Decision::Open { .. } => ExecutionResult::Blocked {
                reason: "open decisions are not allowed in the manage phase".into(),
            },
            Decision::Hold { .. } => ExecutionResult::Hold,
        };

        info!(phase = "manage", decision = decision.operation_name(), result = %result, "manage phase done");
        self.persist_operation(cycle_id, instruction, &decision, &result, context).await;
    }

    // -------------------------------------------------------------------------
    // Phase 6 — scout for new entries
    // -------------------------------------------------------------------------

    async fn scout_phase(
        &self,
        scout: &[String],
        context: &CycleContext,
        account: &AccountStatus,
        cycle_id: &str,
    ) {
        let instruction = "You are scouting for NEW opportunities among the candidate symbols. \
                           Decide whether to OPEN one position (or hold). Ignore any positions \
                           you may already hold; do NOT close anything.";
        let prompt = self.build_prompt(scout, context, account, "scout candidates");

        let decision = self
            .llm
            .decide(
                instruction,
                &prompt,
                &CallContext {
                    purpose: "scout_decision".into(),
                    ticker: scout.first().cloned(),
                    cycle_id: Some(cycle_id.to_string()),
                },
            )
            .await;

        let result = match &decision {
            Decision::Open { order, confidence, .. } if scout.contains(&order.symbol) => {
                if *confidence < self.state.settings.min_confidence {
                    ExecutionResult::Blocked {
                        reason: format!(
                            "confidence {confidence:.2} below gate {:.2}",
                            self.state.settings.min_confidence
                        ),
                    }
                } else if let Some(reason) = self.trend_gate(order).await {
                    ExecutionResult::Blocked { reason }
                } else {
                    let result = self
                        .execution
                        .execute_decision(&decision, account.balance_usd)
                        .await;

                    if let ExecutionResult::Executed { position, sizing, .. } = &result {
                        self.record_opened_trade(position, sizing.size_usd, cycle_id).await;
                        self.notifier
                            .notify_trade_opened(
                                &position.symbol,
                                &position.direction.to_string(),
                                sizing.size_usd,
                                position.leverage,
                            )
                            .await;
                    }
                    result
                }
            }
            Decision::Open { order, .. } => ExecutionResult::Blocked {
                reason: format!("{} is not in this cycle's scout batch", order.symbol),
            },
            Decision::Close { .. } => ExecutionResult::Blocked {
                reason: "close decisions are not allowed in the scout phase".into(),
            },
            Decision::Hold { .. } => ExecutionResult::Hold,
        };

        info!(phase = "scout", decision = decision.operation_name(), result = %result, "scout phase done");
        self.persist_operation(cycle_id, instruction, &decision, &result, context).await;
    }

    /// Trend-confirmation gate for an open order. `None` means pass;
    /// `Some(reason)` blocks. Scalping mode bypasses the gate entirely.
    async fn trend_gate(&self, order: &crate::llm::OpenOrder) -> Option<String> {
        let trend_settings = &self.state.settings.trend;
        if !trend_settings.enabled || trend_settings.allow_scalping {
            return None;
        }

        // Reuse the screener's daily indicators when the symbol was scored.
        let daily_metrics: Option<CoinMetrics> = self
            .screener
            .cached_result()
            .and_then(|r| {
                r.selected_coins
                    .iter()
                    .find(|c| c.symbol == order.symbol)
                    .map(|c| c.metrics.clone())
            });

        let confirmation = self
            .trend
            .confirm_trend(&order.symbol, daily_metrics.as_ref())
            .await;

        if !confirmation.should_trade {
            return Some(format!(
                "trend confirmation blocked entry (quality {:?}, confidence {:.2})",
                confirmation.quality, confirmation.confidence
            ));
        }
        if confirmation.recommended_direction != Some(order.direction) {
            return Some(format!(
                "trend direction {:?} conflicts with requested {}",
                confirmation.recommended_direction, order.direction
            ));
        }
        if trend_settings.skip_poor_entry && confirmation.entry_quality == EntryQuality::Wait {
            return Some("entry timing is poor (wait)".to_string());
        }

        None
    }

    /// Persist the executed_trades open row and track it for settlement.
    async fn record_opened_trade(
        &self,
        position: &crate::risk::Position,
        size_usd: f64,
        cycle_id: &str,
    ) {
        let Some(db) = &self.state.db else {
            return;
        };

        let row = TradeOpenRow {
            bot_operation_id: None,
            symbol: position.symbol.clone(),
            direction: position.direction.to_string(),
            entry_price: position.entry_price,
            size: position.size,
            size_usd,
            leverage: position.leverage as i64,
            stop_loss_price: Some(position.stop_loss_price),
            take_profit_price: Some(position.take_profit_price),
            hl_order_id: None,
            created_at: position.opened_at,
            fees_usd: 0.0,
        };

        match db.insert_open_trade(&row).await {
            Ok(trade_id) => {
                self.state
                    .active_trades
                    .write()
                    .insert(position.symbol.clone(), trade_id);
            }
            Err(e) => warn!(
                symbol = %position.symbol,
                cycle_id,
                error = %e,
                "open trade persist failed"
            ),
        }
    }

    // -------------------------------------------------------------------------
    // Prompt building & operation persistence
    // -------------------------------------------------------------------------

    fn build_prompt(
        &self,
        symbols: &[String],
        context: &CycleContext,
        account: &AccountStatus,
        focus: &str,
    ) -> String {
        let risk_status = self.state.risk.status();

        let mut positions_block = String::new();
        if account.open_positions.is_empty() {
            positions_block.push_str("none\n");
        } else {
            for p in &account.open_positions {
                positions_block.push_str(&format!(
                    "- {} {} size {} @ {} (mark {}, PnL ${:.2}, {})\n",
                    p.symbol, p.side, p.size, p.entry_price, p.mark_price, p.pnl_usd, p.leverage
                ));
            }
        }

        format!(
            "## Portfolio\n\
             Balance: ${:.2} (perps ${:.2}, spot ${:.2})\n\
             Open positions:\n{positions_block}\n\
             ## Risk status\n\
             Daily PnL: ${:.2} | Consecutive losses: {} | Circuit breaker: {}\n\n\
             ## Symbols in scope ({focus})\n{}\n\n\
             ## Technical analysis (Hyperliquid, 15m)\n{}\n\
             ## Cross-venue snapshot\n{}\n\
             ## News\n{}\n\n\
             ## Sentiment\n{}\n\n\
             ## Forecasts\n{}\n\
             ## Whale activity\n{}\n",
            account.balance_usd,
            account.perps_balance_usd,
            account.spot_balance_usd,
            risk_status.daily_pnl,
            risk_status.consecutive_losses,
            if risk_status.circuit_breaker_active { "ACTIVE" } else { "clear" },
            symbols.join(", "),
            context.indicators_for(symbols),
            context.cross_venue_text,
            context.feeds.news_text,
            context.feeds.sentiment_text,
            context.feeds.forecast_text,
            context.feeds.whale_text,
        )
    }

    /// Every decision becomes a bot-operation row with its full context.
    async fn persist_operation(
        &self,
        cycle_id: &str,
        system_prompt: &str,
        decision: &Decision,
        result: &ExecutionResult,
        context: &CycleContext,
    ) {
        let Some(db) = &self.state.db else {
            return;
        };

        let context_id = match db
            .insert_ai_context(
                system_prompt,
                &context.indicators_text,
                &format!("{}\n\n{}", context.feeds.news_text, context.feeds.whale_text),
                &context.feeds.sentiment_text,
                &context.feeds.forecast_text,
            )
            .await
        {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(error = %e, "ai context persist failed");
                None
            }
        };

        let (portion, leverage, direction) = match decision {
            Decision::Open { order, .. } => (
                Some(order.target_portion_of_balance),
                Some(order.leverage as i64),
                Some(order.direction.to_string()),
            ),
            _ => (None, None, None),
        };

        let row = BotOperationRow {
            cycle_id: Some(cycle_id.to_string()),
            operation: decision.operation_name().to_string(),
            symbol: decision.symbol().map(str::to_string),
            direction,
            target_portion_of_balance: portion,
            leverage,
            raw_payload: serde_json::to_string(decision).unwrap_or_default(),
            execution_result: serde_json::to_string(result).ok(),
            context_id,
        };

        if let Err(e) = db.insert_bot_operation(&row).await {
            warn!(error = %e, "bot operation persist failed");
        }
    }
}
