// =============================================================================
// Meridian — Autonomous Hyperliquid Perp Trading Agent — Main Entry Point
// =============================================================================
//
// Startup order: settings → venue client (meta fetch with backoff) →
// database → subsystems → status API → reconciliation loop → scheduler.
// Config errors are fatal before anything touches the network; everything
// after that degrades instead of dying.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod analysis;
mod api;
mod app_state;
mod config;
mod engine;
mod execution;
mod feeds;
mod hyperliquid;
mod indicators;
mod llm;
mod market_data;
mod notifier;
mod persistence;
mod reconcile;
mod risk;
mod scheduler;
mod screener;
mod trend;
mod types;

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::analysis::MarketAnalyzer;
use crate::app_state::AppState;
use crate::config::Settings;
use crate::engine::TradingEngine;
use crate::execution::ExecutionEngine;
use crate::feeds::ContextFeeds;
use crate::hyperliquid::HyperliquidClient;
use crate::llm::{DecisionClient, UsageTracker};
use crate::market_data::{build_providers, MarketAggregator};
use crate::notifier::Notifier;
use crate::persistence::Database;
use crate::risk::RiskManager;
use crate::scheduler::Scheduler;
use crate::screener::CoinScreener;
use crate::trend::TrendEngine;

/// How often the fill reconciler runs.
const RECONCILE_INTERVAL: std::time::Duration = std::time::Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & logging ─────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║           Meridian Trading Agent — Starting Up           ║");
    info!("╚══════════════════════════════════════════════════════════╝");

    // Config errors are fatal: exit non-zero with a descriptive line.
    let settings = match Settings::from_env() {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "configuration invalid — refusing to start");
            std::process::exit(1);
        }
    };

    // ── 2. Venue client ──────────────────────────────────────────────────
    let venue = Arc::new(HyperliquidClient::connect(&settings).await?);

    // ── 3. Database (optional — the engine runs degraded without it) ─────
    let db = match Database::new(&settings.database_url).await {
        Ok(db) => Some(db),
        Err(e) => {
            warn!(error = %e, "database unavailable — events will not persist");
            None
        }
    };

    // ── 4. Core subsystems ───────────────────────────────────────────────
    let usage = UsageTracker::new(db.clone());
    let risk = Arc::new(RiskManager::new(settings.risk.clone()));
    let state = Arc::new(AppState::new(
        settings.clone(),
        venue.clone(),
        risk.clone(),
        db.clone(),
        usage.clone(),
    ));

    let screener = Arc::new(CoinScreener::new(venue.clone(), &settings)?);
    let analyzer = MarketAnalyzer::new(venue.clone());
    let providers = build_providers(&settings.market_data_providers);
    let aggregator = MarketAggregator::new(venue.clone(), providers);
    let feeds = ContextFeeds::new(venue.clone());
    let trend = TrendEngine::new(venue.clone(), settings.trend.clone());
    let llm = DecisionClient::new(&settings.default_ai_model, usage.clone());
    let execution = ExecutionEngine::new(venue.clone(), risk.clone());
    let notifier = Arc::new(Notifier::new(
        settings.telegram_bot_token.clone(),
        settings.telegram_chat_id.clone(),
    ));

    // ── 5. Status API server ─────────────────────────────────────────────
    let api_state = state.clone();
    let bind_addr = settings.bind_addr.clone();
    tokio::spawn(async move {
        let app = api::rest::router(api_state);
        match tokio::net::TcpListener::bind(&bind_addr).await {
            Ok(listener) => {
                info!(addr = %bind_addr, "status API listening");
                if let Err(e) = axum::serve(listener, app).await {
                    error!(error = %e, "status API server failed");
                }
            }
            Err(e) => error!(addr = %bind_addr, error = %e, "status API bind failed"),
        }
    });

    // ── 6. Reconciliation loop ───────────────────────────────────────────
    if let Some(db) = db.clone() {
        let recon_venue = venue.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(RECONCILE_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if let Err(e) = reconcile::sync_trades(&recon_venue, &db).await {
                    warn!(error = %e, "fill reconciliation failed");
                }
            }
        });
    } else {
        warn!("reconciliation loop disabled (no database)");
    }

    // ── 7. Startup notification ──────────────────────────────────────────
    match venue.account_status().await {
        Ok(status) => {
            info!(
                balance = format!("{:.2}", status.balance_usd),
                positions = status.open_positions.len(),
                "initial account state"
            );
            *state.last_snapshot.write() = Some(status.clone());
            notifier.notify_startup(settings.testnet, status.balance_usd).await;
        }
        Err(e) => warn!(error = %e, "initial account fetch failed"),
    }

    // ── 8. Trading engine & scheduler ────────────────────────────────────
    let trading_engine = Arc::new(TradingEngine::new(
        state.clone(),
        screener,
        analyzer,
        aggregator,
        feeds,
        trend,
        llm,
        execution,
        notifier,
    ));

    info!("all subsystems running — entering cycle loop");
    Scheduler::new(state, trading_engine).run().await;

    info!("Meridian shut down complete.");
    Ok(())
}
