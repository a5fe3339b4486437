// =============================================================================
// Scheduler & Supervisor — interval-driven cycles with graceful shutdown
// =============================================================================
//
// Two periodic jobs:
//   - the trading cycle, every CYCLE_INTERVAL_MINUTES, missed ticks
//     coalesced and at most one instance in flight (the engine's guard is
//     the second line of defence);
//   - a light health check every five minutes (venue ping).
//
// The first cycle runs immediately at startup. On ctrl-c / SIGTERM the
// scheduler stops issuing ticks and lets an in-flight cycle finish before
// returning (bounded by a grace period).
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::app_state::AppState;
use crate::engine::TradingEngine;

const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(5 * 60);
/// How long shutdown waits for an active cycle before abandoning it.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(120);

pub struct Scheduler {
    state: Arc<AppState>,
    engine: Arc<TradingEngine>,
}

impl Scheduler {
    pub fn new(state: Arc<AppState>, engine: Arc<TradingEngine>) -> Self {
        Self { state, engine }
    }

    /// Run until a shutdown signal arrives, then drain the active cycle.
    pub async fn run(self) {
        let interval_minutes = self.state.settings.cycle_interval_minutes.max(1);
        info!(interval_minutes, "scheduler starting");

        let (stop_tx, stop_rx) = watch::channel(false);

        // Immediate first cycle.
        info!("running first cycle immediately");
        self.engine.run_cycle().await;

        let cycle_engine = self.engine.clone();
        let mut cycle_stop = stop_rx;
        let mut cycle_task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(interval_minutes * 60));
            // Coalesce: a cycle that overruns its slot eats the missed ticks
            // instead of replaying them back-to-back.
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await; // consume the immediate tick — first cycle already ran

            loop {
                tokio::select! {
                    _ = ticker.tick() => cycle_engine.run_cycle().await,
                    _ = cycle_stop.changed() => {
                        if *cycle_stop.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("cycle loop stopped");
        });

        let health_state = self.state.clone();
        let health_task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(HEALTH_CHECK_INTERVAL);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                match health_state.venue.all_mids().await {
                    Ok(mids) => info!(symbols = mids.len(), "health check ok"),
                    Err(e) => {
                        warn!(error = %e, "health check failed");
                        health_state.push_error(format!("health check failed: {e}"));
                    }
                }
            }
        });

        Self::wait_for_shutdown().await;
        warn!("shutdown signal received — stopping scheduler");

        let _ = stop_tx.send(true);
        health_task.abort();

        // An in-flight cycle finishes its work; the watch change is only
        // observed between ticks.
        tokio::select! {
            _ = &mut cycle_task => {}
            _ = tokio::time::sleep(SHUTDOWN_GRACE) => {
                warn!("active cycle did not finish within the grace period — aborting");
                cycle_task.abort();
            }
        }

        info!("scheduler stopped");
    }

    #[cfg(unix)]
    async fn wait_for_shutdown() {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    async fn wait_for_shutdown() {
        let _ = tokio::signal::ctrl_c().await;
    }
}
