// =============================================================================
// Central Application State — Meridian Trading Agent
// =============================================================================
//
// The shared spine of the process. Subsystems own their internals; AppState
// ties them together and feeds the read-only status API. Thread safety:
// atomics for counters and the cycle guard, parking_lot::RwLock for small
// shared collections.
// =============================================================================

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;

use crate::config::Settings;
use crate::hyperliquid::{AccountStatus, HyperliquidClient};
use crate::llm::UsageTracker;
use crate::persistence::Database;
use crate::risk::{RiskManager, RiskStatus};

/// Maximum number of recent errors retained for the dashboard.
const MAX_RECENT_ERRORS: usize = 50;

/// A recorded error event.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub message: String,
    pub at: String,
}

pub struct AppState {
    pub settings: Settings,
    pub venue: Arc<HyperliquidClient>,
    pub risk: Arc<RiskManager>,
    pub db: Option<Database>,
    pub usage: Arc<UsageTracker>,

    // ── Cycle bookkeeping ───────────────────────────────────────────────
    /// Total cycles started since boot.
    pub cycle_count: AtomicU64,
    /// At-most-one-cycle guard (belt to the scheduler's suspenders).
    pub cycle_in_flight: AtomicBool,
    pub last_cycle_at: RwLock<Option<String>>,
    pub last_cycle_error: RwLock<Option<String>>,

    // ── Universe rotation ───────────────────────────────────────────────
    /// Rotating start index into the scout candidate list.
    pub rotation_index: AtomicUsize,

    // ── Dashboard data ──────────────────────────────────────────────────
    pub last_snapshot: RwLock<Option<AccountStatus>>,
    pub recent_errors: RwLock<Vec<ErrorRecord>>,
    /// symbol → executed_trades row id for trades this process opened.
    pub active_trades: RwLock<HashMap<String, i64>>,

    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(
        settings: Settings,
        venue: Arc<HyperliquidClient>,
        risk: Arc<RiskManager>,
        db: Option<Database>,
        usage: Arc<UsageTracker>,
    ) -> Self {
        Self {
            settings,
            venue,
            risk,
            db,
            usage,
            cycle_count: AtomicU64::new(0),
            cycle_in_flight: AtomicBool::new(false),
            last_cycle_at: RwLock::new(None),
            last_cycle_error: RwLock::new(None),
            rotation_index: AtomicUsize::new(0),
            last_snapshot: RwLock::new(None),
            recent_errors: RwLock::new(Vec::new()),
            active_trades: RwLock::new(HashMap::new()),
            start_time: std::time::Instant::now(),
        }
    }

    /// Record an error for the dashboard ring buffer.
    pub fn push_error(&self, message: String) {
        let mut errors = self.recent_errors.write();
        errors.push(ErrorRecord {
            message,
            at: Utc::now().to_rfc3339(),
        });
        while errors.len() > MAX_RECENT_ERRORS {
            errors.remove(0);
        }
    }

    /// Take the next scout batch out of `candidates`, wrapping modularly,
    /// and advance the rotation index by the batch size.
    pub fn next_scout_batch(&self, candidates: &[String], batch_size: usize) -> Vec<String> {
        rotate_batch(&self.rotation_index, candidates, batch_size)
    }

    /// Serializable status payload for the read-only API.
    pub fn build_status(&self) -> StatusSnapshot {
        StatusSnapshot {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            cycle_count: self.cycle_count.load(Ordering::SeqCst),
            cycle_in_flight: self.cycle_in_flight.load(Ordering::SeqCst),
            last_cycle_at: self.last_cycle_at.read().clone(),
            last_cycle_error: self.last_cycle_error.read().clone(),
            account: self.last_snapshot.read().clone(),
            risk: self.risk.status(),
            active_trades: self.active_trades.read().clone(),
            pending_usage_rows: self.usage.pending_count(),
            recent_errors: self.recent_errors.read().clone(),
        }
    }
}

/// Modular batch rotation: take `batch_size` entries starting at the index,
/// wrapping around the end, then advance the index by the batch size. Bounds
/// per-cycle LLM cost while eventually covering the whole candidate list.
fn rotate_batch(index: &AtomicUsize, candidates: &[String], batch_size: usize) -> Vec<String> {
    if candidates.is_empty() || batch_size == 0 {
        return Vec::new();
    }

    let len = candidates.len();
    let start = index.load(Ordering::SeqCst) % len;
    let take = batch_size.min(len);

    let batch = (0..take)
        .map(|i| candidates[(start + i) % len].clone())
        .collect();

    index.store((start + batch_size) % len, Ordering::SeqCst);
    batch
}

/// The `/api/state` payload.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub uptime_seconds: u64,
    pub cycle_count: u64,
    pub cycle_in_flight: bool,
    pub last_cycle_at: Option<String>,
    pub last_cycle_error: Option<String>,
    pub account: Option<AccountStatus>,
    pub risk: RiskStatus,
    pub active_trades: HashMap<String, i64>,
    pub pending_usage_rows: usize,
    pub recent_errors: Vec<ErrorRecord>,
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn candidates() -> Vec<String> {
        ["A", "B", "C", "D", "E", "F", "G"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn rotation_walks_and_wraps() {
        let index = AtomicUsize::new(0);
        let pool = candidates();

        assert_eq!(rotate_batch(&index, &pool, 3), vec!["A", "B", "C"]);
        assert_eq!(rotate_batch(&index, &pool, 3), vec!["D", "E", "F"]);
        // Wraps around the end of the list.
        assert_eq!(rotate_batch(&index, &pool, 3), vec!["G", "A", "B"]);
    }

    #[test]
    fn rotation_batch_larger_than_pool() {
        let index = AtomicUsize::new(0);
        let pool = candidates();
        let batch = rotate_batch(&index, &pool, 20);
        assert_eq!(batch.len(), pool.len());
    }

    #[test]
    fn rotation_empty_inputs() {
        let index = AtomicUsize::new(0);
        assert!(rotate_batch(&index, &[], 5).is_empty());
        assert!(rotate_batch(&index, &candidates(), 0).is_empty());
    }

    #[test]
    fn rotation_survives_pool_shrinking() {
        let index = AtomicUsize::new(5);
        // Index beyond the new pool length is reduced modularly.
        let pool: Vec<String> = ["X", "Y", "Z"].iter().map(|s| s.to_string()).collect();
        let batch = rotate_batch(&index, &pool, 2);
        assert_eq!(batch, vec!["Z", "X"]);
    }
}
