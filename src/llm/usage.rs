// =============================================================================
// Token accounting — per-call usage rows with a price table
// =============================================================================
//
// Costs come from a USD-per-million-token table; unknown models fall through
// to a default price so a new model never records zero cost. Persistence is
// best-effort: rows that fail to insert buffer in memory and replay on the
// next successful write.
// =============================================================================

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::persistence::Database;

/// (model id, input USD per 1M tokens, output USD per 1M tokens).
const PRICING: &[(&str, f64, f64)] = &[
    ("gpt-4o", 2.50, 10.00),
    ("gpt-4o-mini", 0.15, 0.60),
    ("gpt-4.1-mini", 0.40, 1.60),
    ("gpt-4.1-nano", 0.10, 0.40),
    ("gpt-5.1-2025-11-13", 1.25, 10.00),
    ("deepseek-chat", 0.14, 0.28),
    ("deepseek-reasoner", 0.55, 2.19),
];

const DEFAULT_PRICE: (f64, f64) = (1.00, 2.00);

/// One recorded LLM call.
#[derive(Debug, Clone, Serialize)]
pub struct UsageRecord {
    pub timestamp: DateTime<Utc>,
    pub model: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub total_tokens: i64,
    pub input_cost_usd: f64,
    pub output_cost_usd: f64,
    pub total_cost_usd: f64,
    pub purpose: String,
    pub ticker: Option<String>,
    pub cycle_id: Option<String>,
    pub response_time_ms: i64,
}

/// Price lookup: exact model id first (so "gpt-4o-mini" never hits the
/// "gpt-4o" row), then prefix match for dated variants, then the default.
fn price_for(model: &str) -> (f64, f64) {
    let lower = model.to_ascii_lowercase();
    PRICING
        .iter()
        .find(|(id, _, _)| lower == *id)
        .or_else(|| PRICING.iter().find(|(id, _, _)| lower.starts_with(id)))
        .map(|(_, input, output)| (*input, *output))
        .unwrap_or(DEFAULT_PRICE)
}

pub struct UsageTracker {
    db: Option<Database>,
    /// Rows waiting for the database to come back.
    pending: Mutex<Vec<UsageRecord>>,
}

impl UsageTracker {
    pub fn new(db: Option<Database>) -> Arc<Self> {
        if db.is_none() {
            warn!("no database — LLM usage will only accumulate in memory");
        }
        Arc::new(Self {
            db,
            pending: Mutex::new(Vec::new()),
        })
    }

    /// Build a usage record with costs computed from the price table.
    pub fn build_record(
        model: &str,
        input_tokens: i64,
        output_tokens: i64,
        purpose: &str,
        ticker: Option<String>,
        cycle_id: Option<String>,
        response_time_ms: i64,
    ) -> UsageRecord {
        let (input_price, output_price) = price_for(model);
        let input_cost = input_tokens as f64 / 1_000_000.0 * input_price;
        let output_cost = output_tokens as f64 / 1_000_000.0 * output_price;

        UsageRecord {
            timestamp: Utc::now(),
            model: model.to_string(),
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
            input_cost_usd: input_cost,
            output_cost_usd: output_cost,
            total_cost_usd: input_cost + output_cost,
            purpose: purpose.to_string(),
            ticker,
            cycle_id,
            response_time_ms,
        }
    }

    /// Record one call. Database failures buffer the row instead of
    /// propagating — accounting must never break a trading cycle.
    pub async fn track(&self, record: UsageRecord) {
        let Some(db) = &self.db else {
            self.pending.lock().push(record);
            return;
        };

        // Replay anything buffered from earlier failures first.
        let backlog: Vec<UsageRecord> = std::mem::take(&mut *self.pending.lock());
        for old in backlog {
            if let Err(e) = db.insert_llm_usage(&old).await {
                debug!(error = %e, "usage replay still failing — re-buffering");
                self.pending.lock().push(old);
            }
        }

        if let Err(e) = db.insert_llm_usage(&record).await {
            warn!(error = %e, model = %record.model, "usage insert failed — buffering");
            self.pending.lock().push(record);
        }
    }

    /// Rows currently waiting on the database.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_model_pricing() {
        let record =
            UsageTracker::build_record("deepseek-chat", 1_000_000, 500_000, "decision", None, None, 900);
        assert!((record.input_cost_usd - 0.14).abs() < 1e-9);
        assert!((record.output_cost_usd - 0.14).abs() < 1e-9);
        assert!((record.total_cost_usd - 0.28).abs() < 1e-9);
        assert_eq!(record.total_tokens, 1_500_000);
    }

    #[test]
    fn exact_match_beats_prefix() {
        // "gpt-4o-mini" must not pick up the "gpt-4o" row.
        let record = UsageTracker::build_record("gpt-4o-mini", 1_000_000, 0, "x", None, None, 0);
        assert!((record.input_cost_usd - 0.15).abs() < 1e-9);

        // Dated variants fall back to the prefix row.
        let record = UsageTracker::build_record("gpt-4o-2024-11-20", 1_000_000, 0, "x", None, None, 0);
        assert!((record.input_cost_usd - 2.50).abs() < 1e-9);
    }

    #[test]
    fn unknown_model_uses_default_price() {
        let record = UsageTracker::build_record("mystery-9000", 2_000_000, 1_000_000, "x", None, None, 0);
        assert!((record.input_cost_usd - 2.0).abs() < 1e-9);
        assert!((record.output_cost_usd - 2.0).abs() < 1e-9);
    }

    #[test]
    fn totals_are_consistent() {
        let record = UsageTracker::build_record(
            "gpt-4o-mini",
            12_345,
            678,
            "decision",
            Some("BTC".into()),
            Some("cycle-1".into()),
            1200,
        );
        assert_eq!(record.total_tokens, record.input_tokens + record.output_tokens);
        assert!(
            (record.total_cost_usd - (record.input_cost_usd + record.output_cost_usd)).abs()
                < 1e-12
        );
    }

    #[tokio::test]
    async fn tracker_without_db_buffers() {
        let tracker = UsageTracker::new(None);
        tracker
            .track(UsageTracker::build_record("m", 1, 1, "p", None, None, 0))
            .await;
        assert_eq!(tracker.pending_count(), 1);
    }
}
