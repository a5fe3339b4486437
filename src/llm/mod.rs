// =============================================================================
// LLM decision layer — model registry, decision client, token accounting
// =============================================================================

pub mod client;
pub mod decision;
pub mod registry;
pub mod usage;

pub use client::DecisionClient;
pub use decision::{Decision, OpenOrder};
pub use usage::{UsageRecord, UsageTracker};
