// =============================================================================
// Hyperliquid venue client
// =============================================================================
//
// Reads go through POST /info authenticated by nothing but the master account
// address in the request body; writes go through POST /exchange and carry an
// EIP-712 signature produced by the API wallet key. Mixing up the two
// addresses is the classic integration bug — reads MUST use the master
// account (it owns the funds), writes MUST be signed by the API wallet.
// =============================================================================

pub mod client;
pub mod error;
pub mod retry;
pub mod signing;
pub mod types;

pub use client::HyperliquidClient;
pub use types::{AccountStatus, VenuePosition};
