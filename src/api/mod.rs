// =============================================================================
// Read-only status API
// =============================================================================

pub mod rest;
