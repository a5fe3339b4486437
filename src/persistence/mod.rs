// =============================================================================
// Persistence — append-only event tables in SQLite
// =============================================================================

pub mod database;
pub mod records;

pub use database::Database;
