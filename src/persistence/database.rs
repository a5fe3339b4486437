// =============================================================================
// Database — SQLite pool with schema bootstrap
// =============================================================================
//
// The database is the only durable shared state: every table is append-only
// (the reconciler's trade-close update is the one sanctioned mutation). WAL
// mode keeps the reconciler and the orchestrator from blocking each other.
// =============================================================================

use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::info;

#[derive(Clone)]
pub struct Database {
    pub pool: SqlitePool,
}

impl Database {
    pub async fn new(db_url: &str) -> Result<Self> {
        if let Some(path_part) = db_url.strip_prefix("sqlite://") {
            if let Some(parent) = Path::new(path_part).parent() {
                if !parent.exists() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .context("failed to create database directory")?;
                }
            }
        }

        let options = SqliteConnectOptions::from_str(db_url)
            .context("invalid DATABASE_URL")?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("failed to connect to SQLite database")?;

        info!(db_url, "connected to database");

        let db = Self { pool };
        db.init().await?;
        Ok(db)
    }

    async fn init(&self) -> Result<()> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS account_snapshots (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                balance_usd REAL NOT NULL,
                perps_balance_usd REAL NOT NULL,
                spot_balance_usd REAL NOT NULL
            );
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS open_positions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                snapshot_id INTEGER NOT NULL REFERENCES account_snapshots(id),
                symbol TEXT NOT NULL,
                side TEXT NOT NULL,
                size REAL NOT NULL,
                entry_price REAL NOT NULL,
                mark_price REAL NOT NULL,
                pnl_usd REAL NOT NULL,
                leverage TEXT
            );
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS ai_contexts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                system_prompt TEXT NOT NULL
            );
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS indicators_contexts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                context_id INTEGER NOT NULL REFERENCES ai_contexts(id),
                payload TEXT NOT NULL
            );
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS news_contexts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                context_id INTEGER NOT NULL REFERENCES ai_contexts(id),
                payload TEXT NOT NULL
            );
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS sentiment_contexts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                context_id INTEGER NOT NULL REFERENCES ai_contexts(id),
                payload TEXT NOT NULL
            );
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS forecasts_contexts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                context_id INTEGER NOT NULL REFERENCES ai_contexts(id),
                payload TEXT NOT NULL
            );
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS bot_operations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                cycle_id TEXT,
                operation TEXT NOT NULL,
                symbol TEXT,
                direction TEXT,
                target_portion_of_balance REAL,
                leverage INTEGER,
                raw_payload TEXT NOT NULL,
                execution_result TEXT,
                context_id INTEGER REFERENCES ai_contexts(id)
            );
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS executed_trades (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                bot_operation_id INTEGER REFERENCES bot_operations(id),
                trade_type TEXT NOT NULL,
                symbol TEXT NOT NULL,
                direction TEXT NOT NULL,
                entry_price REAL,
                exit_price REAL,
                size REAL,
                size_usd REAL,
                leverage INTEGER,
                stop_loss_price REAL,
                take_profit_price REAL,
                exit_reason TEXT,
                pnl_usd REAL,
                pnl_pct REAL,
                duration_minutes REAL,
                status TEXT NOT NULL DEFAULT 'open',
                closed_at TEXT,
                fees_usd REAL,
                hl_order_id TEXT
            );
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS idx_trades_symbol_status
            ON executed_trades (symbol, status);
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS coin_screenings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                screening_type TEXT NOT NULL,
                selected_coins TEXT NOT NULL,
                excluded_coins TEXT NOT NULL,
                next_rebalance TEXT NOT NULL
            );
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS coin_scores_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                screening_id INTEGER NOT NULL REFERENCES coin_screenings(id),
                symbol TEXT NOT NULL,
                score REAL NOT NULL,
                rank INTEGER NOT NULL,
                factors TEXT NOT NULL
            );
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS llm_usage (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL DEFAULT (datetime('now')),
                model TEXT NOT NULL,
                input_tokens INTEGER NOT NULL,
                output_tokens INTEGER NOT NULL,
                total_tokens INTEGER NOT NULL,
                input_cost_usd REAL,
                output_cost_usd REAL,
                total_cost_usd REAL,
                purpose TEXT,
                ticker TEXT,
                cycle_id TEXT,
                response_time_ms INTEGER
            );
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS idx_llm_usage_cycle ON llm_usage (cycle_id);
            "#,
        ];

        let mut conn = self.pool.acquire().await?;
        for stmt in statements {
            sqlx::query(stmt)
                .execute(&mut *conn)
                .await
                .context("schema init statement failed")?;
        }

        info!("database schema verified");
        Ok(())
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish()
    }
}
