// =============================================================================
// Record helpers — typed inserts and the reconciler's dedupe queries
// =============================================================================
//
// Timestamps are stored as UTC "YYYY-MM-DD HH:MM:SS" strings so SQLite's
// strftime can do the ±5 s dedupe windows server-side.
// =============================================================================

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::Row;

use crate::hyperliquid::AccountStatus;
use crate::llm::UsageRecord;
use crate::screener::ScreeningResult;
use crate::types::ExitReason;

use super::database::Database;

fn ts(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// One LLM decision with everything needed to audit it later.
#[derive(Debug, Clone)]
pub struct BotOperationRow {
    pub cycle_id: Option<String>,
    pub operation: String,
    pub symbol: Option<String>,
    pub direction: Option<String>,
    pub target_portion_of_balance: Option<f64>,
    pub leverage: Option<i64>,
    /// Full decision payload as JSON.
    pub raw_payload: String,
    /// Execution outcome as JSON, when the decision was acted on.
    pub execution_result: Option<String>,
    pub context_id: Option<i64>,
}

/// Opening row of one logical trade.
#[derive(Debug, Clone)]
pub struct TradeOpenRow {
    pub bot_operation_id: Option<i64>,
    pub symbol: String,
    pub direction: String,
    pub entry_price: f64,
    pub size: f64,
    pub size_usd: f64,
    pub leverage: i64,
    pub stop_loss_price: Option<f64>,
    pub take_profit_price: Option<f64>,
    pub hl_order_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub fees_usd: f64,
}

/// Open-trade reference used when the reconciler matches a close fill.
#[derive(Debug, Clone)]
pub struct OpenTradeRef {
    pub id: i64,
    pub entry_price: f64,
    pub size: f64,
}

impl Database {
    // -------------------------------------------------------------------------
    // Account snapshots
    // -------------------------------------------------------------------------

    /// Persist one balance snapshot with its open-position satellites.
    pub async fn insert_account_snapshot(&self, status: &AccountStatus) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO account_snapshots (created_at, balance_usd, perps_balance_usd, spot_balance_usd)
             VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(ts(Utc::now()))
        .bind(status.balance_usd)
        .bind(status.perps_balance_usd)
        .bind(status.spot_balance_usd)
        .execute(&self.pool)
        .await
        .context("account snapshot insert failed")?;

        let snapshot_id = result.last_insert_rowid();

        for p in &status.open_positions {
            sqlx::query(
                "INSERT INTO open_positions
                 (snapshot_id, symbol, side, size, entry_price, mark_price, pnl_usd, leverage)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )
            .bind(snapshot_id)
            .bind(&p.symbol)
            .bind(&p.side)
            .bind(p.size)
            .bind(p.entry_price)
            .bind(p.mark_price)
            .bind(p.pnl_usd)
            .bind(&p.leverage)
            .execute(&self.pool)
            .await
            .context("open position insert failed")?;
        }

        Ok(snapshot_id)
    }

    // -------------------------------------------------------------------------
    // AI contexts & operations
    // -------------------------------------------------------------------------

    /// Persist the prompt context with its satellite payloads, returning the
    /// context id for the bot-operation row.
    pub async fn insert_ai_context(
        &self,
        system_prompt: &str,
        indicators: &str,
        news: &str,
        sentiment: &str,
        forecasts: &str,
    ) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO ai_contexts (created_at, system_prompt) VALUES (?1, ?2)",
        )
        .bind(ts(Utc::now()))
        .bind(system_prompt)
        .execute(&self.pool)
        .await
        .context("ai context insert failed")?;

        let context_id = result.last_insert_rowid();

        for (table, payload) in [
            ("indicators_contexts", indicators),
            ("news_contexts", news),
            ("sentiment_contexts", sentiment),
            ("forecasts_contexts", forecasts),
        ] {
            sqlx::query(&format!(
                "INSERT INTO {table} (context_id, payload) VALUES (?1, ?2)"
            ))
            .bind(context_id)
            .bind(payload)
            .execute(&self.pool)
            .await
            .with_context(|| format!("{table} insert failed"))?;
        }

        Ok(context_id)
    }

    pub async fn insert_bot_operation(&self, row: &BotOperationRow) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO bot_operations
             (created_at, cycle_id, operation, symbol, direction,
              target_portion_of_balance, leverage, raw_payload, execution_result, context_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )
        .bind(ts(Utc::now()))
        .bind(&row.cycle_id)
        .bind(&row.operation)
        .bind(&row.symbol)
        .bind(&row.direction)
        .bind(row.target_portion_of_balance)
        .bind(row.leverage)
        .bind(&row.raw_payload)
        .bind(&row.execution_result)
        .bind(row.context_id)
        .execute(&self.pool)
        .await
        .context("bot operation insert failed")?;

        Ok(result.last_insert_rowid())
    }

    // -------------------------------------------------------------------------
    // Trades
    // -------------------------------------------------------------------------

    pub async fn insert_open_trade(&self, row: &TradeOpenRow) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO executed_trades
             (created_at, bot_operation_id, trade_type, symbol, direction,
              entry_price, size, size_usd, leverage,
              stop_loss_price, take_profit_price, status, fees_usd, hl_order_id)
             VALUES (?1, ?2, 'open', ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 'open', ?11, ?12)",
        )
        .bind(ts(row.created_at))
        .bind(row.bot_operation_id)
        .bind(&row.symbol)
        .bind(&row.direction)
        .bind(row.entry_price)
        .bind(row.size)
        .bind(row.size_usd)
        .bind(row.leverage)
        .bind(row.stop_loss_price)
        .bind(row.take_profit_price)
        .bind(row.fees_usd)
        .bind(&row.hl_order_id)
        .execute(&self.pool)
        .await
        .context("open trade insert failed")?;

        Ok(result.last_insert_rowid())
    }

    /// Close a trade row: open → closed is the only status transition.
    #[allow(clippy::too_many_arguments)]
    pub async fn close_trade(
        &self,
        trade_id: i64,
        exit_price: f64,
        exit_reason: ExitReason,
        pnl_usd: f64,
        pnl_pct: f64,
        closed_at: DateTime<Utc>,
        extra_fees_usd: f64,
    ) -> Result<()> {
        let closed = ts(closed_at);
        sqlx::query(
            "UPDATE executed_trades
             SET status = 'closed',
                 exit_price = ?2,
                 exit_reason = ?3,
                 pnl_usd = ?4,
                 pnl_pct = ?5,
                 closed_at = ?6,
                 fees_usd = COALESCE(fees_usd, 0) + ?7,
                 duration_minutes = (julianday(?6) - julianday(created_at)) * 1440.0
             WHERE id = ?1 AND status = 'open'",
        )
        .bind(trade_id)
        .bind(exit_price)
        .bind(exit_reason.to_string())
        .bind(pnl_usd)
        .bind(pnl_pct)
        .bind(closed)
        .bind(extra_fees_usd)
        .execute(&self.pool)
        .await
        .context("trade close update failed")?;

        Ok(())
    }

    /// Dedupe for open fills: matching venue order id, or same symbol within
    /// ±5 s of the fill time.
    pub async fn open_fill_already_recorded(
        &self,
        hl_order_id: &str,
        symbol: &str,
        fill_time: DateTime<Utc>,
    ) -> Result<bool> {
        let row = sqlx::query(
            "SELECT id FROM executed_trades
             WHERE hl_order_id = ?1
                OR (symbol = ?2 AND ABS(strftime('%s', created_at) - ?3) < 5)
             LIMIT 1",
        )
        .bind(hl_order_id)
        .bind(symbol)
        .bind(fill_time.timestamp())
        .fetch_optional(&self.pool)
        .await
        .context("open fill dedupe query failed")?;

        Ok(row.is_some())
    }

    /// Most recent open trade for (symbol, direction) — the row a close fill
    /// settles.
    pub async fn latest_open_trade(
        &self,
        symbol: &str,
        direction: &str,
    ) -> Result<Option<OpenTradeRef>> {
        let row = sqlx::query(
            "SELECT id, entry_price, size FROM executed_trades
             WHERE symbol = ?1 AND direction = ?2 AND status = 'open'
             ORDER BY created_at DESC
             LIMIT 1",
        )
        .bind(symbol)
        .bind(direction)
        .fetch_optional(&self.pool)
        .await
        .context("latest open trade query failed")?;

        Ok(row.map(|r| OpenTradeRef {
            id: r.get::<i64, _>("id"),
            entry_price: r.get::<f64, _>("entry_price"),
            size: r.get::<f64, _>("size"),
        }))
    }

    /// Dedupe for close fills: a closed row for the symbol within ±5 s.
    pub async fn closed_fill_already_recorded(
        &self,
        symbol: &str,
        fill_time: DateTime<Utc>,
    ) -> Result<bool> {
        let row = sqlx::query(
            "SELECT id FROM executed_trades
             WHERE symbol = ?1 AND status = 'closed'
               AND closed_at IS NOT NULL
               AND ABS(strftime('%s', closed_at) - ?2) < 5
             LIMIT 1",
        )
        .bind(symbol)
        .bind(fill_time.timestamp())
        .fetch_optional(&self.pool)
        .await
        .context("closed fill dedupe query failed")?;

        Ok(row.is_some())
    }

    /// Insert a fully closed trade reconstructed from a fill that had no
    /// matching open row.
    #[allow(clippy::too_many_arguments)]
    pub async fn insert_synced_closed_trade(
        &self,
        symbol: &str,
        direction: &str,
        size: f64,
        entry_price: f64,
        exit_price: f64,
        pnl_usd: f64,
        pnl_pct: f64,
        hl_order_id: &str,
        closed_at: DateTime<Utc>,
        fees_usd: f64,
    ) -> Result<i64> {
        // The true open time is unknown; backdate by an hour so duration
        // stays plausible and ordering sane.
        let created_at = closed_at - chrono::Duration::hours(1);

        let result = sqlx::query(
            "INSERT INTO executed_trades
             (created_at, trade_type, symbol, direction, entry_price, exit_price,
              size, size_usd, leverage, status, closed_at, exit_reason,
              pnl_usd, pnl_pct, fees_usd, hl_order_id)
             VALUES (?1, 'close', ?2, ?3, ?4, ?5, ?6, ?7, 1, 'closed', ?8, ?9, ?10, ?11, ?12, ?13)",
        )
        .bind(ts(created_at))
        .bind(symbol)
        .bind(direction)
        .bind(entry_price)
        .bind(exit_price)
        .bind(size)
        .bind(exit_price * size)
        .bind(ts(closed_at))
        .bind(ExitReason::SyncedHistory.to_string())
        .bind(pnl_usd)
        .bind(pnl_pct)
        .bind(fees_usd)
        .bind(hl_order_id)
        .execute(&self.pool)
        .await
        .context("synced closed trade insert failed")?;

        Ok(result.last_insert_rowid())
    }

    // -------------------------------------------------------------------------
    // Screenings
    // -------------------------------------------------------------------------

    pub async fn insert_screening(&self, result: &ScreeningResult) -> Result<i64> {
        let selected = serde_json::to_string(&result.selected_coins)?;
        let excluded = serde_json::to_string(&result.excluded_coins)?;

        let inserted = sqlx::query(
            "INSERT INTO coin_screenings
             (created_at, screening_type, selected_coins, excluded_coins, next_rebalance)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(ts(result.screening_timestamp))
        .bind(result.screening_type.to_string())
        .bind(selected)
        .bind(excluded)
        .bind(ts(result.next_rebalance))
        .execute(&self.pool)
        .await
        .context("screening insert failed")?;

        let screening_id = inserted.last_insert_rowid();

        for coin in &result.selected_coins {
            sqlx::query(
                "INSERT INTO coin_scores_history (screening_id, symbol, score, rank, factors)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .bind(screening_id)
            .bind(&coin.symbol)
            .bind(coin.score)
            .bind(coin.rank as i64)
            .bind(serde_json::to_string(&coin.factors)?)
            .execute(&self.pool)
            .await
            .context("coin score insert failed")?;
        }

        Ok(screening_id)
    }

    // -------------------------------------------------------------------------
    // LLM usage
    // -------------------------------------------------------------------------

    pub async fn insert_llm_usage(&self, record: &UsageRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO llm_usage
             (timestamp, model, input_tokens, output_tokens, total_tokens,
              input_cost_usd, output_cost_usd, total_cost_usd,
              purpose, ticker, cycle_id, response_time_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        )
        .bind(ts(record.timestamp))
        .bind(&record.model)
        .bind(record.input_tokens)
        .bind(record.output_tokens)
        .bind(record.total_tokens)
        .bind(record.input_cost_usd)
        .bind(record.output_cost_usd)
        .bind(record.total_cost_usd)
        .bind(&record.purpose)
        .bind(&record.ticker)
        .bind(&record.cycle_id)
        .bind(record.response_time_ms)
        .execute(&self.pool)
        .await
        .context("llm usage insert failed")?;

        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::hyperliquid::VenuePosition;

    use crate::persistence::database::tests::test_db;

    fn open_row(symbol: &str, at: DateTime<Utc>) -> TradeOpenRow {
        TradeOpenRow {
            bot_operation_id: None,
            symbol: symbol.to_string(),
            direction: "long".to_string(),
            entry_price: 150.0,
            size: 10.0,
            size_usd: 1500.0,
            leverage: 1,
            stop_loss_price: Some(147.0),
            take_profit_price: Some(157.5),
            hl_order_id: Some("991".to_string()),
            created_at: at,
            fees_usd: 0.05,
        }
    }

    #[tokio::test]
    async fn snapshot_with_positions_roundtrip() {
        let db = test_db().await;
        let status = AccountStatus {
            balance_usd: 1000.0,
            perps_balance_usd: 900.0,
            spot_balance_usd: 100.0,
            open_positions: vec![VenuePosition {
                symbol: "BTC".into(),
                side: "long".into(),
                size: 0.01,
                entry_price: 50_000.0,
                mark_price: 50_500.0,
                pnl_usd: 5.0,
                leverage: "3x (cross)".into(),
            }],
        };

        let id = db.insert_account_snapshot(&status).await.unwrap();
        assert!(id > 0);

        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM open_positions WHERE snapshot_id = ?1")
                .bind(id)
                .fetch_one(&db.pool)
                .await
                .unwrap();
        assert_eq!(count.0, 1);
    }

    #[tokio::test]
    async fn trade_lifecycle_open_close() {
        let db = test_db().await;
        let opened_at = Utc::now() - chrono::Duration::minutes(30);
        let id = db.insert_open_trade(&open_row("SOL", opened_at)).await.unwrap();

        let open = db.latest_open_trade("SOL", "long").await.unwrap().unwrap();
        assert_eq!(open.id, id);
        assert_eq!(open.entry_price, 150.0);

        db.close_trade(id, 155.0, ExitReason::SyncedFill, 50.0, 3.33, Utc::now(), 0.02)
            .await
            .unwrap();

        // Closed rows stop matching as open.
        assert!(db.latest_open_trade("SOL", "long").await.unwrap().is_none());

        let row = sqlx::query(
            "SELECT status, exit_reason, duration_minutes FROM executed_trades WHERE id = ?1",
        )
        .bind(id)
        .fetch_one(&db.pool)
        .await
        .unwrap();
        assert_eq!(row.get::<String, _>("status"), "closed");
        assert_eq!(row.get::<String, _>("exit_reason"), "synced_fill");
        let duration: f64 = row.get("duration_minutes");
        assert!((duration - 30.0).abs() < 2.0, "duration {duration} not ~30min");
    }

    #[tokio::test]
    async fn open_fill_dedupe_by_order_id_and_window() {
        let db = test_db().await;
        let at = Utc::now();
        db.insert_open_trade(&open_row("SOL", at)).await.unwrap();

        // Same order id.
        assert!(db
            .open_fill_already_recorded("991", "OTHER", at + chrono::Duration::hours(2))
            .await
            .unwrap());
        // Same symbol inside the window.
        assert!(db
            .open_fill_already_recorded("other-oid", "SOL", at + chrono::Duration::seconds(3))
            .await
            .unwrap());
        // Same symbol outside the window.
        assert!(!db
            .open_fill_already_recorded("other-oid", "SOL", at + chrono::Duration::seconds(60))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn closed_fill_dedupe_window() {
        let db = test_db().await;
        let closed_at = Utc::now();
        db.insert_synced_closed_trade(
            "SOL", "long", 10.0, 150.0, 155.0, 50.0, 3.33, "77", closed_at, 0.1,
        )
        .await
        .unwrap();

        assert!(db
            .closed_fill_already_recorded("SOL", closed_at + chrono::Duration::seconds(2))
            .await
            .unwrap());
        assert!(!db
            .closed_fill_already_recorded("SOL", closed_at + chrono::Duration::seconds(30))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn llm_usage_insert() {
        let db = test_db().await;
        let record = crate::llm::UsageTracker::build_record(
            "deepseek-chat",
            1000,
            200,
            "trading_decision",
            Some("BTC".into()),
            Some("cycle-abc".into()),
            850,
        );
        db.insert_llm_usage(&record).await.unwrap();

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM llm_usage")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(count.0, 1);
    }
}
