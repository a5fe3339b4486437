// =============================================================================
// Risk Manager — position registry, sizing, daily circuit breaker, cooldown
// =============================================================================
//
// Gates and state:
//   1. Daily loss        — breaker latches when |daily PnL| crosses the USD
//                          or percent ceiling; clears at UTC midnight.
//   2. Consecutive losses — a cooldown window blocks new exposure after N
//                          losing trades in a row.
//   3. Position registry — SL/TP prices computed at registration; every
//                          cycle sweeps live prices for crossings.
//
// All state sits behind one mutex. The orchestrator is the sole mutator;
// nothing here talks to the network.
// =============================================================================

use std::collections::HashMap;

use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::RiskSettings;
use crate::types::{Direction, ExitReason};

/// Fraction of balance risked per trade (full SL move = 2 % of equity).
const MAX_RISK_PER_TRADE: f64 = 0.02;

// ---------------------------------------------------------------------------
// Position
// ---------------------------------------------------------------------------

/// One tracked exposure. SL/TP prices are fixed at registration.
#[derive(Debug, Clone, Serialize)]
pub struct Position {
    pub symbol: String,
    pub direction: Direction,
    pub entry_price: f64,
    pub size: f64,
    pub leverage: u32,
    pub stop_loss_price: f64,
    pub take_profit_price: f64,
    pub opened_at: DateTime<Utc>,
}

impl Position {
    /// Stop distance from entry as a percentage.
    pub fn stop_loss_pct(&self) -> f64 {
        match self.direction {
            Direction::Long => (self.entry_price - self.stop_loss_price) / self.entry_price * 100.0,
            Direction::Short => {
                (self.stop_loss_price - self.entry_price) / self.entry_price * 100.0
            }
        }
    }

    /// Target distance from entry as a percentage.
    pub fn take_profit_pct(&self) -> f64 {
        match self.direction {
            Direction::Long => {
                (self.take_profit_price - self.entry_price) / self.entry_price * 100.0
            }
            Direction::Short => {
                (self.entry_price - self.take_profit_price) / self.entry_price * 100.0
            }
        }
    }

    /// Direction-aware SL/TP crossing check.
    pub fn check_exit(&self, current_price: f64) -> Option<ExitReason> {
        match self.direction {
            Direction::Long => {
                if current_price <= self.stop_loss_price {
                    Some(ExitReason::StopLoss)
                } else if current_price >= self.take_profit_price {
                    Some(ExitReason::TakeProfit)
                } else {
                    None
                }
            }
            Direction::Short => {
                if current_price >= self.stop_loss_price {
                    Some(ExitReason::StopLoss)
                } else if current_price <= self.take_profit_price {
                    Some(ExitReason::TakeProfit)
                } else {
                    None
                }
            }
        }
    }

    /// Unrealized PnL in USD at `current_price`.
    pub fn unrealized_pnl(&self, current_price: f64) -> f64 {
        self.direction.sign() * (current_price - self.entry_price) * self.size
    }
}

// ---------------------------------------------------------------------------
// Public result types
// ---------------------------------------------------------------------------

/// Outcome of the admission check.
#[derive(Debug, Clone, Serialize)]
pub struct Admission {
    pub allowed: bool,
    pub reason: String,
}

/// Fixed-fractional sizing outcome.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PositionSizing {
    pub size_usd: f64,
    pub effective_portion: f64,
    pub risk_usd: f64,
}

/// A position whose SL or TP line was crossed this sweep.
#[derive(Debug, Clone, Serialize)]
pub struct ExitEvent {
    pub symbol: String,
    pub direction: Direction,
    pub reason: ExitReason,
    pub entry_price: f64,
    pub exit_price: f64,
    pub pnl_usd: f64,
    pub position: Position,
}

/// Snapshot for the status API and notifications.
#[derive(Debug, Clone, Serialize)]
pub struct RiskStatus {
    pub daily_pnl: f64,
    pub consecutive_losses: u32,
    pub circuit_breaker_active: bool,
    pub open_positions: usize,
    pub positions: HashMap<String, Position>,
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

struct Inner {
    positions: HashMap<String, Position>,
    daily_pnl: f64,
    daily_reset_date: NaiveDate,
    consecutive_losses: u32,
    last_loss_time: Option<DateTime<Utc>>,
    circuit_breaker_active: bool,
}

pub struct RiskManager {
    config: RiskSettings,
    state: Mutex<Inner>,
}

impl RiskManager {
    pub fn new(config: RiskSettings) -> Self {
        info!(
            max_daily_loss_usd = config.max_daily_loss_usd,
            max_daily_loss_pct = config.max_daily_loss_pct,
            max_position_pct = config.max_position_pct,
            max_consecutive_losses = config.max_consecutive_losses,
            "risk manager initialised"
        );
        Self {
            config,
            state: Mutex::new(Inner {
                positions: HashMap::new(),
                daily_pnl: 0.0,
                daily_reset_date: Utc::now().date_naive(),
                consecutive_losses: 0,
                last_loss_time: None,
                circuit_breaker_active: false,
            }),
        }
    }

    // -------------------------------------------------------------------------
    // Admission
    // -------------------------------------------------------------------------

    /// Decide whether a new position may be opened right now.
    pub fn can_open_position(&self, balance_usd: f64) -> Admission {
        let mut s = self.state.lock();
        Self::reset_daily_if_needed(&mut s);

        if s.circuit_breaker_active {
            return Admission {
                allowed: false,
                reason: format!(
                    "Circuit breaker active. Daily loss: ${:.2}",
                    s.daily_pnl.abs()
                ),
            };
        }

        if s.daily_pnl.abs() >= self.config.max_daily_loss_usd {
            s.circuit_breaker_active = true;
            warn!(daily_pnl = s.daily_pnl, "daily USD loss ceiling hit — breaker armed");
            return Admission {
                allowed: false,
                reason: format!("Max daily loss reached: ${:.2}", s.daily_pnl.abs()),
            };
        }

        let daily_loss_pct = if balance_usd > 0.0 {
            s.daily_pnl.abs() / balance_usd * 100.0
        } else {
            0.0
        };
        if daily_loss_pct >= self.config.max_daily_loss_pct {
            s.circuit_breaker_active = true;
            warn!(daily_loss_pct, "daily percent loss ceiling hit — breaker armed");
            return Admission {
                allowed: false,
                reason: format!("Max daily loss percentage reached: {daily_loss_pct:.1}%"),
            };
        }

        if s.consecutive_losses >= self.config.max_consecutive_losses {
            if let Some(last_loss) = s.last_loss_time {
                let cooldown_end =
                    last_loss + ChronoDuration::minutes(self.config.cooldown_after_losses_minutes);
                let now = Utc::now();
                if now < cooldown_end {
                    let remaining = (cooldown_end - now).num_minutes();
                    return Admission {
                        allowed: false,
                        reason: format!(
                            "Cooldown after {} consecutive losses; {remaining} min remaining",
                            s.consecutive_losses
                        ),
                    };
                }
                // Cooldown served.
                s.consecutive_losses = 0;
            }
        }

        Admission {
            allowed: true,
            reason: "OK".to_string(),
        }
    }

    // -------------------------------------------------------------------------
    // Sizing
    // -------------------------------------------------------------------------

    /// Fixed-fractional sizing: the final size is the smallest of the
    /// requested size, the risk-derived size (a full SL move loses 2 % of
    /// equity), and the per-position ceiling. With a zero stop distance the
    /// risk-derived term degenerates to the requested size.
    pub fn calculate_position_size(
        &self,
        balance_usd: f64,
        requested_portion: f64,
        stop_loss_pct: f64,
        leverage: u32,
    ) -> PositionSizing {
        let risk_usd = balance_usd * MAX_RISK_PER_TRADE;
        let requested_size = balance_usd * requested_portion;

        let size_from_risk = if stop_loss_pct > 0.0 {
            risk_usd / stop_loss_pct * 100.0
        } else {
            requested_size
        };

        let max_size = balance_usd * self.config.max_position_pct / 100.0;
        let final_size = requested_size.min(size_from_risk).min(max_size);
        let effective_portion = if balance_usd > 0.0 {
            final_size / balance_usd
        } else {
            0.0
        };

        info!(
            requested = format!("{:.1}%", requested_portion * 100.0),
            risk_based = format!("{size_from_risk:.2}"),
            final_size = format!("{final_size:.2}"),
            effective = format!("{:.1}%", effective_portion * 100.0),
            leverage,
            "position sized"
        );

        PositionSizing {
            size_usd: final_size,
            effective_portion,
            risk_usd,
        }
    }

    // -------------------------------------------------------------------------
    // Registry
    // -------------------------------------------------------------------------

    /// Register a freshly opened position, deriving SL/TP prices from the
    /// entry and the percentage distances.
    #[allow(clippy::too_many_arguments)]
    pub fn register_position(
        &self,
        symbol: &str,
        direction: Direction,
        entry_price: f64,
        size: f64,
        leverage: u32,
        stop_loss_pct: f64,
        take_profit_pct: f64,
    ) -> Position {
        let (stop_loss_price, take_profit_price) = match direction {
            Direction::Long => (
                entry_price * (1.0 - stop_loss_pct / 100.0),
                entry_price * (1.0 + take_profit_pct / 100.0),
            ),
            Direction::Short => (
                entry_price * (1.0 + stop_loss_pct / 100.0),
                entry_price * (1.0 - take_profit_pct / 100.0),
            ),
        };

        let position = Position {
            symbol: symbol.to_string(),
            direction,
            entry_price,
            size,
            leverage,
            stop_loss_price,
            take_profit_price,
            opened_at: Utc::now(),
        };

        info!(
            symbol,
            direction = %direction,
            entry_price,
            size,
            stop_loss = stop_loss_price,
            take_profit = take_profit_price,
            "position registered"
        );

        self.state
            .lock()
            .positions
            .insert(symbol.to_string(), position.clone());
        position
    }

    /// Sweep all tracked positions against fresh prices and emit exit events
    /// for SL/TP crossings. The caller performs the actual closes.
    pub fn check_positions(&self, current_prices: &HashMap<String, f64>) -> Vec<ExitEvent> {
        let s = self.state.lock();
        let mut events = Vec::new();

        for (symbol, position) in &s.positions {
            let Some(&price) = current_prices.get(symbol) else {
                continue;
            };
            if let Some(reason) = position.check_exit(price) {
                let pnl = position.unrealized_pnl(price);
                warn!(
                    symbol = %symbol,
                    reason = %reason,
                    price,
                    entry = position.entry_price,
                    pnl = format!("{pnl:.2}"),
                    "exit line crossed"
                );
                events.push(ExitEvent {
                    symbol: symbol.clone(),
                    direction: position.direction,
                    reason,
                    entry_price: position.entry_price,
                    exit_price: price,
                    pnl_usd: pnl,
                    position: position.clone(),
                });
            }
        }

        events
    }

    /// Fold a closed trade's PnL into the daily stats and loss streak.
    pub fn record_trade_result(&self, pnl: f64) {
        let mut s = self.state.lock();
        s.daily_pnl += pnl;

        if pnl < 0.0 {
            s.consecutive_losses += 1;
            s.last_loss_time = Some(Utc::now());
            warn!(
                pnl = format!("{pnl:.2}"),
                consecutive = s.consecutive_losses,
                daily = format!("{:.2}", s.daily_pnl),
                "loss recorded"
            );
        } else {
            s.consecutive_losses = 0;
            info!(
                pnl = format!("{pnl:.2}"),
                daily = format!("{:.2}", s.daily_pnl),
                "profit recorded"
            );
        }
    }

    /// Drop a symbol from tracking (after any kind of close).
    pub fn remove_position(&self, symbol: &str) {
        if self.state.lock().positions.remove(symbol).is_some() {
            info!(symbol, "position removed from tracking");
        }
    }

    pub fn position(&self, symbol: &str) -> Option<Position> {
        self.state.lock().positions.get(symbol).cloned()
    }

    pub fn tracked_symbols(&self) -> Vec<String> {
        self.state.lock().positions.keys().cloned().collect()
    }

    pub fn status(&self) -> RiskStatus {
        let mut s = self.state.lock();
        Self::reset_daily_if_needed(&mut s);
        RiskStatus {
            daily_pnl: s.daily_pnl,
            consecutive_losses: s.consecutive_losses,
            circuit_breaker_active: s.circuit_breaker_active,
            open_positions: s.positions.len(),
            positions: s.positions.clone(),
        }
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    /// Zero the daily stats when the UTC date rolls over.
    fn reset_daily_if_needed(s: &mut Inner) {
        let today = Utc::now().date_naive();
        if today > s.daily_reset_date {
            info!(
                old_date = %s.daily_reset_date,
                new_date = %today,
                "UTC date rolled — daily risk stats reset"
            );
            s.daily_pnl = 0.0;
            s.daily_reset_date = today;
            s.circuit_breaker_active = false;
        }
    }
}

impl std::fmt::Debug for RiskManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = self.state.lock();
        f.debug_struct("RiskManager")
            .field("open_positions", &s.positions.len())
            .field("daily_pnl", &s.daily_pnl)
            .field("circuit_breaker_active", &s.circuit_breaker_active)
            .finish()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> RiskManager {
        RiskManager::new(RiskSettings::default())
    }

    #[test]
    fn registered_long_has_ordered_levels() {
        let rm = manager();
        let pos = rm.register_position("BTC", Direction::Long, 50_000.0, 0.006, 3, 2.0, 5.0);
        assert!(pos.stop_loss_price < pos.entry_price);
        assert!(pos.entry_price < pos.take_profit_price);
        assert!((pos.stop_loss_price - 49_000.0).abs() < 1e-6);
        assert!((pos.take_profit_price - 52_500.0).abs() < 1e-6);
        assert!((pos.stop_loss_pct() - 2.0).abs() < 1e-9);
        assert!((pos.take_profit_pct() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn registered_short_inverts_levels() {
        let rm = manager();
        let pos = rm.register_position("ETH", Direction::Short, 3_000.0, 1.0, 2, 2.0, 5.0);
        assert!(pos.take_profit_price < pos.entry_price);
        assert!(pos.entry_price < pos.stop_loss_price);
        assert!((pos.stop_loss_pct() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn sizing_takes_the_minimum_leg() {
        let rm = manager();
        // Balance 1000, portion 0.1 => requested 100.
        // Risk leg: 20 / 2% * 100 = 1000. Max leg: 300.
        let sizing = rm.calculate_position_size(1000.0, 0.1, 2.0, 3);
        assert!((sizing.size_usd - 100.0).abs() < 1e-9);
        assert!((sizing.effective_portion - 0.1).abs() < 1e-9);
        assert!((sizing.risk_usd - 20.0).abs() < 1e-9);

        // A tiny stop makes the risk leg dominate: 20 / 0.5% * 100 = 4000,
        // requested 800 > max 300 => capped at the position ceiling.
        let sizing = rm.calculate_position_size(1000.0, 0.8, 0.5, 1);
        assert!((sizing.size_usd - 300.0).abs() < 1e-9);
    }

    #[test]
    fn zero_stop_degenerates_to_requested() {
        let rm = manager();
        let sizing = rm.calculate_position_size(1000.0, 0.1, 0.0, 1);
        assert!((sizing.size_usd - 100.0).abs() < 1e-9);
    }

    #[test]
    fn admission_rejects_on_usd_ceiling() {
        let rm = manager();
        rm.record_trade_result(-495.0);
        // 495 < 500: still admitted.
        assert!(rm.can_open_position(10_000.0).allowed);

        rm.record_trade_result(-10.0);
        // 505 >= 500: denied and the breaker latches.
        let denied = rm.can_open_position(10_000.0);
        assert!(!denied.allowed);
        assert!(denied.reason.contains("Max daily loss"));

        // Subsequent checks hit the latched breaker.
        let denied = rm.can_open_position(10_000.0);
        assert!(!denied.allowed);
        assert!(denied.reason.contains("Circuit breaker"));
        assert!(rm.status().circuit_breaker_active);
    }

    #[test]
    fn admission_rejects_on_pct_ceiling() {
        let rm = manager();
        rm.record_trade_result(-60.0);
        // 60 / 1000 = 6% >= 5%.
        let denied = rm.can_open_position(1000.0);
        assert!(!denied.allowed);
        assert!(denied.reason.contains('%'));
    }

    #[test]
    fn cooldown_after_consecutive_losses() {
        let rm = manager();
        for _ in 0..3 {
            rm.record_trade_result(-1.0);
        }
        let denied = rm.can_open_position(100_000.0);
        assert!(!denied.allowed);
        assert!(denied.reason.contains("Cooldown"));

        // A win resets the streak.
        rm.record_trade_result(5.0);
        assert!(rm.can_open_position(100_000.0).allowed);
    }

    #[test]
    fn sweep_emits_stop_loss_event() {
        let rm = manager();
        rm.register_position("BTC", Direction::Long, 50_000.0, 0.006, 3, 2.0, 5.0);

        let mut prices = HashMap::new();
        prices.insert("BTC".to_string(), 48_900.0);
        let events = rm.check_positions(&prices);
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.reason, ExitReason::StopLoss);
        assert!((event.pnl_usd - (48_900.0 - 50_000.0) * 0.006).abs() < 1e-9);

        // Sweeping again without removal still reports; removal clears it.
        rm.remove_position("BTC");
        assert!(rm.check_positions(&prices).is_empty());
    }

    #[test]
    fn sweep_emits_take_profit_for_short() {
        let rm = manager();
        rm.register_position("ETH", Direction::Short, 3_000.0, 1.0, 2, 2.0, 5.0);

        let mut prices = HashMap::new();
        prices.insert("ETH".to_string(), 2_800.0);
        let events = rm.check_positions(&prices);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].reason, ExitReason::TakeProfit);
        assert!(events[0].pnl_usd > 0.0);
    }

    #[test]
    fn sweep_ignores_unpriced_symbols() {
        let rm = manager();
        rm.register_position("SOL", Direction::Long, 150.0, 10.0, 1, 2.0, 5.0);
        assert!(rm.check_positions(&HashMap::new()).is_empty());
    }
}
