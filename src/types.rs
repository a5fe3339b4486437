// =============================================================================
// Shared types used across the Meridian trading agent
// =============================================================================

use serde::{Deserialize, Serialize};

/// Side of an exposure: long (price up) or short (price down).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// The side that closes an exposure of this direction.
    pub fn opposite(self) -> Self {
        match self {
            Self::Long => Self::Short,
            Self::Short => Self::Long,
        }
    }

    /// `true` when entering this direction means buying.
    pub fn is_buy(self) -> bool {
        matches!(self, Self::Long)
    }

    /// Signed multiplier for PnL arithmetic: +1 long, -1 short.
    pub fn sign(self) -> f64 {
        match self {
            Self::Long => 1.0,
            Self::Short => -1.0,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "long" => Some(Self::Long),
            "short" => Some(Self::Short),
            _ => None,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Long => write!(f, "long"),
            Self::Short => write!(f, "short"),
        }
    }
}

/// Why a trade was closed. Persisted verbatim in `executed_trades.exit_reason`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    Signal,
    Manual,
    SyncedFill,
    SyncedHistory,
    CircuitBreaker,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::StopLoss => "stop_loss",
            Self::TakeProfit => "take_profit",
            Self::Signal => "signal",
            Self::Manual => "manual",
            Self::SyncedFill => "synced_fill",
            Self::SyncedHistory => "synced_history",
            Self::CircuitBreaker => "circuit_breaker",
        };
        write!(f, "{s}")
    }
}

/// One OHLCV bar. Every slice this codebase passes around is oldest-first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    /// Bar open time, unix milliseconds.
    pub open_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    /// Bar close time, unix milliseconds.
    pub close_time: i64,
}

impl Candle {
    pub fn new(
        open_time: i64,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
        close_time: i64,
    ) -> Self {
        Self {
            open_time,
            open,
            high,
            low,
            close,
            volume,
            close_time,
        }
    }
}

/// Extract the close series from a candle slice.
pub fn closes(candles: &[Candle]) -> Vec<f64> {
    candles.iter().map(|c| c.close).collect()
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_roundtrip() {
        assert_eq!(Direction::parse("long"), Some(Direction::Long));
        assert_eq!(Direction::parse("SHORT"), Some(Direction::Short));
        assert_eq!(Direction::parse("flat"), None);
        assert_eq!(Direction::Long.opposite(), Direction::Short);
        assert!(Direction::Long.is_buy());
        assert!(!Direction::Short.is_buy());
        assert_eq!(Direction::Short.sign(), -1.0);
    }

    #[test]
    fn direction_serde_lowercase() {
        assert_eq!(serde_json::to_string(&Direction::Long).unwrap(), "\"long\"");
        let d: Direction = serde_json::from_str("\"short\"").unwrap();
        assert_eq!(d, Direction::Short);
    }

    #[test]
    fn exit_reason_display_matches_serde() {
        for reason in [
            ExitReason::StopLoss,
            ExitReason::TakeProfit,
            ExitReason::Signal,
            ExitReason::Manual,
            ExitReason::SyncedFill,
            ExitReason::SyncedHistory,
            ExitReason::CircuitBreaker,
        ] {
            let json = serde_json::to_string(&reason).unwrap();
            assert_eq!(json, format!("\"{reason}\""));
        }
    }
}
