// =============================================================================
// Trend Confirmation — top-down multi-timeframe gate (1d → 1h → 15m)
// =============================================================================
//
// Daily sets the regime (ADX + DI direction), hourly confirms momentum
// (price vs EMA stack, RSI extremes), 15m times the entry (MACD, distance to
// EMA20). Alignment across the three decides quality and confidence; the
// orchestrator additionally requires the recommended direction to match the
// model's decision before letting an open through.
// =============================================================================

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::config::TrendSettings;
use crate::hyperliquid::HyperliquidClient;
use crate::indicators::{calculate_adx, calculate_ema, calculate_macd, calculate_rsi};
use crate::screener::CoinMetrics;
use crate::types::{closes, Direction};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    StrongBullish,
    Bullish,
    Neutral,
    Bearish,
    StrongBearish,
}

impl TrendDirection {
    pub fn is_bullish(self) -> bool {
        matches!(self, Self::Bullish | Self::StrongBullish)
    }

    pub fn is_bearish(self) -> bool {
        matches!(self, Self::Bearish | Self::StrongBearish)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendQuality {
    Excellent,
    Good,
    Moderate,
    Poor,
    /// Analysis failed — never trade on it.
    Invalid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryQuality {
    Optimal,
    Acceptable,
    Wait,
}

/// Result of one multi-timeframe confirmation.
#[derive(Debug, Clone, Serialize)]
pub struct TrendConfirmation {
    pub symbol: String,
    pub direction: TrendDirection,
    pub quality: TrendQuality,
    pub confidence: f64,

    pub daily_trend: TrendDirection,
    pub hourly_trend: TrendDirection,
    pub m15_trend: TrendDirection,

    pub daily_adx: Option<f64>,
    pub hourly_rsi: Option<f64>,
    pub m15_macd_signal: &'static str,

    pub should_trade: bool,
    pub recommended_direction: Option<Direction>,
    pub entry_quality: EntryQuality,
}

impl TrendConfirmation {
    fn invalid(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            direction: TrendDirection::Neutral,
            quality: TrendQuality::Invalid,
            confidence: 0.0,
            daily_trend: TrendDirection::Neutral,
            hourly_trend: TrendDirection::Neutral,
            m15_trend: TrendDirection::Neutral,
            daily_adx: None,
            hourly_rsi: None,
            m15_macd_signal: "unknown",
            should_trade: false,
            recommended_direction: None,
            entry_quality: EntryQuality::Wait,
        }
    }
}

// ---------------------------------------------------------------------------
// Per-timeframe readings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct DailyReading {
    direction: TrendDirection,
    adx: Option<f64>,
}

#[derive(Debug, Clone, Copy)]
struct HourlyReading {
    direction: TrendDirection,
    rsi: Option<f64>,
    overbought: bool,
    oversold: bool,
}

#[derive(Debug, Clone, Copy)]
struct M15Reading {
    direction: TrendDirection,
    macd_signal: &'static str,
    near_ema: bool,
}

pub struct TrendEngine {
    venue: Arc<HyperliquidClient>,
    settings: TrendSettings,
}

impl TrendEngine {
    pub fn new(venue: Arc<HyperliquidClient>, settings: TrendSettings) -> Self {
        Self { venue, settings }
    }

    /// Run the full confirmation. `daily_metrics` reuses the screener's daily
    /// ADX/DI when available, saving a candle fetch.
    #[instrument(skip(self, daily_metrics), name = "trend::confirm")]
    pub async fn confirm_trend(
        &self,
        symbol: &str,
        daily_metrics: Option<&CoinMetrics>,
    ) -> TrendConfirmation {
        let daily = match self.analyze_daily(symbol, daily_metrics).await {
            Ok(d) => d,
            Err(e) => {
                warn!(symbol, error = %e, "daily analysis failed — trend invalid");
                return TrendConfirmation::invalid(symbol);
            }
        };
        let hourly = match self.analyze_hourly(symbol).await {
            Ok(h) => h,
            Err(e) => {
                warn!(symbol, error = %e, "hourly analysis failed — trend invalid");
                return TrendConfirmation::invalid(symbol);
            }
        };
        let m15 = match self.analyze_15m(symbol).await {
            Ok(m) => m,
            Err(e) => {
                warn!(symbol, error = %e, "15m analysis failed — trend invalid");
                return TrendConfirmation::invalid(symbol);
            }
        };

        let (direction, quality, confidence) = calculate_alignment(daily, hourly, m15);
        let should_trade = should_trade(quality, confidence, hourly, self.settings.min_confidence);
        let entry_quality = assess_entry_quality(m15, direction);

        let recommended_direction = if direction.is_bullish() {
            Some(Direction::Long)
        } else if direction.is_bearish() {
            Some(Direction::Short)
        } else {
            None
        };

        let result = TrendConfirmation {
            symbol: symbol.to_string(),
            direction,
            quality,
            confidence,
            daily_trend: daily.direction,
            hourly_trend: hourly.direction,
            m15_trend: m15.direction,
            daily_adx: daily.adx,
            hourly_rsi: hourly.rsi,
            m15_macd_signal: m15.macd_signal,
            should_trade,
            recommended_direction,
            entry_quality,
        };

        debug!(
            symbol,
            direction = ?result.direction,
            quality = ?result.quality,
            confidence = result.confidence,
            should_trade = result.should_trade,
            entry = ?result.entry_quality,
            "trend confirmation complete"
        );
        result
    }

    /// Daily regime from ADX strength and DI direction.
    async fn analyze_daily(
        &self,
        symbol: &str,
        precomputed: Option<&CoinMetrics>,
    ) -> anyhow::Result<DailyReading> {
        let (adx, plus_di, minus_di) = match precomputed {
            Some(m) if m.adx_14.is_some() => (
                m.adx_14.unwrap_or(0.0),
                m.plus_di.unwrap_or(0.0),
                m.minus_di.unwrap_or(0.0),
            ),
            _ => {
                let candles = self.venue.candles(symbol, "1d", 50).await?;
                match calculate_adx(&candles, 14) {
                    Some(di) => (di.adx, di.plus_di, di.minus_di),
                    None => {
                        return Ok(DailyReading {
                            direction: TrendDirection::Neutral,
                            adx: None,
                        })
                    }
                }
            }
        };

        let direction = if adx > self.settings.adx_threshold {
            match (plus_di > minus_di, adx > 40.0) {
                (true, true) => TrendDirection::StrongBullish,
                (true, false) => TrendDirection::Bullish,
                (false, true) => TrendDirection::StrongBearish,
                (false, false) => TrendDirection::Bearish,
            }
        } else {
            TrendDirection::Neutral
        };

        Ok(DailyReading {
            direction,
            adx: Some(adx),
        })
    }

    /// Hourly momentum from the price/EMA20/EMA50 stack plus RSI extremes.
    async fn analyze_hourly(&self, symbol: &str) -> anyhow::Result<HourlyReading> {
        let candles = self.venue.candles(symbol, "1h", 100).await?;
        if candles.len() < 50 {
            return Ok(HourlyReading {
                direction: TrendDirection::Neutral,
                rsi: None,
                overbought: false,
                oversold: false,
            });
        }

        let close_series = closes(&candles);
        let price = *close_series.last().expect("candles non-empty");
        let ema_20 = calculate_ema(&close_series, 20).last().copied().unwrap_or(price);
        let ema_50 = calculate_ema(&close_series, 50).last().copied().unwrap_or(price);
        let rsi = calculate_rsi(&close_series, 14).last().copied();

        let direction = if price > ema_20 && ema_20 > ema_50 {
            TrendDirection::Bullish
        } else if price < ema_20 && ema_20 < ema_50 {
            TrendDirection::Bearish
        } else {
            TrendDirection::Neutral
        };

        Ok(HourlyReading {
            direction,
            rsi,
            overbought: rsi.is_some_and(|r| r > self.settings.rsi_overbought),
            oversold: rsi.is_some_and(|r| r < self.settings.rsi_oversold),
        })
    }

    /// 15m entry timing from MACD and distance to EMA20.
    async fn analyze_15m(&self, symbol: &str) -> anyhow::Result<M15Reading> {
        let candles = self.venue.candles(symbol, "15m", 100).await?;
        if candles.len() < 50 {
            return Ok(M15Reading {
                direction: TrendDirection::Neutral,
                macd_signal: "unknown",
                near_ema: false,
            });
        }

        let close_series = closes(&candles);
        let price = *close_series.last().expect("candles non-empty");

        let (direction, macd_signal) = match calculate_macd(&close_series).last() {
            Some(p) if p.macd > p.signal && p.histogram > 0.0 => {
                (TrendDirection::Bullish, "bullish")
            }
            Some(p) if p.macd < p.signal && p.histogram < 0.0 => {
                (TrendDirection::Bearish, "bearish")
            }
            Some(_) => (TrendDirection::Neutral, "neutral"),
            None => (TrendDirection::Neutral, "unknown"),
        };

        let ema_20 = calculate_ema(&close_series, 20).last().copied().unwrap_or(price);
        let near_ema = ema_20 > 0.0 && ((price - ema_20).abs() / ema_20 * 100.0) < 0.5;

        Ok(M15Reading {
            direction,
            macd_signal,
            near_ema,
        })
    }
}

// ---------------------------------------------------------------------------
// Pure alignment rules
// ---------------------------------------------------------------------------

fn calculate_alignment(
    daily: DailyReading,
    hourly: HourlyReading,
    m15: M15Reading,
) -> (TrendDirection, TrendQuality, f64) {
    let directions = [daily.direction, hourly.direction, m15.direction];
    let bullish = directions.iter().filter(|d| d.is_bullish()).count();
    let bearish = directions.iter().filter(|d| d.is_bearish()).count();

    let direction = if bullish >= 2 {
        if bullish == 3 {
            TrendDirection::StrongBullish
        } else {
            TrendDirection::Bullish
        }
    } else if bearish >= 2 {
        if bearish == 3 {
            TrendDirection::StrongBearish
        } else {
            TrendDirection::Bearish
        }
    } else {
        TrendDirection::Neutral
    };

    let (quality, confidence) = if bullish == 3 || bearish == 3 {
        (TrendQuality::Excellent, 0.95)
    } else if bullish == 2 || bearish == 2 {
        // The daily/hourly pair is the structural one; a 15m dissent is
        // timing noise, a daily/hourly split is a real conflict.
        let daily_hourly_aligned = (daily.direction.is_bullish() && hourly.direction.is_bullish())
            || (daily.direction.is_bearish() && hourly.direction.is_bearish());
        if daily_hourly_aligned {
            (TrendQuality::Good, 0.80)
        } else {
            (TrendQuality::Moderate, 0.65)
        }
    } else {
        (TrendQuality::Poor, 0.40)
    };

    (direction, quality, confidence)
}

fn should_trade(
    quality: TrendQuality,
    confidence: f64,
    hourly: HourlyReading,
    min_confidence: f64,
) -> bool {
    if matches!(quality, TrendQuality::Poor | TrendQuality::Invalid) {
        return false;
    }
    if confidence < min_confidence {
        return false;
    }
    // RSI at an extreme is tolerated only on a fully aligned trend.
    if (hourly.overbought || hourly.oversold) && quality != TrendQuality::Excellent {
        return false;
    }
    true
}

fn assess_entry_quality(m15: M15Reading, direction: TrendDirection) -> EntryQuality {
    let macd_agrees = (direction.is_bullish() && m15.macd_signal == "bullish")
        || (direction.is_bearish() && m15.macd_signal == "bearish");

    if m15.near_ema && macd_agrees {
        EntryQuality::Optimal
    } else if macd_agrees {
        EntryQuality::Acceptable
    } else {
        EntryQuality::Wait
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn daily(direction: TrendDirection) -> DailyReading {
        DailyReading {
            direction,
            adx: Some(30.0),
        }
    }

    fn hourly(direction: TrendDirection) -> HourlyReading {
        HourlyReading {
            direction,
            rsi: Some(55.0),
            overbought: false,
            oversold: false,
        }
    }

    fn m15(direction: TrendDirection, macd_signal: &'static str, near_ema: bool) -> M15Reading {
        M15Reading {
            direction,
            macd_signal,
            near_ema,
        }
    }

    #[test]
    fn full_alignment_is_excellent() {
        let (dir, quality, confidence) = calculate_alignment(
            daily(TrendDirection::StrongBullish),
            hourly(TrendDirection::Bullish),
            m15(TrendDirection::Bullish, "bullish", true),
        );
        assert_eq!(dir, TrendDirection::StrongBullish);
        assert_eq!(quality, TrendQuality::Excellent);
        assert_eq!(confidence, 0.95);
    }

    #[test]
    fn daily_hourly_pair_is_good() {
        let (dir, quality, confidence) = calculate_alignment(
            daily(TrendDirection::Bearish),
            hourly(TrendDirection::Bearish),
            m15(TrendDirection::Bullish, "bullish", false),
        );
        assert_eq!(dir, TrendDirection::Bearish);
        assert_eq!(quality, TrendQuality::Good);
        assert_eq!(confidence, 0.80);
    }

    #[test]
    fn daily_hourly_conflict_is_moderate() {
        let (dir, quality, confidence) = calculate_alignment(
            daily(TrendDirection::Bearish),
            hourly(TrendDirection::Bullish),
            m15(TrendDirection::Bullish, "bullish", false),
        );
        assert_eq!(dir, TrendDirection::Bullish);
        assert_eq!(quality, TrendQuality::Moderate);
        assert_eq!(confidence, 0.65);
    }

    #[test]
    fn no_majority_is_poor() {
        let (dir, quality, confidence) = calculate_alignment(
            daily(TrendDirection::Neutral),
            hourly(TrendDirection::Bullish),
            m15(TrendDirection::Bearish, "bearish", false),
        );
        assert_eq!(dir, TrendDirection::Neutral);
        assert_eq!(quality, TrendQuality::Poor);
        assert_eq!(confidence, 0.40);
    }

    #[test]
    fn should_trade_gates() {
        let calm = hourly(TrendDirection::Bullish);
        assert!(should_trade(TrendQuality::Good, 0.80, calm, 0.6));
        assert!(!should_trade(TrendQuality::Poor, 0.40, calm, 0.6));
        assert!(!should_trade(TrendQuality::Invalid, 0.0, calm, 0.6));
        // Below the configured floor.
        assert!(!should_trade(TrendQuality::Moderate, 0.65, calm, 0.7));

        let hot = HourlyReading {
            direction: TrendDirection::Bullish,
            rsi: Some(82.0),
            overbought: true,
            oversold: false,
        };
        // Extreme RSI blocks anything short of excellent.
        assert!(!should_trade(TrendQuality::Good, 0.80, hot, 0.6));
        assert!(should_trade(TrendQuality::Excellent, 0.95, hot, 0.6));
    }

    #[test]
    fn entry_quality_tiers() {
        assert_eq!(
            assess_entry_quality(
                m15(TrendDirection::Bullish, "bullish", true),
                TrendDirection::Bullish
            ),
            EntryQuality::Optimal
        );
        assert_eq!(
            assess_entry_quality(
                m15(TrendDirection::Bullish, "bullish", false),
                TrendDirection::StrongBullish
            ),
            EntryQuality::Acceptable
        );
        // MACD disagreeing with the overall direction always waits.
        assert_eq!(
            assess_entry_quality(
                m15(TrendDirection::Bullish, "bullish", true),
                TrendDirection::Bearish
            ),
            EntryQuality::Wait
        );
        assert_eq!(
            assess_entry_quality(
                m15(TrendDirection::Neutral, "neutral", true),
                TrendDirection::Bullish
            ),
            EntryQuality::Wait
        );
    }
}
