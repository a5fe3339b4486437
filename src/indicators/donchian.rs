// =============================================================================
// Donchian Channel — highest high / lowest low over N bars
// =============================================================================
//
// The normalized position of the close within the channel,
//   position = (close - lower) / (upper - lower)
// is clamped to [0, 1] even when the latest close pierces the channel (the
// channel window may exclude the current bar's extremes).
// =============================================================================

use crate::types::Candle;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DonchianChannel {
    pub upper: f64,
    pub lower: f64,
    /// Close position inside the channel, clamped to [0, 1].
    pub position: f64,
}

/// Compute the Donchian channel over the last `period` bars.
///
/// Returns `None` with fewer than `period` candles or a degenerate (zero
/// width) channel.
pub fn calculate_donchian(candles: &[Candle], period: usize) -> Option<DonchianChannel> {
    if period == 0 || candles.len() < period {
        return None;
    }

    let window = &candles[candles.len() - period..];
    let upper = window.iter().map(|c| c.high).fold(f64::MIN, f64::max);
    let lower = window.iter().map(|c| c.low).fold(f64::MAX, f64::min);

    if !upper.is_finite() || !lower.is_finite() || upper <= lower {
        return None;
    }

    let close = candles.last()?.close;
    let position = ((close - lower) / (upper - lower)).clamp(0.0, 1.0);

    Some(DonchianChannel {
        upper,
        lower,
        position,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn candle(high: f64, low: f64, close: f64) -> Candle {
        Candle::new(0, (high + low) / 2.0, high, low, close, 1.0, 0)
    }

    #[test]
    fn donchian_rejects_degenerate_input() {
        let candles = vec![candle(105.0, 95.0, 100.0); 10];
        assert!(calculate_donchian(&candles, 0).is_none());
        assert!(calculate_donchian(&candles, 20).is_none());
        // Zero-width channel.
        let flat = vec![candle(100.0, 100.0, 100.0); 20];
        assert!(calculate_donchian(&flat, 20).is_none());
    }

    #[test]
    fn donchian_bounds() {
        let mut candles = vec![candle(110.0, 90.0, 100.0); 19];
        candles.push(candle(112.0, 95.0, 105.0));
        let ch = calculate_donchian(&candles, 20).unwrap();
        assert_eq!(ch.upper, 112.0);
        assert_eq!(ch.lower, 90.0);
        assert!((ch.position - (105.0 - 90.0) / 22.0).abs() < 1e-12);
    }

    #[test]
    fn donchian_position_clamps_above() {
        // Close above the window high (window excludes the close's own spike).
        let mut candles = vec![candle(110.0, 90.0, 100.0); 20];
        candles.push(candle(110.0, 100.0, 140.0));
        let ch = calculate_donchian(&candles, 20).unwrap();
        assert_eq!(ch.position, 1.0);
    }

    #[test]
    fn donchian_position_clamps_below() {
        let mut candles = vec![candle(110.0, 90.0, 100.0); 20];
        candles.push(candle(100.0, 90.0, 40.0));
        let ch = calculate_donchian(&candles, 20).unwrap();
        assert_eq!(ch.position, 0.0);
    }

    #[test]
    fn donchian_uses_tail_window() {
        // Old extremes outside the window must not count.
        let mut candles = vec![candle(500.0, 10.0, 100.0); 5];
        candles.extend(std::iter::repeat_with(|| candle(110.0, 90.0, 100.0)).take(20));
        let ch = calculate_donchian(&candles, 20).unwrap();
        assert_eq!(ch.upper, 110.0);
        assert_eq!(ch.lower, 90.0);
    }
}
