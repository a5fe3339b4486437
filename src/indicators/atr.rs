// =============================================================================
// Average True Range (ATR) — Wilder's smoothing
// =============================================================================
//
// True Range per bar:
//   TR = max(H - L, |H - prevClose|, |L - prevClose|)
//
// ATR seeds with the SMA of the first `period` TR values and then applies
//   ATR_t = (ATR_{t-1} * (period - 1) + TR_t) / period
// =============================================================================

use crate::types::Candle;

/// Most recent ATR value, or `None` with fewer than `period + 1` candles.
pub fn calculate_atr(candles: &[Candle], period: usize) -> Option<f64> {
    calculate_atr_series(candles, period).last().copied()
}

/// Full ATR series; one value per bar starting at index `period`.
///
/// The screener needs the series to compare the current ATR against the SMA
/// of its own history, so this is the primitive and the scalar wraps it.
pub fn calculate_atr_series(candles: &[Candle], period: usize) -> Vec<f64> {
    if period == 0 || candles.len() < period + 1 {
        return Vec::new();
    }

    let mut true_ranges = Vec::with_capacity(candles.len() - 1);
    for pair in candles.windows(2) {
        let prev_close = pair[0].close;
        let bar = &pair[1];
        let tr = (bar.high - bar.low)
            .max((bar.high - prev_close).abs())
            .max((bar.low - prev_close).abs());
        true_ranges.push(tr);
    }

    let period_f = period as f64;
    let seed: f64 = true_ranges[..period].iter().sum::<f64>() / period_f;
    if !seed.is_finite() {
        return Vec::new();
    }

    let mut series = Vec::with_capacity(true_ranges.len() - period + 1);
    series.push(seed);

    let mut atr = seed;
    for &tr in &true_ranges[period..] {
        atr = (atr * (period_f - 1.0) + tr) / period_f;
        if !atr.is_finite() {
            break;
        }
        series.push(atr);
    }

    series
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
    fn atr_rejects_degenerate_input() {
        let candles = vec![candle(105.0, 95.0, 100.0); 10];
        assert!(calculate_atr(&candles, 0).is_none());
        assert!(calculate_atr(&candles, 14).is_none());
        assert!(calculate_atr_series(&candles, 14).is_empty());
    }

    #[test]
    fn atr_constant_range_converges() {
        // Range is 10 on every bar; ATR converges to 10.
        let candles: Vec<Candle> = (0..40)
            .map(|i| {
                let base = 100.0 + i as f64 * 0.05;
                candle(base + 5.0, base - 5.0, base)
            })
            .collect();
        let atr = calculate_atr(&candles, 14).unwrap();
        assert!((atr - 10.0).abs() < 0.5, "expected ATR near 10, got {atr}");
    }

    #[test]
    fn atr_gap_reflected_in_true_range() {
        // A gap up makes |H - prevClose| the dominant term.
        let candles = vec![
            candle(105.0, 95.0, 95.0),
            candle(118.0, 112.0, 115.0), // TR = |118 - 95| = 23
            candle(119.0, 113.0, 116.0),
            candle(120.0, 114.0, 117.0),
        ];
        let atr = calculate_atr(&candles, 3).unwrap();
        assert!(atr > 6.0, "gap should inflate ATR, got {atr}");
    }

    #[test]
    fn atr_series_length_and_tail() {
        let candles: Vec<Candle> = (0..30)
            .map(|i| {
                let base = 100.0 + i as f64;
                candle(base + 2.0, base - 2.0, base)
            })
            .collect();
        let series = calculate_atr_series(&candles, 14);
        // 29 TR values, seeded after 14 => 16 outputs.
        assert_eq!(series.len(), 16);
        assert_eq!(series.last().copied(), calculate_atr(&candles, 14));
    }

    #[test]
    fn atr_is_positive() {
        let candles: Vec<Candle> = (0..50)
            .map(|i| {
                let base = 200.0 + (i as f64 * 0.4).cos() * 15.0;
                candle(base + 3.0, base - 3.0, base + 1.0)
            })
            .collect();
        assert!(calculate_atr(&candles, 14).unwrap() > 0.0);
    }

    #[test]
    fn atr_nan_truncates() {
        let mut candles = vec![candle(105.0, 95.0, 100.0); 20];
        candles[10].high = f64::NAN;
        // Seed window includes the NaN => no series.
        assert!(calculate_atr_series(&candles, 14).is_empty());
    }
}
