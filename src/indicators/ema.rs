// =============================================================================
// Moving Averages — EMA and SMA
// =============================================================================
//
// EMA weights recent prices more heavily than the SMA:
//   k     = 2 / (period + 1)
//   EMA_t = close_t * k + EMA_{t-1} * (1 - k)
// The series is seeded with the SMA of the first `period` closes, so output
// element 0 corresponds to input index `period - 1`.
// =============================================================================

/// Compute the EMA series for `closes` with the given look-back `period`.
///
/// Returns an empty vec when `period` is zero or the input is shorter than
/// `period`. A non-finite intermediate value truncates the series; consumers
/// must not trust values past a broken point.
pub fn calculate_ema(closes: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || closes.len() < period {
        return Vec::new();
    }

    let k = 2.0 / (period as f64 + 1.0);

    let seed: f64 = closes[..period].iter().sum::<f64>() / period as f64;
    if !seed.is_finite() {
        return Vec::new();
    }

    let mut series = Vec::with_capacity(closes.len() - period + 1);
    series.push(seed);

    let mut ema = seed;
    for &close in &closes[period..] {
        ema = close * k + ema * (1.0 - k);
        if !ema.is_finite() {
            break;
        }
        series.push(ema);
    }

    series
}

/// Simple moving average of the last `period` values.
///
/// Returns `None` when `period` is zero, the input is too short, or the mean
/// is non-finite.
pub fn calculate_sma(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    let mean = values[values.len() - period..].iter().sum::<f64>() / period as f64;
    mean.is_finite().then_some(mean)
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ema_rejects_degenerate_input() {
        assert!(calculate_ema(&[], 5).is_empty());
        assert!(calculate_ema(&[1.0, 2.0, 3.0], 0).is_empty());
        assert!(calculate_ema(&[1.0, 2.0], 5).is_empty());
    }

    #[test]
    fn ema_seed_is_sma() {
        let ema = calculate_ema(&[2.0, 4.0, 6.0], 3);
        assert_eq!(ema.len(), 1);
        assert!((ema[0] - 4.0).abs() < 1e-12);
    }

    #[test]
    fn ema_known_values() {
        // 4-period EMA of 1..=8: seed = 2.5, k = 0.4.
        let closes: Vec<f64> = (1..=8).map(|x| x as f64).collect();
        let ema = calculate_ema(&closes, 4);
        assert_eq!(ema.len(), 5);

        let k: f64 = 0.4;
        let mut expected = 2.5;
        assert!((ema[0] - expected).abs() < 1e-12);
        for (i, &close) in closes[4..].iter().enumerate() {
            expected = close * k + expected * (1.0 - k);
            assert!((ema[i + 1] - expected).abs() < 1e-12);
        }
    }

    #[test]
    fn ema_truncates_on_nan() {
        let closes = vec![1.0, 2.0, 3.0, f64::NAN, 5.0, 6.0];
        let ema = calculate_ema(&closes, 3);
        // Seed survives; the NaN close poisons the next step.
        assert_eq!(ema.len(), 1);
    }

    #[test]
    fn ema_tracks_trend_direction() {
        let rising: Vec<f64> = (1..=100).map(|x| x as f64).collect();
        let ema20 = calculate_ema(&rising, 20);
        let ema50 = calculate_ema(&rising, 50);
        // Faster EMA sits above the slower one in an uptrend.
        assert!(ema20.last().unwrap() > ema50.last().unwrap());
    }

    #[test]
    fn sma_basic() {
        assert_eq!(calculate_sma(&[1.0, 2.0, 3.0, 4.0], 2), Some(3.5));
        assert_eq!(calculate_sma(&[1.0], 2), None);
        assert_eq!(calculate_sma(&[1.0, 2.0], 0), None);
    }

    #[test]
    fn sma_uses_tail_window() {
        // Only the last `period` values count.
        let values = [100.0, 100.0, 1.0, 2.0, 3.0];
        assert_eq!(calculate_sma(&values, 3), Some(2.0));
    }
}
