// =============================================================================
// Relative Strength Index (RSI) — Wilder's smoothing
// =============================================================================
//
//   avg_gain_t = (avg_gain_{t-1} * (period - 1) + gain_t) / period
//   avg_loss_t = (avg_loss_{t-1} * (period - 1) + loss_t) / period
//   RSI        = 100 - 100 / (1 + avg_gain / avg_loss)
//
// Averages are seeded with the simple mean of the first `period` deltas.
// =============================================================================

/// Compute the RSI series for `closes`.
///
/// One output value per close starting at index `period`; the first `period`
/// closes seed the gain/loss averages. Empty vec on degenerate input.
pub fn calculate_rsi(closes: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || closes.len() < period + 1 {
        return Vec::new();
    }

    let deltas: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();
    let period_f = period as f64;

    let mut avg_gain = deltas[..period].iter().filter(|&&d| d > 0.0).sum::<f64>() / period_f;
    let mut avg_loss = deltas[..period]
        .iter()
        .filter(|&&d| d < 0.0)
        .map(|d| -d)
        .sum::<f64>()
        / period_f;

    let mut series = Vec::with_capacity(deltas.len() - period + 1);
    match rsi_point(avg_gain, avg_loss) {
        Some(v) => series.push(v),
        None => return Vec::new(),
    }

    for &delta in &deltas[period..] {
        let gain = delta.max(0.0);
        let loss = (-delta).max(0.0);

        avg_gain = (avg_gain * (period_f - 1.0) + gain) / period_f;
        avg_loss = (avg_loss * (period_f - 1.0) + loss) / period_f;

        match rsi_point(avg_gain, avg_loss) {
            Some(v) => series.push(v),
            None => break,
        }
    }

    series
}

/// Map smoothed averages to an RSI value in [0, 100].
///
/// A market with no movement at all reads as neutral 50; all-gains reads 100.
fn rsi_point(avg_gain: f64, avg_loss: f64) -> Option<f64> {
    let rsi = if avg_loss == 0.0 && avg_gain == 0.0 {
        50.0
    } else if avg_loss == 0.0 {
        100.0
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    };
    rsi.is_finite().then_some(rsi)
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rsi_rejects_degenerate_input() {
        assert!(calculate_rsi(&[], 14).is_empty());
        assert!(calculate_rsi(&[1.0, 2.0, 3.0], 0).is_empty());
        // 14 closes give only 13 deltas.
        let closes: Vec<f64> = (1..=14).map(|x| x as f64).collect();
        assert!(calculate_rsi(&closes, 14).is_empty());
    }

    #[test]
    fn rsi_all_gains_reads_100() {
        let closes: Vec<f64> = (1..=40).map(|x| x as f64).collect();
        for v in calculate_rsi(&closes, 14) {
            assert!((v - 100.0).abs() < 1e-9, "expected 100, got {v}");
        }
    }

    #[test]
    fn rsi_all_losses_reads_0() {
        let closes: Vec<f64> = (1..=40).rev().map(|x| x as f64).collect();
        for v in calculate_rsi(&closes, 14) {
            assert!(v.abs() < 1e-9, "expected 0, got {v}");
        }
    }

    #[test]
    fn rsi_flat_reads_neutral() {
        let closes = vec![250.0; 40];
        for v in calculate_rsi(&closes, 14) {
            assert!((v - 50.0).abs() < 1e-9, "expected 50, got {v}");
        }
    }

    #[test]
    fn rsi_stays_in_range() {
        let closes: Vec<f64> = (0..120)
            .map(|i| 100.0 + (i as f64 * 0.7).sin() * 8.0)
            .collect();
        for v in calculate_rsi(&closes, 14) {
            assert!((0.0..=100.0).contains(&v), "RSI {v} out of range");
        }
    }

    #[test]
    fn rsi_series_length() {
        // n closes => n-1 deltas => n-1-period+1 = n-period outputs.
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + (i % 7) as f64).collect();
        assert_eq!(calculate_rsi(&closes, 14).len(), 60 - 14);
    }
}
