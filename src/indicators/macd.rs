// =============================================================================
// Moving Average Convergence Divergence (MACD)
// =============================================================================
//
// Standard 12/26/9 parameterisation:
//   macd      = EMA(12) - EMA(26)
//   signal    = EMA(9) of the macd line
//   histogram = macd - signal
//
// The histogram sign is what the 15-minute entry-timing layer consumes; the
// raw lines are kept for prompt context.
// =============================================================================

use super::ema::calculate_ema;

/// One point of the MACD complex.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MacdPoint {
    pub macd: f64,
    pub signal: f64,
    pub histogram: f64,
}

const FAST: usize = 12;
const SLOW: usize = 26;
const SIGNAL: usize = 9;

/// Compute the MACD series (12/26/9) for `closes`.
///
/// Output is aligned to the tail of the input: the last element describes the
/// most recent close. Empty vec when there is not enough data for the slow
/// EMA plus the signal seed (34 closes).
pub fn calculate_macd(closes: &[f64]) -> Vec<MacdPoint> {
    if closes.len() < SLOW + SIGNAL - 1 {
        return Vec::new();
    }

    let ema_fast = calculate_ema(closes, FAST);
    let ema_slow = calculate_ema(closes, SLOW);
    if ema_fast.is_empty() || ema_slow.is_empty() {
        return Vec::new();
    }

    // Both series end at the latest close; align them from the tail.
    let n = ema_slow.len().min(ema_fast.len());
    let fast_tail = &ema_fast[ema_fast.len() - n..];
    let slow_tail = &ema_slow[ema_slow.len() - n..];

    let macd_line: Vec<f64> = fast_tail
        .iter()
        .zip(slow_tail.iter())
        .map(|(f, s)| f - s)
        .collect();

    let signal_line = calculate_ema(&macd_line, SIGNAL);
    if signal_line.is_empty() {
        return Vec::new();
    }

    let offset = macd_line.len() - signal_line.len();
    macd_line[offset..]
        .iter()
        .zip(signal_line.iter())
        .map(|(&macd, &signal)| MacdPoint {
            macd,
            signal,
            histogram: macd - signal,
        })
        .collect()
}
