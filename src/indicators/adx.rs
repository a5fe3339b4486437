// =============================================================================
// Average Directional Index (ADX) with +DI / -DI
// =============================================================================
//
// Wilder's directional-movement system:
//   1. +DM / -DM and True Range per bar.
//   2. Wilder-smooth all three over `period`.
//   3. +DI = 100 * smoothed(+DM) / smoothed(TR), same for -DI.
//   4. DX  = 100 * |+DI - -DI| / (+DI + -DI)
//   5. ADX = Wilder-smoothed average of DX.
//
// ADX measures trend strength; the DI pair carries the direction. The trend
// layer reads `adx > 25` as trending and the DI comparison as the sign.
// =============================================================================

use crate::types::Candle;

/// The directional-movement triple for the most recent bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalIndex {
    pub adx: f64,
    pub plus_di: f64,
    pub minus_di: f64,
}

/// Compute ADX, +DI and -DI from `candles`.
///
/// Needs at least `2 * period + 1` bars: `period` to seed the DM/TR smoothing
/// and another `period` DX values to seed the ADX average. Returns `None`
/// below that, for `period == 0`, or when smoothed TR collapses to zero.
pub fn calculate_adx(candles: &[Candle], period: usize) -> Option<DirectionalIndex> {
    if period == 0 || candles.len() < 2 * period + 1 {
        return None;
    }

    let transitions = candles.len() - 1;
    let mut plus_dm = Vec::with_capacity(transitions);
    let mut minus_dm = Vec::with_capacity(transitions);
    let mut true_range = Vec::with_capacity(transitions);

    for pair in candles.windows(2) {
        let (prev, bar) = (&pair[0], &pair[1]);

        let tr = (bar.high - bar.low)
            .max((bar.high - prev.close).abs())
            .max((bar.low - prev.close).abs());

        let up = bar.high - prev.high;
        let down = prev.low - bar.low;

        plus_dm.push(if up > down && up > 0.0 { up } else { 0.0 });
        minus_dm.push(if down > up && down > 0.0 { down } else { 0.0 });
        true_range.push(tr);
    }

    let period_f = period as f64;
    let mut sm_plus: f64 = plus_dm[..period].iter().sum();
    let mut sm_minus: f64 = minus_dm[..period].iter().sum();
    let mut sm_tr: f64 = true_range[..period].iter().sum();

    let mut dx_values = Vec::with_capacity(transitions - period + 1);
    let (mut plus_di, mut minus_di);

    let first = directional_point(sm_plus, sm_minus, sm_tr)?;
    plus_di = first.0;
    minus_di = first.1;
    dx_values.push(first.2);

    for i in period..transitions {
        sm_plus = sm_plus - sm_plus / period_f + plus_dm[i];
        sm_minus = sm_minus - sm_minus / period_f + minus_dm[i];
        sm_tr = sm_tr - sm_tr / period_f + true_range[i];

        let point = directional_point(sm_plus, sm_minus, sm_tr)?;
        plus_di = point.0;
        minus_di = point.1;
        dx_values.push(point.2);
    }

    if dx_values.len() < period {
        return None;
    }

    let mut adx = dx_values[..period].iter().sum::<f64>() / period_f;
    for &dx in &dx_values[period..] {
        adx = (adx * (period_f - 1.0) + dx) / period_f;
    }

    if !adx.is_finite() {
        return None;
    }

    Some(DirectionalIndex {
        adx,
        plus_di,
        minus_di,
    })
}

/// (+DI, -DI, DX) from smoothed inputs; `None` when TR is zero or non-finite.
fn directional_point(sm_plus: f64, sm_minus: f64, sm_tr: f64) -> Option<(f64, f64, f64)> {
    if sm_tr == 0.0 || !sm_tr.is_finite() {
        return None;
    }

    let plus_di = 100.0 * sm_plus / sm_tr;
    let minus_di = 100.0 * sm_minus / sm_tr;
    let di_sum = plus_di + minus_di;

    let dx = if di_sum == 0.0 {
        0.0
    } else {
        100.0 * (plus_di - minus_di).abs() / di_sum
    };

    dx.is_finite().then_some((plus_di, minus_di, dx))
}
