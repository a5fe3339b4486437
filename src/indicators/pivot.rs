// =============================================================================
// Classic Pivot Points — computed from the previous day's OHLC
// =============================================================================
//
//   PP = (H + L + C) / 3
//   S1 = 2*PP - H      R1 = 2*PP - L
//   S2 = PP - (H - L)  R2 = PP + (H - L)
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PivotPoints {
    pub pp: f64,
    pub s1: f64,
    pub s2: f64,
    pub r1: f64,
    pub r2: f64,
}

/// Pivot levels from a single bar's high, low and close (conventionally the
/// previous day's).
pub fn calculate_pivot_points(high: f64, low: f64, close: f64) -> PivotPoints {
    let pp = (high + low + close) / 3.0;
    PivotPoints {
        pp,
        s1: 2.0 * pp - high,
        s2: pp - (high - low),
        r1: 2.0 * pp - low,
        r2: pp + (high - low),
    }
}
