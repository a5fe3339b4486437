// =============================================================================
// Ticker analysis — the 15-minute indicator payload fed to the LLM
// =============================================================================
//
// One payload per ticker: current 15m readings, classic pivot levels from the
// previous day, order-book side totals, and two windows of intraday series
// (the last 10 values of each, oldest → latest). Funding and open interest
// are explicit placeholders here; the screener reads the live values where
// they actually drive a decision.
// =============================================================================

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use tracing::{instrument, warn};

use crate::hyperliquid::HyperliquidClient;
use crate::indicators::{
    calculate_atr, calculate_ema, calculate_macd, calculate_pivot_points, calculate_rsi,
    PivotPoints,
};
use crate::types::closes;

/// How many points of each series the prompt carries.
const SERIES_LEN: usize = 10;

#[derive(Debug, Clone, Serialize)]
pub struct CurrentReadings {
    pub price: f64,
    pub ema_20: f64,
    pub macd: f64,
    pub rsi_7: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct IntradaySeries {
    pub mid_prices: Vec<f64>,
    pub ema_20: Vec<f64>,
    pub macd: Vec<f64>,
    pub rsi_7: Vec<f64>,
    pub rsi_14: Vec<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LongerTermBlock {
    pub ema_20_current: f64,
    pub ema_50_current: f64,
    pub atr_3_current: f64,
    pub atr_14_current: f64,
    pub volume_current: f64,
    pub volume_average: f64,
    pub macd_series: Vec<f64>,
    pub rsi_14_series: Vec<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DerivativesBlock {
    /// Placeholder — not wired from the venue in this payload.
    pub open_interest_latest: f64,
    pub open_interest_average: f64,
    pub funding_rate: f64,
}

/// Complete per-ticker analysis payload.
#[derive(Debug, Clone, Serialize)]
pub struct TickerAnalysis {
    pub ticker: String,
    pub timestamp: String,
    pub current: CurrentReadings,
    /// Human-readable bid/ask totals from the L2 book.
    pub orderbook_volume: String,
    pub pivot_points: PivotSummary,
    pub derivatives: DerivativesBlock,
    pub intraday: IntradaySeries,
    pub longer_term: LongerTermBlock,
}

/// Serializable mirror of [`PivotPoints`].
#[derive(Debug, Clone, Serialize)]
pub struct PivotSummary {
    pub pp: f64,
    pub s1: f64,
    pub s2: f64,
    pub r1: f64,
    pub r2: f64,
}

impl From<PivotPoints> for PivotSummary {
    fn from(p: PivotPoints) -> Self {
        Self {
            pp: p.pp,
            s1: p.s1,
            s2: p.s2,
            r1: p.r1,
            r2: p.r2,
        }
    }
}

pub struct MarketAnalyzer {
    venue: Arc<HyperliquidClient>,
}

impl MarketAnalyzer {
    pub fn new(venue: Arc<HyperliquidClient>) -> Self {
        Self { venue }
    }

    /// Analyze each ticker, skipping failures. Returns the concatenated
    /// prompt text and the structured payloads that produced it.
    pub async fn analyze_many(&self, tickers: &[String]) -> (String, Vec<TickerAnalysis>) {
        let mut text = String::new();
        let mut payloads = Vec::with_capacity(tickers.len());

        for ticker in tickers {
            match self.analyze_ticker(ticker).await {
                Ok(analysis) => {
                    text.push_str(&analysis.format_prompt());
                    payloads.push(analysis);
                }
                Err(e) => warn!(ticker = %ticker, error = %e, "ticker analysis failed"),
            }
        }

        (text, payloads)
    }

    #[instrument(skip(self), name = "analysis::ticker")]
    pub async fn analyze_ticker(&self, ticker: &str) -> Result<TickerAnalysis> {
        let symbol = ticker.to_uppercase();

        // Primary intraday window.
        let candles_15m = self
            .venue
            .candles(&symbol, "15m", 200)
            .await
            .context("15m candle fetch failed")?;
        if candles_15m.len() < 40 {
            anyhow::bail!("not enough 15m candles for {symbol} ({})", candles_15m.len());
        }

        let close_15m = closes(&candles_15m);
        let ema_20 = calculate_ema(&close_15m, 20);
        let macd = calculate_macd(&close_15m);
        let rsi_7 = calculate_rsi(&close_15m, 7);
        let rsi_14 = calculate_rsi(&close_15m, 14);

        let current = CurrentReadings {
            price: *close_15m.last().expect("candles non-empty"),
            ema_20: ema_20.last().copied().unwrap_or(0.0),
            macd: macd.last().map(|p| p.histogram).unwrap_or(0.0),
            rsi_7: rsi_7.last().copied().unwrap_or(50.0),
        };

        let intraday = IntradaySeries {
            mid_prices: tail(&close_15m),
            ema_20: tail(&ema_20),
            macd: tail(&macd.iter().map(|p| p.histogram).collect::<Vec<_>>()),
            rsi_7: tail(&rsi_7),
            rsi_14: tail(&rsi_14),
        };

        // Wider context on the same timeframe: the last 50 bars.
        let window = &candles_15m[candles_15m.len().saturating_sub(50)..];
        let window_closes = closes(window);
        let lt_ema_20 = calculate_ema(&window_closes, 20);
        let lt_ema_50 = calculate_ema(&window_closes, 50);
        let lt_atr_3 = calculate_atr(window, 3);
        let lt_atr_14 = calculate_atr(window, 14);
        let lt_macd = calculate_macd(&window_closes);
        let lt_rsi_14 = calculate_rsi(&window_closes, 14);

        let volumes: Vec<f64> = window.iter().map(|c| c.volume).collect();
        let volume_average = {
            let n = volumes.len().min(20);
            volumes[volumes.len() - n..].iter().sum::<f64>() / n as f64
        };

        let longer_term = LongerTermBlock {
            ema_20_current: lt_ema_20.last().copied().unwrap_or(0.0),
            ema_50_current: lt_ema_50.last().copied().unwrap_or(0.0),
            atr_3_current: lt_atr_3.unwrap_or(0.0),
            atr_14_current: lt_atr_14.unwrap_or(0.0),
            volume_current: volumes.last().copied().unwrap_or(0.0),
            volume_average,
            macd_series: tail(&lt_macd.iter().map(|p| p.histogram).collect::<Vec<_>>()),
            rsi_14_series: tail(&lt_rsi_14),
        };

        // Pivot levels from the previous completed day; when the daily
        // history is too short, the latest 15m bar stands in.
        let pivot = match self.venue.candles(&symbol, "1d", 3).await {
            Ok(daily) if daily.len() >= 2 => {
                let prev = &daily[daily.len() - 2];
                calculate_pivot_points(prev.high, prev.low, prev.close)
            }
            _ => {
                let last = candles_15m.last().expect("candles non-empty");
                calculate_pivot_points(last.high, last.low, last.close)
            }
        };

        let orderbook_volume = match self.venue.l2_snapshot(&symbol).await {
            Ok(book) => {
                let (bid, ask) = book.side_totals();
                format!("Bid Vol: {bid}, Ask Vol: {ask}")
            }
            Err(e) => format!("orderbook unavailable: {e}"),
        };

        Ok(TickerAnalysis {
            ticker: symbol,
            timestamp: Utc::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            current,
            orderbook_volume,
            pivot_points: pivot.into(),
            derivatives: DerivativesBlock {
                open_interest_latest: 0.0,
                open_interest_average: 0.0,
                funding_rate: 0.0,
            },
            intraday,
            longer_term,
        })
    }
}

impl TickerAnalysis {
    /// Render the payload as the prompt block the decision model reads.
    pub fn format_prompt(&self) -> String {
        let mut out = format!("\n<{}_data>\n", self.ticker);
        out.push_str(&format!(
            "Timestamp: {} (UTC) (Hyperliquid, 15m)\n\n",
            self.timestamp
        ));

        out.push_str(&format!(
            "current_price = {:.1}, current_ema20 = {:.3}, current_macd = {:.3}, current_rsi (7 period) = {:.3}\n\n",
            self.current.price, self.current.ema_20, self.current.macd, self.current.rsi_7
        ));
        out.push_str(&format!("Volume: {}\n\n", self.orderbook_volume));

        let p = &self.pivot_points;
        out.push_str("Pivot Points (based on previous day):\n");
        out.push_str(&format!(
            "R2 = {:.2}, R1 = {:.2}, PP = {:.2}, S1 = {:.2}, S2 = {:.2}\n\n",
            p.r2, p.r1, p.pp, p.s1, p.s2
        ));

        out.push_str(&format!(
            "Open Interest (placeholder): Latest: {:.2} Average: {:.2}\n",
            self.derivatives.open_interest_latest, self.derivatives.open_interest_average
        ));
        out.push_str(&format!(
            "Funding Rate: {:.2e}\n\n",
            self.derivatives.funding_rate
        ));

        out.push_str("Intraday series (15m, oldest → latest):\n");
        out.push_str(&format!("Mid prices: {:?}\n", rounded(&self.intraday.mid_prices, 1)));
        out.push_str(&format!(
            "EMA indicators (20-period): {:?}\n",
            rounded(&self.intraday.ema_20, 3)
        ));
        out.push_str(&format!("MACD indicators: {:?}\n", rounded(&self.intraday.macd, 3)));
        out.push_str(&format!(
            "RSI indicators (7-Period): {:?}\n",
            rounded(&self.intraday.rsi_7, 3)
        ));
        out.push_str(&format!(
            "RSI indicators (14-Period): {:?}\n\n",
            rounded(&self.intraday.rsi_14, 3)
        ));

        let lt = &self.longer_term;
        out.push_str("Longer-term context (still 15-minute timeframe, wider window):\n");
        out.push_str(&format!(
            "20-Period EMA: {:.3} vs. 50-Period EMA: {:.3}\n",
            lt.ema_20_current, lt.ema_50_current
        ));
        out.push_str(&format!(
            "3-Period ATR: {:.3} vs. 14-Period ATR: {:.3}\n",
            lt.atr_3_current, lt.atr_14_current
        ));
        out.push_str(&format!(
            "Current Volume: {:.3} vs. Average Volume: {:.3}\n",
            lt.volume_current, lt.volume_average
        ));
        out.push_str(&format!("MACD indicators: {:?}\n", rounded(&lt.macd_series, 3)));
        out.push_str(&format!(
            "RSI indicators (14-Period): {:?}\n",
            rounded(&lt.rsi_14_series, 3)
        ));
        out.push_str(&format!("</{}_data>\n", self.ticker));
        out
    }

    /// Latest price carried by the payload — lets the risk sweep reuse it
    /// instead of refetching mids.
    pub fn last_price(&self) -> f64 {
        self.current.price
    }
}

/// Last [`SERIES_LEN`] values of a series, oldest first.
fn tail(series: &[f64]) -> Vec<f64> {
    series[series.len().saturating_sub(SERIES_LEN)..].to_vec()
}

fn rounded(series: &[f64], decimals: u32) -> Vec<f64> {
    let scale = 10f64.powi(decimals as i32);
    series.iter().map(|v| (v * scale).round() / scale).collect()
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_takes_last_ten() {
        let series: Vec<f64> = (1..=25).map(|x| x as f64).collect();
        let t = tail(&series);
        assert_eq!(t.len(), 10);
        assert_eq!(t.first().copied(), Some(16.0));
        assert_eq!(t.last().copied(), Some(25.0));

        let short = vec![1.0, 2.0];
        assert_eq!(tail(&short), short);
    }

    #[test]
    fn rounding_helper() {
        assert_eq!(rounded(&[1.23456, 2.0], 3), vec![1.235, 2.0]);
        assert_eq!(rounded(&[99.99], 1), vec![100.0]);
    }

    #[test]
    fn prompt_carries_ticker_tags() {
        let analysis = TickerAnalysis {
            ticker: "BTC".into(),
            timestamp: "2024-05-15 12:00:00".into(),
            current: CurrentReadings {
                price: 50_000.0,
                ema_20: 49_900.0,
                macd: 12.5,
                rsi_7: 55.0,
            },
            orderbook_volume: "Bid Vol: 10, Ask Vol: 8".into(),
            pivot_points: PivotSummary {
                pp: 50_000.0,
                s1: 49_000.0,
                s2: 48_000.0,
                r1: 51_000.0,
                r2: 52_000.0,
            },
            derivatives: DerivativesBlock {
                open_interest_latest: 0.0,
                open_interest_average: 0.0,
                funding_rate: 0.0,
            },
            intraday: IntradaySeries {
                mid_prices: vec![49_950.0, 50_000.0],
                ema_20: vec![49_900.0],
                macd: vec![12.5],
                rsi_7: vec![55.0],
                rsi_14: vec![52.0],
            },
            longer_term: LongerTermBlock {
                ema_20_current: 49_900.0,
                ema_50_current: 49_500.0,
                atr_3_current: 120.0,
                atr_14_current: 180.0,
                volume_current: 1000.0,
                volume_average: 900.0,
                macd_series: vec![10.0, 12.5],
                rsi_14_series: vec![51.0, 52.0],
            },
        };

        let prompt = analysis.format_prompt();
        assert!(prompt.starts_with("\n<BTC_data>"));
        assert!(prompt.trim_end().ends_with("</BTC_data>"));
        assert!(prompt.contains("current_price = 50000.0"));
        assert!(prompt.contains("Pivot Points"));
        assert_eq!(analysis.last_price(), 50_000.0);
    }
}
