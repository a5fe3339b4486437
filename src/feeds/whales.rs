// =============================================================================
// Whale feed — large-transfer alerts from whale-alert.io
// =============================================================================
//
// The public data.json endpoint returns alerts as CSV lines:
//   timestamp,emoji,amount,usd_value,description,link
// Amounts and USD values carry thousands separators inside quotes
// ("39,995 #ETH", "$119,668,458"), so the line goes through a real CSV
// reader, never a naive comma split.
//
// Only alerts touching the assets this engine trades (or a known exchange)
// reach the prompt; survivors are ranked by USD value, largest first, and
// capped so whale noise cannot crowd out the rest of the context.
// =============================================================================

use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use serde_json::Value;

const WHALE_URL: &str =
    "https://whale-alert.io/data.json?alerts=9&prices=BTC&news=true";

/// Assets whose transfers matter to this engine.
const RELEVANT_ASSETS: &[&str] = &["BTC", "ETH", "SOL", "USDT", "USDC"];

/// Exchange names worth flagging regardless of asset (matched lowercase,
/// substring — several contain dots).
const KNOWN_EXCHANGES: &[&str] = &[
    "binance", "okex", "okx", "coinbase", "kraken", "bitfinex", "huobi", "kucoin", "bybit",
    "gate.io", "bitmex", "ftx", "gemini", "crypto.com", "bitstamp", "bittrex", "poloniex",
];

/// At most this many relevant alerts survive into the prompt.
const MAX_RELEVANT_ALERTS: usize = 5;

#[derive(Debug, Clone, Serialize)]
pub struct WhaleAlert {
    pub timestamp: Option<DateTime<Utc>>,
    pub amount: String,
    pub usd_value: String,
    pub description: String,
    pub link: String,
}

pub struct WhaleFeed {
    http: reqwest::Client,
}

impl WhaleFeed {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .expect("failed to build whale HTTP client"),
        }
    }

    /// Fetch, parse, filter to relevant alerts, rank by USD value and cap.
    pub async fn fetch_alerts(&self) -> Result<Vec<WhaleAlert>> {
        let body: Value = self
            .http
            .get(WHALE_URL)
            .send()
            .await
            .context("whale alert request failed")?
            .error_for_status()?
            .json()
            .await
            .context("whale alert body is not JSON")?;

        let raw_alerts = body
            .get("alerts")
            .and_then(Value::as_array)
            .context("whale alert response missing 'alerts'")?;

        let parsed = raw_alerts
            .iter()
            .filter_map(Value::as_str)
            .filter_map(parse_alert_line)
            .collect();

        Ok(select_relevant(parsed))
    }
}

impl Default for WhaleFeed {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse one "timestamp,emoji,amount,usd,description,link" alert line with
/// quote-aware CSV semantics.
fn parse_alert_line(line: &str) -> Option<WhaleAlert> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(line.as_bytes());

    let record = reader.records().next()?.ok()?;
    if record.len() < 6 {
        return None;
    }

    let field = |i: usize| record.get(i).unwrap_or("").trim().trim_matches('"').to_string();

    let timestamp = record
        .get(0)?
        .trim()
        .parse::<i64>()
        .ok()
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single());

    Some(WhaleAlert {
        timestamp,
        amount: field(2),
        usd_value: field(3),
        description: field(4),
        link: field(5),
    })
}

/// Keep only alerts touching a relevant asset or a known exchange, ranked
/// by descending USD value and capped at [`MAX_RELEVANT_ALERTS`].
fn select_relevant(alerts: Vec<WhaleAlert>) -> Vec<WhaleAlert> {
    let mut relevant: Vec<WhaleAlert> = alerts.into_iter().filter(is_relevant).collect();
    relevant.sort_by(|a, b| {
        usd_numeric(&b.usd_value)
            .partial_cmp(&usd_numeric(&a.usd_value))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    relevant.truncate(MAX_RELEVANT_ALERTS);
    relevant
}

fn is_relevant(alert: &WhaleAlert) -> bool {
    if contains_asset(&alert.amount) || contains_asset(&alert.description) {
        return true;
    }
    let description = alert.description.to_ascii_lowercase();
    KNOWN_EXCHANGES.iter().any(|ex| description.contains(ex))
}

/// Whether the text mentions a relevant asset as its own token ("#ETH",
/// "39,995 ETH"); "ETHEREUM" does not count.
fn contains_asset(text: &str) -> bool {
    let upper = text.to_ascii_uppercase();
    upper
        .split(|c: char| !c.is_ascii_alphanumeric())
        .any(|token| RELEVANT_ASSETS.contains(&token))
}

/// "$119,668,458" → 119668458.0; unparsable values sort last.
fn usd_numeric(usd: &str) -> f64 {
    usd.replace(['$', ','], "")
        .trim()
        .parse()
        .unwrap_or(0.0)
}

/// Render alerts as a prompt block.
pub fn format_alerts(alerts: &[WhaleAlert]) -> String {
    if alerts.is_empty() {
        return "No significant whale movements.".to_string();
    }

    let mut out = String::from("Recent whale movements (largest first):\n");
    for alert in alerts {
        let when = alert
            .timestamp
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "recent".to_string());
        out.push_str(&format!(
            "- [{when}] {} ({}) — {}\n",
            alert.amount, alert.usd_value, alert.description
        ));
        if !alert.link.is_empty() {
            out.push_str(&format!("  {}\n", alert.link));
        }
    }
    out
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn alert(amount: &str, usd_value: &str, description: &str) -> WhaleAlert {
        WhaleAlert {
            timestamp: None,
            amount: amount.to_string(),
            usd_value: usd_value.to_string(),
            description: description.to_string(),
            link: String::new(),
        }
    }

    #[test]
    fn parses_quoted_thousands_separators() {
        let line = r#"1700000000,🚨,"39,995 #ETH","$119,668,458","transferred from #OKEX to unknown wallet",https://example.com/tx"#;
        let alert = parse_alert_line(line).unwrap();
        // Quoted commas stay inside their fields.
        assert_eq!(alert.amount, "39,995 #ETH");
        assert_eq!(alert.usd_value, "$119,668,458");
        assert_eq!(alert.description, "transferred from #OKEX to unknown wallet");
        assert_eq!(alert.link, "https://example.com/tx");
        assert!(alert.timestamp.is_some());
    }

    #[test]
    fn parses_simple_line() {
        let line = "1700000000,🚨,5000 BTC,$150M,transferred to Binance,https://example.com/tx";
        let alert = parse_alert_line(line).unwrap();
        assert_eq!(alert.amount, "5000 BTC");
        assert_eq!(alert.usd_value, "$150M");
        assert_eq!(alert.description, "transferred to Binance");
    }

    #[test]
    fn rejects_malformed_line() {
        assert!(parse_alert_line("only,three,fields").is_none());
        assert!(parse_alert_line("").is_none());
    }

    #[test]
    fn usd_value_parsing() {
        assert_eq!(usd_numeric("$119,668,458"), 119_668_458.0);
        assert_eq!(usd_numeric("1,500"), 1_500.0);
        assert_eq!(usd_numeric("not money"), 0.0);
    }

    #[test]
    fn asset_tokens_match_but_substrings_do_not() {
        assert!(contains_asset("39,995 #ETH"));
        assert!(contains_asset("5000 BTC"));
        assert!(!contains_asset("staked on ETHEREUM"));
        assert!(!contains_asset("1,000,000 #DOGE"));
    }

    #[test]
    fn relevance_filter() {
        // Relevant asset in the amount.
        assert!(is_relevant(&alert("5,000 BTC", "$150M", "to unknown wallet")));
        // Known exchange in the description.
        assert!(is_relevant(&alert(
            "9,000,000 #XYZ",
            "$1M",
            "transferred from #Binance to unknown wallet"
        )));
        // Neither asset nor exchange.
        assert!(!is_relevant(&alert(
            "9,000,000 #XYZ",
            "$1M",
            "transferred from unknown wallet to unknown wallet"
        )));
    }

    #[test]
    fn ranking_and_cap() {
        let alerts: Vec<WhaleAlert> = (1..=7)
            .map(|i| {
                alert(
                    &format!("{i}00 ETH"),
                    &format!("${i},000,000"),
                    "to unknown wallet",
                )
            })
            .collect();

        let selected = select_relevant(alerts);
        assert_eq!(selected.len(), MAX_RELEVANT_ALERTS);
        // Largest USD value first.
        assert_eq!(selected[0].usd_value, "$7,000,000");
        assert_eq!(selected.last().unwrap().usd_value, "$3,000,000");
    }

    #[test]
    fn irrelevant_alerts_are_dropped_before_cap() {
        let mut alerts = vec![alert("100 BTC", "$5,000,000", "to cold storage")];
        alerts.extend((0..10).map(|_| {
            alert("1,000 #JUNK", "$99,000,000", "from unknown wallet to unknown wallet")
        }));

        let selected = select_relevant(alerts);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].amount, "100 BTC");
    }

    #[test]
    fn formatting() {
        let alerts = vec![WhaleAlert {
            timestamp: Some(Utc.timestamp_opt(1_700_000_000, 0).single().unwrap()),
            amount: "5,000 BTC".into(),
            usd_value: "$150,000,000".into(),
            description: "moved to cold storage".into(),
            link: "https://example.com/tx".into(),
        }];
        let text = format_alerts(&alerts);
        assert!(text.contains("5,000 BTC"));
        assert!(text.contains("moved to cold storage"));
        assert!(text.contains("https://example.com/tx"));
        assert_eq!(format_alerts(&[]), "No significant whale movements.");
    }
}
