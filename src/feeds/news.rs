// =============================================================================
// News feed — latest crypto headlines from public RSS
// =============================================================================

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rss::Channel;
use serde::Serialize;
use std::io::Cursor;
use tracing::debug;

const FEED_URLS: &[&str] = &[
    "https://www.coindesk.com/arc/outboundfeeds/rss/",
    "https://cointelegraph.com/rss",
];

#[derive(Debug, Clone, Serialize)]
pub struct NewsItem {
    pub title: String,
    pub link: String,
    pub published: Option<DateTime<Utc>>,
    pub source: String,
}

pub struct NewsFeed {
    http: reqwest::Client,
}

impl NewsFeed {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .expect("failed to build news HTTP client"),
        }
    }

    /// Latest headlines across all feeds, newest first, capped at `limit`.
    /// One dead feed does not sink the others.
    pub async fn fetch_latest(&self, limit: usize) -> Result<Vec<NewsItem>> {
        let mut items = Vec::new();

        for url in FEED_URLS {
            match self.fetch_channel(url).await {
                Ok(channel) => {
                    let source = channel.title().to_string();
                    for item in channel.items() {
                        items.push(NewsItem {
                            title: item.title().unwrap_or("(untitled)").to_string(),
                            link: item.link().unwrap_or_default().to_string(),
                            published: item
                                .pub_date()
                                .and_then(|d| DateTime::parse_from_rfc2822(d).ok())
                                .map(|d| d.with_timezone(&Utc)),
                            source: source.clone(),
                        });
                    }
                }
                Err(e) => debug!(url, error = %e, "rss feed fetch failed"),
            }
        }

        if items.is_empty() {
            anyhow::bail!("no headlines from any feed");
        }

        items.sort_by(|a, b| b.published.cmp(&a.published));
        items.truncate(limit);
        Ok(items)
    }

    async fn fetch_channel(&self, url: &str) -> Result<Channel> {
        let bytes = self
            .http
            .get(url)
            .send()
            .await
            .context("rss request failed")?
            .error_for_status()?
            .bytes()
            .await
            .context("rss body read failed")?;
        Channel::read_from(Cursor::new(bytes)).context("rss parse failed")
    }
}

impl Default for NewsFeed {
    fn default() -> Self {
        Self::new()
    }
}

/// Render headlines as a prompt block.
pub fn format_news(items: &[NewsItem]) -> String {
    if items.is_empty() {
        return "No recent news.".to_string();
    }

    let mut out = String::from("Latest crypto headlines:\n");
    for item in items {
        let when = item
            .published
            .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "recent".to_string());
        out.push_str(&format!("- [{when}] {} ({})\n", item.title, item.source));
    }
    out
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn formatting_includes_titles() {
        let items = vec![
            NewsItem {
                title: "Bitcoin breaks resistance".into(),
                link: "https://example.com/a".into(),
                published: Some(Utc.with_ymd_and_hms(2024, 5, 15, 9, 0, 0).unwrap()),
                source: "CoinDesk".into(),
            },
            NewsItem {
                title: "ETH ETF inflows".into(),
                link: "https://example.com/b".into(),
                published: None,
                source: "Cointelegraph".into(),
            },
        ];
        let text = format_news(&items);
        assert!(text.contains("Bitcoin breaks resistance"));
        assert!(text.contains("2024-05-15 09:00"));
        assert!(text.contains("recent"));
    }

    #[test]
    fn empty_news_placeholder() {
        assert_eq!(format_news(&[]), "No recent news.");
    }
}
