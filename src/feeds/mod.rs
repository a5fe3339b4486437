// =============================================================================
// Context feeds — news, sentiment, forecasts, whale transfers
// =============================================================================
//
// Auxiliary context for the decision prompt. Every feed is best-effort: a
// failure produces a placeholder line and an empty structured payload, never
// an error that reaches the cycle.
// =============================================================================

pub mod forecast;
pub mod news;
pub mod sentiment;
pub mod whales;

use std::sync::Arc;

use serde::Serialize;
use tracing::warn;

use crate::hyperliquid::HyperliquidClient;

pub use forecast::PriceForecast;
pub use news::NewsItem;
pub use sentiment::FearGreed;
pub use whales::WhaleAlert;

/// Everything the feeds contribute to one cycle's prompt.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FeedContext {
    pub news_text: String,
    pub news: Vec<NewsItem>,
    pub sentiment_text: String,
    pub sentiment: Option<FearGreed>,
    pub forecast_text: String,
    pub forecasts: Vec<PriceForecast>,
    pub whale_text: String,
    pub whale_alerts: Vec<WhaleAlert>,
}

pub struct ContextFeeds {
    news: news::NewsFeed,
    sentiment: sentiment::SentimentFeed,
    forecast: forecast::ForecastFeed,
    whales: whales::WhaleFeed,
}

impl ContextFeeds {
    pub fn new(venue: Arc<HyperliquidClient>) -> Self {
        Self {
            news: news::NewsFeed::new(),
            sentiment: sentiment::SentimentFeed::new(),
            forecast: forecast::ForecastFeed::new(venue),
            whales: whales::WhaleFeed::new(),
        }
    }

    /// Gather all four feeds concurrently for the given symbol set.
    pub async fn gather(&self, symbols: &[String]) -> FeedContext {
        let (news, sentiment, forecasts, whales) = tokio::join!(
            self.news.fetch_latest(10),
            self.sentiment.fetch(),
            self.forecast.forecasts_for(symbols),
            self.whales.fetch_alerts(),
        );

        let mut ctx = FeedContext::default();

        match news {
            Ok(items) => {
                ctx.news_text = news::format_news(&items);
                ctx.news = items;
            }
            Err(e) => {
                warn!(error = %e, "news feed failed");
                ctx.news_text = "News feed unavailable.".to_string();
            }
        }

        match sentiment {
            Ok(fg) => {
                ctx.sentiment_text = fg.format_prompt();
                ctx.sentiment = Some(fg);
            }
            Err(e) => {
                warn!(error = %e, "sentiment feed failed");
                ctx.sentiment_text = "Sentiment data unavailable.".to_string();
            }
        }

        match forecasts {
            Ok(list) => {
                ctx.forecast_text = forecast::format_forecasts(&list);
                ctx.forecasts = list;
            }
            Err(e) => {
                warn!(error = %e, "forecast feed failed");
                ctx.forecast_text = "Price forecasts unavailable.".to_string();
            }
        }

        match whales {
            Ok(alerts) => {
                ctx.whale_text = whales::format_alerts(&alerts);
                ctx.whale_alerts = alerts;
            }
            Err(e) => {
                warn!(error = %e, "whale feed failed");
                ctx.whale_text = "Whale alerts unavailable.".to_string();
            }
        }

        ctx
    }
}
