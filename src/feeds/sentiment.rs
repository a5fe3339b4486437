// =============================================================================
// Sentiment feed — Crypto Fear & Greed index (alternative.me)
// =============================================================================

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const FNG_URL: &str = "https://api.alternative.me/fng/";

/// One Fear & Greed reading, 0 (extreme fear) to 100 (extreme greed).
#[derive(Debug, Clone, Serialize)]
pub struct FearGreed {
    pub value: u8,
    pub classification: String,
}

impl FearGreed {
    pub fn format_prompt(&self) -> String {
        format!(
            "Market sentiment: Fear & Greed index = {} ({})",
            self.value, self.classification
        )
    }
}

#[derive(Deserialize)]
struct FngResponse {
    data: Vec<FngEntry>,
}

#[derive(Deserialize)]
struct FngEntry {
    value: String,
    value_classification: String,
}

pub struct SentimentFeed {
    http: reqwest::Client,
}

impl SentimentFeed {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .expect("failed to build sentiment HTTP client"),
        }
    }

    pub async fn fetch(&self) -> Result<FearGreed> {
        let body: FngResponse = self
            .http
            .get(FNG_URL)
            .send()
            .await
            .context("fear & greed request failed")?
            .error_for_status()?
            .json()
            .await
            .context("fear & greed body is not JSON")?;

        let entry = body
            .data
            .first()
            .context("fear & greed response carried no data")?;

        Ok(FearGreed {
            value: entry.value.parse().context("unparsable index value")?,
            classification: entry.value_classification.clone(),
        })
    }
}

impl Default for SentimentFeed {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_rendering() {
        let fg = FearGreed {
            value: 35,
            classification: "Fear".into(),
        };
        assert_eq!(
            fg.format_prompt(),
            "Market sentiment: Fear & Greed index = 35 (Fear)"
        );
    }

    #[test]
    fn response_shape_parses() {
        let raw = r#"{"name":"Fear and Greed Index","data":[{"value":"72","value_classification":"Greed","timestamp":"1715700000"}]}"#;
        let parsed: FngResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.data[0].value, "72");
        assert_eq!(parsed.data[0].value_classification, "Greed");
    }
}
