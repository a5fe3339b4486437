// =============================================================================
// Venue error type
// =============================================================================

/// Errors surfaced by the Hyperliquid client.
///
/// `RateLimited` is special: the retry layer absorbs it with exponential
/// backoff and callers only ever see it after every attempt is exhausted.
#[derive(Debug, thiserror::Error)]
pub enum VenueError {
    #[error("rate limited (429)")]
    RateLimited,

    #[error("hyperliquid API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    Parse(String),

    #[error("unknown symbol {0}")]
    UnknownSymbol(String),

    #[error("signing failed: {0}")]
    Signing(String),
}

impl From<reqwest::Error> for VenueError {
    fn from(err: reqwest::Error) -> Self {
        if err.status().map(|s| s.as_u16()) == Some(429) {
            Self::RateLimited
        } else {
            Self::Transport(err.to_string())
        }
    }
}
