// =============================================================================
// Backoff policy for rate-limited venue calls
// =============================================================================
//
// Hyperliquid throttles cold clients aggressively, including the very first
// meta fetch. Policy: up to 10 attempts; 429s back off exponentially from a
// 10 s base capped at 120 s; transport hiccups retry on the flat base delay;
// logical API errors propagate immediately (retrying a rejected order would
// only repeat the rejection).
// =============================================================================

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use super::error::VenueError;

/// Maximum attempts per logical call.
pub const MAX_ATTEMPTS: u32 = 10;
/// First backoff delay after a 429.
pub const BASE_DELAY: Duration = Duration::from_secs(10);
/// Ceiling for the exponential backoff.
pub const MAX_DELAY: Duration = Duration::from_secs(120);

/// Run `call` until it succeeds, fails with a non-retryable error, or the
/// attempt budget is exhausted (the last error propagates).
pub async fn with_backoff<T, Fut, F>(op: &str, mut call: F) -> Result<T, VenueError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, VenueError>>,
{
    let mut delay = BASE_DELAY;
    let mut last_err = VenueError::RateLimited;

    for attempt in 1..=MAX_ATTEMPTS {
        match call().await {
            Ok(value) => return Ok(value),
            Err(VenueError::RateLimited) => {
                if attempt < MAX_ATTEMPTS {
                    warn!(
                        op,
                        attempt,
                        delay_s = delay.as_secs(),
                        "rate limited (429) — backing off"
                    );
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(MAX_DELAY);
                }
                last_err = VenueError::RateLimited;
            }
            Err(VenueError::Transport(msg)) => {
                if attempt < MAX_ATTEMPTS {
                    warn!(
                        op,
                        attempt,
                        error = %msg,
                        delay_s = BASE_DELAY.as_secs(),
                        "transport error — retrying"
                    );
                    tokio::time::sleep(BASE_DELAY).await;
                }
                last_err = VenueError::Transport(msg);
            }
            Err(other) => return Err(other),
        }
    }

    Err(last_err)
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_first_try() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, _> = with_backoff("test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(7) }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn api_error_propagates_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, _> = with_backoff("test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(VenueError::Api {
                    status: 400,
                    body: "bad order".into(),
                })
            }
        })
        .await;
        assert!(matches!(result, Err(VenueError::Api { status: 400, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_retries_with_growing_delay() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, _> = with_backoff("test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 3 {
                    Err(VenueError::RateLimited)
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_attempt_budget() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, _> = with_backoff("test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(VenueError::RateLimited) }
        })
        .await;
        assert!(matches!(result, Err(VenueError::RateLimited)));
        assert_eq!(calls.load(Ordering::SeqCst), MAX_ATTEMPTS);
    }
}
