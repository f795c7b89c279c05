//! Backoff for Slack Web API calls
//!
//! Only errors that `SlackError::is_retryable` accepts are retried. When Slack
//! answers a rate limit with `Retry-After`, that wait replaces the backoff
//! step, clamped to `max_retry_after_ms`.

use super::slack_errors::SlackError;
use std::future::Future;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// First backoff step in milliseconds
    pub initial_delay_ms: u64,
    /// Backoff ceiling in milliseconds
    pub max_delay_ms: u64,
    /// Backoff multiplier
    pub backoff_factor: f64,
    /// Longest `Retry-After` we are willing to sit out
    pub max_retry_after_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 250,
            max_delay_ms: 5000,
            backoff_factor: 2.0,
            max_retry_after_ms: 30_000,
        }
    }
}

impl RetryConfig {
    /// Wait before the next attempt: Slack's `Retry-After` if it sent one,
    /// otherwise our own backoff step
    fn wait_for(&self, err: &SlackError, backoff: Duration) -> Duration {
        match err.retry_after() {
            Some(wait) => wait.min(Duration::from_millis(self.max_retry_after_ms)),
            None => backoff,
        }
    }

    fn next_backoff(&self, backoff: Duration) -> Duration {
        backoff
            .mul_f64(self.backoff_factor)
            .min(Duration::from_millis(self.max_delay_ms))
    }
}

/// Run `call` until it succeeds, fails with a non-retryable error, or
/// `max_retries` retries are used up.
pub async fn with_retry<T, F, Fut>(
    config: &RetryConfig,
    method: &str,
    mut call: F,
) -> Result<T, SlackError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SlackError>>,
{
    let mut backoff = Duration::from_millis(config.initial_delay_ms);

    for retry in 1..=config.max_retries {
        let err = match call().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() => err,
            Err(err) => return Err(err),
        };

        let wait = config.wait_for(&err, backoff);
        debug!(
            "[Slack] {} failed ({}), retry {}/{} in {:?}",
            method, err, retry, config.max_retries, wait
        );
        sleep(wait).await;
        backoff = config.next_backoff(backoff);
    }

    call().await.map_err(|err| {
        if err.is_retryable() {
            warn!("[Slack] {} still failing after {} retries: {}", method, config.max_retries, err);
        }
        err
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Instant;

    fn fast() -> RetryConfig {
        RetryConfig {
            max_retries: 3,
            initial_delay_ms: 1,
            max_delay_ms: 5,
            backoff_factor: 2.0,
            max_retry_after_ms: 10,
        }
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_rate_limit() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = with_retry(&fast(), "chat.postMessage", || {
            let count = counter_clone.fetch_add(1, Ordering::SeqCst);
            async move {
                if count < 2 {
                    Err(SlackError::RateLimited { retry_after: None })
                } else {
                    Ok("sent")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "sent");
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_auth_failure_not_retried() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = with_retry(&fast(), "chat.postMessage", || {
            counter_clone.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(SlackError::AuthenticationFailed("invalid_auth".into())) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = with_retry(&fast(), "users.info", || {
            counter_clone.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(SlackError::ServiceUnavailable) }
        })
        .await;

        assert_eq!(result.unwrap_err(), SlackError::ServiceUnavailable);
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_retry_after_replaces_backoff() {
        // Backoff alone would sleep a minute; Slack's 1ms hint must win
        let config = RetryConfig {
            initial_delay_ms: 60_000,
            max_delay_ms: 60_000,
            ..fast()
        };
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let started = Instant::now();
        let result = with_retry(&config, "chat.postMessage", || {
            let count = counter_clone.fetch_add(1, Ordering::SeqCst);
            async move {
                if count == 0 {
                    Err(SlackError::RateLimited {
                        retry_after: Some(Duration::from_millis(1)),
                    })
                } else {
                    Ok(())
                }
            }
        })
        .await;

        assert!(result.is_ok());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_retry_after_is_clamped() {
        let config = fast();
        let err = SlackError::RateLimited {
            retry_after: Some(Duration::from_secs(3600)),
        };
        assert_eq!(
            config.wait_for(&err, Duration::from_millis(1)),
            Duration::from_millis(10)
        );
        assert_eq!(
            config.wait_for(&SlackError::ServiceUnavailable, Duration::from_millis(3)),
            Duration::from_millis(3)
        );
        assert_eq!(
            config.next_backoff(Duration::from_millis(4)),
            Duration::from_millis(5)
        );
    }
}
