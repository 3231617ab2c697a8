use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use metrics::counter;
use tokio::time::sleep;

/// Backoff-and-retry wrapper for remote calls that can be rate limited.
///
/// Only failures the caller's predicate classifies as rate limiting are
/// retried; anything else propagates immediately. Delay grows as
/// `base_delay * 2^attempt`. With the policy disabled, calls pass through
/// as a single attempt.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub enabled: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            enabled: true,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, enabled: bool) -> Self {
        Self {
            max_attempts,
            base_delay,
            enabled,
        }
    }

    pub fn from_config(config: &crate::config::AppConfig) -> Self {
        Self {
            max_attempts: config.retry_max_attempts.max(1),
            base_delay: Duration::from_secs(config.retry_base_delay_secs),
            enabled: config.retry_on_rate_limit,
        }
    }

    /// Run `op`, retrying while `is_retryable` holds and attempts remain.
    /// Returns the last error once attempts are exhausted.
    pub async fn run<T, E, F, Fut, P>(&self, label: &str, is_retryable: P, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: Display,
    {
        if !self.enabled {
            return op().await;
        }

        let mut attempt: u32 = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if is_retryable(&e) && attempt + 1 < self.max_attempts => {
                    let delay = self.base_delay * 2u32.saturating_pow(attempt);
                    counter!("upstream_rate_limit_retries_total").increment(1);
                    tracing::warn!(
                        label,
                        attempt,
                        delay_secs = delay.as_secs(),
                        error = %e,
                        "Rate limited — backing off"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[derive(Debug, thiserror::Error)]
    enum FakeError {
        #[error("rate limited")]
        RateLimited,
        #[error("broken pipe")]
        Fatal,
    }

    fn rate_limited(e: &FakeError) -> bool {
        matches!(e, FakeError::RateLimited)
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_third_attempt_after_two_backoff_waits() {
        let policy = RetryPolicy::new(3, Duration::from_secs(2), true);
        let calls = Arc::new(AtomicU32::new(0));
        let started = tokio::time::Instant::now();

        let calls_ref = calls.clone();
        let result: Result<u32, FakeError> = policy
            .run("test", rate_limited, move || {
                let calls = calls_ref.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(FakeError::RateLimited)
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 2s after the first failure, 4s after the second.
        assert_eq!(started.elapsed(), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_attempts_return_the_last_error() {
        let policy = RetryPolicy::new(3, Duration::from_secs(1), true);
        let calls = Arc::new(AtomicU32::new(0));

        let calls_ref = calls.clone();
        let result: Result<u32, FakeError> = policy
            .run("test", rate_limited, move || {
                let calls = calls_ref.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(FakeError::RateLimited)
                }
            })
            .await;

        assert!(matches!(result, Err(FakeError::RateLimited)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_error_propagates_immediately() {
        let policy = RetryPolicy::new(3, Duration::from_secs(60), true);
        let calls = Arc::new(AtomicU32::new(0));

        let calls_ref = calls.clone();
        let result: Result<u32, FakeError> = policy
            .run("test", rate_limited, move || {
                let calls = calls_ref.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(FakeError::Fatal)
                }
            })
            .await;

        assert!(matches!(result, Err(FakeError::Fatal)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn disabled_policy_is_a_single_passthrough_attempt() {
        let policy = RetryPolicy::new(5, Duration::from_secs(60), false);
        let calls = Arc::new(AtomicU32::new(0));

        let calls_ref = calls.clone();
        let result: Result<u32, FakeError> = policy
            .run("test", rate_limited, move || {
                let calls = calls_ref.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(FakeError::RateLimited)
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
