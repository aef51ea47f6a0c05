//! Retry of storefront API calls with exponential backoff.
//!
//! Retries wrap the API call inside a fetch producer, never the fetch itself:
//! waiters of a de-duplicated fetch see one outcome, after all attempts.

use std::future::Future;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use tracing::{debug, warn};

use crate::api::ApiResult;

/// How often and how patiently to retry a failed API call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts after the first (0 = never retry).
    pub max_retries: u32,

    /// Delay before the first retry.
    pub initial_backoff: Duration,

    /// Upper bound for any single delay.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: 0,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        RetryPolicy {
            max_retries,
            initial_backoff,
            max_backoff,
        }
    }

    /// Never retries.
    pub fn none() -> Self {
        Self::default()
    }

    fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            current_interval: self.initial_backoff,
            initial_interval: self.initial_backoff,
            max_interval: self.max_backoff,
            multiplier: 2.0,
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}

/// Runs `op`, re-running it after a backoff delay while it fails with a
/// retryable [`ApiError`](crate::api::ApiError) and attempts remain.
///
/// A non-retryable error, or the last retryable one, is returned as is.
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, mut op: F) -> ApiResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ApiResult<T>>,
{
    let mut backoff = policy.create_backoff();
    let mut retries = 0u32;

    loop {
        match op().await {
            Ok(value) => {
                if retries > 0 {
                    debug!(retries, "API call succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) if err.is_retryable() && retries < policy.max_retries => {
                retries += 1;
                let delay = backoff.next_backoff().unwrap_or(policy.max_backoff);
                warn!(
                    attempt = retries,
                    max_retries = policy.max_retries,
                    ?delay,
                    error = %err,
                    "Retrying storefront API call"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn flaky(failures: u32, error: ApiError) -> (Arc<AtomicU32>, impl FnMut() -> futures_util::future::Ready<ApiResult<&'static str>>) {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        let op = move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            futures_util::future::ready(if n < failures { Err(error.clone()) } else { Ok("ok") })
        };
        (attempts, op)
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_policy_does_not_retry() {
        let (attempts, op) = flaky(1, ApiError::Transport("reset".into()));
        let result = with_retry(RetryPolicy::default(), op).await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retryable_errors_are_retried() {
        let policy = RetryPolicy::new(3, Duration::from_millis(10), Duration::from_millis(100));
        let (attempts, op) = flaky(2, ApiError::Http { status: 503, message: "busy".into() });

        assert_eq!(with_retry(policy, op).await.unwrap(), "ok");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_retries() {
        let policy = RetryPolicy::new(2, Duration::from_millis(10), Duration::from_millis(100));
        let (attempts, op) = flaky(10, ApiError::Transport("down".into()));

        let err = with_retry(policy, op).await.unwrap_err();
        assert_eq!(err, ApiError::Transport("down".into()));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_errors_fail_fast() {
        let policy = RetryPolicy::new(5, Duration::from_millis(10), Duration::from_millis(100));
        let (attempts, op) = flaky(10, ApiError::NotFound("product 9".into()));

        assert!(with_retry(policy, op).await.unwrap_err().is_not_found());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
