//! Retry logic with exponential backoff
//!
//! Provides the retry policy the cloud façade wraps every call in:
//! exponential backoff, jittered, retried only for throttling errors.

use crate::error::{IsRetryable, Result, RollerError};
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

const DEFAULT_INITIAL_RETRY_DELAY_MS: u64 = 500;
const DEFAULT_MAX_RETRY_DELAY_SECS: u64 = 10;
const DEFAULT_JITTER_FACTOR: f64 = 0.1;
const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const CLOUD_API_MAX_ATTEMPTS: u32 = 5;

/// Retry policy trait
///
/// Note: using `async fn` in a trait generates a clippy warning about auto
/// trait bounds, but avoiding it would require an explicit boxed-future
/// return type for no real benefit here.
#[allow(async_fn_in_trait)]
pub trait RetryPolicy: Send + Sync {
    /// Execute a function with retry logic
    async fn execute_with_retry<F, Fut, T>(&self, f: F) -> Result<T>
    where
        F: Fn() -> Fut + Send + Sync,
        Fut: Future<Output = Result<T>> + Send;
}

/// Exponential backoff retry policy.
///
/// `max_attempts = None` means unlimited attempts — this is what the cloud
/// façade uses for throttling (base 500 ms, cap 10 s, unlimited attempts).
pub struct ExponentialBackoffPolicy {
    max_attempts: Option<u32>,
    initial_delay: Duration,
    max_delay: Duration,
    jitter_factor: f64,
}

impl ExponentialBackoffPolicy {
    /// Create a new exponential backoff policy with a bounded attempt count.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: Some(max_attempts),
            initial_delay: Duration::from_millis(DEFAULT_INITIAL_RETRY_DELAY_MS),
            max_delay: Duration::from_secs(DEFAULT_MAX_RETRY_DELAY_SECS),
            jitter_factor: DEFAULT_JITTER_FACTOR,
        }
    }

    /// Create default policy (3 attempts).
    ///
    /// Not the `Default` trait impl, to avoid confusion with
    /// `Default::default()`.
    pub fn default_policy() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS)
    }

    /// Create policy for general cloud API calls (5 attempts).
    pub fn for_cloud_api() -> Self {
        Self::new(CLOUD_API_MAX_ATTEMPTS)
    }

    /// Create the façade's throttling policy: base 500ms, cap 10s, unlimited
    /// attempts.
    pub fn for_throttling() -> Self {
        Self {
            max_attempts: None,
            initial_delay: Duration::from_millis(DEFAULT_INITIAL_RETRY_DELAY_MS),
            max_delay: Duration::from_secs(DEFAULT_MAX_RETRY_DELAY_SECS),
            jitter_factor: DEFAULT_JITTER_FACTOR,
        }
    }

    fn calculate_backoff(&self, attempt: u32) -> Duration {
        let exponential = self.initial_delay.as_millis() as f64 * 2f64.powi(attempt as i32);
        let delay_ms = exponential.min(self.max_delay.as_millis() as f64);

        let jitter = delay_ms * self.jitter_factor * fastrand::f64();
        Duration::from_millis((delay_ms + jitter) as u64)
    }

    fn is_last_attempt(&self, attempt: u32) -> bool {
        matches!(self.max_attempts, Some(max) if attempt == max - 1)
    }
}

impl RetryPolicy for ExponentialBackoffPolicy {
    async fn execute_with_retry<F, Fut, T>(&self, f: F) -> Result<T>
    where
        F: Fn() -> Fut + Send + Sync,
        Fut: Future<Output = Result<T>> + Send,
    {
        let mut attempt: u32 = 0;

        loop {
            match f().await {
                Ok(result) => {
                    if attempt > 0 {
                        info!("operation succeeded after {} retries", attempt);
                    }
                    return Ok(result);
                }
                Err(e) => {
                    if !e.is_retryable() {
                        warn!("non-retryable error, aborting: {}", e);
                        return Err(e);
                    }

                    if self.is_last_attempt(attempt) {
                        let max_attempts = self.max_attempts.unwrap_or(attempt + 1);
                        warn!("max retries ({}) reached", max_attempts);
                        return Err(RollerError::Retryable {
                            attempt: attempt + 1,
                            max_attempts,
                            reason: format!("{}", e),
                            source: Some(Box::new(e)),
                        });
                    }

                    let backoff = self.calculate_backoff(attempt);
                    warn!(
                        "retryable error (attempt {}), retrying in {:?}: {}",
                        attempt + 1,
                        backoff,
                        e
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// No retry policy (for operations that shouldn't be retried, e.g. tests).
pub struct NoRetryPolicy;

impl RetryPolicy for NoRetryPolicy {
    async fn execute_with_retry<F, Fut, T>(&self, f: F) -> Result<T>
    where
        F: Fn() -> Fut + Send + Sync,
        Fut: Future<Output = Result<T>> + Send,
    {
        f().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_without_retry() {
        let policy = ExponentialBackoffPolicy::for_throttling();
        let result = policy.execute_with_retry(|| async { Ok::<_, RollerError>(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn retries_retryable_errors_until_success() {
        let policy = ExponentialBackoffPolicy::new(5);
        let calls = AtomicU32::new(0);

        let result = policy
            .execute_with_retry(|| async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(RollerError::CloudProvider {
                        provider: "aws".into(),
                        message: "throttling".into(),
                        source: None,
                    })
                } else {
                    Ok(n)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_non_retryable_errors() {
        let policy = ExponentialBackoffPolicy::new(5);
        let calls = AtomicU32::new(0);

        let result: Result<()> = policy
            .execute_with_retry(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(RollerError::GroupSelector {
                    pattern: "^web".into(),
                    matches: 0,
                })
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn bounded_policy_gives_up_after_max_attempts() {
        let policy = ExponentialBackoffPolicy::new(2);

        let result: Result<()> = policy
            .execute_with_retry(|| async {
                Err(RollerError::CloudProvider {
                    provider: "aws".into(),
                    message: "throttling".into(),
                    source: None,
                })
            })
            .await;

        match result {
            Err(RollerError::Retryable { attempt, max_attempts, .. }) => {
                assert_eq!(attempt, 2);
                assert_eq!(max_attempts, 2);
            }
            other => panic!("expected Retryable error, got {other:?}"),
        }
    }
}
