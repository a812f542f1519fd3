//! Bounded Retry with Exponential Backoff
//!
//! Wraps a single provider call attempt with a bounded retry loop. The
//! primary provider gets more attempts than the fallback; a last resort is
//! retried less aggressively.
//!
//! A failure is retried only when it is classified retryable (no HTTP
//! status, or a transient one). Backoff grows exponentially with uniform
//! jitter to avoid synchronized retries across concurrent callers, capped
//! at 5 seconds. On exhaustion the last error is propagated; intermediate
//! errors are discarded.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::debug;

use crate::constants::retry as retry_constants;
use crate::types::ProviderError;

/// Per-provider retry bounds
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the first attempt (total attempts = max_retries + 1)
    pub max_retries: u32,
}

impl RetryPolicy {
    /// Primary provider: 2 retries, 3 attempts total
    pub fn primary() -> Self {
        Self {
            max_retries: retry_constants::PRIMARY_MAX_RETRIES,
        }
    }

    /// Fallback provider: 1 retry, 2 attempts total
    pub fn fallback() -> Self {
        Self {
            max_retries: retry_constants::FALLBACK_MAX_RETRIES,
        }
    }
}

/// Executes one logical provider call under a retry policy.
#[derive(Debug, Clone, Copy)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Run `operation` until it succeeds, a non-retryable error occurs, or
    /// the retry budget is exhausted.
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let max_retries = self.policy.max_retries;

        for attempt in 0..=max_retries {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if attempt < max_retries && err.is_retryable() {
                        let delay = backoff_delay(attempt);
                        debug!(
                            attempt = attempt + 1,
                            max_retries,
                            delay_ms = delay.as_millis() as u64,
                            error = %err,
                            "Retrying after backoff"
                        );
                        sleep(delay).await;
                    } else {
                        return Err(err);
                    }
                }
            }
        }

        unreachable!("retry loop always returns from its final attempt")
    }
}

/// Backoff delay for attempt `n` (0-indexed):
/// `min(1000 * 2^n + uniform(0, 500), 5000)` milliseconds.
pub(crate) fn backoff_delay(attempt: u32) -> Duration {
    let base = retry_constants::BASE_DELAY_MS.saturating_mul(1u64 << attempt.min(12));
    let jitter = rand::rng().random_range(0..retry_constants::MAX_JITTER_MS);
    Duration::from_millis((base + jitter).min(retry_constants::MAX_DELAY_MS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn transient(attempts: &AtomicU32) -> ProviderError {
        attempts.fetch_add(1, Ordering::SeqCst);
        ProviderError::with_status("mock", 503, "service unavailable")
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_needs_single_attempt() {
        let attempts = AtomicU32::new(0);
        let executor = RetryExecutor::new(RetryPolicy::primary());

        let result: Result<u32, _> = executor
            .execute(|| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Ok(42) }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_exceeds_attempt_budget() {
        let attempts = AtomicU32::new(0);
        let executor = RetryExecutor::new(RetryPolicy::primary());

        let result: Result<(), _> = executor
            .execute(|| {
                let err = transient(&attempts);
                async move { Err(err) }
            })
            .await;

        assert!(result.is_err());
        // 2 retries => 3 attempts total
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_policy_attempts() {
        let attempts = AtomicU32::new(0);
        let executor = RetryExecutor::new(RetryPolicy::fallback());

        let result: Result<(), _> = executor
            .execute(|| {
                let err = transient(&attempts);
                async move { Err(err) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_aborts_immediately() {
        let attempts = AtomicU32::new(0);
        let executor = RetryExecutor::new(RetryPolicy::primary());

        let result: Result<(), _> = executor
            .execute(|| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(ProviderError::with_status("mock", 401, "unauthorized")) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_status_is_retried() {
        let attempts = AtomicU32::new(0);
        let executor = RetryExecutor::new(RetryPolicy::fallback());

        let result: Result<(), _> = executor
            .execute(|| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(ProviderError::new("mock", "connection reset")) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failures() {
        let attempts = AtomicU32::new(0);
        let executor = RetryExecutor::new(RetryPolicy::primary());

        let result = executor
            .execute(|| {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(ProviderError::with_status("mock", 429, "rate limited"))
                    } else {
                        Ok("recovered")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "recovered");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_backoff_delay_window() {
        for attempt in 0..3u32 {
            let floor = 1000u64 * (1 << attempt);
            for _ in 0..50 {
                let delay = backoff_delay(attempt).as_millis() as u64;
                assert!(delay >= floor.min(5000));
                assert!(delay <= (floor + 500).min(5000));
            }
        }
    }

    #[test]
    fn test_backoff_delay_is_capped() {
        for _ in 0..50 {
            assert!(backoff_delay(10) <= Duration::from_millis(5000));
        }
    }
}
