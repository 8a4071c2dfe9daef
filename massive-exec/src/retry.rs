//! Bounded retry with exponential backoff.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::error::{ExecError, ExecResult};

/// How often and how patiently a remote call is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first (at least 1)
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_backoff: Duration,
    /// Upper bound for any single delay
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Create a policy doubling the delay after every failed attempt.
    pub fn new(max_attempts: u32, initial_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            max_backoff: initial_backoff.saturating_mul(16),
        }
    }

    /// Single attempt, no retries.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Delay before retry number `retry` (1-based).
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff)
    }

    /// Run `call` until it succeeds, fails with an error `should_retry`
    /// rejects, or attempts run out. The last error is returned.
    pub async fn run<T, F, Fut>(
        &self,
        operation: &str,
        should_retry: fn(&ExecError) -> bool,
        mut call: F,
    ) -> ExecResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ExecResult<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < max_attempts && should_retry(&e) => {
                    let delay = self.backoff_for(attempt);
                    warn!(
                        operation,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Remote call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(500))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::new(10, Duration::from_millis(100));

        assert_eq!(policy.backoff_for(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(400));
        assert_eq!(policy.backoff_for(10), Duration::from_millis(1600));
    }

    #[test]
    fn test_zero_attempts_means_one() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_until_success() {
        let policy = RetryPolicy::new(3, Duration::from_millis(10));
        let calls = AtomicU32::new(0);
        let calls = &calls;

        let result = policy
            .run("test", ExecError::is_transient, move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(ExecError::Ledger("flaky".to_string()))
                } else {
                    Ok(7u32)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let policy = RetryPolicy::new(2, Duration::from_millis(10));
        let calls = AtomicU32::new(0);
        let calls = &calls;

        let result: ExecResult<()> = policy
            .run("test", ExecError::is_transient, move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ExecError::Timeout("slow".to_string()))
            })
            .await;

        assert!(matches!(result, Err(ExecError::Timeout(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_does_not_retry_permanent_errors() {
        let policy = RetryPolicy::new(5, Duration::from_millis(10));
        let calls = AtomicU32::new(0);
        let calls = &calls;

        let result: ExecResult<()> = policy
            .run("test", ExecError::is_transient, move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ExecError::ApprovalFailed("reverted".to_string()))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
