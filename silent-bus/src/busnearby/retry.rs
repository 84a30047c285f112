//! Exponential backoff for transient request failures.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use super::error::ApiError;

/// Default delay before the first retry.
const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(2);

/// Default number of retries after the first attempt.
const DEFAULT_MAX_RETRIES: u32 = 3;

/// How transient failures are retried.
///
/// The n-th retry (0-based) waits `base_delay * 2^n`. Timeouts and
/// connection failures share the same schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_retries: u32,
}

impl RetryPolicy {
    pub fn new(base_delay: Duration, max_retries: u32) -> Self {
        Self {
            base_delay,
            max_retries,
        }
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self::new(Duration::ZERO, 0)
    }

    /// Delay before retry number `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }

    /// Run `op` until it succeeds, fails permanently, or retries run out.
    ///
    /// The error kind of the final attempt is preserved.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, ApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.max_retries => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        error = %err,
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        delay_secs = delay.as_secs_f64(),
                        "Request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) if err.is_transient() => return Err(err.exhausted(self.max_retries)),
                Err(err) => return Err(err),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_DELAY, DEFAULT_MAX_RETRIES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn instant_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(Duration::ZERO, max_retries)
    }

    #[test]
    fn default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.base_delay, Duration::from_secs(2));
        assert_eq!(policy.max_retries, 3);
    }

    #[test]
    fn delays_double() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_secs(2));
        assert_eq!(policy.delay_for(1), Duration::from_secs(4));
        assert_eq!(policy.delay_for(2), Duration::from_secs(8));
    }

    #[test]
    fn delay_saturates() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(200), policy.delay_for(40));
        assert!(policy.delay_for(200) > policy.delay_for(31));
    }

    #[tokio::test]
    async fn timeout_every_attempt_surfaces_timeout() {
        let calls = &AtomicU32::new(0);
        let result: Result<(), _> = instant_policy(3)
            .run(move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ApiError::Timeout("deadline elapsed".into()))
            })
            .await;

        assert!(matches!(result, Err(ApiError::Timeout(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn connection_failure_keeps_its_kind() {
        let result: Result<(), _> = instant_policy(2)
            .run(|| async { Err(ApiError::ConnectionFailure("refused".into())) })
            .await;

        assert!(matches!(result, Err(ApiError::ConnectionFailure(_))));
    }

    #[tokio::test]
    async fn recovers_after_transient_failures() {
        let calls = &AtomicU32::new(0);
        let result = instant_policy(3)
            .run(move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(ApiError::ConnectionFailure("reset".into()))
                } else {
                    Ok(42)
                }
            })
            .await;

        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let calls = &AtomicU32::new(0);
        let result: Result<(), _> = instant_policy(3)
            .run(move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ApiError::InvalidResponse("not json".into()))
            })
            .await;

        assert_eq!(result, Err(ApiError::InvalidResponse("not json".into())));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn none_policy_tries_once() {
        let calls = &AtomicU32::new(0);
        let result: Result<(), _> = RetryPolicy::none()
            .run(move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ApiError::Timeout("slow".into()))
            })
            .await;

        assert!(matches!(result, Err(ApiError::Timeout(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
