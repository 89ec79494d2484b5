//! Exponential backoff for management API calls.
//!
//! Only errors that [`UploadError::is_retryable`] accepts are retried
//! (network failures, HTTP 429 and 5xx). Everything else is returned after
//! the first attempt.
//!
//! The delay before retry `n` (1-based) is:
//!
//! ```text
//! delay = min(base_delay * 2^(n-1), max_delay) + random_jitter(0..=jitter)
//! ```

use super::UploadError;
use rand::{Rng, rng};
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{error, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backoff {
    /// Total attempts, including the first.
    max_attempts: usize,
    base_delay: Duration,
    max_delay: Duration,
    jitter: Duration,
}

impl Backoff {
    pub fn new(max_attempts: usize, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: Duration::from_secs(30),
            jitter: Duration::from_millis(250),
        }
    }

    /// Delay before retry number `retry` (1-based), without jitter.
    pub fn delay_for(&self, retry: usize) -> Duration {
        let shift = retry.saturating_sub(1).min(16) as u32;
        self.base_delay.saturating_mul(1 << shift).min(self.max_delay)
    }

    fn jitter(&self) -> Duration {
        let max_ms = self.jitter.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rng().random_range(0..=max_ms))
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent.
    pub async fn retry<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, UploadError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, UploadError>>,
    {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            attempt += 1;
            let attempt_t0 = Instant::now();
            let e = match op().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if !e.is_retryable() {
                return Err(e);
            }
            if attempt >= self.max_attempts {
                error!(
                    what,
                    attempt,
                    max = self.max_attempts,
                    elapsed_ms_total = total_t0.elapsed().as_millis() as u64,
                    error = %e,
                    "Request exhausted retries"
                );
                return Err(e);
            }

            let delay = self.delay_for(attempt) + self.jitter();
            warn!(
                what,
                attempt,
                max = self.max_attempts,
                elapsed_ms_attempt = attempt_t0.elapsed().as_millis() as u64,
                ?delay,
                error = %e,
                "Request failed; backing off"
            );
            sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn quick(max_attempts: usize) -> Backoff {
        Backoff {
            jitter: Duration::ZERO,
            ..Backoff::new(max_attempts, Duration::ZERO)
        }
    }

    fn unavailable() -> UploadError {
        UploadError::from_status(503, "busy".to_string())
    }

    #[test]
    fn test_delay_doubles_and_caps() {
        let backoff = Backoff::new(6, Duration::from_secs(1));
        assert_eq!(backoff.delay_for(1), Duration::from_secs(1));
        assert_eq!(backoff.delay_for(2), Duration::from_secs(2));
        assert_eq!(backoff.delay_for(3), Duration::from_secs(4));
        assert_eq!(backoff.delay_for(10), Duration::from_secs(30));
    }

    #[test]
    fn test_zero_attempts_means_one() {
        assert_eq!(Backoff::new(0, Duration::ZERO).max_attempts, 1);
    }

    #[tokio::test]
    async fn test_retries_transient_errors_until_success() {
        let calls = Cell::new(0);
        let result = quick(4)
            .retry("GET stories", || async {
                calls.set(calls.get() + 1);
                if calls.get() < 3 { Err(unavailable()) } else { Ok(calls.get()) }
            })
            .await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = Cell::new(0);
        let result: Result<(), _> = quick(4)
            .retry("GET stories", || async {
                calls.set(calls.get() + 1);
                Err(UploadError::from_status(429, String::new()))
            })
            .await;
        assert!(matches!(result, Err(UploadError::Api { status: 429, .. })));
        assert_eq!(calls.get(), 4);
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let calls = Cell::new(0);
        let result: Result<(), _> = quick(4)
            .retry("POST stories", || async {
                calls.set(calls.get() + 1);
                Err(UploadError::from_status(422, "slug already taken".to_string()))
            })
            .await;
        assert!(matches!(result, Err(UploadError::Rejected { .. })));
        assert_eq!(calls.get(), 1);
    }
}
