//! Reusable retry schedule for external provider calls.
//!
//! Both the [`Embedder`](crate::embedding::Embedder) and the
//! [`Adjudicator`](crate::adjudication::Adjudicator) take a [`RetryPolicy`]
//! by value instead of hand-rolling backoff loops at each call site. The
//! policy decides what is retryable via
//! [`VerifyError::is_transient`](crate::types::VerifyError::is_transient):
//! provider failures are retried up to `max_attempts`, parse failures at
//! most once, everything else surfaces immediately.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::types::VerifyError;

/// Exponential backoff schedule with a capped attempt count.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Total attempts, including the first call.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles each retry.
    pub base_delay: Duration,
    /// Ceiling on the computed delay.
    pub max_delay: Duration,
    /// Add up to 50% random jitter to each delay to avoid thundering herds
    /// against a rate-limited provider.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// A policy that never waits; used in tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: false,
        }
    }

    /// Delay before the retry following attempt number `attempt` (1-based).
    fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let mut delay = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(exp))
            .min(self.max_delay);
        if self.jitter && !delay.is_zero() {
            let extra = rand::thread_rng().gen_range(0.0..=0.5);
            delay = delay.mul_f64(1.0 + extra).min(self.max_delay.mul_f64(1.5));
        }
        delay
    }

    /// Drive `op` until it succeeds, fails terminally, or the schedule is
    /// exhausted. The last error is returned on exhaustion.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, VerifyError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, VerifyError>>,
    {
        let mut parse_retries = 0u32;
        let mut attempt = 1u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_transient() => return Err(err),
                Err(err) => {
                    // Malformed output gets one second chance, not a full
                    // backoff ladder.
                    if matches!(err, VerifyError::Parse(_)) {
                        parse_retries += 1;
                        if parse_retries > 1 {
                            return Err(err);
                        }
                    } else if attempt >= self.max_attempts {
                        return Err(err);
                    }

                    let delay = self.delay_for(attempt);
                    warn!(
                        target: "claimsmith::retry",
                        %label,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient failure, retrying"
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::immediate(3);
        let result = policy
            .run("test", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(VerifyError::Provider("throttled".into()))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(result, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausts_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::immediate(3);
        let err = policy
            .run("test", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(VerifyError::Provider("down".into())) }
            })
            .await
            .unwrap_err();
        assert!(matches!(err, VerifyError::Provider(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fatal_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::immediate(5);
        let err = policy
            .run("test", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(VerifyError::config("bad")) }
            })
            .await
            .unwrap_err();
        assert!(matches!(err, VerifyError::Configuration(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn parse_errors_get_a_single_retry() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::immediate(5);
        let err = policy
            .run("test", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(VerifyError::Parse("not json".into())) }
            })
            .await
            .unwrap_err();
        assert!(matches!(err, VerifyError::Parse(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
