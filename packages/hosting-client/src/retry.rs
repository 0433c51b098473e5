//! Retry policy and the `with_retry` combinator.
//!
//! A [`RetryPolicy`] is a plain value: attempt ceiling plus an exponential
//! backoff curve. [`with_retry`] drives any async operation whose error type
//! implements [`Retryable`], so every integration shares the same loop.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// Classifies an error as transient (worth retrying) or terminal.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Bounded exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first call.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles for each retry after that.
    pub base_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            ..Default::default()
        }
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// No retries at all.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Delay to wait before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Run `op` until it succeeds, fails terminally, or the policy is exhausted.
///
/// The last error is returned when attempts run out.
pub async fn with_retry<T, E, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, E>
where
    E: Retryable + std::fmt::Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                warn!(
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retryable failure, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
