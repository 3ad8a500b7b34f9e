// src/exec/retry.rs

//! Retry policy and retry combinators.
//!
//! The combinators are independent of engine control flow: they take any
//! fallible operation and re-invoke it according to a [`RetryConfig`].

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tracing::{debug, warn};

use crate::errors::is_transient;
use crate::types::{BackoffStrategy, JitterStrategy, RetryOn};

/// Retry policy configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Re-attempts after the first try; `0` disables retrying.
    pub max_retries: u32,
    pub backoff: BackoffStrategy,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: JitterStrategy,
    pub retry_on: RetryOn,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: BackoffStrategy::Exponential,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            jitter: JitterStrategy::None,
            retry_on: RetryOn::AnyError,
        }
    }
}

impl RetryConfig {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffStrategy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn with_jitter(mut self, jitter: JitterStrategy) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_retry_on(mut self, retry_on: RetryOn) -> Self {
        self.retry_on = retry_on;
        self
    }

    /// Delay before re-attempt `attempt` (0-indexed), without jitter.
    pub fn base_delay_for(&self, attempt: u32) -> Duration {
        let delay = match self.backoff {
            BackoffStrategy::Fixed => Duration::ZERO,
            BackoffStrategy::Linear => self
                .base_delay
                .checked_mul(attempt.saturating_add(1))
                .unwrap_or(self.max_delay),
            BackoffStrategy::Exponential => 2u32
                .checked_pow(attempt)
                .and_then(|factor| self.base_delay.checked_mul(factor))
                .unwrap_or(self.max_delay),
        };
        delay.min(self.max_delay)
    }

    /// Delay before re-attempt `attempt` (0-indexed), with jitter applied.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let delay = self.base_delay_for(attempt);
        if delay.is_zero() {
            return delay;
        }

        match self.jitter {
            JitterStrategy::None => delay,
            JitterStrategy::Full => {
                let secs = rand::rng().random_range(0.0..=delay.as_secs_f64());
                Duration::from_secs_f64(secs)
            }
            JitterStrategy::Equal => {
                let half = delay.as_secs_f64() / 2.0;
                let secs = rand::rng().random_range(half..=delay.as_secs_f64());
                Duration::from_secs_f64(secs)
            }
        }
    }

    /// Whether a failure on attempt `attempt` (0-indexed) should be retried.
    pub fn should_retry(&self, attempt: u32, err: &anyhow::Error) -> bool {
        if attempt >= self.max_retries {
            return false;
        }
        match self.retry_on {
            RetryOn::AnyError => true,
            RetryOn::Transient => is_transient(err),
        }
    }
}

/// Returned by the combinators when every attempt failed.
#[derive(Debug, Error)]
#[error("gave up after {attempts} attempt(s): {last:#}")]
pub struct RetryError {
    pub attempts: u32,
    #[source]
    pub last: anyhow::Error,
}

impl RetryError {
    pub fn into_inner(self) -> anyhow::Error {
        self.last
    }
}

/// Call `op` until it succeeds or the policy gives up, sleeping the current
/// thread between attempts.
///
/// `op` receives the 0-indexed attempt number. On success the value is
/// returned together with the number of attempts made.
pub fn retry<T, F>(config: &RetryConfig, mut op: F) -> Result<(T, u32), RetryError>
where
    F: FnMut(u32) -> anyhow::Result<T>,
{
    let mut attempt = 0;
    loop {
        match op(attempt) {
            Ok(value) => return Ok((value, attempt + 1)),
            Err(err) => {
                if !config.should_retry(attempt, &err) {
                    return Err(RetryError {
                        attempts: attempt + 1,
                        last: err,
                    });
                }
                let delay = config.delay_for(attempt);
                warn!(attempt = attempt + 1, ?delay, error = %err, "attempt failed; retrying");
                if !delay.is_zero() {
                    std::thread::sleep(delay);
                }
                attempt += 1;
            }
        }
    }
}

/// Async variant of [`retry`]; sleeps with tokio.
pub async fn retry_async<T, F, Fut>(config: &RetryConfig, mut op: F) -> Result<(T, u32), RetryError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let mut attempt = 0;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok((value, attempt + 1)),
            Err(err) => {
                if !config.should_retry(attempt, &err) {
                    return Err(RetryError {
                        attempts: attempt + 1,
                        last: err,
                    });
                }
                let delay = config.delay_for(attempt);
                debug!(attempt = attempt + 1, ?delay, error = %err, "attempt failed; retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
