use std::future::Future;
use std::time::Duration;

use backon::{BackoffBuilder, Retryable};
use serde::{Deserialize, Serialize};

use crate::config::{duration_str, optional_duration_str};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// `base * 2^attempt`
    Exponential,
    /// `base * (attempt + 1)`
    Linear,
    /// Always `base`
    Fixed,
}

/// Bounded retry policy for one outbound call.
///
/// The policy itself holds no counters; every call to [`with_retry`] starts a
/// fresh schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total number of invocations, including the first one
    pub max_attempts: u32,
    #[serde(with = "duration_str")]
    pub base_delay: Duration,
    #[serde(with = "optional_duration_str")]
    pub max_delay: Option<Duration>,
    pub strategy: BackoffStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Some(Duration::from_secs(10)),
            strategy: BackoffStrategy::Exponential,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after the failed invocation number `attempt` (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let delay = match self.strategy {
            BackoffStrategy::Exponential => self
                .base_delay
                .saturating_mul(2u32.saturating_pow(attempt)),
            BackoffStrategy::Linear => self.base_delay.saturating_mul(attempt.saturating_add(1)),
            BackoffStrategy::Fixed => self.base_delay,
        };
        match self.max_delay {
            Some(max_delay) => delay.min(max_delay),
            None => delay,
        }
    }
}

impl BackoffBuilder for RetryPolicy {
    type Backoff = DelaySchedule;

    fn build(self) -> Self::Backoff {
        DelaySchedule {
            policy: self,
            attempt: 0,
        }
    }
}

/// Yields one delay per retry, `max_attempts - 1` in total.
#[derive(Debug, Clone)]
pub struct DelaySchedule {
    policy: RetryPolicy,
    attempt: u32,
}

impl Iterator for DelaySchedule {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.attempt.saturating_add(1) >= self.policy.max_attempts {
            return None;
        }
        let delay = self.policy.delay(self.attempt);
        self.attempt += 1;
        Some(delay)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    #[error("retries exhausted after {attempts} attempts: {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: E,
    },
    #[error(transparent)]
    Terminal(E),
}

/// Run `operation`, retrying failures that `is_retryable` accepts until the
/// policy's attempts are used up.
///
/// Non-retryable failures are returned immediately as
/// [`RetryError::Terminal`]; a retryable failure on the last attempt becomes
/// [`RetryError::Exhausted`].
pub async fn with_retry<T, E, Op, Fut, P>(
    policy: &RetryPolicy,
    operation_name: &str,
    mut operation: Op,
    is_retryable: P,
) -> Result<T, RetryError<E>>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut attempts = 0u32;
    let mut retries = 0u32;

    let result = (|| {
        attempts += 1;
        operation()
    })
    .retry(*policy)
    .when(|error| is_retryable(error))
    .notify(|error, delay| {
        retries += 1;
        tracing::warn!(
            "{} failed (retry {} of {}), retrying in {:?}: {}",
            operation_name,
            retries,
            policy.max_attempts.saturating_sub(1),
            delay,
            error
        );
    })
    .await;

    match result {
        Ok(value) => Ok(value),
        Err(error) if is_retryable(&error) => {
            tracing::debug!("{} gave up after {} attempts", operation_name, attempts);
            Err(RetryError::Exhausted {
                attempts,
                source: error,
            })
        }
        Err(error) => Err(RetryError::Terminal(error)),
    }
}
