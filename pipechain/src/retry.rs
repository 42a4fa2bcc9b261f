//! Bounded retry with configurable backoff and jitter.
//!
//! Used for optimistic-locking loops: an operation is retried only while it
//! fails with a stale-object conflict, and gives up with
//! [`ChainError::RetryExhausted`] once the attempt budget is spent.

use crate::errors::{ChainError, StoreError};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Backoff strategy for retry delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// delay = base * 2^attempt
    #[default]
    Exponential,
    /// delay = base * (attempt + 1)
    Linear,
    /// delay = base (constant)
    Constant,
}

/// Jitter strategy to spread concurrent retries apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
    /// No jitter
    #[default]
    None,
    /// Random from 0 to delay
    Full,
    /// Half fixed, half random
    Equal,
}

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum attempts (including the initial one).
    pub max_attempts: usize,
    /// Base delay between attempts in milliseconds.
    pub base_delay_ms: u64,
    /// Maximum delay cap in milliseconds.
    pub max_delay_ms: u64,
    /// Backoff strategy.
    pub backoff_strategy: BackoffStrategy,
    /// Jitter strategy.
    pub jitter_strategy: JitterStrategy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 50,
            max_delay_ms: 1000,
            backoff_strategy: BackoffStrategy::Exponential,
            jitter_strategy: JitterStrategy::None,
        }
    }
}

impl RetryConfig {
    /// Creates a new retry config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_base_delay_ms(mut self, delay: u64) -> Self {
        self.base_delay_ms = delay;
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub fn with_max_delay_ms(mut self, delay: u64) -> Self {
        self.max_delay_ms = delay;
        self
    }

    /// Sets the backoff strategy.
    #[must_use]
    pub fn with_backoff(mut self, strategy: BackoffStrategy) -> Self {
        self.backoff_strategy = strategy;
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, strategy: JitterStrategy) -> Self {
        self.jitter_strategy = strategy;
        self
    }
}

/// State tracking for a retry loop.
#[derive(Debug, Default)]
pub struct RetryState {
    /// Number of attempts made so far.
    pub attempt: usize,
}

impl RetryState {
    /// Creates a new retry state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if retries are exhausted.
    #[must_use]
    pub fn is_exhausted(&self, config: &RetryConfig) -> bool {
        self.attempt >= config.max_attempts
    }

    /// Calculates the delay before the next attempt.
    #[must_use]
    pub fn calculate_delay(&self, config: &RetryConfig) -> Duration {
        let base = config.base_delay_ms;
        let max = config.max_delay_ms;
        let attempt = self.attempt.saturating_sub(1);

        let delay = match config.backoff_strategy {
            BackoffStrategy::Exponential => {
                let exponent = u32::try_from(attempt).unwrap_or(u32::MAX);
                base.saturating_mul(2u64.saturating_pow(exponent)).min(max)
            }
            BackoffStrategy::Linear => {
                let factor = u64::try_from(attempt + 1).unwrap_or(u64::MAX);
                base.saturating_mul(factor).min(max)
            }
            BackoffStrategy::Constant => base.min(max),
        };

        let jittered = match config.jitter_strategy {
            JitterStrategy::None => delay,
            JitterStrategy::Full => {
                if delay == 0 {
                    0
                } else {
                    rand::thread_rng().gen_range(0..=delay)
                }
            }
            JitterStrategy::Equal => {
                let half = delay / 2;
                if half == 0 {
                    delay
                } else {
                    half + rand::thread_rng().gen_range(0..=half)
                }
            }
        };

        Duration::from_millis(jittered)
    }
}

/// Runs `operation` until it succeeds, retrying only on stale-object
/// conflicts.
///
/// The closure receives the 1-based attempt number so it can re-read state
/// before trying again. Non-conflict errors are returned immediately.
pub async fn retry_on_conflict<T, F, Fut>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T, ChainError>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut state = RetryState::new();

    loop {
        state.attempt += 1;

        match operation(state.attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_stale() => {
                if state.is_exhausted(config) {
                    return Err(ChainError::retry_exhausted(operation_name, state.attempt));
                }
                let delay = state.calculate_delay(config);
                tracing::debug!(
                    operation = operation_name,
                    attempt = state.attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %err,
                    "Retrying after optimistic lock conflict"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err.into()),
        }
    }
}
