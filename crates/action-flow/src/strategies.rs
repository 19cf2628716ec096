//! Retry backoff strategies for interruption handlers

use std::time::Duration;

use crate::types::{RetryConfig, RetryStrategy};

/// Delay before retry `attempt` (1-indexed) for a given strategy.
///
/// Linear: `base_delay_ms * attempt`. Exponential: `base_delay_ms * 2^(attempt-1)`.
/// Arithmetic saturates at `u64::MAX`; an attempt of 0 is treated as 1.
pub fn next_delay(strategy: RetryStrategy, attempt: u32, base_delay_ms: u64) -> u64 {
    let attempt = attempt.max(1);
    match strategy {
        RetryStrategy::Linear => base_delay_ms.saturating_mul(u64::from(attempt)),
        RetryStrategy::Exponential => {
            let multiplier = 2u64.checked_pow(attempt - 1).unwrap_or(u64::MAX);
            base_delay_ms.saturating_mul(multiplier)
        }
    }
}

/// Outcome of consulting the retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait this long, then run the handler again
    Delay(Duration),
    /// Retry budget spent
    Exhausted,
}

impl RetryConfig {
    pub fn next_delay(&self, attempt: u32) -> RetryDecision {
        if attempt > self.attempts {
            RetryDecision::Exhausted
        } else {
            RetryDecision::Delay(Duration::from_millis(next_delay(
                self.strategy,
                attempt,
                self.delay_ms,
            )))
        }
    }
}

/// Backoff policy seam; the engine only sees this trait.
pub trait BackoffPolicy: Send + Sync {
    fn decide(&self, retry: &RetryConfig, attempt: u32) -> RetryDecision;
}

/// Deterministic policy: no jitter, no cap beyond saturation.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeterministicBackoff;

impl DeterministicBackoff {
    pub fn new() -> Self {
        Self
    }
}

impl BackoffPolicy for DeterministicBackoff {
    fn decide(&self, retry: &RetryConfig, attempt: u32) -> RetryDecision {
        retry.next_delay(attempt)
    }
}

/// Scales every delay down to zero; keeps the retry count.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImmediateBackoff;

impl BackoffPolicy for ImmediateBackoff {
    fn decide(&self, retry: &RetryConfig, attempt: u32) -> RetryDecision {
        match retry.next_delay(attempt) {
            RetryDecision::Delay(_) => RetryDecision::Delay(Duration::ZERO),
            RetryDecision::Exhausted => RetryDecision::Exhausted,
        }
    }
}
