//! Retry policy applied by the engine to every step.

use std::time::Duration;

use ledger::ErrorKind;
use serde::{Deserialize, Serialize};

use crate::error::StepError;

/// Backoff shape plus the set of error kinds that are never retried.
///
/// The delay before attempt `n + 1`, after attempt `n` failed, is
/// `min(initial_interval * backoff_coefficient^(n - 1), maximum_interval)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub initial_interval: Duration,
    pub backoff_coefficient: f64,
    pub maximum_interval: Duration,
    /// Total attempts allowed per step; 0 means unbounded.
    pub maximum_attempts: u32,
    pub non_retryable: Vec<ErrorKind>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(1),
            backoff_coefficient: 2.0,
            maximum_interval: Duration::from_secs(100),
            maximum_attempts: 500,
            non_retryable: vec![ErrorKind::InvalidAccount, ErrorKind::InsufficientFunds],
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            maximum_attempts: 1,
            ..Self::default()
        }
    }

    pub fn with_initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval;
        self
    }

    pub fn with_backoff_coefficient(mut self, coefficient: f64) -> Self {
        self.backoff_coefficient = coefficient;
        self
    }

    pub fn with_maximum_interval(mut self, interval: Duration) -> Self {
        self.maximum_interval = interval;
        self
    }

    pub fn with_maximum_attempts(mut self, attempts: u32) -> Self {
        self.maximum_attempts = attempts;
        self
    }

    pub fn with_non_retryable(mut self, kinds: impl IntoIterator<Item = ErrorKind>) -> Self {
        self.non_retryable = kinds.into_iter().collect();
        self
    }

    /// Returns true if the error may be retried at all.
    ///
    /// Timeouts are retryable; cancellation never is.
    pub fn is_retryable(&self, error: &StepError) -> bool {
        match error {
            StepError::Ledger(err) => !self.non_retryable.contains(&err.kind()),
            StepError::Timeout { .. } => true,
            StepError::Cancelled { .. } => false,
        }
    }

    /// Returns true if another attempt is allowed after `attempt` attempts.
    pub fn has_attempts_left(&self, attempt: u32) -> bool {
        self.maximum_attempts == 0 || attempt < self.maximum_attempts
    }

    /// Backoff before the attempt following failed attempt `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let coefficient = if self.backoff_coefficient.is_finite() {
            self.backoff_coefficient.max(1.0)
        } else {
            1.0
        };
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let cap = self.maximum_interval.as_secs_f64();
        let delay = self.initial_interval.as_secs_f64() * coefficient.powi(exponent);

        if !delay.is_finite() || delay >= cap {
            self.maximum_interval
        } else {
            Duration::from_secs_f64(delay)
        }
    }

    /// Decides what happens after attempt `attempt` failed with `error`:
    /// the backoff before retrying, or None if the step has failed for good.
    pub fn next_delay(&self, error: &StepError, attempt: u32) -> Option<Duration> {
        if self.is_retryable(error) && self.has_attempts_left(attempt) {
            Some(self.delay_for(attempt))
        } else {
            None
        }
    }
}
