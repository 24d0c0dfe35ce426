//! Saga runtime configuration.

use std::time::Duration;

use crate::retry::RetryPolicy;

/// Default task queue transfers are submitted to.
pub const DEFAULT_TASK_QUEUE: &str = "TRANSFER_MONEY_TASK_QUEUE";

/// Settings shared by every step of every transfer.
///
/// Passed explicitly at construction; nothing is read from globals.
#[derive(Debug, Clone, PartialEq)]
pub struct SagaConfig {
    pub task_queue: String,
    pub retry_policy: RetryPolicy,
    /// Start-to-close timeout of a single step attempt.
    pub step_timeout: Duration,
}

impl Default for SagaConfig {
    fn default() -> Self {
        Self {
            task_queue: DEFAULT_TASK_QUEUE.to_string(),
            retry_policy: RetryPolicy::default(),
            step_timeout: Duration::from_secs(60),
        }
    }
}

impl SagaConfig {
    pub fn with_task_queue(mut self, task_queue: impl Into<String>) -> Self {
        self.task_queue = task_queue.into();
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = SagaConfig::default();
        assert_eq!(config.task_queue, "TRANSFER_MONEY_TASK_QUEUE");
        assert_eq!(config.step_timeout, Duration::from_secs(60));
        assert_eq!(config.retry_policy, RetryPolicy::default());
    }

    #[test]
    fn test_builders() {
        let config = SagaConfig::default()
            .with_task_queue("q")
            .with_step_timeout(Duration::from_millis(5))
            .with_retry_policy(RetryPolicy::no_retry());
        assert_eq!(config.task_queue, "q");
        assert_eq!(config.step_timeout, Duration::from_millis(5));
        assert_eq!(config.retry_policy.maximum_attempts, 1);
    }
}
