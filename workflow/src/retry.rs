use std::time::Duration;

use crate::error::ActivityFailure;

/// Exponential backoff with a bounded number of attempts.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    pub initial_interval: Duration,
    pub backoff_coefficient: f64,
    pub maximum_interval: Duration,
    /// Attempts including the first one. Zero means unlimited.
    pub maximum_attempts: u32,
    /// Failure kinds that end the invocation on first occurrence.
    pub non_retryable_kinds: Vec<String>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            initial_interval: Duration::from_secs(1),
            backoff_coefficient: 2.0,
            maximum_interval: Duration::from_secs(100),
            maximum_attempts: 3,
            non_retryable_kinds: Vec::new(),
        }
    }
}

impl RetryPolicy {
    pub fn with_non_retryable(mut self, kind: &str) -> Self {
        self.non_retryable_kinds.push(kind.to_string());
        self
    }

    /// Delay before retry number `retry` (1 for the first retry).
    pub fn backoff(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.initial_interval.as_secs_f64() * self.backoff_coefficient.max(1.0).powi(exponent);
        Duration::from_secs_f64(secs.min(self.maximum_interval.as_secs_f64()))
    }

    /// Whether another attempt follows attempt number `attempt` that failed
    /// with `failure`.
    pub fn should_retry(&self, attempt: u32, failure: &ActivityFailure) -> bool {
        if failure.non_retryable || self.non_retryable_kinds.iter().any(|k| failure.is_kind(k)) {
            return false;
        }
        self.maximum_attempts == 0 || attempt < self.maximum_attempts
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ActivityOptions {
    /// Limit for a single attempt.
    pub start_to_close_timeout: Duration,
    pub retry_policy: RetryPolicy,
}

impl Default for ActivityOptions {
    fn default() -> Self {
        ActivityOptions {
            start_to_close_timeout: Duration::from_secs(10),
            retry_policy: RetryPolicy::default(),
        }
    }
}
