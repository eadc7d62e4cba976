use std::time::Duration;

use common::error::AppError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const TIMEOUT_KIND: &str = "timeout";

/// Outcome of a failed activity attempt, stored in history as-is.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct ActivityFailure {
    /// Classification tag checked against `RetryPolicy::non_retryable_kinds`.
    pub kind: String,
    pub message: String,
    pub non_retryable: bool,
}

impl ActivityFailure {
    pub fn retryable(kind: impl Into<String>, message: impl Into<String>) -> Self {
        ActivityFailure {
            kind: kind.into(),
            message: message.into(),
            non_retryable: false,
        }
    }

    pub fn non_retryable(kind: impl Into<String>, message: impl Into<String>) -> Self {
        ActivityFailure {
            kind: kind.into(),
            message: message.into(),
            non_retryable: true,
        }
    }

    pub fn timeout(after: Duration) -> Self {
        Self::retryable(TIMEOUT_KIND, format!("no result after {:?}", after))
    }

    pub fn is_kind(&self, kind: &str) -> bool {
        self.kind == kind
    }
}

#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("activity {activity} failed after {attempts} attempt(s): {failure}")]
    Activity {
        activity: String,
        attempts: u32,
        failure: ActivityFailure,
    },

    #[error("history diverged from workflow code: {0}")]
    NonDeterminism(String),

    #[error("execution timed out after {0:?}")]
    TimedOut(Duration),

    #[error("invalid workflow operation: {0}")]
    Invalid(String),

    #[error("history store error: {0}")]
    Store(#[from] AppError),
}

impl WorkflowError {
    /// The activity failure behind this error, if any.
    pub fn activity_failure(&self) -> Option<&ActivityFailure> {
        match self {
            WorkflowError::Activity { failure, .. } => Some(failure),
            _ => None,
        }
    }
}
