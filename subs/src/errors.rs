use common::error::AppError;
use workflow::ActivityFailure;

/// Failure kind of a charge the owner cannot pay for. Never retried.
pub const INSUFFICIENT_FUNDS: &str = "insufficient_funds";

/// Maps an application error to the failure an activity reports.
pub fn classify(err: AppError) -> ActivityFailure {
    let kind = match &err {
        AppError::InsufficientFunds(_) => {
            return ActivityFailure::non_retryable(INSUFFICIENT_FUNDS, err.to_string());
        }
        AppError::Database(_) | AppError::Migration(_) => "database",
        AppError::Redis(_) | AppError::RedisPool(_) => "redis",
        AppError::NotFound(_) => "not_found",
        AppError::Timeout(_) => "timeout",
        _ => "application",
    };
    ActivityFailure::retryable(kind, err.to_string())
}
