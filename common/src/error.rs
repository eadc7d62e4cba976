use thiserror::Error;

pub type Res<T> = std::result::Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    // === CONVERSION ERRORS ===
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Redis pool error: {0}")]
    RedisPool(#[from] deadpool_redis::PoolError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // === APPLICATION ERRORS ===
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Resource conflict: {0}")]
    Conflict(String),

    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("{0}")]
    Internal(String),
}

impl AppError {
    /// Business-rule and validation errors are final: repeating the same call
    /// yields the same answer. Everything else may succeed on a later attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::Database(_)
            | AppError::Redis(_)
            | AppError::RedisPool(_)
            | AppError::Timeout(_)
            | AppError::Internal(_) => true,

            AppError::Migration(_)
            | AppError::Serialization(_)
            | AppError::BadRequest(_)
            | AppError::NotFound(_)
            | AppError::Forbidden(_)
            | AppError::Conflict(_)
            | AppError::InsufficientFunds(_) => false,
        }
    }
}
