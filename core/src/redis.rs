use common::{
    env_config::Config,
    error::{AppError, Res},
};

/// Pool shared by the command queue and the workflow history store. The
/// worker holds one connection in a blocking receive at all times.
pub fn setup(config: &Config) -> Res<deadpool_redis::Pool> {
    deadpool_redis::Config::from_url(&config.redis_url)
        .create_pool(Some(deadpool_redis::Runtime::Tokio1))
        .map_err(|e| AppError::Internal(format!("Failed to create Redis pool: {}", e)))
}
