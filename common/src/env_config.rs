use std::{env, sync::Arc, time::Duration};

#[derive(Clone, Debug)]
/// Configuration struct for the subscriptions worker.
///
/// Built once at process start and shared by reference; nothing in the
/// workspace mutates it afterwards.
pub struct Config {
    // environment
    pub environment: String, // development or production
    /// The URL of the database to connect to.
    pub database_url: String,
    /// The URL of Redis server to connect to.
    pub redis_url: String,
    /// A boolean indicating whether console logging is enabled.
    pub console_logging_enabled: bool,
    /// File that receives a copy of every log line.
    pub log_file: String,
    /// Redis list carrying subscription commands.
    pub command_queue: String,
    /// Key prefix for workflow histories in Redis.
    pub workflow_prefix: String,
    /// Pricing and renewal rules for new subscriptions.
    pub billing: BillingConfig,
    /// Timeouts and retry settings for orchestrator instances.
    pub workflow: WorkflowConfig,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BillingConfig {
    /// Amount debited on every renewal, in minor units.
    pub price: i64,
    /// Features granted by a subscription, in display order.
    pub features: Vec<String>,
    /// Time between two charges.
    pub renewal_period: Duration,
}

#[derive(Clone, Debug, PartialEq)]
pub struct WorkflowConfig {
    /// Hard ceiling on the lifetime of one orchestrator instance.
    pub execution_timeout: Duration,
    /// Timeout of a single activity attempt.
    pub activity_timeout: Duration,
    /// Attempts per activity invocation, first one included.
    pub activity_max_attempts: u32,
    /// Delay before the first retry; doubles on each further retry.
    pub activity_retry_interval: Duration,
}

impl Default for BillingConfig {
    fn default() -> Self {
        BillingConfig {
            price: 50,
            features: vec!["downloads".to_string(), "uploads".to_string()],
            renewal_period: Duration::from_secs(30 * 24 * 60 * 60),
        }
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        WorkflowConfig {
            execution_timeout: Duration::from_secs(180 * 24 * 60 * 60),
            activity_timeout: Duration::from_secs(10),
            activity_max_attempts: 3,
            activity_retry_interval: Duration::from_secs(1),
        }
    }
}

impl BillingConfig {
    /// Reads billing rules from environment variables:
    /// - `SUBSCRIPTION_PRICE`: Optional. Defaults to 50.
    /// - `SUBSCRIPTION_FEATURES`: Optional. Comma separated, defaults to "downloads,uploads".
    /// - `RENEWAL_PERIOD_SECS`: Optional. Defaults to 30 days.
    ///
    /// # Panics
    ///
    /// Panics if a numeric variable is set but cannot be parsed, or if the
    /// price is not positive.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let defaults = BillingConfig::default();

        let price: i64 = env::var("SUBSCRIPTION_PRICE")
            .map(|v| v.parse().expect("SUBSCRIPTION_PRICE must be a valid number"))
            .unwrap_or(defaults.price);
        assert!(price > 0, "SUBSCRIPTION_PRICE must be positive");

        BillingConfig {
            price,
            features: env::var("SUBSCRIPTION_FEATURES")
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|f| !f.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or(defaults.features),
            renewal_period: env::var("RENEWAL_PERIOD_SECS")
                .map(|v| {
                    Duration::from_secs(
                        v.parse()
                            .expect("RENEWAL_PERIOD_SECS must be a valid number"),
                    )
                })
                .unwrap_or(defaults.renewal_period),
        }
    }
}

impl WorkflowConfig {
    /// Reads orchestrator settings from environment variables:
    /// - `EXECUTION_TIMEOUT_DAYS`: Optional. Defaults to 180.
    /// - `ACTIVITY_TIMEOUT_SECS`: Optional. Defaults to 10.
    /// - `ACTIVITY_MAX_ATTEMPTS`: Optional. Defaults to 3.
    /// - `ACTIVITY_RETRY_INTERVAL_MS`: Optional. Defaults to 1000.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let defaults = WorkflowConfig::default();

        let secs = |name: &str, default: Duration, unit: u64| {
            env::var(name)
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .map(|v| Duration::from_secs(v * unit))
                .unwrap_or(default)
        };

        WorkflowConfig {
            execution_timeout: secs(
                "EXECUTION_TIMEOUT_DAYS",
                defaults.execution_timeout,
                24 * 60 * 60,
            ),
            activity_timeout: secs("ACTIVITY_TIMEOUT_SECS", defaults.activity_timeout, 1),
            activity_max_attempts: env::var("ACTIVITY_MAX_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.activity_max_attempts),
            activity_retry_interval: env::var("ACTIVITY_RETRY_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.activity_retry_interval),
        }
    }
}

impl Config {
    /// Creates a new `Config` instance from environment variables.
    ///
    /// # Environment Variables
    ///
    /// Required:
    /// - `ENVIRONMENT`: development or production
    /// - `DATABASE_URL`: Connection string for Postgres
    /// - `REDIS_URL`: Connection string for Redis
    ///
    /// Optional (with defaults):
    /// - `ENABLE_CONSOLE_LOGGING`: Whether to log to stdout (default: true)
    /// - `LOG_FILE`: Log file path (default: "subscriptions.log")
    /// - `COMMAND_QUEUE`: Redis list for commands (default: "subscriptions")
    /// - `WORKFLOW_PREFIX`: Redis key prefix for histories (default: "workflow")
    /// - Billing and workflow settings, see `BillingConfig` and `WorkflowConfig`
    ///
    /// # Panics
    ///
    /// This function will panic if required environment variables are missing or if
    /// numeric values cannot be parsed correctly.
    pub fn from_env() -> Arc<Self> {
        dotenvy::dotenv().ok();

        Arc::new(Config {
            environment: env::var("ENVIRONMENT").expect("ENVIRONMENT must be set"),
            database_url: env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
            redis_url: env::var("REDIS_URL").expect("REDIS_URL must be set"),
            console_logging_enabled: env::var("ENABLE_CONSOLE_LOGGING")
                .unwrap_or_else(|_| "true".to_string())
                .to_lowercase()
                == "true",
            log_file: env::var("LOG_FILE").unwrap_or_else(|_| "subscriptions.log".to_string()),
            command_queue: env::var("COMMAND_QUEUE")
                .unwrap_or_else(|_| "subscriptions".to_string()),
            workflow_prefix: env::var("WORKFLOW_PREFIX")
                .unwrap_or_else(|_| "workflow".to_string()),
            billing: BillingConfig::from_env(),
            workflow: WorkflowConfig::from_env(),
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}
