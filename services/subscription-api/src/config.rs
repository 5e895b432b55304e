//! Configuration for the Subscription API service.

use std::time::Duration;

use trellis_lifecycle::messaging::{
    DEFAULT_POLL_INTERVAL, DEFAULT_REQUEUE_DELAY, DEFAULT_VISIBILITY_TIMEOUT,
};
use trellis_lifecycle::{AckMode, LifecycleConfig, ValidationRules, WorkerConfig};

/// Subscription API configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port
    pub http_port: u16,
    /// Database URL
    pub database_url: String,
    /// Request timeout
    pub request_timeout: Duration,
    /// Metrics enabled
    pub metrics_enabled: bool,
    /// Run the activation worker inside this process
    pub embedded_worker: bool,
    /// Lifecycle service configuration
    pub lifecycle: LifecycleConfig,
    /// Settings for the embedded worker
    pub worker: WorkerConfig,
    /// Pause between empty polls of the queue by the embedded worker
    pub worker_poll_interval: Duration,
    /// How long an event leased by the embedded worker stays hidden
    pub worker_visibility_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        // Database
        let database_url = var("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;

        // Server
        let http_port = parse_or(&var, "HTTP_PORT", 8080)?;

        let request_timeout_secs: u64 = parse_or(&var, "REQUEST_TIMEOUT_SECS", 30)?;

        // Metrics
        let metrics_enabled = var("METRICS_ENABLED")
            .and_then(|v| v.parse().ok())
            .unwrap_or(true);

        // Lifecycle
        let embedded_worker = parse_or(&var, "EMBEDDED_WORKER", false)?;
        let plan_id_max_len = parse_or(&var, "PLAN_ID_MAX_LEN", 64)?;
        let max_conflict_retries = parse_or(&var, "MAX_CONFLICT_RETRIES", 3)?;

        if plan_id_max_len == 0 {
            return Err(ConfigError::Invalid("PLAN_ID_MAX_LEN"));
        }

        // Embedded worker, same variables as the standalone binary
        let ack_mode: AckMode = parse_or(&var, "WORKER_ACK_MODE", AckMode::AfterProcessing)?;
        let requeue_on_store_failure = parse_or(&var, "WORKER_REQUEUE_ON_STORE_FAILURE", false)?;
        let worker_poll_interval = duration_or(
            &var,
            "WORKER_POLL_INTERVAL_MS",
            Duration::from_millis,
            DEFAULT_POLL_INTERVAL,
        )?;
        let worker_visibility_timeout = duration_or(
            &var,
            "WORKER_VISIBILITY_TIMEOUT_SECS",
            Duration::from_secs,
            DEFAULT_VISIBILITY_TIMEOUT,
        )?;
        if worker_visibility_timeout.is_zero() {
            return Err(ConfigError::Invalid("WORKER_VISIBILITY_TIMEOUT_SECS"));
        }
        let requeue_delay = duration_or(
            &var,
            "WORKER_REQUEUE_DELAY_MS",
            Duration::from_millis,
            DEFAULT_REQUEUE_DELAY,
        )?;

        let lifecycle = LifecycleConfig::new()
            .with_max_conflict_retries(max_conflict_retries)
            .with_validation(ValidationRules::default().with_plan_id_max_len(plan_id_max_len));
        let worker = WorkerConfig::new()
            .with_ack_mode(ack_mode)
            .with_requeue_on_store_failure(requeue_on_store_failure)
            .with_max_conflict_retries(max_conflict_retries)
            .with_receive_backoff(worker_poll_interval)
            .with_requeue_delay(requeue_delay);

        Ok(Self {
            http_port,
            database_url,
            request_timeout: Duration::from_secs(request_timeout_secs),
            metrics_enabled,
            embedded_worker,
            lifecycle,
            worker,
            worker_poll_interval,
            worker_visibility_timeout,
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match var(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(key)),
        None => Ok(default),
    }
}

fn duration_or(
    var: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    unit: fn(u64) -> Duration,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(unit)
            .map_err(|_| ConfigError::Invalid(key)),
        None => Ok(default),
    }
}

/// Configuration error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
}
