//! Configuration for the activation worker.

use std::time::Duration;

use trellis_lifecycle::messaging::{
    DEFAULT_POLL_INTERVAL, DEFAULT_REQUEUE_DELAY, DEFAULT_VISIBILITY_TIMEOUT,
};
use trellis_lifecycle::{AckMode, WorkerConfig, SUBSCRIPTION_CREATED_CHANNEL};

/// Activation worker configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database URL
    pub database_url: String,
    /// Channel to consume
    pub channel: String,
    /// Pause between empty polls of the queue
    pub poll_interval: Duration,
    /// How long a leased event stays hidden from other consumers
    pub visibility_timeout: Duration,
    /// Port for the Prometheus scrape endpoint, disabled when unset
    pub metrics_port: Option<u16>,
    /// Processing behaviour
    pub worker: WorkerConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_url = var("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let channel =
            var("WORKER_CHANNEL").unwrap_or_else(|| SUBSCRIPTION_CREATED_CHANNEL.to_string());

        let poll_interval = match var("WORKER_POLL_INTERVAL_MS") {
            Some(raw) => Duration::from_millis(
                raw.parse()
                    .map_err(|_| ConfigError::Invalid("WORKER_POLL_INTERVAL_MS"))?,
            ),
            None => DEFAULT_POLL_INTERVAL,
        };

        let visibility_timeout = match var("WORKER_VISIBILITY_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(
                raw.parse()
                    .map_err(|_| ConfigError::Invalid("WORKER_VISIBILITY_TIMEOUT_SECS"))?,
            ),
            None => DEFAULT_VISIBILITY_TIMEOUT,
        };
        if visibility_timeout.is_zero() {
            return Err(ConfigError::Invalid("WORKER_VISIBILITY_TIMEOUT_SECS"));
        }

        let ack_mode: AckMode = match var("WORKER_ACK_MODE") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid("WORKER_ACK_MODE"))?,
            None => AckMode::AfterProcessing,
        };

        let requeue_on_store_failure = match var("WORKER_REQUEUE_ON_STORE_FAILURE") {
            Some(raw) => raw
                .parse()
                .map_err(|_| ConfigError::Invalid("WORKER_REQUEUE_ON_STORE_FAILURE"))?,
            None => false,
        };

        let requeue_delay = match var("WORKER_REQUEUE_DELAY_MS") {
            Some(raw) => Duration::from_millis(
                raw.parse()
                    .map_err(|_| ConfigError::Invalid("WORKER_REQUEUE_DELAY_MS"))?,
            ),
            None => DEFAULT_REQUEUE_DELAY,
        };

        let max_conflict_retries = match var("MAX_CONFLICT_RETRIES") {
            Some(raw) => raw
                .parse()
                .map_err(|_| ConfigError::Invalid("MAX_CONFLICT_RETRIES"))?,
            None => 3,
        };

        let metrics_port: Option<u16> = var("WORKER_METRICS_PORT")
            .map(|raw| raw.parse().map_err(|_| ConfigError::Invalid("WORKER_METRICS_PORT")))
            .transpose()?;

        let worker = WorkerConfig::new()
            .with_ack_mode(ack_mode)
            .with_requeue_on_store_failure(requeue_on_store_failure)
            .with_max_conflict_retries(max_conflict_retries)
            .with_receive_backoff(poll_interval)
            .with_requeue_delay(requeue_delay);

        Ok(Self {
            database_url,
            channel,
            poll_interval,
            visibility_timeout,
            metrics_port,
            worker,
        })
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
