//! Lifecycle and worker configuration

use std::time::Duration;

use trellis_types::SUBSCRIPTION_CREATED_CHANNEL;

use crate::validation::ValidationRules;

/// Lifecycle service configuration
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Channel `SubscriptionCreated` envelopes are published to
    pub channel: String,
    /// How many times a cancel retries its read-check-write after a version conflict
    pub max_conflict_retries: u32,
    /// Input validation rules
    pub validation: ValidationRules,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            channel: SUBSCRIPTION_CREATED_CHANNEL.to_string(),
            max_conflict_retries: 3,
            validation: ValidationRules::default(),
        }
    }
}

impl LifecycleConfig {
    /// Create a config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the event channel
    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    /// Set the conflict retry budget
    pub fn with_max_conflict_retries(mut self, retries: u32) -> Self {
        self.max_conflict_retries = retries;
        self
    }

    /// Set validation rules
    pub fn with_validation(mut self, rules: ValidationRules) -> Self {
        self.validation = rules;
        self
    }
}

/// When the worker acknowledges a delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckMode {
    /// Acknowledge as soon as the delivery is received (at-most-once)
    OnReceipt,
    /// Acknowledge once processing finished (at-least-once)
    AfterProcessing,
}

impl std::str::FromStr for AckMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "on_receipt" | "auto" => Ok(Self::OnReceipt),
            "after_processing" | "manual" => Ok(Self::AfterProcessing),
            other => Err(format!("unknown ack mode: {other}")),
        }
    }
}

/// Activation worker configuration
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Acknowledgement policy
    pub ack_mode: AckMode,
    /// Put a delivery back on the channel when the store is unavailable,
    /// instead of dropping it. Only meaningful with [`AckMode::AfterProcessing`].
    pub requeue_on_store_failure: bool,
    /// Read-activate-save attempts after a version conflict
    pub max_conflict_retries: u32,
    /// Pause after the consumer itself fails before receiving again
    pub receive_backoff: Duration,
    /// Pause after requeueing a delivery, so a failing store is not hammered
    /// with the same message
    pub requeue_delay: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            ack_mode: AckMode::AfterProcessing,
            requeue_on_store_failure: false,
            max_conflict_retries: 3,
            receive_backoff: Duration::from_secs(1),
            requeue_delay: Duration::from_secs(1),
        }
    }
}

impl WorkerConfig {
    /// Create a config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the acknowledgement policy
    pub fn with_ack_mode(mut self, mode: AckMode) -> Self {
        self.ack_mode = mode;
        self
    }

    /// Requeue deliveries when the store is unavailable
    pub fn with_requeue_on_store_failure(mut self, requeue: bool) -> Self {
        self.requeue_on_store_failure = requeue;
        self
    }

    /// Set the conflict retry budget
    pub fn with_max_conflict_retries(mut self, retries: u32) -> Self {
        self.max_conflict_retries = retries;
        self
    }

    /// Set the backoff after consumer failures
    pub fn with_receive_backoff(mut self, backoff: Duration) -> Self {
        self.receive_backoff = backoff;
        self
    }

    /// Set the pause after a requeue
    pub fn with_requeue_delay(mut self, delay: Duration) -> Self {
        self.requeue_delay = delay;
        self
    }
}
