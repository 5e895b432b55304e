//! Event channel abstraction
//!
//! Publishers push opaque payloads onto a named durable channel; a consumer
//! receives them back as [`Delivery`] values that must be settled with
//! [`Delivery::ack`] or [`Delivery::nack`]. Delivery is at-least-once: a
//! delivery dropped without being settled is handed out again.

mod memory;
mod postgres;

pub use memory::{MemoryBroker, MemoryConsumer};
pub use postgres::{
    PgEventConsumer, PgEventQueue, DEFAULT_POLL_INTERVAL, DEFAULT_REQUEUE_DELAY,
    DEFAULT_VISIBILITY_TIMEOUT,
};

use async_trait::async_trait;
use thiserror::Error;

/// Messaging errors
#[derive(Error, Debug)]
pub enum MessagingError {
    /// The channel or consumer has been closed
    #[error("channel closed")]
    Closed,

    /// A consumer is already attached to the channel
    #[error("channel {0} already has a consumer")]
    ConsumerAttached(String),

    /// Payload could not be encoded
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),

    /// Broker backend failure
    #[error("backend error: {0}")]
    Backend(#[from] sqlx::Error),
}

/// Publishes payloads to a named channel.
///
/// The channel is created on first use. A successful return means the
/// payload is durable as far as the backend guarantees.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish a payload
    async fn publish(&self, channel: &str, payload: Vec<u8>) -> Result<(), MessagingError>;
}

/// Receives deliveries from a single channel
#[async_trait]
pub trait EventConsumer: Send {
    /// Wait for the next delivery.
    ///
    /// Returns `Ok(None)` once the channel is closed for good.
    async fn receive(&mut self) -> Result<Option<Delivery>, MessagingError>;
}

/// Backend hook for settling a delivery
#[async_trait]
pub trait Acker: Send + Sync {
    /// Remove the delivery from the channel
    async fn ack(&self) -> Result<(), MessagingError>;

    /// Reject the delivery, optionally putting it back on the channel
    async fn nack(&self, requeue: bool) -> Result<(), MessagingError>;
}

/// A received payload awaiting settlement
pub struct Delivery {
    payload: Vec<u8>,
    redelivered: bool,
    acker: Box<dyn Acker>,
}

impl Delivery {
    /// Wrap a payload with its backend acker
    pub fn new(payload: Vec<u8>, redelivered: bool, acker: impl Acker + 'static) -> Self {
        Self {
            payload,
            redelivered,
            acker: Box::new(acker),
        }
    }

    /// Raw payload bytes
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Whether this payload was handed out before
    pub fn is_redelivered(&self) -> bool {
        self.redelivered
    }

    /// Acknowledge processing
    pub async fn ack(self) -> Result<(), MessagingError> {
        self.acker.ack().await
    }

    /// Reject, optionally requeueing
    pub async fn nack(self, requeue: bool) -> Result<(), MessagingError> {
        self.acker.nack(requeue).await
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("payload_len", &self.payload.len())
            .field("redelivered", &self.redelivered)
            .finish_non_exhaustive()
    }
}
