//! In-process broker
//!
//! Channels are unbounded tokio queues created on first publish. Nothing
//! survives a restart, so this broker suits tests and single-process tools.
//! Deployed services use the Postgres queue.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{Acker, Delivery, EventConsumer, EventPublisher, MessagingError};

#[derive(Debug)]
struct Message {
    payload: Vec<u8>,
    redelivered: bool,
}

struct ChannelState {
    // None once the channel is closed
    tx: Option<mpsc::UnboundedSender<Message>>,
    rx: Option<mpsc::UnboundedReceiver<Message>>,
}

impl ChannelState {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx: Some(tx),
            rx: Some(rx),
        }
    }

    fn sender(&self) -> Result<&mpsc::UnboundedSender<Message>, MessagingError> {
        self.tx.as_ref().ok_or(MessagingError::Closed)
    }
}

/// In-memory broker with one queue per channel name
#[derive(Clone, Default)]
pub struct MemoryBroker {
    channels: Arc<Mutex<HashMap<String, ChannelState>>>,
}

impl MemoryBroker {
    /// Create an empty broker
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the single consumer of a channel, creating the channel if needed
    pub fn consumer(&self, channel: &str) -> Result<MemoryConsumer, MessagingError> {
        let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        let state = channels
            .entry(channel.to_string())
            .or_insert_with(ChannelState::new);
        let requeue_to = state.sender()?.downgrade();

        let rx = state
            .rx
            .take()
            .ok_or_else(|| MessagingError::ConsumerAttached(channel.to_string()))?;

        Ok(MemoryConsumer { rx, requeue_to })
    }

    /// Close a channel.
    ///
    /// Its consumer drains what was already published and then observes the
    /// end of the stream. Later publishes and consumers get
    /// [`MessagingError::Closed`].
    pub fn close(&self, channel: &str) {
        let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        let state = channels
            .entry(channel.to_string())
            .or_insert_with(ChannelState::new);
        state.tx = None;
        state.rx = None;
    }
}

#[async_trait]
impl EventPublisher for MemoryBroker {
    async fn publish(&self, channel: &str, payload: Vec<u8>) -> Result<(), MessagingError> {
        let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        let state = channels
            .entry(channel.to_string())
            .or_insert_with(ChannelState::new);

        state
            .sender()?
            .send(Message {
                payload,
                redelivered: false,
            })
            .map_err(|_| MessagingError::Closed)
    }
}

impl std::fmt::Debug for MemoryBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBroker").finish_non_exhaustive()
    }
}

/// Consumer side of a [`MemoryBroker`] channel
pub struct MemoryConsumer {
    rx: mpsc::UnboundedReceiver<Message>,
    requeue_to: mpsc::WeakUnboundedSender<Message>,
}

#[async_trait]
impl EventConsumer for MemoryConsumer {
    async fn receive(&mut self) -> Result<Option<Delivery>, MessagingError> {
        let Some(message) = self.rx.recv().await else {
            return Ok(None);
        };

        let acker = MemoryAcker {
            payload: message.payload.clone(),
            requeue_to: self.requeue_to.clone(),
            settled: AtomicBool::new(false),
        };

        Ok(Some(Delivery::new(
            message.payload,
            message.redelivered,
            acker,
        )))
    }
}

struct MemoryAcker {
    payload: Vec<u8>,
    requeue_to: mpsc::WeakUnboundedSender<Message>,
    settled: AtomicBool,
}

impl MemoryAcker {
    fn requeue(&self) -> Result<(), MessagingError> {
        let tx = self.requeue_to.upgrade().ok_or(MessagingError::Closed)?;
        tx.send(Message {
            payload: self.payload.clone(),
            redelivered: true,
        })
        .map_err(|_| MessagingError::Closed)
    }
}

#[async_trait]
impl Acker for MemoryAcker {
    async fn ack(&self) -> Result<(), MessagingError> {
        self.settled.store(true, Ordering::Release);
        Ok(())
    }

    async fn nack(&self, requeue: bool) -> Result<(), MessagingError> {
        self.settled.store(true, Ordering::Release);
        if requeue {
            self.requeue()?;
        }
        Ok(())
    }
}

impl Drop for MemoryAcker {
    // An unsettled delivery goes back on the channel, like an unacked
    // message on a consumer that went away.
    fn drop(&mut self) {
        if !*self.settled.get_mut() {
            let _ = self.requeue();
        }
    }
}
