//! Welcome notifications sent when a trial starts

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use trellis_types::SubscriptionCreated;

/// Notification delivery failure
#[derive(Error, Debug)]
#[error("notification failed: {0}")]
pub struct NotifyError(pub String);

/// Sends the welcome message for a newly activated trial
#[async_trait]
pub trait WelcomeNotifier: Send + Sync {
    /// Notify the subscriber named in the event
    async fn send_welcome(&self, event: &SubscriptionCreated) -> Result<(), NotifyError>;
}

/// Notifier that only records the send in the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl WelcomeNotifier for LogNotifier {
    async fn send_welcome(&self, event: &SubscriptionCreated) -> Result<(), NotifyError> {
        info!(
            subscription_id = %event.subscription_id,
            email = %event.email,
            "Sending welcome email"
        );
        Ok(())
    }
}
