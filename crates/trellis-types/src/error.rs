//! Common error types

use thiserror::Error;

use crate::SubscriptionStatus;

/// Rejected state machine transition
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionError {
    /// Cancellation requested from a status that does not allow it
    #[error("subscription cannot be cancelled from status {0}")]
    CannotBeCancelled(SubscriptionStatus),
}

/// Unknown subscription status string
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid subscription status: {0}")]
pub struct StatusParseError(pub String);
