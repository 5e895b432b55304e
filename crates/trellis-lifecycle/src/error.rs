//! Lifecycle errors

use thiserror::Error;

use trellis_db::DbError;
use trellis_types::TransitionError;

use crate::messaging::MessagingError;

/// What a `NotFound` refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotFoundKind {
    /// The subscription does not exist
    Subscription,
    /// The owning user does not exist
    User,
}

impl std::fmt::Display for NotFoundKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Subscription => write!(f, "subscription"),
            Self::User => write!(f, "user"),
        }
    }
}

/// Failure of an external collaborator
#[derive(Error, Debug)]
pub enum DependencyError {
    /// Subscription or user store
    #[error(transparent)]
    Store(#[from] DbError),

    /// Event channel
    #[error(transparent)]
    Messaging(#[from] MessagingError),
}

/// Lifecycle errors
#[derive(Error, Debug)]
pub enum LifecycleError {
    /// Malformed or missing input
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Referenced entity does not exist
    #[error("{0} not found")]
    NotFound(NotFoundKind),

    /// Entity exists but belongs to someone else
    #[error("forbidden")]
    Forbidden,

    /// State machine rejected the transition
    #[error(transparent)]
    CannotTransition(#[from] TransitionError),

    /// Concurrent writers kept winning the race
    #[error("subscription was modified concurrently")]
    Conflict,

    /// Store or channel unavailable
    #[error("{operation} failed: {source}")]
    DependencyFailure {
        /// Operation that was running
        operation: &'static str,
        /// Underlying failure
        #[source]
        source: DependencyError,
    },
}

impl LifecycleError {
    /// Build a dependency failure for an operation
    pub fn dependency(operation: &'static str, source: impl Into<DependencyError>) -> Self {
        Self::DependencyFailure {
            operation,
            source: source.into(),
        }
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Check if this is a client error rather than a server-side failure
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::DependencyFailure { .. })
    }
}
