//! Trellis Lifecycle - Subscription lifecycle engine
//!
//! Creation of subscriptions with their event announcement, user-scoped
//! reads and cancellation, and the asynchronous worker that moves new
//! subscriptions into their trial period.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use trellis_db::Repositories;
//! use trellis_lifecycle::{
//!     ActivationWorker, CreateSubscriptionInput, LifecycleConfig, LifecycleService,
//!     LogNotifier, PgEventQueue, WorkerConfig, SUBSCRIPTION_CREATED_CHANNEL,
//! };
//!
//! let queue = PgEventQueue::new(pool.clone());
//! let service = LifecycleService::new(
//!     LifecycleConfig::default(),
//!     Arc::new(repos.subscriptions.clone()),
//!     Arc::new(repos.users.clone()),
//!     Arc::new(queue.clone()),
//! );
//! let sub = service
//!     .create_subscription(user_id, CreateSubscriptionInput::new("pro"))
//!     .await?;
//!
//! let worker = ActivationWorker::new(
//!     WorkerConfig::default(),
//!     Arc::new(repos.subscriptions),
//!     Arc::new(LogNotifier),
//! );
//! tokio::spawn(async move {
//!     worker.run(queue.consumer(SUBSCRIPTION_CREATED_CHANNEL), shutdown_rx).await
//! });
//! ```

pub mod config;
pub mod error;
pub mod messaging;
pub mod metrics;
pub mod notifier;
pub mod service;
pub mod validation;
pub mod worker;

pub use config::{AckMode, LifecycleConfig, WorkerConfig};
pub use error::{DependencyError, LifecycleError, NotFoundKind};
pub use messaging::{
    Acker, Delivery, EventConsumer, EventPublisher, MemoryBroker, MemoryConsumer,
    MessagingError, PgEventConsumer, PgEventQueue,
};
pub use notifier::{LogNotifier, NotifyError, WelcomeNotifier};
pub use service::LifecycleService;
pub use validation::{CreateSubscriptionInput, InputValidator, ValidationRules};
pub use worker::{ActivationWorker, DropReason, ProcessOutcome};

// Re-export the envelope channel for convenience
pub use trellis_types::SUBSCRIPTION_CREATED_CHANNEL;
