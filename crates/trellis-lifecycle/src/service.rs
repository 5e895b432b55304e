//! Subscription lifecycle service
//!
//! Creation persists the subscription and then publishes a
//! [`SubscriptionCreated`] envelope. There is no transaction spanning the
//! store and the channel:
//! - a failed save aborts before anything is published
//! - a failed publish fails the request although the row already exists

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, error, info, instrument, warn};

use trellis_db::{DbError, SubscriptionRepository, SubscriptionRow, UserRepository};
use trellis_types::{Subscription, SubscriptionCreated, SubscriptionId, UserId};

use crate::config::LifecycleConfig;
use crate::error::{LifecycleError, NotFoundKind};
use crate::messaging::{EventPublisher, MessagingError};
use crate::metrics::{
    record_op_duration, PUBLISH_FAILURES_TOTAL, SUBSCRIPTIONS_CANCELLED_TOTAL,
    SUBSCRIPTIONS_CREATED_TOTAL,
};
use crate::validation::{CreateSubscriptionInput, InputValidator};

/// Subscription lifecycle service
///
/// Holds no mutable state of its own; share it behind an `Arc` across
/// request tasks.
pub struct LifecycleService<S, U, P>
where
    S: SubscriptionRepository,
    U: UserRepository,
    P: EventPublisher,
{
    subscriptions: Arc<S>,
    users: Arc<U>,
    publisher: Arc<P>,
    validator: Arc<InputValidator>,
    config: LifecycleConfig,
}

impl<S, U, P> LifecycleService<S, U, P>
where
    S: SubscriptionRepository,
    U: UserRepository,
    P: EventPublisher,
{
    /// Create a new lifecycle service
    pub fn new(
        config: LifecycleConfig,
        subscriptions: Arc<S>,
        users: Arc<U>,
        publisher: Arc<P>,
    ) -> Self {
        Self {
            validator: Arc::new(InputValidator::new(config.validation.clone())),
            subscriptions,
            users,
            publisher,
            config,
        }
    }

    // =========================================================================
    // Creation
    // =========================================================================

    /// Create a `PENDING` subscription and announce it to the worker
    #[instrument(skip(self, input), fields(user_id = %user_id))]
    pub async fn create_subscription(
        &self,
        user_id: UserId,
        input: CreateSubscriptionInput,
    ) -> Result<Subscription, LifecycleError> {
        let start = Instant::now();
        let result = self.create_inner(user_id, input).await;
        record_op_duration("create_subscription", start, result.is_ok());
        result
    }

    async fn create_inner(
        &self,
        user_id: UserId,
        input: CreateSubscriptionInput,
    ) -> Result<Subscription, LifecycleError> {
        self.validator.validate_create(&input)?;

        let pending = Subscription::new_pending(user_id, input.plan_id, Utc::now());
        let subscription_id = pending.id;

        let stored = self
            .subscriptions
            .save(&SubscriptionRow::from(&pending))
            .await
            .map_err(|e| store_failure("save_subscription", subscription_id, e))?;
        let subscription = Subscription::try_from(stored)
            .map_err(|e| store_failure("save_subscription", subscription_id, e))?;

        let user = self
            .users
            .find_by_id(user_id.0)
            .await
            .map_err(|e| store_failure("find_user", subscription_id, e))?
            .ok_or_else(|| {
                warn!(%subscription_id, "Owner missing after subscription was persisted");
                LifecycleError::NotFound(NotFoundKind::User)
            })?;

        let event = SubscriptionCreated {
            subscription_id,
            user_id,
            email: user.email,
        };
        self.publish_created(&event).await?;

        metrics::counter!(SUBSCRIPTIONS_CREATED_TOTAL).increment(1);
        info!(%subscription_id, plan_id = %subscription.plan_id, "Subscription created");

        Ok(subscription)
    }

    async fn publish_created(&self, event: &SubscriptionCreated) -> Result<(), LifecycleError> {
        let published = match event.to_bytes() {
            Ok(payload) => self.publisher.publish(&self.config.channel, payload).await,
            Err(e) => Err(MessagingError::from(e)),
        };

        published.map_err(|e| {
            metrics::counter!(PUBLISH_FAILURES_TOTAL).increment(1);
            error!(
                subscription_id = %event.subscription_id,
                channel = %self.config.channel,
                error = %e,
                "Subscription persisted but creation event was not published"
            );
            LifecycleError::dependency("publish_event", e)
        })
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Get a subscription owned by the caller
    #[instrument(skip(self), fields(user_id = %user_id, subscription_id = %subscription_id))]
    pub async fn get_subscription(
        &self,
        user_id: UserId,
        subscription_id: SubscriptionId,
    ) -> Result<Subscription, LifecycleError> {
        let start = Instant::now();
        let result = self.load_owned(user_id, subscription_id).await;
        record_op_duration("get_subscription", start, result.is_ok());
        result
    }

    /// Load a subscription and check the caller owns it
    async fn load_owned(
        &self,
        user_id: UserId,
        subscription_id: SubscriptionId,
    ) -> Result<Subscription, LifecycleError> {
        let row = match self.subscriptions.find_by_id(subscription_id.0).await {
            Ok(row) => row,
            Err(DbError::NotFound) => {
                return Err(LifecycleError::NotFound(NotFoundKind::Subscription))
            }
            Err(e) => return Err(store_failure("find_subscription", subscription_id, e)),
        };

        let subscription = Subscription::try_from(row)
            .map_err(|e| store_failure("find_subscription", subscription_id, e))?;

        if !subscription.is_owned_by(&user_id) {
            debug!("Subscription belongs to another user");
            return Err(LifecycleError::Forbidden);
        }

        Ok(subscription)
    }

    // =========================================================================
    // Cancellation
    // =========================================================================

    /// Cancel a subscription owned by the caller.
    ///
    /// The read-check-write cycle is repeated when a concurrent writer bumped
    /// the version in between, up to `max_conflict_retries` times. A retry
    /// re-checks legality, so of two racing cancels exactly one succeeds.
    #[instrument(skip(self), fields(user_id = %user_id, subscription_id = %subscription_id))]
    pub async fn cancel_subscription(
        &self,
        user_id: UserId,
        subscription_id: SubscriptionId,
    ) -> Result<Subscription, LifecycleError> {
        let start = Instant::now();
        let result = self.cancel_inner(user_id, subscription_id).await;
        record_op_duration("cancel_subscription", start, result.is_ok());
        result
    }

    async fn cancel_inner(
        &self,
        user_id: UserId,
        subscription_id: SubscriptionId,
    ) -> Result<Subscription, LifecycleError> {
        let mut attempt = 0;

        loop {
            let mut subscription = self.load_owned(user_id, subscription_id).await?;
            subscription.cancel(Utc::now())?;

            match self.subscriptions.save(&SubscriptionRow::from(&subscription)).await {
                Ok(stored) => {
                    let cancelled = Subscription::try_from(stored)
                        .map_err(|e| store_failure("save_subscription", subscription_id, e))?;
                    metrics::counter!(SUBSCRIPTIONS_CANCELLED_TOTAL).increment(1);
                    info!("Subscription cancelled");
                    return Ok(cancelled);
                }
                Err(DbError::Conflict { .. }) if attempt < self.config.max_conflict_retries => {
                    attempt += 1;
                    debug!(attempt, "Concurrent update while cancelling, retrying");
                }
                Err(DbError::Conflict { .. }) => {
                    warn!(attempts = attempt + 1, "Cancellation kept losing to concurrent updates");
                    return Err(LifecycleError::Conflict);
                }
                Err(e) => return Err(store_failure("save_subscription", subscription_id, e)),
            }
        }
    }
}

/// Log a store failure with its context and wrap it for the caller
fn store_failure(
    operation: &'static str,
    subscription_id: SubscriptionId,
    err: DbError,
) -> LifecycleError {
    error!(%subscription_id, operation, error = %err, "Store operation failed");
    LifecycleError::dependency(operation, err)
}

impl<S, U, P> std::fmt::Debug for LifecycleService<S, U, P>
where
    S: SubscriptionRepository,
    U: UserRepository,
    P: EventPublisher,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleService")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
