//! Activation worker
//!
//! Consumes [`SubscriptionCreated`] envelopes and moves `PENDING`
//! subscriptions into their trial period. Every per-message failure is
//! logged, counted and dropped; nothing short of the consumer closing or a
//! shutdown signal stops the loop.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use trellis_db::{DbError, SubscriptionRepository, SubscriptionRow};
use trellis_types::{Subscription, SubscriptionCreated, SubscriptionStatus, TrialActivation};

use crate::config::{AckMode, WorkerConfig};
use crate::messaging::{Delivery, EventConsumer};
use crate::metrics::record_worker_outcome;
use crate::notifier::WelcomeNotifier;

/// Why a delivery was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Payload is not a valid envelope; retrying can never succeed
    Malformed,
    /// No subscription with the envelope's ID is visible
    NotFound,
    /// The store failed while reading or writing
    StoreFailure,
    /// Concurrent writers kept winning the race
    Conflict,
}

/// Result of processing one delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The subscription entered its trial period
    Activated,
    /// The subscription was already past `PENDING`; nothing was written
    Unchanged(SubscriptionStatus),
    /// The delivery could not be applied
    Dropped(DropReason),
}

impl ProcessOutcome {
    /// Metrics label
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Activated => "activated",
            Self::Unchanged(_) => "unchanged",
            Self::Dropped(DropReason::Malformed) => "dropped_malformed",
            Self::Dropped(DropReason::NotFound) => "dropped_not_found",
            Self::Dropped(DropReason::StoreFailure) => "dropped_store_failure",
            Self::Dropped(DropReason::Conflict) => "dropped_conflict",
        }
    }
}

/// Long-running consumer that activates trials
pub struct ActivationWorker<S, N>
where
    S: SubscriptionRepository,
    N: WelcomeNotifier,
{
    subscriptions: Arc<S>,
    notifier: Arc<N>,
    config: WorkerConfig,
}

impl<S, N> ActivationWorker<S, N>
where
    S: SubscriptionRepository,
    N: WelcomeNotifier,
{
    /// Create a new worker
    pub fn new(config: WorkerConfig, subscriptions: Arc<S>, notifier: Arc<N>) -> Self {
        Self {
            subscriptions,
            notifier,
            config,
        }
    }

    /// Consume until the channel closes or `shutdown` flips to `true`.
    ///
    /// Should be spawned as a tokio task.
    pub async fn run<C: EventConsumer>(&self, mut consumer: C, mut shutdown: watch::Receiver<bool>) {
        info!(ack_mode = ?self.config.ack_mode, "Activation worker started");
        let mut watching_shutdown = true;

        loop {
            if *shutdown.borrow() {
                break;
            }

            let received = tokio::select! {
                received = consumer.receive() => received,
                changed = shutdown.changed(), if watching_shutdown => {
                    if changed.is_err() {
                        // Sender gone: nobody can ask us to stop any more.
                        debug!("Shutdown sender dropped");
                        watching_shutdown = false;
                    }
                    continue;
                }
            };

            match received {
                Ok(Some(delivery)) => {
                    self.handle_delivery(delivery).await;
                }
                Ok(None) => {
                    info!("Event channel closed");
                    break;
                }
                Err(e) => {
                    error!(error = %e, "Failed to receive from event channel");
                    tokio::time::sleep(self.config.receive_backoff).await;
                }
            }
        }

        info!("Activation worker stopped");
    }

    /// Process one delivery and settle it according to the ack mode
    pub async fn handle_delivery(&self, delivery: Delivery) -> ProcessOutcome {
        match self.config.ack_mode {
            AckMode::OnReceipt => {
                let payload = delivery.payload().to_vec();
                if let Err(e) = delivery.ack().await {
                    warn!(error = %e, "Failed to acknowledge delivery");
                }
                self.process(&payload).await
            }
            AckMode::AfterProcessing => {
                let outcome = self.process(delivery.payload()).await;
                let requeue = self.config.requeue_on_store_failure
                    && matches!(outcome, ProcessOutcome::Dropped(DropReason::StoreFailure));

                let settled = if requeue {
                    delivery.nack(true).await
                } else {
                    delivery.ack().await
                };
                match settled {
                    Ok(()) if requeue => {
                        debug!(
                            delay = ?self.config.requeue_delay,
                            "Delivery requeued, backing off"
                        );
                        tokio::time::sleep(self.config.requeue_delay).await;
                    }
                    Ok(()) => {}
                    Err(e) => warn!(error = %e, requeue, "Failed to settle delivery"),
                }
                outcome
            }
        }
    }

    /// Decode a payload and apply trial activation
    pub async fn process(&self, payload: &[u8]) -> ProcessOutcome {
        let outcome = match SubscriptionCreated::from_slice(payload) {
            Ok(event) => self.apply(&event).await,
            Err(e) => {
                warn!(error = %e, payload_len = payload.len(), "Dropping undecodable event");
                ProcessOutcome::Dropped(DropReason::Malformed)
            }
        };

        record_worker_outcome(outcome.as_str());
        outcome
    }

    #[instrument(skip(self, event), fields(subscription_id = %event.subscription_id))]
    async fn apply(&self, event: &SubscriptionCreated) -> ProcessOutcome {
        let mut attempt = 0;

        loop {
            let mut subscription = match self.load(event).await {
                Ok(subscription) => subscription,
                Err(outcome) => return outcome,
            };

            if let TrialActivation::AlreadyPastPending(status) =
                subscription.activate_trial(Utc::now())
            {
                debug!(%status, "Subscription already past PENDING, nothing to do");
                return ProcessOutcome::Unchanged(status);
            }

            match self.subscriptions.save(&SubscriptionRow::from(&subscription)).await {
                Ok(_) => {
                    info!(trial_ends_at = ?subscription.trial_ends_at, "Trial activated");
                    if let Err(e) = self.notifier.send_welcome(event).await {
                        warn!(error = %e, "Welcome notification failed");
                    }
                    return ProcessOutcome::Activated;
                }
                Err(DbError::Conflict { .. }) if attempt < self.config.max_conflict_retries => {
                    attempt += 1;
                    debug!(attempt, "Concurrent update while activating, retrying");
                }
                Err(DbError::Conflict { .. }) => {
                    error!("Trial activation kept losing to concurrent updates");
                    return ProcessOutcome::Dropped(DropReason::Conflict);
                }
                Err(e) => {
                    error!(error = %e, "Failed to persist trial activation");
                    return ProcessOutcome::Dropped(DropReason::StoreFailure);
                }
            }
        }
    }

    async fn load(&self, event: &SubscriptionCreated) -> Result<Subscription, ProcessOutcome> {
        let row = match self.subscriptions.find_by_id(event.subscription_id.0).await {
            Ok(row) => row,
            Err(DbError::NotFound) => {
                warn!("Subscription not found, dropping event");
                return Err(ProcessOutcome::Dropped(DropReason::NotFound));
            }
            Err(e) => {
                error!(error = %e, "Failed to load subscription");
                return Err(ProcessOutcome::Dropped(DropReason::StoreFailure));
            }
        };

        Subscription::try_from(row).map_err(|e| {
            error!(error = %e, "Stored subscription is unreadable");
            ProcessOutcome::Dropped(DropReason::StoreFailure)
        })
    }
}

impl<S, N> std::fmt::Debug for ActivationWorker<S, N>
where
    S: SubscriptionRepository,
    N: WelcomeNotifier,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivationWorker")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
