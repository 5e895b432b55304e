//! Subscription types and lifecycle state machine
//!
//! ```text
//! PENDING ──activate_trial──▶ TRIAL ──▶ ACTIVE ──▶ PAST_DUE
//!                               │          │
//!                               └──cancel──┴──▶ CANCELLED (terminal)
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{StatusParseError, TransitionError, UserId};

/// Length of the trial period granted on activation
pub const TRIAL_PERIOD: Duration = Duration::days(14);

/// Unique subscription identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(pub Uuid);

impl SubscriptionId {
    /// Create a new random subscription ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a subscription ID from a string
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for SubscriptionId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Subscription status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionStatus {
    /// Created, waiting for the activation worker
    Pending,
    /// In trial period
    Trial,
    /// Subscription is active
    Active,
    /// Payment is past due
    PastDue,
    /// Subscription was cancelled
    Cancelled,
}

impl SubscriptionStatus {
    /// Every status, in lifecycle order
    pub const ALL: [Self; 5] = [
        Self::Pending,
        Self::Trial,
        Self::Active,
        Self::PastDue,
        Self::Cancelled,
    ];

    /// Whether a subscription in this status may be cancelled.
    ///
    /// Only `ACTIVE` and `TRIAL` subscriptions qualify. `PENDING` ones have
    /// not been activated yet and `PAST_DUE` ones are settled by billing.
    pub const fn can_be_cancelled(&self) -> bool {
        matches!(self, Self::Active | Self::Trial)
    }

    /// Whether no further transitions are permitted
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Wire/storage representation
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Trial => "TRIAL",
            Self::Active => "ACTIVE",
            Self::PastDue => "PAST_DUE",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SubscriptionStatus {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "TRIAL" => Ok(Self::Trial),
            "ACTIVE" => Ok(Self::Active),
            "PAST_DUE" => Ok(Self::PastDue),
            "CANCELLED" => Ok(Self::Cancelled),
            other => Err(StatusParseError(other.to_string())),
        }
    }
}

/// Result of replaying trial activation against a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialActivation {
    /// The subscription moved from `PENDING` to `TRIAL`
    Activated,
    /// The subscription was already past `PENDING`; nothing changed
    AlreadyPastPending(SubscriptionStatus),
}

/// User subscription
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    /// Subscription ID
    pub id: SubscriptionId,
    /// User who owns the subscription
    pub user_id: UserId,
    /// Purchased plan, opaque to the lifecycle engine
    pub plan_id: String,
    /// Subscription status
    pub status: SubscriptionStatus,
    /// When the subscription was created
    pub created_at: DateTime<Utc>,
    /// Last mutation
    pub updated_at: DateTime<Utc>,
    /// When the subscription was cancelled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<DateTime<Utc>>,
    /// End of the trial period, once activated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trial_ends_at: Option<DateTime<Utc>>,
    /// Optimistic concurrency version; `0` until first persisted
    #[serde(skip)]
    pub version: i64,
}

impl Subscription {
    /// Build a new `PENDING` subscription with a fresh ID
    pub fn new_pending(user_id: UserId, plan_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: SubscriptionId::new(),
            user_id,
            plan_id: plan_id.into(),
            status: SubscriptionStatus::Pending,
            created_at: now,
            updated_at: now,
            cancelled_at: None,
            trial_ends_at: None,
            version: 0,
        }
    }

    /// Whether the given user owns this subscription
    pub fn is_owned_by(&self, user_id: &UserId) -> bool {
        self.user_id == *user_id
    }

    /// Whether the subscription may currently be cancelled
    pub fn can_be_cancelled(&self) -> bool {
        self.status.can_be_cancelled()
    }

    /// Move the subscription to `CANCELLED`.
    ///
    /// Fails without touching the entity when the current status does not
    /// allow cancellation, including when it is already cancelled, so the
    /// original cancellation timestamp is never overwritten.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<(), TransitionError> {
        if !self.can_be_cancelled() {
            return Err(TransitionError::CannotBeCancelled(self.status));
        }

        self.status = SubscriptionStatus::Cancelled;
        self.cancelled_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Start the trial period.
    ///
    /// Only a `PENDING` subscription is changed. Any other status is left
    /// as-is so replays of the same activation are harmless.
    pub fn activate_trial(&mut self, now: DateTime<Utc>) -> TrialActivation {
        if self.status != SubscriptionStatus::Pending {
            return TrialActivation::AlreadyPastPending(self.status);
        }

        self.status = SubscriptionStatus::Trial;
        self.trial_ends_at = Some(now + TRIAL_PERIOD);
        self.updated_at = now;
        TrialActivation::Activated
    }
}
