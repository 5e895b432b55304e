//! Event envelopes exchanged between the lifecycle service and the worker

use serde::{Deserialize, Serialize};

use crate::{SubscriptionId, UserId};

/// Channel carrying [`SubscriptionCreated`] envelopes
pub const SUBSCRIPTION_CREATED_CHANNEL: &str = "subscription_created_events";

/// Published once a new subscription has been persisted.
///
/// Carries enough to act on without re-reading the owning user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionCreated {
    /// The subscription that was created
    pub subscription_id: SubscriptionId,
    /// Its owner
    pub user_id: UserId,
    /// Owner contact address at creation time
    pub email: String,
}

impl SubscriptionCreated {
    /// Encode as a JSON payload
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Decode a JSON payload
    pub fn from_slice(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }
}
