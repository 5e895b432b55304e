//! Database row models
//!
//! These types map directly to database rows using SQLx's FromRow derive.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use trellis_types::{Subscription, SubscriptionId, SubscriptionStatus, UserId};

use crate::DbError;

/// User row from the database
#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Subscription row from the database
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct SubscriptionRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub plan_id: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub version: i64,
}

// Conversion implementations between Row types and trellis-types domain types
impl UserRow {
    /// Convert to domain UserId
    pub fn user_id(&self) -> UserId {
        UserId(self.id)
    }
}

impl From<&Subscription> for SubscriptionRow {
    fn from(sub: &Subscription) -> Self {
        Self {
            id: sub.id.0,
            user_id: sub.user_id.0,
            plan_id: sub.plan_id.clone(),
            status: sub.status.as_str().to_string(),
            created_at: sub.created_at,
            updated_at: sub.updated_at,
            cancelled_at: sub.cancelled_at,
            trial_ends_at: sub.trial_ends_at,
            version: sub.version,
        }
    }
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = DbError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        let status: SubscriptionStatus = row
            .status
            .parse()
            .map_err(|e: trellis_types::StatusParseError| DbError::Decode(e.to_string()))?;

        Ok(Self {
            id: SubscriptionId(row.id),
            user_id: UserId(row.user_id),
            plan_id: row.plan_id,
            status,
            created_at: row.created_at,
            updated_at: row.updated_at,
            cancelled_at: row.cancelled_at,
            trial_ends_at: row.trial_ends_at,
            version: row.version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscription_row_conversion() {
        let mut sub = Subscription::new_pending(UserId::new(), "pro", Utc::now());
        sub.version = 4;

        let row = SubscriptionRow::from(&sub);
        assert_eq!(row.status, "PENDING");
        assert_eq!(row.version, 4);

        let back = Subscription::try_from(row).unwrap();
        assert_eq!(back, sub);
    }

    #[test]
    fn test_unknown_status_is_decode_error() {
        let sub = Subscription::new_pending(UserId::new(), "pro", Utc::now());
        let mut row = SubscriptionRow::from(&sub);
        row.status = "canceled".to_string();

        let err = Subscription::try_from(row).unwrap_err();
        assert!(matches!(err, DbError::Decode(_)));
    }
}
