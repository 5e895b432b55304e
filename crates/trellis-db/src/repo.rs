//! Repository traits
//!
//! Define async repository interfaces for database operations.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::DbResult;
use crate::models::*;

/// User repository trait
///
/// Users are owned by the auth side of the system; the lifecycle engine only
/// reads them.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Find a user by ID
    async fn find_by_id(&self, id: Uuid) -> DbResult<Option<UserRow>>;
}

/// Subscription repository trait
#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    /// Find a subscription by ID.
    ///
    /// Returns [`DbError::NotFound`](crate::DbError::NotFound) when absent.
    async fn find_by_id(&self, id: Uuid) -> DbResult<SubscriptionRow>;

    /// Upsert a subscription by ID, replacing every mutable column.
    ///
    /// `row.version` is the version the caller read: `0` inserts a new row,
    /// anything else only writes if the stored version still matches. A
    /// mismatch (or inserting an ID that already exists) yields
    /// [`DbError::Conflict`](crate::DbError::Conflict). Returns the stored row
    /// with its new version.
    async fn save(&self, row: &SubscriptionRow) -> DbResult<SubscriptionRow>;
}
