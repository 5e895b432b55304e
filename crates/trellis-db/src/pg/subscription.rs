//! PostgreSQL subscription repository implementation

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::models::SubscriptionRow;
use crate::repo::SubscriptionRepository;

/// PostgreSQL subscription repository
#[derive(Clone)]
pub struct PgSubscriptionRepository {
    pool: PgPool,
}

impl PgSubscriptionRepository {
    /// Create a new subscription repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert(&self, row: &SubscriptionRow) -> DbResult<Option<SubscriptionRow>> {
        let stored = sqlx::query_as::<_, SubscriptionRow>(
            r#"
            INSERT INTO subscriptions (id, user_id, plan_id, status, created_at, updated_at,
                                       cancelled_at, trial_ends_at, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 1)
            ON CONFLICT (id) DO NOTHING
            RETURNING id, user_id, plan_id, status, created_at, updated_at,
                      cancelled_at, trial_ends_at, version
            "#,
        )
        .bind(row.id)
        .bind(row.user_id)
        .bind(&row.plan_id)
        .bind(&row.status)
        .bind(row.created_at)
        .bind(row.updated_at)
        .bind(row.cancelled_at)
        .bind(row.trial_ends_at)
        .fetch_optional(&self.pool)
        .await?;

        Ok(stored)
    }

    async fn replace(&self, row: &SubscriptionRow) -> DbResult<Option<SubscriptionRow>> {
        let stored = sqlx::query_as::<_, SubscriptionRow>(
            r#"
            UPDATE subscriptions
            SET user_id = $2,
                plan_id = $3,
                status = $4,
                updated_at = $5,
                cancelled_at = $6,
                trial_ends_at = $7,
                version = version + 1
            WHERE id = $1 AND version = $8
            RETURNING id, user_id, plan_id, status, created_at, updated_at,
                      cancelled_at, trial_ends_at, version
            "#,
        )
        .bind(row.id)
        .bind(row.user_id)
        .bind(&row.plan_id)
        .bind(&row.status)
        .bind(row.updated_at)
        .bind(row.cancelled_at)
        .bind(row.trial_ends_at)
        .bind(row.version)
        .fetch_optional(&self.pool)
        .await?;

        Ok(stored)
    }
}

#[async_trait]
impl SubscriptionRepository for PgSubscriptionRepository {
    async fn find_by_id(&self, id: Uuid) -> DbResult<SubscriptionRow> {
        let sub = sqlx::query_as::<_, SubscriptionRow>(
            r#"
            SELECT id, user_id, plan_id, status, created_at, updated_at,
                   cancelled_at, trial_ends_at, version
            FROM subscriptions
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        sub.ok_or(DbError::NotFound)
    }

    async fn save(&self, row: &SubscriptionRow) -> DbResult<SubscriptionRow> {
        let stored = if row.version == 0 {
            self.insert(row).await?
        } else {
            self.replace(row).await?
        };

        stored.ok_or_else(|| {
            tracing::debug!(
                subscription_id = %row.id,
                expected = row.version,
                "Stale subscription write rejected"
            );
            DbError::Conflict {
                expected: row.version,
            }
        })
    }
}
