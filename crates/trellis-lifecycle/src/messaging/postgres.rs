//! Durable queue on PostgreSQL
//!
//! Lets the API and the worker run as separate processes sharing only the
//! database. Rows in `queued_events` are leased with `FOR UPDATE SKIP LOCKED`;
//! a lease that is neither acked nor nacked expires after the visibility
//! timeout and the row is handed out again.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, instrument};

use super::{Acker, Delivery, EventConsumer, EventPublisher, MessagingError};

/// Default pause between empty polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Default lease length for a received row
pub const DEFAULT_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(30);

/// Default time a requeued row stays hidden before it is handed out again
pub const DEFAULT_REQUEUE_DELAY: Duration = Duration::from_secs(1);

/// PostgreSQL-backed event queue
#[derive(Clone)]
pub struct PgEventQueue {
    pool: PgPool,
}

impl PgEventQueue {
    /// Create a queue over an existing pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Consumer for one channel
    pub fn consumer(&self, channel: impl Into<String>) -> PgEventConsumer {
        PgEventConsumer {
            pool: self.pool.clone(),
            channel: channel.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            visibility_timeout: DEFAULT_VISIBILITY_TIMEOUT,
            requeue_delay: DEFAULT_REQUEUE_DELAY,
        }
    }
}

#[async_trait]
impl EventPublisher for PgEventQueue {
    #[instrument(skip(self, payload), fields(payload_len = payload.len()))]
    async fn publish(&self, channel: &str, payload: Vec<u8>) -> Result<(), MessagingError> {
        sqlx::query("INSERT INTO queued_events (channel, payload) VALUES ($1, $2)")
            .bind(channel)
            .bind(payload)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

impl std::fmt::Debug for PgEventQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgEventQueue").finish_non_exhaustive()
    }
}

/// Polling consumer of a [`PgEventQueue`] channel
pub struct PgEventConsumer {
    pool: PgPool,
    channel: String,
    poll_interval: Duration,
    visibility_timeout: Duration,
    requeue_delay: Duration,
}

impl PgEventConsumer {
    /// Set the pause between empty polls
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set how long a received row stays invisible to other consumers
    pub fn with_visibility_timeout(mut self, timeout: Duration) -> Self {
        self.visibility_timeout = timeout;
        self
    }

    /// Set how long a requeued row stays invisible before redelivery
    pub fn with_requeue_delay(mut self, delay: Duration) -> Self {
        self.requeue_delay = delay;
        self
    }

    async fn lease_next(&self) -> Result<Option<(i64, Vec<u8>, i32)>, MessagingError> {
        let row = sqlx::query_as::<_, (i64, Vec<u8>, i32)>(
            r#"
            UPDATE queued_events
            SET leased_until = NOW() + make_interval(secs => $2),
                deliveries = deliveries + 1
            WHERE id = (
                SELECT id
                FROM queued_events
                WHERE channel = $1
                  AND (leased_until IS NULL OR leased_until < NOW())
                ORDER BY id
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, payload, deliveries
            "#,
        )
        .bind(&self.channel)
        .bind(self.visibility_timeout.as_secs_f64())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }
}

#[async_trait]
impl EventConsumer for PgEventConsumer {
    async fn receive(&mut self) -> Result<Option<Delivery>, MessagingError> {
        loop {
            if let Some((id, payload, deliveries)) = self.lease_next().await? {
                debug!(event_id = id, deliveries, channel = %self.channel, "Leased queued event");
                let acker = PgAcker {
                    pool: self.pool.clone(),
                    id,
                    requeue_delay: self.requeue_delay,
                };
                return Ok(Some(Delivery::new(payload, deliveries > 1, acker)));
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

struct PgAcker {
    pool: PgPool,
    id: i64,
    requeue_delay: Duration,
}

#[async_trait]
impl Acker for PgAcker {
    async fn ack(&self) -> Result<(), MessagingError> {
        sqlx::query("DELETE FROM queued_events WHERE id = $1")
            .bind(self.id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn nack(&self, requeue: bool) -> Result<(), MessagingError> {
        if requeue {
            // Hidden until the delay passes, then leasable again
            sqlx::query(
                "UPDATE queued_events \
                 SET leased_until = NOW() + make_interval(secs => $2) \
                 WHERE id = $1",
            )
            .bind(self.id)
            .bind(self.requeue_delay.as_secs_f64())
            .execute(&self.pool)
            .await?;
            Ok(())
        } else {
            self.ack().await
        }
    }
}
