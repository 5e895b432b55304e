//! Application state for the Subscription API service.

use std::sync::Arc;
use std::time::Duration;

use trellis_db::pg::{PgSubscriptionRepository, PgUserRepository};
use trellis_db::{DbPool, SubscriptionRepository, UserRepository};
use trellis_lifecycle::{EventPublisher, LifecycleService, PgEventQueue};

/// Lifecycle service wired to PostgreSQL
pub type PgLifecycleService =
    LifecycleService<PgSubscriptionRepository, PgUserRepository, PgEventQueue>;

/// Application state shared across all handlers
pub struct AppState<S = PgSubscriptionRepository, U = PgUserRepository, P = PgEventQueue>
where
    S: SubscriptionRepository,
    U: UserRepository,
    P: EventPublisher,
{
    /// Subscription lifecycle service
    pub lifecycle: Arc<LifecycleService<S, U, P>>,
    /// Database pool, used by the readiness probe
    pub pool: DbPool,
    /// Request timeout
    pub request_timeout: Duration,
}

impl<S, U, P> AppState<S, U, P>
where
    S: SubscriptionRepository,
    U: UserRepository,
    P: EventPublisher,
{
    /// Create new application state
    pub fn new(lifecycle: LifecycleService<S, U, P>, pool: DbPool, request_timeout: Duration) -> Self {
        Self {
            lifecycle: Arc::new(lifecycle),
            pool,
            request_timeout,
        }
    }
}

impl<S, U, P> Clone for AppState<S, U, P>
where
    S: SubscriptionRepository,
    U: UserRepository,
    P: EventPublisher,
{
    fn clone(&self) -> Self {
        Self {
            lifecycle: Arc::clone(&self.lifecycle),
            pool: self.pool.clone(),
            request_timeout: self.request_timeout,
        }
    }
}

impl<S, U, P> std::fmt::Debug for AppState<S, U, P>
where
    S: SubscriptionRepository,
    U: UserRepository,
    P: EventPublisher,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}
