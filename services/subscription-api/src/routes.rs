//! HTTP router and middleware stack

use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use trellis_db::{SubscriptionRepository, UserRepository};
use trellis_lifecycle::EventPublisher;

use crate::handlers;
use crate::state::AppState;

/// Build the full application router
pub fn build_router<S, U, P>(
    state: AppState<S, U, P>,
    metrics_handle: Option<PrometheusHandle>,
) -> Router
where
    S: SubscriptionRepository + 'static,
    U: UserRepository + 'static,
    P: EventPublisher + 'static,
{
    let request_timeout = state.request_timeout;

    let api = Router::new()
        .route(
            "/subscriptions",
            post(handlers::create_subscription::<S, U, P>),
        )
        .route(
            "/subscriptions/{id}",
            get(handlers::get_subscription::<S, U, P>)
                .delete(handlers::cancel_subscription::<S, U, P>),
        );

    // Health routes (no timeout - must always respond quickly)
    let health_routes = Router::new()
        .route("/health", get(handlers::health))
        .route("/ready", get(handlers::ready::<S, U, P>));

    let metrics_route = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    // Outermost first
    let middleware = ServiceBuilder::new()
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TimeoutLayer::new(request_timeout));

    Router::new()
        .merge(api)
        .layer(middleware)
        .merge(health_routes)
        .merge(metrics_route)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::Utc;
    use dashmap::DashMap;
    use serde_json::{json, Value};
    use sqlx::postgres::PgPoolOptions;
    use tower::ServiceExt;
    use uuid::Uuid;

    use trellis_db::{DbError, DbResult, SubscriptionRow, UserRow};
    use trellis_lifecycle::{
        EventConsumer, LifecycleConfig, LifecycleService, MemoryBroker, MemoryConsumer,
        SUBSCRIPTION_CREATED_CHANNEL,
    };
    use trellis_types::{Subscription, SubscriptionCreated, SubscriptionStatus, UserId};

    use super::*;
    use crate::extractors::USER_ID_HEADER;

    #[derive(Default)]
    struct InMemorySubscriptions {
        rows: DashMap<Uuid, SubscriptionRow>,
    }

    #[async_trait]
    impl SubscriptionRepository for InMemorySubscriptions {
        async fn find_by_id(&self, id: Uuid) -> DbResult<SubscriptionRow> {
            self.rows
                .get(&id)
                .map(|r| r.value().clone())
                .ok_or(DbError::NotFound)
        }

        async fn save(&self, row: &SubscriptionRow) -> DbResult<SubscriptionRow> {
            let current = self.rows.get(&row.id).map(|r| r.version).unwrap_or(0);
            if current != row.version {
                return Err(DbError::Conflict {
                    expected: row.version,
                });
            }
            let mut stored = row.clone();
            stored.version = row.version + 1;
            self.rows.insert(stored.id, stored.clone());
            Ok(stored)
        }
    }

    #[derive(Default)]
    struct InMemoryUsers {
        users: DashMap<Uuid, UserRow>,
    }

    #[async_trait]
    impl UserRepository for InMemoryUsers {
        async fn find_by_id(&self, id: Uuid) -> DbResult<Option<UserRow>> {
            Ok(self.users.get(&id).map(|r| r.value().clone()))
        }
    }

    struct TestApp {
        router: Router,
        subscriptions: Arc<InMemorySubscriptions>,
        consumer: MemoryConsumer,
        user_id: UserId,
    }

    fn test_app() -> TestApp {
        let subscriptions = Arc::new(InMemorySubscriptions::default());
        let users = Arc::new(InMemoryUsers::default());
        let broker = MemoryBroker::new();
        let consumer = broker.consumer(SUBSCRIPTION_CREATED_CHANNEL).unwrap();

        let user = UserRow {
            id: Uuid::new_v4(),
            name: "Ana".to_string(),
            email: "ana@example.com".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let user_id = user.user_id();
        users.users.insert(user.id, user);

        let lifecycle = LifecycleService::new(
            LifecycleConfig::default(),
            Arc::clone(&subscriptions),
            users,
            Arc::new(broker),
        );
        // Never connects unless /ready is hit
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/trellis_test")
            .unwrap();
        let state = AppState::new(lifecycle, pool, Duration::from_secs(5));

        TestApp {
            router: build_router(state, None),
            subscriptions,
            consumer,
            user_id,
        }
    }

    impl TestApp {
        fn seed(&self, owner: UserId, status: SubscriptionStatus) -> Subscription {
            let mut sub = Subscription::new_pending(owner, "pro", Utc::now());
            sub.status = status;
            let mut row = SubscriptionRow::from(&sub);
            row.version = 1;
            self.subscriptions.rows.insert(row.id, row);
            sub
        }

        async fn send(
            &self,
            method: &str,
            uri: &str,
            caller: Option<UserId>,
            body: Option<Value>,
        ) -> (StatusCode, Value) {
            let mut builder = Request::builder().method(method).uri(uri);
            if let Some(caller) = caller {
                builder = builder.header(USER_ID_HEADER, caller.to_string());
            }
            let body = match body {
                Some(json) => {
                    builder = builder.header("content-type", "application/json");
                    Body::from(json.to_string())
                }
                None => Body::empty(),
            };

            let response = self
                .router
                .clone()
                .oneshot(builder.body(body).unwrap())
                .await
                .unwrap();
            let status = response.status();
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            let value = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap()
            };
            (status, value)
        }
    }

    fn error_code(body: &Value) -> &str {
        body["error"]["code"].as_str().unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = test_app();
        let (status, body) = app.send("GET", "/health", None, None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_create_returns_pending_and_publishes() {
        let mut app = test_app();
        let (status, body) = app
            .send(
                "POST",
                "/subscriptions",
                Some(app.user_id),
                Some(json!({ "planId": "pro" })),
            )
            .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["status"], "PENDING");
        assert_eq!(body["planId"], "pro");
        assert_eq!(body["userId"], app.user_id.to_string());
        assert!(body.get("cancelledAt").is_none());
        assert!(body.get("version").is_none());

        let delivery = app.consumer.receive().await.unwrap().unwrap();
        let event = SubscriptionCreated::from_slice(delivery.payload()).unwrap();
        assert_eq!(event.subscription_id.to_string(), body["id"].as_str().unwrap());
        assert_eq!(event.email, "ana@example.com");
        delivery.ack().await.unwrap();
    }

    #[tokio::test]
    async fn test_create_requires_caller() {
        let app = test_app();
        let (status, body) = app
            .send("POST", "/subscriptions", None, Some(json!({ "planId": "pro" })))
            .await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(error_code(&body), "UNAUTHENTICATED");
    }

    #[tokio::test]
    async fn test_create_rejects_bad_input() {
        let app = test_app();

        let (status, body) = app
            .send(
                "POST",
                "/subscriptions",
                Some(app.user_id),
                Some(json!({ "planId": "  " })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error_code(&body), "INVALID_INPUT");

        let (status, body) = app
            .send(
                "POST",
                "/subscriptions",
                Some(app.user_id),
                Some(json!({ "planId": 42 })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error_code(&body), "INVALID_INPUT");

        assert!(app.subscriptions.rows.is_empty());
    }

    #[tokio::test]
    async fn test_create_for_unknown_user() {
        let app = test_app();
        let (status, body) = app
            .send(
                "POST",
                "/subscriptions",
                Some(UserId::new()),
                Some(json!({ "planId": "pro" })),
            )
            .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(error_code(&body), "USER_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_get_checks_ownership() {
        let app = test_app();
        let sub = app.seed(app.user_id, SubscriptionStatus::Active);
        let uri = format!("/subscriptions/{}", sub.id);

        let (status, body) = app.send("GET", &uri, Some(app.user_id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ACTIVE");

        let (status, body) = app.send("GET", &uri, Some(UserId::new()), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(error_code(&body), "FORBIDDEN");
        assert!(body.get("planId").is_none());
    }

    #[tokio::test]
    async fn test_get_missing_or_malformed_id() {
        let app = test_app();

        let uri = format!("/subscriptions/{}", Uuid::new_v4());
        let (status, body) = app.send("GET", &uri, Some(app.user_id), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(error_code(&body), "SUBSCRIPTION_NOT_FOUND");

        let (status, body) = app
            .send("GET", "/subscriptions/not-a-uuid", Some(app.user_id), None)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error_code(&body), "INVALID_INPUT");
    }

    #[tokio::test]
    async fn test_cancel_active_then_again() {
        let app = test_app();
        let sub = app.seed(app.user_id, SubscriptionStatus::Active);
        let uri = format!("/subscriptions/{}", sub.id);

        let (status, body) = app.send("DELETE", &uri, Some(app.user_id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "CANCELLED");
        assert_eq!(body["cancelledAt"], body["updatedAt"]);

        let (status, body) = app.send("DELETE", &uri, Some(app.user_id), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(error_code(&body), "CANNOT_TRANSITION");
    }

    #[tokio::test]
    async fn test_cancel_pending_is_rejected() {
        let app = test_app();
        let sub = app.seed(app.user_id, SubscriptionStatus::Pending);
        let uri = format!("/subscriptions/{}", sub.id);

        let (status, body) = app.send("DELETE", &uri, Some(app.user_id), None).await;

        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(error_code(&body), "CANNOT_TRANSITION");
    }

    #[tokio::test]
    async fn test_cancel_other_users_subscription() {
        let app = test_app();
        let sub = app.seed(app.user_id, SubscriptionStatus::Trial);
        let uri = format!("/subscriptions/{}", sub.id);

        let (status, _) = app.send("DELETE", &uri, Some(UserId::new()), None).await;

        assert_eq!(status, StatusCode::FORBIDDEN);
        let stored = app.subscriptions.rows.get(&sub.id.0).unwrap().status.clone();
        assert_eq!(stored, "TRIAL");
    }
}
