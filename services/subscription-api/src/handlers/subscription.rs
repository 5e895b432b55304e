//! Subscription handlers

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use trellis_db::{SubscriptionRepository, UserRepository};
use trellis_lifecycle::{CreateSubscriptionInput, EventPublisher};
use trellis_types::{Subscription, SubscriptionId};

use crate::error::{ApiError, ApiResult};
use crate::extractors::CallerId;
use crate::state::AppState;

/// Parse a path segment as a subscription ID
fn parse_subscription_id(raw: &str) -> ApiResult<SubscriptionId> {
    SubscriptionId::parse(raw)
        .map_err(|_| ApiError::InvalidInput(format!("Invalid subscription id: {raw}")))
}

/// POST /subscriptions
///
/// Responds once the subscription is persisted and announced; trial
/// activation happens later in the worker.
pub async fn create_subscription<S, U, P>(
    State(state): State<AppState<S, U, P>>,
    CallerId(user_id): CallerId,
    payload: Result<Json<CreateSubscriptionInput>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Subscription>)>
where
    S: SubscriptionRepository + 'static,
    U: UserRepository + 'static,
    P: EventPublisher + 'static,
{
    let Json(input) = payload.map_err(|e| ApiError::InvalidInput(e.body_text()))?;

    let sub = state.lifecycle.create_subscription(user_id, input).await?;

    Ok((StatusCode::CREATED, Json(sub)))
}

/// GET /subscriptions/{id}
pub async fn get_subscription<S, U, P>(
    State(state): State<AppState<S, U, P>>,
    CallerId(user_id): CallerId,
    Path(id): Path<String>,
) -> ApiResult<Json<Subscription>>
where
    S: SubscriptionRepository + 'static,
    U: UserRepository + 'static,
    P: EventPublisher + 'static,
{
    let subscription_id = parse_subscription_id(&id)?;
    let sub = state
        .lifecycle
        .get_subscription(user_id, subscription_id)
        .await?;

    Ok(Json(sub))
}

/// DELETE /subscriptions/{id}
pub async fn cancel_subscription<S, U, P>(
    State(state): State<AppState<S, U, P>>,
    CallerId(user_id): CallerId,
    Path(id): Path<String>,
) -> ApiResult<Json<Subscription>>
where
    S: SubscriptionRepository + 'static,
    U: UserRepository + 'static,
    P: EventPublisher + 'static,
{
    let subscription_id = parse_subscription_id(&id)?;
    let sub = state
        .lifecycle
        .cancel_subscription(user_id, subscription_id)
        .await?;

    tracing::info!(%user_id, %subscription_id, "Subscription cancelled via API");

    Ok(Json(sub))
}
