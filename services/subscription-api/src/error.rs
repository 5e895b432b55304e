//! Error types for the Subscription API service.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use trellis_lifecycle::{LifecycleError, NotFoundKind};

/// API error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
}

/// API error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Missing or invalid X-User-Id header")]
    Unauthenticated,

    #[error("{0}")]
    InvalidInput(String),

    #[error("Subscription not found")]
    SubscriptionNotFound,

    #[error("User not found")]
    UserNotFound,

    #[error("Subscription belongs to another user")]
    Forbidden,

    #[error("{0}")]
    CannotTransition(String),

    #[error("Subscription was modified concurrently, retry the request")]
    Conflict,

    #[error("Internal error")]
    Lifecycle(#[source] LifecycleError),
}

impl From<LifecycleError> for ApiError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::InvalidInput(message) => Self::InvalidInput(message),
            LifecycleError::NotFound(NotFoundKind::Subscription) => Self::SubscriptionNotFound,
            LifecycleError::NotFound(NotFoundKind::User) => Self::UserNotFound,
            LifecycleError::Forbidden => Self::Forbidden,
            LifecycleError::CannotTransition(e) => Self::CannotTransition(e.to_string()),
            LifecycleError::Conflict => Self::Conflict,
            err @ LifecycleError::DependencyFailure { .. } => Self::Lifecycle(err),
        }
    }
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::SubscriptionNotFound | Self::UserNotFound => StatusCode::NOT_FOUND,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::CannotTransition(_) | Self::Conflict => StatusCode::CONFLICT,
            Self::Lifecycle(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::SubscriptionNotFound => "SUBSCRIPTION_NOT_FOUND",
            Self::UserNotFound => "USER_NOT_FOUND",
            Self::Forbidden => "FORBIDDEN",
            Self::CannotTransition(_) => "CANNOT_TRANSITION",
            Self::Conflict => "CONFLICT",
            Self::Lifecycle(_) => "DEPENDENCY_FAILURE",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();

        // Details stay in the log; the caller only sees the generic message
        if let Self::Lifecycle(source) = &self {
            tracing::error!(error = %source, "Internal API error");
        }

        let body = ErrorResponse {
            error: ErrorDetail {
                code,
                message: self.to_string(),
            },
        };

        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
