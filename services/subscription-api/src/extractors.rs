//! Request extractors
//!
//! Authentication happens at the gateway, which forwards the verified caller
//! as a UUID in the `X-User-Id` header.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use trellis_types::UserId;

use crate::error::ApiError;

/// Header carrying the authenticated caller
pub const USER_ID_HEADER: &str = "x-user-id";

/// The authenticated caller.
///
/// Rejects with 401 when the header is absent or not a UUID.
#[derive(Debug, Clone, Copy)]
pub struct CallerId(pub UserId);

impl<S> FromRequestParts<S> for CallerId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or(ApiError::Unauthenticated)?;

        UserId::parse(raw.trim())
            .map(Self)
            .map_err(|_| ApiError::Unauthenticated)
    }
}
