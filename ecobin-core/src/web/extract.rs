use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::Error;
use crate::web::error::ApiError;

/// Shared-secret header carried by bins on `POST /api/reward`.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Set by the authentication layer in front of this service.
pub const ACCOUNT_HEADER: &str = "x-account-id";

pub fn api_key(headers: &HeaderMap) -> Option<&str> {
    headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok())
}

/// The authenticated account a redemption is credited to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActingAccount(pub Uuid);

impl<S> FromRequestParts<S> for ActingAccount
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(ACCOUNT_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| Uuid::parse_str(v.trim()).ok())
            .map(ActingAccount)
            .ok_or(ApiError(Error::Unauthorized))
    }
}
