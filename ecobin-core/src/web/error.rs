use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::error;

use crate::Error;

/// Maps workspace errors onto HTTP statuses with a `{"error": ...}` body.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            Error::Unauthorized => StatusCode::UNAUTHORIZED,
            Error::InvalidMaterial(_) | Error::Parse(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) | Error::AccountNotFound(_) => StatusCode::NOT_FOUND,
            Error::AlreadyRedeemed(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match &self.0 {
            Error::Unauthorized => "unauthorized".to_string(),
            Error::InvalidMaterial(m) => format!("material '{}' is not recognized", m),
            Error::Parse(m) => m.clone(),
            Error::NotFound(_) => "reward not found".to_string(),
            Error::AccountNotFound(_) => "account not found".to_string(),
            Error::AlreadyRedeemed(_) => "reward already redeemed".to_string(),
            _ => "internal server error".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {:?}", self.0);
        }
        (status, Json(serde_json::json!({ "error": self.message() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broken_records_are_server_errors() {
        let err = ApiError(Error::Internal("token abc is not in a redeemed state".into()));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message(), "internal server error");

        let blank = ApiError(Error::Parse("reward code must not be empty".into()));
        assert_eq!(blank.status(), StatusCode::BAD_REQUEST);
    }
}
