//! Error types for onboard-sim HTTP handlers

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::models::SessionError;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Conflict (409), e.g. session busy or in the wrong state
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Dependent service not configured or unreachable (503)
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// onboard-common error
    #[error("Common error: {0}")]
    Common(#[from] onboard_common::Error),
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        let message = err.to_string();
        match err {
            SessionError::UnknownPersona(_) | SessionError::UnknownSituation(_) | SessionError::SessionNotFound(_) => {
                ApiError::NotFound(message)
            }
            SessionError::SessionBusy(_) | SessionError::InvalidState { .. } => ApiError::Conflict(message),
            SessionError::EmptyUtterance => ApiError::BadRequest(message),
            SessionError::SpeechUnavailable(_) => ApiError::Unavailable(message),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
            ApiError::Common(ref err) => (StatusCode::INTERNAL_SERVER_ERROR, "COMMON_ERROR", err.to_string()),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn session_errors_map_to_statuses() {
        let id = Uuid::new_v4();
        let cases = [
            (SessionError::SessionNotFound(id), StatusCode::NOT_FOUND),
            (SessionError::UnknownPersona("x".to_string()), StatusCode::NOT_FOUND),
            (SessionError::SessionBusy(id), StatusCode::CONFLICT),
            (
                SessionError::InvalidState {
                    session_id: id,
                    state: "COMPLETED",
                    operation: "take a turn",
                },
                StatusCode::CONFLICT,
            ),
            (SessionError::EmptyUtterance, StatusCode::BAD_REQUEST),
            (SessionError::SpeechUnavailable("off".to_string()), StatusCode::SERVICE_UNAVAILABLE),
        ];

        for (err, status) in cases {
            assert_eq!(ApiError::from(err).into_response().status(), status);
        }
    }
}
