//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::DomainError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Domain logic error.
    Domain(DomainError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Domain(err) => domain_error_to_response(err),
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn domain_error_to_response(err: DomainError) -> (StatusCode, String) {
    if err.is_validation() {
        (StatusCode::BAD_REQUEST, err.to_string())
    } else if err.is_not_found() {
        (StatusCode::NOT_FOUND, err.to_string())
    } else if matches!(err, DomainError::Broker(_)) {
        tracing::warn!(error = %err, "broker unavailable");
        (StatusCode::SERVICE_UNAVAILABLE, err.to_string())
    } else {
        tracing::error!(error = %err, "internal server error");
        (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::Domain(err)
    }
}
