//! API error handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use core_kernel::PortError;
use domain_closing::ClosingError;

/// API error types
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<String>>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone()),
            ApiError::Validation(msg) => (StatusCode::UNPROCESSABLE_ENTITY, "validation_error", msg.clone()),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, "unavailable", msg.clone()),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg.clone()),
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        let body = ErrorResponse {
            error: error_type.to_string(),
            message,
            details: None,
        };

        (status, Json(body)).into_response()
    }
}

impl From<PortError> for ApiError {
    fn from(err: PortError) -> Self {
        match &err {
            PortError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            PortError::Validation { .. } => ApiError::Validation(err.to_string()),
            PortError::Conflict { .. } => ApiError::Conflict(err.to_string()),
            e if e.is_transient() => ApiError::Unavailable(err.to_string()),
            _ => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<ClosingError> for ApiError {
    fn from(err: ClosingError) -> Self {
        match err {
            ClosingError::RunNotFound(_) | ClosingError::VoucherNotFound(_) => {
                ApiError::NotFound(err.to_string())
            }
            ClosingError::InvalidStatusTransition { .. } => ApiError::Conflict(err.to_string()),
            ClosingError::InvalidDimensions(_)
            | ClosingError::InvalidDimensionKey { .. }
            | ClosingError::InvalidPeriod(_) => ApiError::Validation(err.to_string()),
            ClosingError::Port(port) => port.into(),
            ref e if e.is_transient() => ApiError::Unavailable(err.to_string()),
            _ => ApiError::Internal(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::RunId;

    #[test]
    fn test_missing_run_is_404() {
        let response = ApiError::from(ClosingError::RunNotFound(RunId::new())).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_invalid_transition_is_409() {
        let error = ClosingError::InvalidStatusTransition {
            from: "Completed".to_string(),
            to: "Paused".to_string(),
        };
        assert_eq!(ApiError::from(error).into_response().status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_transient_port_error_is_503() {
        let error = ClosingError::Port(PortError::connection("reset by peer"));
        assert_eq!(
            ApiError::from(error).into_response().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
