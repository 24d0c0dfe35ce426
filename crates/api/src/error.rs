//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use saga::SagaError;
use thiserror::Error;

/// API-level error type that maps to HTTP responses.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found.
    #[error("{0}")]
    NotFound(String),
    /// Saga operation error.
    #[error(transparent)]
    Saga(#[from] SagaError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Saga(err) => match err {
                SagaError::Validation(_) => StatusCode::BAD_REQUEST,
                SagaError::WorkflowNotFound(_) => StatusCode::NOT_FOUND,
                SagaError::AlreadyRunning(_)
                | SagaError::ReferenceConflict { .. }
                | SagaError::CancellationRejected { .. } => StatusCode::CONFLICT,
                SagaError::WorkerUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
                SagaError::CorruptHistory { .. }
                | SagaError::History(_)
                | SagaError::Domain(_)
                | SagaError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();
        if status.is_server_error() {
            tracing::error!(error = %message, "internal server error");
        }

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}
