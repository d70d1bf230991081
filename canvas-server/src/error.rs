//! HTTP boundary errors.
//!
//! Every store and gateway failure is converted into a JSON error response
//! here; nothing propagates to axum as an unhandled fault.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use canvas_core::StoreError;
use serde_json::{json, Value};
use thiserror::Error;

use crate::execution::ExecutionError;
use crate::validation::ValidationError;

/// Error returned by HTTP handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Element store or file tree failure.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Code execution gateway failure.
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    /// Request failed input validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// Request body was well-formed JSON but semantically invalid.
    #[error("{0}")]
    BadRequest(String),
}

impl ApiError {
    /// HTTP status for this error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Store(e) if e.is_not_found() => StatusCode::NOT_FOUND,
            Self::Store(StoreError::InvalidPatch(_) | StoreError::ElementLimit { .. }) => {
                StatusCode::BAD_REQUEST
            }
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Execution(ExecutionError::Upstream { .. } | ExecutionError::InvalidUrl(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Execution(_) | Self::Validation(_) | Self::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
        }
    }

    fn body(&self) -> Value {
        match self {
            Self::Execution(ExecutionError::UnsupportedLanguage {
                language,
                supported,
            }) => json!({
                "error": format!("Unsupported language: {language}"),
                "supportedLanguages": supported,
            }),
            Self::Execution(ExecutionError::Upstream { message, details }) => json!({
                "error": "Failed to execute code",
                "message": message,
                "details": details,
            }),
            other => json!({ "error": other.to_string() }),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, status = %status, "Request rejected");
        }
        (status, Json(self.body())).into_response()
    }
}
