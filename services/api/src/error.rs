//! services/api/src/error.rs
//!
//! Defines the primary error type for the entire API service and how it is
//! rendered as an HTTP response.

use crate::config::ConfigError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use records_core::ports::PortError;
use serde_json::json;
use tracing::error;

/// The primary error type for the `api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from one of the core service ports.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    /// Represents a failed schema migration at startup.
    #[error("Migration Error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Represents a failure while encoding a CSV export.
    #[error("CSV Error: {0}")]
    Csv(#[from] csv::Error),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A request field failed validation.
    #[error("Invalid value for {field}: {message}")]
    Validation { field: String, message: String },

    /// No valid session accompanied the request.
    #[error("Authentication required")]
    Unauthenticated,

    /// The caller is authenticated but may not perform this operation.
    #[error("Forbidden")]
    Forbidden,

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        ApiError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, field) = match &self {
            ApiError::Validation { field, .. } => {
                (StatusCode::BAD_REQUEST, self.to_string(), Some(field.clone()))
            }
            ApiError::Port(PortError::Invalid { field, .. }) => {
                (StatusCode::BAD_REQUEST, self_message(&self), Some(field.clone()))
            }
            ApiError::Port(PortError::NotFound(_)) => {
                (StatusCode::NOT_FOUND, self_message(&self), None)
            }
            ApiError::Port(PortError::Conflict(field)) => {
                (StatusCode::CONFLICT, self_message(&self), Some(field.clone()))
            }
            ApiError::Port(PortError::Protected(_)) => {
                (StatusCode::CONFLICT, self_message(&self), None)
            }
            ApiError::Port(PortError::Unauthorized) | ApiError::Unauthenticated => {
                (StatusCode::UNAUTHORIZED, "Authentication required".to_string(), None)
            }
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "Forbidden".to_string(), None),
            _ => {
                error!("Request failed: {:?}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    None,
                )
            }
        };

        let body = match field {
            Some(field) => json!({ "error": message, "field": field }),
            None => json!({ "error": message }),
        };
        (status, Json(body)).into_response()
    }
}

/// The port error's own message, without the "Service Port Error" prefix.
fn self_message(err: &ApiError) -> String {
    match err {
        ApiError::Port(inner) => inner.to_string(),
        other => other.to_string(),
    }
}
