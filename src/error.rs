//! Domain error types for the versioning engine.
//!
//! Uses thiserror for ergonomic error handling with automatic Display implementations.
//! Only faults that abort an operation live here; script execution failures and
//! not-found conditions travel as [`crate::models::OperationResult`] values.

use actix_web::{HttpResponse, ResponseError};
use std::fmt;

/// Application-level errors.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Database operation failed
    #[error("Database error: {0}")]
    Database(String),

    /// Resource not found
    #[error("{0} not found")]
    NotFound(String),

    /// Invalid input data
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Authentication failed
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Entity type used for persistence without registered metadata
    #[error("{0} is not a persistible type")]
    Mapping(String),

    /// Script resource name does not carry a numeric id
    #[error("Cannot read script id from file name: {0}")]
    ScriptId(String),

    /// Command exceeded the configured timeout
    #[error("Command timed out after {0} seconds")]
    Timeout(u64),

    /// Reading a script resource failed
    #[error("Resource error: {0}")]
    Resource(String),
}

impl AppError {
    /// Whether this error signals a packaging or programming defect that must
    /// terminate the enclosing deployment step.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AppError::Mapping(_) | AppError::ScriptId(_))
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let (status, error_code, response_message) = match self {
            AppError::Database(err_str) => {
                tracing::error!("Database error: {}", err_str);
                (
                    actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "An internal database error occurred".to_string(),
                )
            }
            AppError::NotFound(_) => (
                actix_web::http::StatusCode::NOT_FOUND,
                "NOT_FOUND",
                self.to_string(),
            ),
            AppError::InvalidInput(_) => (
                actix_web::http::StatusCode::BAD_REQUEST,
                "INVALID_INPUT",
                self.to_string(),
            ),
            AppError::Unauthorized(_) => (
                actix_web::http::StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                self.to_string(),
            ),
            AppError::Mapping(_) | AppError::ScriptId(_) => {
                tracing::error!("Configuration fault: {}", self);
                (
                    actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                    "CONFIGURATION_ERROR",
                    self.to_string(),
                )
            }
            AppError::Timeout(_) => (
                actix_web::http::StatusCode::GATEWAY_TIMEOUT,
                "TIMEOUT",
                self.to_string(),
            ),
            AppError::Resource(_) => (
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                "RESOURCE_ERROR",
                self.to_string(),
            ),
        };

        HttpResponse::build(status).json(ErrorResponse {
            error: error_code.to_string(),
            message: response_message,
        })
    }
}

/// Error response body matching OpenAPI schema.
#[derive(Debug, serde::Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error, self.message)
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

// Conversion implementations for common error types

impl From<sea_orm::DbErr> for AppError {
    fn from(err: sea_orm::DbErr) -> Self {
        AppError::Database(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Resource(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidInput(format!("JSON parsing error: {}", err))
    }
}
