//! # Error Handling
//!
//! Two layers of errors live here:
//!
//! - **`EnhanceError`**: the failure taxonomy of the enhancement pipeline
//!   (model initialization, model invocation, audio I/O). These abort a job and
//!   their message is what a polling client eventually sees on a failed task.
//! - **`AppError`**: HTTP-facing errors, converted into JSON responses by the
//!   `ResponseError` implementation below.
//!
//! ## JSON Response Format:
//! All HTTP errors share one envelope:
//! ```json
//! {
//!   "error": {
//!     "type": "validation_error",
//!     "message": "File extension '.exe' not allowed",
//!     "timestamp": "2025-01-01T12:00:00Z"
//!   }
//! }
//! ```

use actix_web::{HttpResponse, ResponseError};  // Web framework error handling
use serde_json::json;                          // For creating JSON error responses
use std::fmt;                                  // For implementing Display trait

/// Failures that abort a `process_file` call.
///
/// ## Retry Policy:
/// Only `Initialization` is ever the product of retries (the model loader is
/// attempted several times before this is returned). `Enhancement` and `Io`
/// are surfaced on the first occurrence.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EnhanceError {
    /// The model could not be loaded; fatal for the worker that owns it.
    #[error("Failed to initialize audio processing model: {0}")]
    Initialization(String),

    /// The model failed on a specific window.
    #[error("Failed to enhance audio: {0}")]
    Enhancement(String),

    /// Loading or saving audio failed.
    #[error("{0}")]
    Io(String),
}

impl EnhanceError {
    pub fn io(context: &str, err: impl fmt::Display) -> Self {
        EnhanceError::Io(format!("{}: {}", context, err))
    }
}

/// Custom error types for the HTTP layer.
///
/// ## Error Categories:
/// - **Internal**: Server-side problems (500 errors)
/// - **BadRequest**: Client sent invalid data, or asked for something not ready (400 errors)
/// - **NotFound**: Requested resource doesn't exist (404 errors)
/// - **ValidationError**: Upload failed validation rules (400 errors)
#[derive(Debug)]
pub enum AppError {
    /// Internal server errors (queue failures, disk problems, etc.)
    Internal(String),

    /// Client sent invalid or malformed data
    BadRequest(String),

    /// Requested resource was not found
    NotFound(String),

    /// Upload failed validation (extension, size, empty file)
    ValidationError(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

/// Converts errors into HTTP responses.
///
/// ## HTTP Status Code Mapping:
/// - Internal → 500 (Internal Server Error)
/// - BadRequest/ValidationError → 400 (Bad Request)
/// - NotFound → 404 (Not Found)
impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let (status, error_type, message) = match self {
            AppError::Internal(msg) => (
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,  // 500
                "internal_error",
                msg.clone(),
            ),
            AppError::BadRequest(msg) => (
                actix_web::http::StatusCode::BAD_REQUEST,  // 400
                "bad_request",
                msg.clone(),
            ),
            AppError::NotFound(msg) => (
                actix_web::http::StatusCode::NOT_FOUND,  // 404
                "not_found",
                msg.clone(),
            ),
            AppError::ValidationError(msg) => (
                actix_web::http::StatusCode::BAD_REQUEST,  // 400
                "validation_error",
                msg.clone(),
            ),
        };

        HttpResponse::build(status).json(json!({
            "error": {
                "type": error_type,
                "message": message,
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }))
    }
}

/// Automatic conversion from anyhow::Error to AppError.
///
/// ## Usage:
/// Collaborator seams (queue, cache) return `anyhow::Result`; `?` in a
/// handler turns those failures into a 500.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(format!("JSON parsing error: {}", err))
    }
}

/// Multipart decoding problems are the client's fault.
impl From<actix_multipart::MultipartError> for AppError {
    fn from(err: actix_multipart::MultipartError) -> Self {
        AppError::BadRequest(format!("Malformed upload: {}", err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(format!("I/O error: {}", err))
    }
}

/// Type alias for Results that use our custom error type.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            AppError::ValidationError("too big".into()).error_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::NotFound("gone".into()).error_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::from(anyhow::anyhow!("queue down")).error_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_enhance_error_preserves_message() {
        let err = EnhanceError::Enhancement("CUDA out of memory".to_string());
        assert!(err.to_string().contains("CUDA out of memory"));

        let err = EnhanceError::io("Failed to load audio file", "unsupported codec");
        assert_eq!(err.to_string(), "Failed to load audio file: unsupported codec");
    }
}
