//! # Error Handling
//!
//! This module defines the service-wide error type and how it's converted to HTTP responses.
//!
//! ## Error Taxonomy:
//! - **ValidationError**: The caller left out a required field (400)
//! - **Upstream**: The Gemini API failed or answered with an unexpected shape (502)
//! - everything else is plumbing: malformed JSON, unknown route, wrong method,
//!   missing configuration, internal failures
//!
//! Every failure is reported with the same JSON body:
//! ```json
//! {
//!   "error": "Story prompt is required",
//!   "type": "validation_error",
//!   "timestamp": "2025-01-01T12:00:00Z"
//! }
//! ```
//! `error` is a plain string so callers can display it as-is.

use crate::gemini::GeminiError;
use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;

/// Custom error types for the application.
///
/// ## Usage Example:
/// ```rust
/// return Err(AppError::ValidationError("Text required".to_string()));
/// ```
#[derive(Debug)]
pub enum AppError {
    /// Internal server errors
    Internal(String),

    /// Client sent a body that couldn't be parsed
    BadRequest(String),

    /// No route matches the request path
    NotFound(String),

    /// Route exists but not for this HTTP method
    MethodNotAllowed(String),

    /// Configuration file or environment variable problems
    ConfigError(String),

    /// A required request field is missing or empty
    ValidationError(String),

    /// The upstream API failed or returned something unusable
    Upstream(String),
}

impl AppError {
    /// The human-readable message, without the category prefix.
    pub fn message(&self) -> &str {
        match self {
            AppError::Internal(msg)
            | AppError::BadRequest(msg)
            | AppError::NotFound(msg)
            | AppError::MethodNotAllowed(msg)
            | AppError::ConfigError(msg)
            | AppError::ValidationError(msg)
            | AppError::Upstream(msg) => msg,
        }
    }

    /// Machine-readable category used in the `type` field.
    pub fn error_type(&self) -> &'static str {
        match self {
            AppError::Internal(_) => "internal_error",
            AppError::BadRequest(_) => "bad_request",
            AppError::NotFound(_) => "not_found",
            AppError::MethodNotAllowed(_) => "method_not_allowed",
            AppError::ConfigError(_) => "config_error",
            AppError::ValidationError(_) => "validation_error",
            AppError::Upstream(_) => "upstream_error",
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::MethodNotAllowed(msg) => write!(f, "Method not allowed: {}", msg),
            AppError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            AppError::Upstream(msg) => write!(f, "Upstream error: {}", msg),
        }
    }
}

/// Maps each error to its HTTP status and the shared JSON body.
///
/// ## HTTP Status Code Mapping:
/// - Internal/ConfigError → 500
/// - BadRequest/ValidationError → 400
/// - NotFound → 404, MethodNotAllowed → 405
/// - Upstream → 502
impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Internal(_) | AppError::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::BadRequest(_) | AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "error": self.message(),
            "type": self.error_type(),
            "timestamp": chrono::Utc::now().to_rfc3339()
        }))
    }
}

/// Anything reaching a handler as `anyhow::Error` is unexpected.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// JSON parsing errors are almost always the client's fault.
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(format!("JSON parsing error: {}", err))
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

/// A missing API key is our configuration problem; the rest is the upstream's.
impl From<GeminiError> for AppError {
    fn from(err: GeminiError) -> Self {
        match err {
            GeminiError::NotConfigured(msg) => AppError::ConfigError(msg),
            other => AppError::Upstream(other.to_string()),
        }
    }
}

/// Shorthand for `Result<T, AppError>`.
pub type AppResult<T> = Result<T, AppError>;
