//! # Error Handling
//!
//! This module defines the two error types the application uses and how they
//! are surfaced:
//!
//! - [`AppError`] covers the HTTP surface. It implements `ResponseError` so
//!   handler failures are converted to consistent JSON error responses.
//! - [`SessionError`] covers the interview session itself. Its variants map
//!   directly onto the recovery policy: most are degrade-and-continue, only
//!   `Internal` closes the session (and never the whole process).
//!
//! ## Recovery policy per variant:
//! - `Decode`: bad/corrupt candidate audio — logged, the chunk is dropped,
//!   the session continues.
//! - `ServiceTimeout`: an external provider call exceeded its deadline — the
//!   operation degrades to a fallback value, never aborts the session.
//! - `Service`: a non-timeout provider failure (HTTP error, malformed
//!   response) — same degrade-and-continue policy.
//! - `Protocol`: an unparseable or unknown inbound message — surfaced to the
//!   candidate via an `ERROR` notice, the connection stays open.
//! - `ArtifactMissing`: a question's audio artifact is absent or unreadable —
//!   surfaced as `AUDIO_ERROR`, the interview continues without it.
//! - `Internal`: an unrecoverable local resource failure (e.g. a temp file
//!   cannot be created) — closes this session only.

use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;

/// Custom error types for the HTTP API surface.
///
/// ## Error Categories:
/// - **Internal**: Server-side problems (500 errors)
/// - **BadRequest**: Client sent invalid data (400 errors)
/// - **NotFound**: Requested resource doesn't exist (404 errors)
/// - **ConfigError**: Configuration problems (500 errors)
/// - **ValidationError**: Data validation failed (400 errors)
#[derive(Debug)]
pub enum AppError {
    /// Internal server errors (service wiring failures, I/O issues, etc.)
    Internal(String),

    /// Client sent invalid or malformed data
    BadRequest(String),

    /// Requested resource was not found
    NotFound(String),

    /// Configuration file or environment variable problems
    ConfigError(String),

    /// User input failed validation rules
    ValidationError(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

/// Converts our custom errors into HTTP responses that clients can understand.
///
/// ## JSON Response Format:
/// All errors return JSON with a consistent structure:
/// ```json
/// {
///   "error": {
///     "type": "validation_error",
///     "message": "Port must be greater than 0",
///     "timestamp": "2025-01-01T12:00:00Z"
///   }
/// }
/// ```
impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let (status, error_type, message) = match self {
            AppError::Internal(msg) => (
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                msg.clone(),
            ),
            AppError::BadRequest(msg) => (
                actix_web::http::StatusCode::BAD_REQUEST,
                "bad_request",
                msg.clone(),
            ),
            AppError::NotFound(msg) => (
                actix_web::http::StatusCode::NOT_FOUND,
                "not_found",
                msg.clone(),
            ),
            AppError::ConfigError(msg) => (
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                "config_error",
                msg.clone(),
            ),
            AppError::ValidationError(msg) => (
                actix_web::http::StatusCode::BAD_REQUEST,
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

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

/// Type alias for Results that use our HTTP error type.
pub type AppResult<T> = Result<T, AppError>;

/// Errors raised inside an interview session.
///
/// Carries enough context for logging; the orchestrator decides per variant
/// whether to drop a chunk, degrade to a fallback, notify the candidate, or
/// close the session (see the module docs for the policy table).
#[derive(Debug)]
pub enum SessionError {
    /// Inbound audio could not be decoded to PCM
    Decode(String),

    /// An external provider call exceeded its deadline
    ServiceTimeout(String),

    /// An external provider call failed for a non-timeout reason
    Service(String),

    /// An inbound session message could not be understood
    Protocol(String),

    /// The audio artifact for the given question index is absent or unreadable
    ArtifactMissing(usize),

    /// Unrecoverable local resource failure; closes this session only
    Internal(String),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Decode(msg) => write!(f, "Audio decode error: {}", msg),
            SessionError::ServiceTimeout(what) => write!(f, "Timed out waiting for {}", what),
            SessionError::Service(msg) => write!(f, "External service error: {}", msg),
            SessionError::Protocol(msg) => write!(f, "Protocol error: {}", msg),
            SessionError::ArtifactMissing(index) => {
                write!(f, "Audio artifact missing for question {}", index)
            }
            SessionError::Internal(msg) => write!(f, "Internal session error: {}", msg),
        }
    }
}

impl SessionError {
    /// Classify a reqwest failure: timeouts get their own variant so the
    /// caller's degrade policy can distinguish them in logs and metrics.
    pub fn from_request(err: reqwest::Error, what: &str) -> Self {
        if err.is_timeout() {
            SessionError::ServiceTimeout(what.to_string())
        } else {
            SessionError::Service(format!("{}: {}", what, err))
        }
    }

    /// Whether this error should end the session.
    ///
    /// Only local resource failures are fatal; everything else degrades.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SessionError::Internal(_))
    }
}

/// Type alias for Results inside the session pipeline and services.
pub type SessionResult<T> = Result<T, SessionError>;
