//! Handler error classification.
//!
//! Every handler error is reduced to one coarse [`StatusCode`]. The code is
//! the `status` label on RPC metrics and decides the HTTP status the gateway
//! returns.

use std::error::Error;
use std::fmt;

use axum::http;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Coarse outcome of a handled call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    Ok,
    Canceled,
    InvalidArgument,
    DeadlineExceeded,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    Unauthenticated,
    Internal,
}

impl StatusCode {
    /// Label value, kebab-case.
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusCode::Ok => "ok",
            StatusCode::Canceled => "canceled",
            StatusCode::InvalidArgument => "invalid-argument",
            StatusCode::DeadlineExceeded => "deadline-exceeded",
            StatusCode::NotFound => "not-found",
            StatusCode::AlreadyExists => "already-exists",
            StatusCode::PermissionDenied => "permission-denied",
            StatusCode::Unauthenticated => "unauthenticated",
            StatusCode::Internal => "internal",
        }
    }

    pub fn http_status(&self) -> http::StatusCode {
        match self {
            StatusCode::Ok => http::StatusCode::OK,
            StatusCode::Unauthenticated => http::StatusCode::UNAUTHORIZED,
            StatusCode::AlreadyExists => http::StatusCode::BAD_REQUEST,
            StatusCode::NotFound => http::StatusCode::NOT_FOUND,
            StatusCode::Internal => http::StatusCode::INTERNAL_SERVER_ERROR,
            StatusCode::PermissionDenied => http::StatusCode::FORBIDDEN,
            StatusCode::Canceled => http::StatusCode::REQUEST_TIMEOUT,
            StatusCode::DeadlineExceeded => http::StatusCode::GATEWAY_TIMEOUT,
            StatusCode::InvalidArgument => http::StatusCode::BAD_REQUEST,
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Domain errors returned by service handlers.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("no ctx metadata")]
    Unauthenticated,

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("validate: {0}")]
    InvalidArgument(String),

    #[error("request canceled")]
    Canceled,

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::NotFound(_) => StatusCode::NotFound,
            ServiceError::AlreadyExists(_) => StatusCode::AlreadyExists,
            ServiceError::Unauthenticated => StatusCode::Unauthenticated,
            ServiceError::PermissionDenied(_) => StatusCode::PermissionDenied,
            ServiceError::InvalidArgument(_) => StatusCode::InvalidArgument,
            ServiceError::Canceled => StatusCode::Canceled,
            ServiceError::DeadlineExceeded => StatusCode::DeadlineExceeded,
            ServiceError::Internal(_) => StatusCode::Internal,
        }
    }
}

impl From<tokio::time::error::Elapsed> for ServiceError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        ServiceError::DeadlineExceeded
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        (self.status().http_status(), self.to_string()).into_response()
    }
}

/// Classify an error by walking its source chain.
///
/// Typed errors win over message heuristics. Anything unrecognized is
/// `Internal`.
pub fn classify(err: &(dyn Error + 'static)) -> StatusCode {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(service) = e.downcast_ref::<ServiceError>() {
            return service.status();
        }
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            match io.kind() {
                std::io::ErrorKind::NotFound => return StatusCode::NotFound,
                std::io::ErrorKind::TimedOut => return StatusCode::DeadlineExceeded,
                _ => {}
            }
        }
        if e.is::<tokio::time::error::Elapsed>() {
            return StatusCode::DeadlineExceeded;
        }
        current = e.source();
    }

    if err.to_string().contains("validate") {
        return StatusCode::InvalidArgument;
    }
    StatusCode::Internal
}
