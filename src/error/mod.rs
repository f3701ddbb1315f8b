use crate::rate_limit::{apply_rate_limit_headers, RateLimitDecision};
use axum::{
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Result type for service operations
pub type Result<T> = std::result::Result<T, ServiceError>;

/// Reason a bearer credential was refused.
///
/// The kind is logged for operators but never returned to the caller.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    #[error("missing or non-bearer authorization header")]
    Missing,

    #[error("malformed token")]
    Malformed,

    #[error("token signature does not verify")]
    InvalidSignature,

    #[error("token expired or has no expiry")]
    Expired,
}

impl AuthFailure {
    /// Short label used in logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            AuthFailure::Missing => "missing",
            AuthFailure::Malformed => "malformed",
            AuthFailure::InvalidSignature => "invalid_signature",
            AuthFailure::Expired => "expired",
        }
    }
}

/// Service error types
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Authentication failed: {0}")]
    Unauthorized(AuthFailure),

    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Too many requests")]
    RateLimited(RateLimitDecision),

    #[error("Rate limiter error: {0}")]
    Store(String),

    #[error("Invalid request payload: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),
}

impl ServiceError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ServiceError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ServiceError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            ServiceError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Conflict(_) => StatusCode::CONFLICT,
        }
    }

    /// Message returned to the client.
    ///
    /// Internal details and the auth failure kind stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            ServiceError::Config(_) | ServiceError::Internal(_) | ServiceError::Io(_) => {
                "Internal server error".to_string()
            }
            ServiceError::Unauthorized(_) => "Unauthorized".to_string(),
            ServiceError::Store(_) => "Rate limiter error".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({ "error": self.public_message() }));
        let mut response = (status, body).into_response();

        if let ServiceError::RateLimited(decision) = &self {
            apply_rate_limit_headers(response.headers_mut(), decision);
            if let Some(retry_after) = decision.retry_after {
                response
                    .headers_mut()
                    .insert("retry-after", HeaderValue::from(retry_after));
            }
        }

        response
    }
}
