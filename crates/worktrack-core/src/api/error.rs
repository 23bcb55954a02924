use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Session expired - please sign in again")]
    SessionExpired,

    #[error("Unauthorized - check email and password")]
    Unauthorized,

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    Network(#[from] TransportError),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    pub fn from_status(status: u16, body: &str) -> Self {
        let truncated = Self::truncate_body(body);
        match status {
            401 => ApiError::Unauthorized,
            403 => ApiError::AccessDenied(truncated),
            404 => ApiError::NotFound(truncated),
            429 => ApiError::RateLimited,
            500..=599 => ApiError::ServerError(truncated),
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, truncated)),
        }
    }

    /// Whether the caller has to sign in again before retrying
    pub fn requires_login(&self) -> bool {
        matches!(self, ApiError::SessionExpired | ApiError::Unauthorized)
    }
}

/// Transport-level failure, unrelated to authorization.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Other(String),
}

/// Why a credential renewal did not produce a new access credential.
///
/// Never surfaced to callers directly: every variant ends the session and
/// is reported as [`ApiError::SessionExpired`].
#[derive(Error, Debug)]
pub enum RenewalError {
    #[error("No refresh credential available")]
    MissingRefresh,

    #[error("Malformed credential")]
    MalformedCredential,

    #[error("Refresh credential expired")]
    RefreshExpired,

    #[error("Renewal rejected with status {0}")]
    Rejected(u16),

    #[error("Renewal timed out after {0:?}")]
    Timeout(Duration),

    #[error("Renewal request failed: {0}")]
    Transport(#[from] TransportError),

    #[error("Invalid renewal response: {0}")]
    InvalidResponse(String),
}
