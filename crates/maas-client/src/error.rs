//! MAAS client errors

use thiserror::Error;

/// Errors that can occur when interacting with the MAAS API
#[derive(Debug, Error)]
pub enum MaasError {
    /// HTTP request/response error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// MAAS API returned an error
    #[error("MAAS API error: {0}")]
    Api(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Authentication failed (malformed key, revoked token, etc.)
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// MAAS rejected the write because a conflicting object exists
    #[error("Conflict: {0}")]
    Conflict(String),

    /// MAAS answered with a server-side (5xx) status
    #[error("MAAS unavailable: {0}")]
    Unavailable(String),

    /// Invalid request (e.g., missing required fields)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl MaasError {
    /// Whether retrying the same request later may succeed.
    ///
    /// Transport failures and server-side (5xx) responses are transient;
    /// authentication, validation and conflict errors are not.
    pub fn is_transient(&self) -> bool {
        matches!(self, MaasError::Http(_) | MaasError::Unavailable(_))
    }
}
