//! LXD client errors

use thiserror::Error;

/// Errors that can occur when talking to the LXD daemon
#[derive(Debug, Error)]
pub enum LxdError {
    /// The command could not be spawned or exited non-zero
    #[error("Command failed: {0}")]
    Exec(String),

    /// LXD returned an error for the request
    #[error("LXD API error: {0}")]
    Api(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The command did not finish in time
    #[error("Timed out: {0}")]
    Timeout(String),
}
