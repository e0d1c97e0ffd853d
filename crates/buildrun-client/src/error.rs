//! Error types for the resource client.

use thiserror::Error;

/// Errors that can occur when talking to the platform API.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Failed to establish or keep a connection.
    #[error("connection failed: {0}")]
    Connection(String),

    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// The write lost a race with another writer.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The execution unit cannot serve output yet.
    #[error("not ready: {0}")]
    NotReady(String),

    /// Any other non-success answer from the API.
    #[error("API error (HTTP {code}): {message}")]
    Status { code: u16, message: String },

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<buildrun_core::CoreError> for ClientError {
    fn from(e: buildrun_core::CoreError) -> Self {
        Self::Serialization(e.to_string())
    }
}
