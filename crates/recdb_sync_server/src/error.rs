//! Error types for the sync server.

use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur while serving sync requests.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Store, codec or crypto failure.
    #[error("core error: {0}")]
    Core(#[from] recdb_core::CoreError),

    /// Malformed request body.
    #[error("protocol error: {0}")]
    Protocol(#[from] recdb_sync_protocol::ProtocolError),

    /// The request is well-formed but not serviceable.
    #[error("invalid request: {message}")]
    InvalidRequest {
        /// Description of the problem.
        message: String,
    },

    /// The delta exceeds the configured size bound.
    #[error("delta too large: {count} instances exceed the limit of {max}")]
    DeltaTooLarge {
        /// Instances in the request.
        count: usize,
        /// The configured bound.
        max: usize,
    },

    /// The request path names no endpoint.
    #[error("unknown path: {path}")]
    UnknownPath {
        /// The requested path.
        path: String,
    },
}

impl ServerError {
    /// Creates an invalid request error.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }
}
