//! Error types for storage backends.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur in a key-value backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Another process holds the store's file lock.
    #[error("store locked: {path}")]
    Locked {
        /// Path of the locked store.
        path: String,
    },

    /// The persisted document could not be read back as a string map.
    #[error("store corrupt: {message}")]
    Corrupt {
        /// Description of the corruption.
        message: String,
    },

    /// Codec failure while persisting or loading the map.
    #[error("codec error: {0}")]
    Codec(#[from] recdb_codec::CodecError),
}

impl StorageError {
    /// Creates a corrupt-store error.
    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::Corrupt {
            message: message.into(),
        }
    }
}
