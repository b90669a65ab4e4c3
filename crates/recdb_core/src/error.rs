//! Error types for recdb core.

use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in recdb core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Host key-value backend error.
    #[error("storage error: {0}")]
    Storage(#[from] recdb_storage::StorageError),

    /// Canonical codec error.
    #[error("codec error: {0}")]
    Codec(#[from] recdb_codec::CodecError),

    /// A record names a type the store was not configured with.
    #[error("unknown record type: {name}")]
    UnknownType {
        /// The unconfigured type name.
        name: String,
    },

    /// A record or canonical document is structurally invalid.
    #[error("invalid record: {message}")]
    InvalidRecord {
        /// Description of the problem.
        message: String,
    },

    /// An add would collide with an existing creation timestamp.
    #[error("id conflict: {id} already present in type {type_name}")]
    IdConflict {
        /// Record type.
        type_name: String,
        /// The colliding creation timestamp.
        id: u64,
    },

    /// A replace or remove found no record to act on.
    #[error("no match: {id} not present in type {type_name}")]
    NoMatch {
        /// Record type.
        type_name: String,
        /// The missing creation timestamp.
        id: u64,
    },

    /// Encryption failed.
    #[error("encryption failed: {message}")]
    EncryptionFailed {
        /// Description of the failure.
        message: String,
    },

    /// Decryption failed (wrong key or tampered ciphertext).
    #[error("decryption failed: {message}")]
    DecryptionFailed {
        /// Description of the failure.
        message: String,
    },

    /// Key derivation failed.
    #[error("key derivation failed: {message}")]
    KeyDerivationFailed {
        /// Description of the failure.
        message: String,
    },

    /// A cipher envelope is missing fields or carries bad hex.
    #[error("invalid cipher envelope: {message}")]
    InvalidEnvelope {
        /// Description of the problem.
        message: String,
    },

    /// The persisted last-sync watermark is not a decimal timestamp.
    #[error("invalid sync watermark: {value:?}")]
    InvalidWatermark {
        /// The unparseable stored value.
        value: String,
    },
}

impl CoreError {
    /// Creates an unknown type error.
    pub fn unknown_type(name: impl Into<String>) -> Self {
        Self::UnknownType { name: name.into() }
    }

    /// Creates an invalid record error.
    pub fn invalid_record(message: impl Into<String>) -> Self {
        Self::InvalidRecord {
            message: message.into(),
        }
    }

    /// Creates an encryption failed error.
    pub fn encryption_failed(message: impl Into<String>) -> Self {
        Self::EncryptionFailed {
            message: message.into(),
        }
    }

    /// Creates a decryption failed error.
    pub fn decryption_failed(message: impl Into<String>) -> Self {
        Self::DecryptionFailed {
            message: message.into(),
        }
    }

    /// Creates a key derivation failed error.
    pub fn key_derivation_failed(message: impl Into<String>) -> Self {
        Self::KeyDerivationFailed {
            message: message.into(),
        }
    }

    /// Creates an invalid envelope error.
    pub fn invalid_envelope(message: impl Into<String>) -> Self {
        Self::InvalidEnvelope {
            message: message.into(),
        }
    }

    /// Returns true if this is a cryptographic failure.
    pub fn is_crypto(&self) -> bool {
        matches!(
            self,
            CoreError::EncryptionFailed { .. }
                | CoreError::DecryptionFailed { .. }
                | CoreError::KeyDerivationFailed { .. }
                | CoreError::InvalidEnvelope { .. }
        )
    }
}
