//! Error types for the sync protocol.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while encoding or decoding protocol messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Codec failure.
    #[error("codec error: {0}")]
    Codec(#[from] recdb_codec::CodecError),

    /// The `query` discriminator names no known query.
    #[error("unknown query: {name}")]
    UnknownQuery {
        /// The unrecognized query name.
        name: String,
    },

    /// A rank key names no known activity rank.
    #[error("unknown rank: {name}")]
    UnknownRank {
        /// The unrecognized rank name.
        name: String,
    },

    /// A required field is absent.
    #[error("missing field: {name}")]
    MissingField {
        /// The absent field's name.
        name: String,
    },

    /// A field is present but has the wrong shape.
    #[error("invalid field {name}: {message}")]
    InvalidField {
        /// The offending field's name.
        name: String,
        /// Description of the problem.
        message: String,
    },

    /// A record ID key is not a decimal timestamp.
    #[error("invalid record id key: {key:?}")]
    InvalidId {
        /// The unparseable key.
        key: String,
    },
}

impl ProtocolError {
    /// Creates a missing field error.
    pub fn missing_field(name: impl Into<String>) -> Self {
        Self::MissingField { name: name.into() }
    }

    /// Creates an invalid field error.
    pub fn invalid_field(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidField {
            name: name.into(),
            message: message.into(),
        }
    }
}
