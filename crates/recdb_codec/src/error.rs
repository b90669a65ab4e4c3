//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur during encoding or decoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Unexpected end of input.
    #[error("unexpected end of input")]
    UnexpectedEof,

    /// Unexpected byte while parsing.
    #[error("unexpected character {found:?} at offset {offset}")]
    UnexpectedChar {
        /// The byte that was found.
        found: char,
        /// Byte offset into the input.
        offset: usize,
    },

    /// Invalid escape sequence inside a string literal.
    #[error("invalid escape sequence at offset {offset}")]
    InvalidEscape {
        /// Byte offset into the input.
        offset: usize,
    },

    /// Invalid UTF-8 string.
    #[error("invalid UTF-8 string")]
    InvalidUtf8,

    /// A number literal that cannot be represented.
    #[error("invalid number literal: {literal}")]
    InvalidNumber {
        /// The offending literal.
        literal: String,
    },

    /// NaN and infinities have no JSON representation.
    #[error("non-finite numbers cannot be serialized")]
    NonFiniteNumber,

    /// Nesting depth limit exceeded.
    #[error("nesting depth limit exceeded")]
    DepthLimitExceeded,

    /// Input continued past the end of the document.
    #[error("trailing data after document at offset {offset}")]
    TrailingData {
        /// Byte offset of the first trailing byte.
        offset: usize,
    },

    /// Invalid document structure.
    #[error("invalid structure: {message}")]
    InvalidStructure {
        /// Description of the structural error.
        message: String,
    },
}

impl CodecError {
    /// Create an invalid structure error.
    pub fn invalid_structure(message: impl Into<String>) -> Self {
        Self::InvalidStructure {
            message: message.into(),
        }
    }

    /// Create an invalid number error.
    pub fn invalid_number(literal: impl Into<String>) -> Self {
        Self::InvalidNumber {
            literal: literal.into(),
        }
    }
}
