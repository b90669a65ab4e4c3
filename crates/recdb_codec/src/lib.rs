//! # recdb Codec
//!
//! Canonical JSON codec and content hashing for recdb.
//!
//! This crate provides:
//! - A dynamic `Value` model with insertion-ordered objects
//! - Canonical serialization (no whitespace, deterministic numbers)
//! - A JSON parser with input limits
//! - SHA-256 content digests in lowercase hex
//!
//! The canonical form is the hash pre-image for the sync protocol:
//! two record sets with the same logical content must serialize to
//! byte-identical output.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod decoder;
mod encoder;
mod error;
mod hash;
mod value;

pub use decoder::from_json;
pub use encoder::{to_canonical_json, CanonicalEncoder};
pub use error::{CodecError, CodecResult};
pub use hash::{is_sha256_hex, sha256_hex, SHA256_HEX_LEN};
pub use value::{Number, Value};
