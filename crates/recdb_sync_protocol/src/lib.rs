//! # recdb Sync Protocol
//!
//! Sync protocol types for recdb.
//!
//! This crate provides:
//! - `Rank` and the nested `TypeIndex`/`RankIndex` delta maps
//! - The six wire queries and their responses
//! - Canonical JSON encoding/decoding for all of them
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod messages;
mod rank;
mod type_index;

pub use error::{ProtocolError, ProtocolResult};
pub use messages::{
    decode_hash_response, encode_hash_response, ChoiceIndex, Query, ReconcileResponse,
};
pub use rank::Rank;
pub use type_index::{RankIndex, TypeIndex};

/// Content type set on every request.
pub const CONTENT_TYPE: &str = "application/json; charset=UTF-8";

/// Path of the single POST endpoint all queries go to.
pub const QUERY_PATH: &str = "/sync";

/// Path of the GET endpoint mirroring the `hash` query.
pub const HASH_PATH: &str = "/sync/hash";
