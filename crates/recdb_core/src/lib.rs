//! # recdb Core
//!
//! Record model, typed store, crypto box and encrypted cache for recdb.
//!
//! This crate provides:
//! - The `Payload` trait and `Record`/`Tombstone` model
//! - `TypeRegistry` for payload reconstruction from canonical form
//! - `RecordStore`: typed containers with the descending sort invariant
//! - AES-256-GCM sealing under a PBKDF2-derived key
//! - `LocalCache`: encrypted persistence over a host key-value backend

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cache;
mod clock;
pub mod crypto;
mod error;
mod record;
mod store;

pub use cache::{LocalCache, EMPTY_DOCUMENT};
pub use clock::{Clock, ManualClock, RecordId, SystemClock, Timestamp, NEVER};
pub use error::{CoreError, CoreResult};
pub use record::{
    is_tombstone_literal, GenericPayload, Payload, PayloadParser, Record, Tombstone, TypeRegistry,
    FIELD_CREATED, FIELD_DELETED, FIELD_MODIFIED,
};
pub use store::{RecordStore, TypeChanges};
