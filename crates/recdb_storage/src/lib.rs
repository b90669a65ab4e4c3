//! # recdb Storage
//!
//! Host key-value persistence backends for recdb.
//!
//! This crate provides:
//! - The `KeyValueBackend` trait (string → string persistent map)
//! - `MemoryBackend` for tests and ephemeral use
//! - `FileBackend` persisting the map as one canonical document
//!
//! The local cache stores encrypted payloads through this interface;
//! backends never see plaintext record data.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::KeyValueBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::MemoryBackend;
