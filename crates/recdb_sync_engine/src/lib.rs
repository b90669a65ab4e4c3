//! # recdb Sync Engine
//!
//! Client-side sync engine for recdb.
//!
//! This crate provides:
//! - The sync state machine (compare → reconcile → resolve → commit)
//! - Delta compilation and reconciliation-response application
//! - The `RemoteStore` transport seam with an HTTP implementation
//! - Public operations: `init`, `sync`, `save`, `edit`, `delete`,
//!   `search`, `resolve`
//!
//! A client is single-writer: public operations serialize on one lock.
//! The engine is the only writer of the last-sync watermark, and a
//! failed pass never advances it.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod delta;
mod engine;
mod error;
mod http;
mod resolver;
mod state;
mod transport;

pub use config::SyncConfig;
pub use delta::{apply, compile};
pub use engine::SyncEngine;
pub use error::{SyncError, SyncResult};
pub use http::{HttpClient, HttpResponse, HttpTransport, LoopbackClient, LoopbackServer};
pub use resolver::{ConflictResolver, ManualResolver, PreferenceResolver};
pub use state::{SyncReport, SyncState, SyncStats};
pub use transport::{MockTransport, RemoteStore, TransportError, TransportResult};
