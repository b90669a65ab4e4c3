//! # recdb Sync Server
//!
//! Authoritative-side reconciler and request handling for recdb.
//!
//! This crate provides:
//! - The three-way merge over per-type record deltas
//! - Request handlers for the six wire queries
//! - A `SyncServer` facade an HTTP layer (or a loopback client) can
//!   route into
//!
//! The authoritative store is the single source of truth for
//! cross-client convergence; every identity a merge touches ends up in
//! the applied state or in a conflict list.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod handler;
mod reconciler;
mod server;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::{HandlerContext, RequestHandler};
pub use reconciler::reconcile;
pub use server::SyncServer;
