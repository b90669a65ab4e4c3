//! The sync server facade.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::{HandlerContext, RequestHandler};
use recdb_core::{Clock, RecordStore, TypeRegistry};
use recdb_sync_protocol::{Query, HASH_PATH, QUERY_PATH};
use std::sync::Arc;
use tracing::warn;

/// The authoritative sync server.
///
/// Holds the authoritative record set and services the wire queries.
/// The reconciler behind it is the single serialization point for
/// cross-client convergence: one write lock spans each merge.
///
/// # Example
///
/// ```
/// use recdb_core::{SystemClock, TypeRegistry};
/// use recdb_sync_server::{ServerConfig, SyncServer};
/// use std::sync::Arc;
///
/// let server = SyncServer::new(
///     ServerConfig::default(),
///     TypeRegistry::generic(&["task"]),
///     Arc::new(SystemClock),
/// );
/// // In a real deployment an HTTP layer feeds handle_post/handle_get.
/// ```
pub struct SyncServer {
    handler: RequestHandler,
    context: Arc<HandlerContext>,
}

impl SyncServer {
    /// Creates a server with an empty authoritative set over the given
    /// type registry.
    pub fn new(config: ServerConfig, registry: TypeRegistry, clock: Arc<dyn Clock>) -> Self {
        Self::from_store(config, RecordStore::new(registry, clock))
    }

    /// Creates a server over an existing authoritative store.
    pub fn from_store(config: ServerConfig, store: RecordStore) -> Self {
        let context = Arc::new(HandlerContext::new(config, store));
        let handler = RequestHandler::new(Arc::clone(&context));
        Self { handler, context }
    }

    /// Handles a POST body against the query endpoint.
    pub fn handle_post(&self, path: &str, body: &[u8]) -> ServerResult<Vec<u8>> {
        if path != QUERY_PATH {
            return Err(ServerError::UnknownPath {
                path: path.to_string(),
            });
        }
        let query = Query::decode(body)?;
        self.handler.handle(query).inspect_err(|e| {
            warn!(error = %e, "query failed");
        })
    }

    /// Handles a GET against the hash mirror.
    pub fn handle_get(&self, path: &str) -> ServerResult<Vec<u8>> {
        if path != HASH_PATH {
            return Err(ServerError::UnknownPath {
                path: path.to_string(),
            });
        }
        self.handler.handle(Query::Hash)
    }

    /// The authoritative content hash.
    pub fn content_hash(&self) -> ServerResult<String> {
        self.handler.handle_hash()
    }

    /// Number of active records in the authoritative set.
    pub fn record_count(&self) -> usize {
        self.context.with_store(|store| store.record_count())
    }

    /// Runs a closure against the authoritative store (seeding,
    /// inspection).
    pub fn with_store<R>(&self, f: impl FnOnce(&mut RecordStore) -> R) -> R {
        self.context.with_store(f)
    }
}
