//! Request handling for the sync endpoint.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::reconciler::reconcile;
use parking_lot::RwLock;
use recdb_codec::Value;
use recdb_core::{is_tombstone_literal, RecordStore, Tombstone};
use recdb_sync_protocol::{
    encode_hash_response, ChoiceIndex, Query, ReconcileResponse, TypeIndex,
};
use std::sync::Arc;
use tracing::debug;

/// Shared state behind the request handlers.
pub struct HandlerContext {
    /// Server configuration.
    pub config: ServerConfig,
    /// The authoritative record set.
    store: RwLock<RecordStore>,
}

impl HandlerContext {
    /// Creates a context over an authoritative store.
    pub fn new(config: ServerConfig, store: RecordStore) -> Self {
        Self {
            config,
            store: RwLock::new(store),
        }
    }

    /// Runs a closure against the authoritative store.
    ///
    /// Mainly for seeding and inspecting state in tests and tools.
    pub fn with_store<R>(&self, f: impl FnOnce(&mut RecordStore) -> R) -> R {
        f(&mut self.store.write())
    }
}

/// Handler for sync queries.
pub struct RequestHandler {
    context: Arc<HandlerContext>,
}

impl RequestHandler {
    /// Creates a handler over the shared context.
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self { context }
    }

    /// Dispatches a decoded query and encodes its response.
    pub fn handle(&self, query: Query) -> ServerResult<Vec<u8>> {
        debug!(query = query.name(), "handling query");
        match query {
            Query::Hash => {
                let hash = self.handle_hash()?;
                Ok(encode_hash_response(&hash)?)
            }
            Query::Add {
                type_name,
                instance,
            } => {
                let hash = self.handle_add(&type_name, &instance)?;
                Ok(encode_hash_response(&hash)?)
            }
            Query::Edit {
                type_name,
                instance,
            } => {
                let hash = self.handle_edit(&type_name, &instance)?;
                Ok(encode_hash_response(&hash)?)
            }
            Query::Delete {
                type_name,
                instance,
            } => {
                let hash = self.handle_delete(&type_name, &instance)?;
                Ok(encode_hash_response(&hash)?)
            }
            Query::Reconcile { sync, instances } => {
                let response = self.handle_reconcile(sync, &instances)?;
                Ok(response.encode()?)
            }
            Query::Resolve { choices } => {
                let response = self.handle_resolve(&choices)?;
                Ok(response.encode()?)
            }
        }
    }

    /// The authoritative content hash.
    pub fn handle_hash(&self) -> ServerResult<String> {
        Ok(self.context.store.read().content_hash()?)
    }

    /// Inserts one record, returning the new authoritative hash.
    pub fn handle_add(&self, type_name: &str, instance: &Value) -> ServerResult<String> {
        let mut store = self.context.store.write();
        let record = store.registry().record_from_canonical(type_name, instance)?;
        store.add(record)?;
        Ok(store.content_hash()?)
    }

    /// Replaces one record, returning the new authoritative hash.
    pub fn handle_edit(&self, type_name: &str, instance: &Value) -> ServerResult<String> {
        let mut store = self.context.store.write();
        let record = store.registry().record_from_canonical(type_name, instance)?;
        store.replace(record)?;
        Ok(store.content_hash()?)
    }

    /// Tombstones one record, returning the new authoritative hash.
    ///
    /// The instance is the tombstone literal: the deletion timestamp
    /// the client recorded is the one the authoritative set keeps.
    pub fn handle_delete(&self, type_name: &str, instance: &Value) -> ServerResult<String> {
        let mut store = self.context.store.write();
        let tombstone = Tombstone::from_canonical(instance)?;
        store.apply_tombstone(type_name, tombstone)?;
        Ok(store.content_hash()?)
    }

    /// Runs the three-way merge.
    pub fn handle_reconcile(
        &self,
        sync: u64,
        instances: &TypeIndex,
    ) -> ServerResult<ReconcileResponse> {
        let count = instances.len();
        if count > self.context.config.max_delta_instances {
            return Err(ServerError::DeltaTooLarge {
                count,
                max: self.context.config.max_delta_instances,
            });
        }
        reconcile(&mut self.context.store.write(), sync, instances)
    }

    /// Applies chosen conflict resolutions.
    ///
    /// Each chosen version lands in the authoritative set the way a
    /// client change would: tombstone literals tombstone, record
    /// literals replace a standing record or insert a fresh one. A
    /// record choice for a tombstoned identity is rejected: deleted
    /// records are never resurrected. The response carries the chosen
    /// versions back under `modified`/`deleted` so the client applies
    /// them symmetrically.
    pub fn handle_resolve(&self, choices: &ChoiceIndex) -> ServerResult<ReconcileResponse> {
        let mut store = self.context.store.write();
        let mut data = TypeIndex::new();

        for (type_name, versions) in choices.iter() {
            for (id, version) in versions {
                if is_tombstone_literal(version) {
                    let tombstone = Tombstone::from_canonical(version)?;
                    store.apply_tombstone(type_name, tombstone)?;
                    data.entry(type_name).deleted.insert(*id, version.clone());
                    continue;
                }

                if store.tombstones(type_name)?.iter().any(|t| t.created == *id) {
                    return Err(ServerError::invalid_request(format!(
                        "cannot resurrect deleted record {id} in type {type_name:?}"
                    )));
                }
                let record = store.registry().record_from_canonical(type_name, version)?;
                if store.get(type_name, *id)?.is_some() {
                    store.replace(record)?;
                } else {
                    store.add(record)?;
                }
                data.entry(type_name).modified.insert(*id, version.clone());
            }
        }

        let hash = store.content_hash()?;
        Ok(ReconcileResponse { hash, data })
    }
}
