//! The sync engine: hash compare, reconcile, resolve, commit.

use crate::config::SyncConfig;
use crate::delta::{apply, compile};
use crate::error::{SyncError, SyncResult};
use crate::resolver::{ConflictResolver, ManualResolver};
use crate::state::{SyncReport, SyncState, SyncStats};
use crate::transport::{RemoteStore, TransportError};
use parking_lot::{Mutex, RwLock};
use recdb_codec::is_sha256_hex;
use recdb_core::{CoreError, LocalCache, Record, RecordStore, Timestamp, EMPTY_DOCUMENT};
use recdb_sync_protocol::ChoiceIndex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

struct Inner {
    store: RecordStore,
    cache: LocalCache,
}

/// The client-side synchronization engine.
///
/// Owns the record store and the encrypted cache, drives the fixed
/// state machine (compare → reconcile → resolve → commit), and is the
/// only writer of the last-sync watermark. Public operations serialize
/// on one mutex: a client is single-writer.
pub struct SyncEngine<T: RemoteStore> {
    config: SyncConfig,
    transport: Arc<T>,
    inner: Mutex<Inner>,
    state: RwLock<SyncState>,
    stats: RwLock<SyncStats>,
    resolver: Box<dyn ConflictResolver>,
    cancelled: AtomicBool,
}

impl<T: RemoteStore> SyncEngine<T> {
    /// Creates an engine over a store, cache and transport.
    pub fn new(config: SyncConfig, transport: T, store: RecordStore, cache: LocalCache) -> Self {
        Self {
            config,
            transport: Arc::new(transport),
            inner: Mutex::new(Inner { store, cache }),
            state: RwLock::new(SyncState::Idle),
            stats: RwLock::new(SyncStats::default()),
            resolver: Box::new(ManualResolver),
            cancelled: AtomicBool::new(false),
        }
    }

    /// Replaces the conflict resolver.
    #[must_use]
    pub fn with_resolver(mut self, resolver: Box<dyn ConflictResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// The current state.
    pub fn state(&self) -> SyncState {
        *self.state.read()
    }

    /// The engine's lifetime counters.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// The persisted last-sync watermark.
    pub fn last_sync(&self) -> SyncResult<Timestamp> {
        let inner = self.inner.lock();
        inner
            .cache
            .last_sync()
            .map_err(|e| SyncError::core(self.state(), e))
    }

    /// The local canonical content hash.
    pub fn content_hash(&self) -> SyncResult<String> {
        let inner = self.inner.lock();
        inner
            .store
            .content_hash()
            .map_err(|e| SyncError::core(self.state(), e))
    }

    /// Requests cancellation of the in-flight sync pass.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Loads the cached record set and runs a sync pass.
    ///
    /// A missing cache entry is recoverable: the engine starts from the
    /// empty document and the first sync pulls the authoritative set
    /// down. A cache entry that does not decrypt is not recoverable and
    /// surfaces the crypto failure.
    pub fn init(&self) -> SyncResult<SyncReport> {
        let mut inner = self.inner.lock();
        self.set_state(SyncState::Comparing);

        let document = inner
            .cache
            .read_data()
            .map_err(|e| self.core_err(SyncState::Comparing, e))?
            .unwrap_or_else(|| EMPTY_DOCUMENT.to_string());
        inner
            .store
            .load_canonical_bytes(document.as_bytes())
            .map_err(|e| self.core_err(SyncState::Comparing, e))?;

        debug!(records = inner.store.record_count(), "store loaded from cache");
        self.sync_locked(&mut inner, None, None)
    }

    /// Runs a sync pass, recomputing both hashes.
    pub fn sync(&self) -> SyncResult<SyncReport> {
        let mut inner = self.inner.lock();
        self.sync_locked(&mut inner, None, None)
    }

    /// Saves a new record: preliminary sync, identity assignment, the
    /// parallel local write + remote `add`, then a concluding sync.
    ///
    /// The caller's record receives its assigned identity.
    pub fn save(&self, record: &mut Record) -> SyncResult<SyncReport> {
        let mut inner = self.inner.lock();
        self.sync_locked(&mut inner, None, None)?;

        record.set_created(inner.store.new_id());
        let type_name = record.type_name().to_string();
        let literal = record
            .to_canonical()
            .map_err(|e| self.core_err(self.state(), e.into()))?;
        inner
            .store
            .add(record.clone())
            .map_err(|e| self.core_err(self.state(), e))?;

        let (local_hash, remote_hash) = self.flush_parallel(&mut inner, |transport| {
            transport.push_add(&type_name, &literal)
        })?;
        self.sync_locked(&mut inner, Some(local_hash), Some(remote_hash))
    }

    /// Edits an existing record: preliminary sync, modification stamp,
    /// the parallel local write + remote `edit`, then a concluding sync.
    ///
    /// The caller's record receives its modification timestamp.
    pub fn edit(&self, record: &mut Record) -> SyncResult<SyncReport> {
        let mut inner = self.inner.lock();
        self.sync_locked(&mut inner, None, None)?;

        record.set_modified(inner.store.now());
        let type_name = record.type_name().to_string();
        let literal = record
            .to_canonical()
            .map_err(|e| self.core_err(self.state(), e.into()))?;
        inner
            .store
            .replace(record.clone())
            .map_err(|e| self.core_err(self.state(), e))?;

        let (local_hash, remote_hash) = self.flush_parallel(&mut inner, |transport| {
            transport.push_edit(&type_name, &literal)
        })?;
        self.sync_locked(&mut inner, Some(local_hash), Some(remote_hash))
    }

    /// Deletes a record: preliminary sync, tombstone creation, the
    /// parallel local write + remote `delete`, then a concluding sync.
    pub fn delete(&self, record: &Record) -> SyncResult<SyncReport> {
        let mut inner = self.inner.lock();
        self.sync_locked(&mut inner, None, None)?;

        let type_name = record.type_name().to_string();
        let id = record.created();
        inner
            .store
            .remove(&type_name, id, true)
            .map_err(|e| self.core_err(self.state(), e))?;
        let tombstone = inner
            .store
            .tombstones(&type_name)
            .map_err(|e| self.core_err(self.state(), e))?
            .iter()
            .find(|t| t.created == id)
            .copied()
            .ok_or_else(|| {
                self.core_err(
                    self.state(),
                    CoreError::invalid_record("tombstone missing after remove"),
                )
            })?;
        let literal = tombstone.to_canonical();

        let (local_hash, remote_hash) = self.flush_parallel(&mut inner, |transport| {
            transport.push_delete(&type_name, &literal)
        })?;
        self.sync_locked(&mut inner, Some(local_hash), Some(remote_hash))
    }

    /// Read-only lookup by type and predicate. Reads the store
    /// directly; no sync is involved.
    pub fn search<F>(&self, type_name: &str, predicate: F) -> SyncResult<Vec<Record>>
    where
        F: FnMut(&Record) -> bool,
    {
        let inner = self.inner.lock();
        inner
            .store
            .search(type_name, predicate)
            .map_err(|e| SyncError::core(self.state(), e))
    }

    /// Applies caller-chosen conflict resolutions and re-syncs.
    pub fn resolve(&self, choices: &ChoiceIndex) -> SyncResult<SyncReport> {
        let mut inner = self.inner.lock();
        self.set_state(SyncState::Resolving);

        let response = self
            .transport
            .resolve(choices)
            .map_err(|e| self.transport_err(SyncState::Resolving, e))?;
        let unresolved = apply(&mut inner.store, &response.data)
            .map_err(|e| self.core_err(SyncState::Resolving, e))?;
        if unresolved.has_conflicts() {
            return Err(self.fail(SyncError::ConflictsPending {
                conflicts: unresolved,
            }));
        }

        self.sync_locked(&mut inner, None, None)
    }

    /// The compare → reconcile → resolve → commit pass. Caller holds
    /// the single-writer lock.
    fn sync_locked(
        &self,
        inner: &mut Inner,
        local: Option<String>,
        remote: Option<String>,
    ) -> SyncResult<SyncReport> {
        let mut local = local;
        let mut remote = remote;
        let mut last_remote = String::new();

        for _pass in 0..self.config.max_sync_passes {
            self.check_cancelled()?;
            self.set_state(SyncState::Comparing);

            let local_hash = match local.take() {
                Some(hash) => hash,
                None => inner
                    .store
                    .content_hash()
                    .map_err(|e| self.core_err(SyncState::Comparing, e))?,
            };
            let remote_hash = match remote.take() {
                Some(hash) => hash,
                None => self
                    .transport
                    .fetch_hash()
                    .map_err(|e| self.transport_err(SyncState::Comparing, e))?,
            };
            last_remote.clone_from(&remote_hash);

            if is_sha256_hex(&local_hash)
                && is_sha256_hex(&remote_hash)
                && local_hash == remote_hash
            {
                return self.converged(inner, remote_hash);
            }
            debug!(%local_hash, %remote_hash, "hashes differ, reconciling");

            self.check_cancelled()?;
            self.set_state(SyncState::Reconciling);
            let last_sync = inner
                .cache
                .last_sync()
                .map_err(|e| self.core_err(SyncState::Reconciling, e))?;
            let delta = compile(&inner.store, last_sync)
                .map_err(|e| self.core_err(SyncState::Reconciling, e))?;
            let response = self
                .transport
                .reconcile(last_sync, &delta)
                .map_err(|e| self.transport_err(SyncState::Reconciling, e))?;
            self.stats.write().reconciliations += 1;

            let conflicts = apply(&mut inner.store, &response.data)
                .map_err(|e| self.core_err(SyncState::Reconciling, e))?;

            if conflicts.has_conflicts() {
                self.set_state(SyncState::Resolving);
                self.stats.write().conflicts_seen += conflicts.len() as u64;
                warn!(conflicts = conflicts.len(), "reconciliation surfaced conflicts");

                let Some(choices) = self.resolver.resolve(&conflicts) else {
                    return Err(self.fail(SyncError::ConflictsPending { conflicts }));
                };
                let resolution = self
                    .transport
                    .resolve(&choices)
                    .map_err(|e| self.transport_err(SyncState::Resolving, e))?;
                let unresolved = apply(&mut inner.store, &resolution.data)
                    .map_err(|e| self.core_err(SyncState::Resolving, e))?;
                if unresolved.has_conflicts() {
                    return Err(self.fail(SyncError::ConflictsPending {
                        conflicts: unresolved,
                    }));
                }
                // Re-enter the compare with fresh hashes.
                continue;
            }

            self.check_cancelled()?;
            self.set_state(SyncState::Committing);
            let committed = inner
                .store
                .content_hash()
                .map_err(|e| self.core_err(SyncState::Committing, e))?;
            if committed != response.hash {
                return Err(self.fail(SyncError::HashMismatch {
                    local: committed,
                    remote: response.hash,
                }));
            }

            let plaintext = canonical_text(&inner.store)
                .map_err(|e| self.core_err(SyncState::Committing, e))?;
            inner
                .cache
                .write_data(&plaintext)
                .map_err(|e| self.core_err(SyncState::Committing, e))?;
            return self.converged(inner, committed);
        }

        let local = inner
            .store
            .content_hash()
            .map_err(|e| self.core_err(SyncState::Comparing, e))?;
        Err(self.fail(SyncError::HashMismatch {
            local,
            remote: last_remote,
        }))
    }

    /// Runs the independent local-write and remote-POST legs in
    /// parallel, then awaits both.
    fn flush_parallel<F>(&self, inner: &mut Inner, push: F) -> SyncResult<(String, String)>
    where
        F: FnOnce(&T) -> Result<String, TransportError> + Send,
    {
        let plaintext = canonical_text(&inner.store).map_err(|e| self.core_err(self.state(), e))?;
        let cache = &inner.cache;
        let transport = Arc::clone(&self.transport);

        let (local, remote) = std::thread::scope(|scope| {
            let local = scope.spawn(move || cache.write_data(&plaintext));
            let remote = scope.spawn(move || push(transport.as_ref()));
            let local = local
                .join()
                .unwrap_or_else(|_| Err(CoreError::invalid_record("local write worker panicked")));
            let remote = remote
                .join()
                .unwrap_or_else(|_| Err(TransportError::fatal("remote write worker panicked")));
            (local, remote)
        });

        let local_hash = local.map_err(|e| self.core_err(self.state(), e))?;
        let remote_hash = remote.map_err(|e| self.transport_err(self.state(), e))?;
        Ok((local_hash, remote_hash))
    }

    fn converged(&self, inner: &mut Inner, hash: String) -> SyncResult<SyncReport> {
        let time = inner.store.now();
        inner
            .cache
            .set_last_sync(time)
            .map_err(|e| self.core_err(self.state(), e))?;
        self.set_state(SyncState::Synced);
        {
            let mut stats = self.stats.write();
            stats.syncs_completed += 1;
            stats.last_error = None;
        }
        info!(%hash, time, "sync converged");
        Ok(SyncReport { hash, time })
    }

    fn set_state(&self, state: SyncState) {
        *self.state.write() = state;
    }

    fn check_cancelled(&self) -> SyncResult<()> {
        if self.cancelled.swap(false, Ordering::SeqCst) {
            return Err(self.fail(SyncError::Cancelled));
        }
        Ok(())
    }

    fn fail(&self, error: SyncError) -> SyncError {
        self.set_state(SyncState::Failed);
        self.stats.write().last_error = Some(error.to_string());
        error
    }

    fn core_err(&self, state: SyncState, error: CoreError) -> SyncError {
        self.fail(SyncError::core(state, error))
    }

    fn transport_err(&self, state: SyncState, error: TransportError) -> SyncError {
        self.fail(SyncError::Transport {
            state,
            message: error.message,
            retryable: error.retryable,
        })
    }
}

impl<T: RemoteStore> std::fmt::Debug for SyncEngine<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

fn canonical_text(store: &RecordStore) -> Result<String, CoreError> {
    let bytes = store.canonical_bytes()?;
    String::from_utf8(bytes).map_err(|_| CoreError::invalid_record("canonical form is not UTF-8"))
}
