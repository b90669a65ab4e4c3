//! Sync engine state machine types.

use recdb_core::Timestamp;

/// The current state of the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Engine is idle, not syncing.
    Idle,
    /// Engine is comparing local and remote content hashes.
    Comparing,
    /// Engine is running the reconciliation protocol.
    Reconciling,
    /// Engine is waiting on conflict resolution.
    Resolving,
    /// Engine is verifying and persisting the reconciled set.
    Committing,
    /// The last sync pass converged.
    Synced,
    /// The last sync pass failed.
    Failed,
}

impl SyncState {
    /// Returns true if the engine is inside a sync pass.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SyncState::Comparing
                | SyncState::Reconciling
                | SyncState::Resolving
                | SyncState::Committing
        )
    }

    /// Returns true if a new sync pass can start.
    pub fn can_start(&self) -> bool {
        matches!(self, SyncState::Idle | SyncState::Synced | SyncState::Failed)
    }
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SyncState::Idle => "idle",
            SyncState::Comparing => "comparing",
            SyncState::Reconciling => "reconciling",
            SyncState::Resolving => "resolving",
            SyncState::Committing => "committing",
            SyncState::Synced => "synced",
            SyncState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// The outcome of a successful sync pass.
///
/// Returned frozen: the hash both replicas converged on and the
/// watermark that was persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// The content hash both sides now share.
    pub hash: String,
    /// The persisted last-sync timestamp.
    pub time: Timestamp,
}

/// Counters over the engine's lifetime.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Sync passes that converged.
    pub syncs_completed: u64,
    /// Reconciliation round-trips performed.
    pub reconciliations: u64,
    /// Conflicted records observed.
    pub conflicts_seen: u64,
    /// Last error message, if the previous pass failed.
    pub last_error: Option<String>,
}
