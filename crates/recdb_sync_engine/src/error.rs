//! Error types for the sync engine.

use crate::state::SyncState;
use recdb_sync_protocol::TypeIndex;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error while {state}: {message}")]
    Transport {
        /// The machine state the failure happened in.
        state: SyncState,
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// Codec, crypto, cache or store failure, tagged with the state.
    #[error("core error while {state}: {source}")]
    Core {
        /// The machine state the failure happened in.
        state: SyncState,
        /// The underlying failure.
        #[source]
        source: recdb_core::CoreError,
    },

    /// The remote's response could not be decoded or is structurally
    /// invalid (unknown rank, missing fields).
    #[error("reconcile error while {state}: {source}")]
    Protocol {
        /// The machine state the failure happened in.
        state: SyncState,
        /// The underlying failure.
        #[source]
        source: recdb_sync_protocol::ProtocolError,
    },

    /// Reconciliation surfaced conflicts and no resolver settled them.
    #[error("{} record(s) conflict and need resolution", conflicts.len())]
    ConflictsPending {
        /// The conflicted records, per type, server version first.
        conflicts: TypeIndex,
    },

    /// After reconciliation, the local and authoritative hashes still
    /// differ.
    #[error("sync failed: local hash {local} != remote hash {remote}")]
    HashMismatch {
        /// The locally computed content hash.
        local: String,
        /// The authoritative content hash.
        remote: String,
    },

    /// The sync pass was cancelled.
    #[error("sync cancelled")]
    Cancelled,
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(state: SyncState, message: impl Into<String>) -> Self {
        Self::Transport {
            state,
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(state: SyncState, message: impl Into<String>) -> Self {
        Self::Transport {
            state,
            message: message.into(),
            retryable: false,
        }
    }

    /// Tags a core failure with the state it happened in.
    pub fn core(state: SyncState, source: recdb_core::CoreError) -> Self {
        Self::Core { state, source }
    }

    /// Tags a protocol failure with the state it happened in.
    pub fn protocol(state: SyncState, source: recdb_sync_protocol::ProtocolError) -> Self {
        Self::Protocol { state, source }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Transport { retryable: true, .. })
    }

    /// The machine state the error is tagged with, if any.
    pub fn state(&self) -> Option<SyncState> {
        match self {
            SyncError::Transport { state, .. }
            | SyncError::Core { state, .. }
            | SyncError::Protocol { state, .. } => Some(*state),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(SyncError::transport_retryable(SyncState::Comparing, "timeout").is_retryable());
        assert!(!SyncError::transport_fatal(SyncState::Comparing, "bad cert").is_retryable());
        assert!(!SyncError::Cancelled.is_retryable());
    }

    #[test]
    fn errors_carry_state() {
        let err = SyncError::core(
            SyncState::Committing,
            recdb_core::CoreError::invalid_record("x"),
        );
        assert_eq!(err.state(), Some(SyncState::Committing));
        assert!(err.to_string().contains("committing"));

        assert_eq!(
            SyncError::HashMismatch {
                local: "a".into(),
                remote: "b".into()
            }
            .state(),
            None
        );
    }
}
