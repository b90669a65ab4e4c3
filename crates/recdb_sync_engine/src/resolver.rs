//! Conflict resolution seam.

use recdb_sync_protocol::{ChoiceIndex, TypeIndex};

/// Decides between competing record versions.
///
/// Reconciliation surfaces conflicts as `[server, client]` version
/// lists; a resolver picks one version per record. Resolution is an
/// application concern (a policy or a human), so the engine only
/// defines the seam.
pub trait ConflictResolver: Send + Sync {
    /// Returns the chosen versions, or `None` to leave the conflicts
    /// to the caller.
    fn resolve(&self, conflicts: &TypeIndex) -> Option<ChoiceIndex>;
}

/// The default resolver: resolves nothing.
///
/// Conflicts surface to the caller as
/// [`SyncError::ConflictsPending`](crate::SyncError::ConflictsPending),
/// to be fed back through the engine's `resolve` operation once a
/// human (or policy) has chosen.
#[derive(Debug, Default, Clone, Copy)]
pub struct ManualResolver;

impl ConflictResolver for ManualResolver {
    fn resolve(&self, _conflicts: &TypeIndex) -> Option<ChoiceIndex> {
        None
    }
}

/// A resolver that always prefers one side of the conflict list.
#[derive(Debug, Clone, Copy)]
pub enum PreferenceResolver {
    /// Always pick the server version (first in the list).
    ServerWins,
    /// Always pick the client version (last in the list).
    ClientWins,
}

impl ConflictResolver for PreferenceResolver {
    fn resolve(&self, conflicts: &TypeIndex) -> Option<ChoiceIndex> {
        let mut choices = ChoiceIndex::new();
        for (type_name, ranks) in conflicts.iter() {
            for (id, versions) in &ranks.conflict {
                let version = match self {
                    PreferenceResolver::ServerWins => versions.first(),
                    PreferenceResolver::ClientWins => versions.last(),
                }?;
                choices.choose(type_name, *id, version.clone());
            }
        }
        Some(choices)
    }
}
