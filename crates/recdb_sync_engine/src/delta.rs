//! Delta compilation and reconciliation-response application.

use recdb_core::{CoreResult, RecordStore, Timestamp, Tombstone};
use recdb_sync_protocol::TypeIndex;
use tracing::debug;

/// Compiles the store's activity since the reference timestamp into a
/// wire delta.
///
/// Records created after `since` land under rank `new`, records
/// modified (but not created) after it under `modified`, tombstones
/// deleted after it under `deleted`. Rank `conflict` is never produced
/// here; only the reconciler introduces it. Unchanged types and empty
/// ranks are pruned.
pub fn compile(store: &RecordStore, since: Timestamp) -> CoreResult<TypeIndex> {
    let mut delta = TypeIndex::new();

    for changes in store.changes_since(since) {
        let ranks = delta.entry(&changes.type_name);
        for record in &changes.added {
            ranks.new.insert(record.created(), record.to_canonical()?);
        }
        for record in &changes.updated {
            ranks
                .modified
                .insert(record.created(), record.to_canonical()?);
        }
        for tombstone in &changes.removed {
            ranks
                .deleted
                .insert(tombstone.created, tombstone.to_canonical());
        }
    }

    debug!(since, entries = delta.len(), "compiled delta");
    Ok(delta)
}

/// Applies a reconciliation (or resolution) response to the store.
///
/// `new` entries are added, `modified` entries replace, `deleted`
/// entries tombstone with the deletion timestamp the server recorded.
/// `conflict` entries never touch the store: they are collected and
/// returned for resolution.
pub fn apply(store: &mut RecordStore, data: &TypeIndex) -> CoreResult<TypeIndex> {
    let mut conflicts = TypeIndex::new();

    for (type_name, ranks) in data.iter() {
        for literal in ranks.new.values() {
            let record = store.registry().record_from_canonical(type_name, literal)?;
            store.add(record)?;
        }
        for literal in ranks.modified.values() {
            let record = store.registry().record_from_canonical(type_name, literal)?;
            store.replace(record)?;
        }
        for literal in ranks.deleted.values() {
            let tombstone = Tombstone::from_canonical(literal)?;
            store.apply_tombstone(type_name, tombstone)?;
        }
        if !ranks.conflict.is_empty() {
            conflicts.entry(type_name).conflict = ranks.conflict.clone();
        }
    }

    debug!(
        applied = data.len() - conflicts.len(),
        conflicts = conflicts.len(),
        "applied reconciliation response"
    );
    Ok(conflicts)
}
