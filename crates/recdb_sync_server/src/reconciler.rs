//! Three-way reconciliation over per-type record deltas.

use crate::error::{ServerError, ServerResult};
use recdb_codec::Value;
use recdb_core::{RecordStore, Timestamp, Tombstone};
use recdb_sync_protocol::{ReconcileResponse, TypeIndex};
use tracing::{debug, warn};

/// Merges a client's delta into the authoritative set.
///
/// The merge runs in three stages:
///
/// 1. Authoritative activity since the client's last sync is screened
///    into the response by rank, before any client change lands.
/// 2. Identities both sides touched become conflicts: the response
///    carries `[server, client]` version lists and neither side's
///    change is applied.
/// 3. Remaining client entries apply to the authoritative set: adds
///    must not collide, replaces must beat a server record that is
///    unmodified since the last sync, deletes must hit exactly one
///    record. Anything else becomes a conflict.
///
/// Every identity from either side ends up in the applied authoritative
/// state or in a conflict list; nothing is silently discarded. The
/// returned hash is the post-merge authoritative content hash.
pub fn reconcile(
    store: &mut RecordStore,
    last_sync: Timestamp,
    delta: &TypeIndex,
) -> ServerResult<ReconcileResponse> {
    for (type_name, ranks) in delta.iter() {
        if !store.registry().contains(type_name) {
            return Err(ServerError::invalid_request(format!(
                "unknown record type {type_name:?}"
            )));
        }
        if !ranks.conflict.is_empty() {
            return Err(ServerError::invalid_request(
                "client deltas cannot carry the conflict rank",
            ));
        }
    }

    let mut response = TypeIndex::new();

    // Stage 1 and 2: screen authoritative activity, detecting
    // collisions against the client's delta.
    for changes in store.changes_since(last_sync) {
        let client = delta.get(&changes.type_name);
        let ranks = response.entry(&changes.type_name);

        for record in &changes.added {
            let id = record.created();
            let literal = record.to_canonical().map_err(recdb_core::CoreError::from)?;
            match client.and_then(|c| c.version_of(id)) {
                Some(theirs) => {
                    ranks.conflict.insert(id, vec![literal, theirs.clone()]);
                }
                None => {
                    ranks.new.insert(id, literal);
                }
            }
        }
        for record in &changes.updated {
            let id = record.created();
            let literal = record.to_canonical().map_err(recdb_core::CoreError::from)?;
            match client.and_then(|c| c.version_of(id)) {
                Some(theirs) => {
                    ranks.conflict.insert(id, vec![literal, theirs.clone()]);
                }
                None => {
                    ranks.modified.insert(id, literal);
                }
            }
        }
        for tombstone in &changes.removed {
            let id = tombstone.created;
            let literal = tombstone.to_canonical();
            match client.and_then(|c| c.version_of(id)) {
                Some(theirs) => {
                    ranks.conflict.insert(id, vec![literal, theirs.clone()]);
                }
                None => {
                    ranks.deleted.insert(id, literal);
                }
            }
        }
    }

    // Stage 3: apply the client entries that did not collide.
    for (type_name, client) in delta.iter() {
        for (id, literal) in &client.new {
            if in_conflict(&response, type_name, *id) {
                continue;
            }
            let held = store.get(type_name, *id)?.is_some()
                || store
                    .tombstones(type_name)?
                    .iter()
                    .any(|t| t.created == *id);
            if held {
                push_conflict(&mut response, store, type_name, *id, literal)?;
                continue;
            }
            let record = store.registry().record_from_canonical(type_name, literal)?;
            store.add(record)?;
        }

        for (id, literal) in &client.modified {
            if in_conflict(&response, type_name, *id) {
                continue;
            }
            let record = store.registry().record_from_canonical(type_name, literal)?;
            let replaceable = store.get(type_name, *id)?.is_some_and(|server| {
                (server.modified() == 0 || server.modified() <= last_sync)
                    && record.modified() > server.modified()
            });
            if replaceable {
                store.replace(record)?;
            } else {
                push_conflict(&mut response, store, type_name, *id, literal)?;
            }
        }

        for (id, literal) in &client.deleted {
            if in_conflict(&response, type_name, *id) {
                continue;
            }
            if store.get(type_name, *id)?.is_some() {
                let tombstone = Tombstone::from_canonical(literal)?;
                store.apply_tombstone(type_name, tombstone)?;
            } else {
                push_conflict(&mut response, store, type_name, *id, literal)?;
            }
        }
    }

    let hash = store.content_hash()?;
    if response.has_conflicts() {
        warn!(conflicts = response.len(), "reconciliation produced conflicts");
    }
    debug!(last_sync, entries = response.len(), %hash, "reconciled");
    Ok(ReconcileResponse {
        hash,
        data: response,
    })
}

fn in_conflict(response: &TypeIndex, type_name: &str, id: u64) -> bool {
    response
        .get(type_name)
        .is_some_and(|ranks| ranks.conflict.contains_key(&id))
}

/// Records a conflict for a client entry, server version first when
/// the authoritative set holds one.
fn push_conflict(
    response: &mut TypeIndex,
    store: &RecordStore,
    type_name: &str,
    id: u64,
    client_version: &Value,
) -> ServerResult<()> {
    let mut versions = Vec::with_capacity(2);
    if let Some(server) = store.get(type_name, id)? {
        versions.push(server.to_canonical().map_err(recdb_core::CoreError::from)?);
    } else if let Some(tombstone) = store
        .tombstones(type_name)?
        .iter()
        .find(|t| t.created == id)
    {
        versions.push(tombstone.to_canonical());
    }
    versions.push(client_version.clone());

    response.entry(type_name).conflict.insert(id, versions);
    Ok(())
}
