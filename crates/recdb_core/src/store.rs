//! Typed record store.

use crate::clock::{Clock, RecordId, Timestamp, NEVER};
use crate::error::{CoreError, CoreResult};
use crate::record::{is_tombstone_literal, Record, Tombstone, TypeRegistry};
use recdb_codec::{from_json, sha256_hex, to_canonical_json, CodecResult, Value};
use std::sync::Arc;

/// Per-type containers: active records and tombstones, both held in
/// strictly descending `created` order.
#[derive(Debug)]
struct TypedContainer {
    type_name: String,
    active: Vec<Record>,
    tombstones: Vec<Tombstone>,
}

impl TypedContainer {
    fn new(type_name: String) -> Self {
        Self {
            type_name,
            active: Vec::new(),
            tombstones: Vec::new(),
        }
    }

    fn holds_id(&self, id: RecordId) -> bool {
        self.active.iter().any(|r| r.created() == id)
            || self.tombstones.iter().any(|t| t.created == id)
    }

    fn sort(&mut self) {
        self.active.sort_by(|a, b| b.created().cmp(&a.created()));
        self.tombstones.sort_by(|a, b| b.created.cmp(&a.created));
    }
}

/// Changes one type accumulated since a reference timestamp.
///
/// `added` holds records created after the reference, `updated` those
/// modified after it (but created before), `removed` the tombstones
/// whose deletion is after it. A record never appears in both `added`
/// and `updated`.
#[derive(Debug, Clone)]
pub struct TypeChanges {
    /// The type these changes belong to.
    pub type_name: String,
    /// Records created after the reference timestamp.
    pub added: Vec<Record>,
    /// Records modified (but not created) after the reference.
    pub updated: Vec<Record>,
    /// Tombstones whose deletion is after the reference.
    pub removed: Vec<Tombstone>,
}

impl TypeChanges {
    /// True if no changes were collected.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }
}

/// The typed record set of one replica.
///
/// Holds active records and tombstones per configured type, assigns
/// record identities, and produces/consumes the canonical form that
/// is hashed and shipped over the wire. All mutating operations
/// restore the descending sort order before returning.
pub struct RecordStore {
    registry: TypeRegistry,
    containers: Vec<TypedContainer>,
    max_id: RecordId,
    clock: Arc<dyn Clock>,
}

impl RecordStore {
    /// Creates an empty store over the registry's type set.
    pub fn new(registry: TypeRegistry, clock: Arc<dyn Clock>) -> Self {
        let containers = registry
            .type_names()
            .iter()
            .map(|name| TypedContainer::new(name.clone()))
            .collect();
        Self {
            registry,
            containers,
            max_id: NEVER,
            clock,
        }
    }

    /// The configured type names, in canonical order.
    pub fn type_names(&self) -> &[String] {
        self.registry.type_names()
    }

    /// The registry this store was configured with.
    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// The current wall-clock time of the injected clock.
    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// The largest record identity ever observed by this store.
    pub fn max_id(&self) -> RecordId {
        self.max_id
    }

    /// Returns a fresh record identity: `max(now, max_id + 1)`.
    ///
    /// Identities are strictly increasing even when several records
    /// are saved within one millisecond.
    pub fn new_id(&mut self) -> RecordId {
        let id = self.clock.now().max(self.max_id + 1);
        self.max_id = id;
        id
    }

    /// Total number of active records across all types.
    pub fn record_count(&self) -> usize {
        self.containers.iter().map(|c| c.active.len()).sum()
    }

    /// Active records of one type, in descending `created` order.
    pub fn records(&self, type_name: &str) -> CoreResult<&[Record]> {
        Ok(&self.container(type_name)?.active)
    }

    /// Tombstones of one type, in descending `created` order.
    pub fn tombstones(&self, type_name: &str) -> CoreResult<&[Tombstone]> {
        Ok(&self.container(type_name)?.tombstones)
    }

    /// Looks up an active record by identity.
    pub fn get(&self, type_name: &str, id: RecordId) -> CoreResult<Option<&Record>> {
        Ok(self
            .container(type_name)?
            .active
            .iter()
            .find(|r| r.created() == id))
    }

    /// Returns clones of the records of one type matching a predicate.
    pub fn search<F>(&self, type_name: &str, mut predicate: F) -> CoreResult<Vec<Record>>
    where
        F: FnMut(&Record) -> bool,
    {
        Ok(self
            .container(type_name)?
            .active
            .iter()
            .filter(|r| predicate(r))
            .cloned()
            .collect())
    }

    /// Inserts a record, returning its index in the type's container.
    ///
    /// # Errors
    ///
    /// `UnknownType` if the record's type is not configured;
    /// `InvalidRecord` if it has no identity yet; `IdConflict` if an
    /// active record or tombstone already holds the identity.
    pub fn add(&mut self, record: Record) -> CoreResult<usize> {
        if record.created() == NEVER {
            return Err(CoreError::invalid_record("record has no identity"));
        }
        let id = record.created();
        let container = self.container_mut(record.type_name())?;
        if container.holds_id(id) {
            return Err(CoreError::IdConflict {
                type_name: container.type_name.clone(),
                id,
            });
        }

        container.active.push(record);
        container.sort();
        let index = container
            .active
            .iter()
            .position(|r| r.created() == id)
            .unwrap_or(0);

        if id > self.max_id {
            self.max_id = id;
        }
        Ok(index)
    }

    /// Substitutes the active record with the same type and identity.
    ///
    /// # Errors
    ///
    /// `NoMatch` if no active record holds the identity.
    pub fn replace(&mut self, record: Record) -> CoreResult<()> {
        let id = record.created();
        let container = self.container_mut(record.type_name())?;
        let slot = container
            .active
            .iter_mut()
            .find(|r| r.created() == id)
            .ok_or_else(|| CoreError::NoMatch {
                type_name: record.type_name().to_string(),
                id,
            })?;
        *slot = record;
        container.sort();
        Ok(())
    }

    /// Removes an active record, optionally leaving a tombstone stamped
    /// with the current clock time.
    ///
    /// # Errors
    ///
    /// `NoMatch` if no active record holds the identity.
    pub fn remove(&mut self, type_name: &str, id: RecordId, tombstone: bool) -> CoreResult<()> {
        let deleted = self.clock.now();
        let container = self.container_mut(type_name)?;
        let position = container
            .active
            .iter()
            .position(|r| r.created() == id)
            .ok_or_else(|| CoreError::NoMatch {
                type_name: type_name.to_string(),
                id,
            })?;
        container.active.remove(position);

        if tombstone {
            container.tombstones.push(Tombstone::new(id, deleted));
            container.sort();
        }
        Ok(())
    }

    /// Applies a tombstone from the authoritative side.
    ///
    /// Removes the matching active record if one exists and records the
    /// tombstone with the deletion timestamp it carries, so that both
    /// replicas serialize identically. Records the store may never have
    /// seen (created and deleted since the last sync) tombstone cleanly.
    pub fn apply_tombstone(&mut self, type_name: &str, tombstone: Tombstone) -> CoreResult<()> {
        let container = self.container_mut(type_name)?;
        container.active.retain(|r| r.created() != tombstone.created);

        if let Some(existing) = container
            .tombstones
            .iter_mut()
            .find(|t| t.created == tombstone.created)
        {
            existing.deleted = tombstone.deleted;
        } else {
            container.tombstones.push(tombstone);
        }
        container.sort();

        if tombstone.created > self.max_id {
            self.max_id = tombstone.created;
        }
        Ok(())
    }

    /// Collects this store's activity after the reference timestamp,
    /// per type, with unchanged types omitted.
    pub fn changes_since(&self, since: Timestamp) -> Vec<TypeChanges> {
        let mut all = Vec::new();
        for container in &self.containers {
            let changes = TypeChanges {
                type_name: container.type_name.clone(),
                added: container
                    .active
                    .iter()
                    .filter(|r| r.created() > since)
                    .cloned()
                    .collect(),
                updated: container
                    .active
                    .iter()
                    .filter(|r| r.created() <= since && r.modified() > since)
                    .cloned()
                    .collect(),
                removed: container
                    .tombstones
                    .iter()
                    .filter(|t| t.deleted > since)
                    .copied()
                    .collect(),
            };
            if !changes.is_empty() {
                all.push(changes);
            }
        }
        all
    }

    /// The canonical form of the whole record set.
    ///
    /// Type names appear in configuration order; within a type, active
    /// records and tombstones merge into one strictly descending
    /// `created` sequence.
    pub fn to_canonical(&self) -> CodecResult<Value> {
        let mut types = Vec::with_capacity(self.containers.len());
        for container in &self.containers {
            let mut literals =
                Vec::with_capacity(container.active.len() + container.tombstones.len());
            let mut records = container.active.iter().peekable();
            let mut tombstones = container.tombstones.iter().peekable();

            loop {
                let take_record = match (records.peek(), tombstones.peek()) {
                    (Some(r), Some(t)) => r.created() > t.created,
                    (Some(_), None) => true,
                    (None, Some(_)) => false,
                    (None, None) => break,
                };
                if take_record {
                    if let Some(record) = records.next() {
                        literals.push(record.to_canonical()?);
                    }
                } else if let Some(tombstone) = tombstones.next() {
                    literals.push(tombstone.to_canonical());
                }
            }

            types.push((container.type_name.clone(), Value::Array(literals)));
        }
        Ok(Value::Object(types))
    }

    /// The canonical byte form (the hash pre-image).
    pub fn canonical_bytes(&self) -> CoreResult<Vec<u8>> {
        Ok(to_canonical_json(&self.to_canonical()?)?)
    }

    /// The lowercase-hex SHA-256 of the canonical bytes.
    pub fn content_hash(&self) -> CoreResult<String> {
        Ok(sha256_hex(&self.canonical_bytes()?))
    }

    /// Bulk-loads records and tombstones from a canonical document.
    ///
    /// Each type's payloads are reconstructed through the registry and
    /// inserted via [`add`](Self::add); `max_id` rises to the largest
    /// identity observed.
    pub fn load_canonical(&mut self, document: &Value) -> CoreResult<()> {
        let types = document
            .as_object()
            .ok_or_else(|| CoreError::invalid_record("canonical document must be an object"))?;

        for (type_name, literals) in types {
            if !self.registry.contains(type_name) {
                return Err(CoreError::unknown_type(type_name));
            }
            let literals = literals.as_array().ok_or_else(|| {
                CoreError::invalid_record(format!("type {type_name:?} must hold an array"))
            })?;

            for literal in literals {
                if is_tombstone_literal(literal) {
                    let tombstone = Tombstone::from_canonical(literal)?;
                    let container = self.container_mut(type_name)?;
                    if container.holds_id(tombstone.created) {
                        return Err(CoreError::IdConflict {
                            type_name: type_name.clone(),
                            id: tombstone.created,
                        });
                    }
                    container.tombstones.push(tombstone);
                    container.sort();
                    if tombstone.created > self.max_id {
                        self.max_id = tombstone.created;
                    }
                } else {
                    let record = self.registry.record_from_canonical(type_name, literal)?;
                    self.add(record)?;
                }
            }
        }
        Ok(())
    }

    /// Parses and bulk-loads a canonical document from bytes.
    pub fn load_canonical_bytes(&mut self, bytes: &[u8]) -> CoreResult<()> {
        let document = from_json(bytes)?;
        self.load_canonical(&document)
    }

    fn container(&self, type_name: &str) -> CoreResult<&TypedContainer> {
        self.containers
            .iter()
            .find(|c| c.type_name == type_name)
            .ok_or_else(|| CoreError::unknown_type(type_name))
    }

    fn container_mut(&mut self, type_name: &str) -> CoreResult<&mut TypedContainer> {
        self.containers
            .iter_mut()
            .find(|c| c.type_name == type_name)
            .ok_or_else(|| CoreError::unknown_type(type_name))
    }
}

impl std::fmt::Debug for RecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStore")
            .field("types", &self.registry.type_names())
            .field("records", &self.record_count())
            .field("max_id", &self.max_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::record::GenericPayload;

    fn test_store(now: Timestamp) -> (RecordStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_at(now));
        let store = RecordStore::new(
            TypeRegistry::generic(&["task", "note"]),
            Arc::clone(&clock) as Arc<dyn Clock>,
        );
        (store, clock)
    }

    fn task(created: RecordId, modified: Timestamp, title: &str) -> Record {
        Record::with_timestamps(
            created,
            modified,
            Box::new(GenericPayload::new(
                "task",
                vec![("title".to_string(), Value::from(title))],
            )),
        )
    }

    #[test]
    fn new_ids_are_strictly_increasing() {
        let (mut store, clock) = test_store(1000);

        // Three saves within the same millisecond.
        let a = store.new_id();
        let b = store.new_id();
        let c = store.new_id();
        assert_eq!((a, b, c), (1000, 1001, 1002));

        // Clock catches up and passes the counter.
        clock.set(5000);
        assert_eq!(store.new_id(), 5000);
    }

    #[test]
    fn add_keeps_descending_order() {
        let (mut store, _) = test_store(1000);

        store.add(task(100, 0, "a")).unwrap();
        store.add(task(300, 0, "c")).unwrap();
        store.add(task(200, 0, "b")).unwrap();

        let ids: Vec<RecordId> = store
            .records("task")
            .unwrap()
            .iter()
            .map(Record::created)
            .collect();
        assert_eq!(ids, vec![300, 200, 100]);
        assert_eq!(store.max_id(), 300);
    }

    #[test]
    fn add_returns_position() {
        let (mut store, _) = test_store(1000);

        store.add(task(100, 0, "a")).unwrap();
        assert_eq!(store.add(task(300, 0, "c")).unwrap(), 0);
        assert_eq!(store.add(task(200, 0, "b")).unwrap(), 1);
    }

    #[test]
    fn add_rejects_duplicate_id() {
        let (mut store, _) = test_store(1000);
        store.add(task(100, 0, "a")).unwrap();

        assert!(matches!(
            store.add(task(100, 0, "again")),
            Err(CoreError::IdConflict { id: 100, .. })
        ));
    }

    #[test]
    fn add_rejects_id_held_by_tombstone() {
        let (mut store, _) = test_store(1000);
        store.add(task(100, 0, "a")).unwrap();
        store.remove("task", 100, true).unwrap();

        // No resurrection from tombstones.
        assert!(matches!(
            store.add(task(100, 0, "again")),
            Err(CoreError::IdConflict { id: 100, .. })
        ));
    }

    #[test]
    fn add_rejects_unknown_type_and_missing_id() {
        let (mut store, _) = test_store(1000);

        let stray = Record::with_timestamps(
            100,
            0,
            Box::new(GenericPayload::new("contact", vec![])),
        );
        assert!(matches!(
            store.add(stray),
            Err(CoreError::UnknownType { .. })
        ));

        let unsaved = Record::new(Box::new(GenericPayload::new("task", vec![])));
        assert!(store.add(unsaved).is_err());
    }

    #[test]
    fn replace_substitutes_in_place() {
        let (mut store, _) = test_store(1000);
        store.add(task(100, 0, "old")).unwrap();

        store.replace(task(100, 150, "new")).unwrap();

        let record = store.get("task", 100).unwrap().unwrap();
        assert_eq!(record.modified(), 150);
        assert_eq!(store.records("task").unwrap().len(), 1);
    }

    #[test]
    fn replace_missing_fails() {
        let (mut store, _) = test_store(1000);
        assert!(matches!(
            store.replace(task(100, 150, "x")),
            Err(CoreError::NoMatch { id: 100, .. })
        ));
    }

    #[test]
    fn remove_leaves_tombstone() {
        let (mut store, clock) = test_store(1000);
        store.add(task(100, 0, "x")).unwrap();

        clock.set(1500);
        store.remove("task", 100, true).unwrap();

        assert!(store.get("task", 100).unwrap().is_none());
        assert_eq!(
            store.tombstones("task").unwrap(),
            [Tombstone::new(100, 1500)]
        );
    }

    #[test]
    fn remove_without_tombstone() {
        let (mut store, _) = test_store(1000);
        store.add(task(100, 0, "x")).unwrap();

        store.remove("task", 100, false).unwrap();
        assert!(store.tombstones("task").unwrap().is_empty());
    }

    #[test]
    fn remove_missing_fails() {
        let (mut store, _) = test_store(1000);
        assert!(matches!(
            store.remove("task", 100, true),
            Err(CoreError::NoMatch { .. })
        ));
    }

    #[test]
    fn apply_tombstone_for_unseen_record() {
        let (mut store, _) = test_store(1000);

        store
            .apply_tombstone("task", Tombstone::new(2000, 2100))
            .unwrap();
        assert_eq!(
            store.tombstones("task").unwrap(),
            [Tombstone::new(2000, 2100)]
        );
        assert_eq!(store.max_id(), 2000);
    }

    #[test]
    fn apply_tombstone_removes_active() {
        let (mut store, _) = test_store(1000);
        store.add(task(100, 0, "x")).unwrap();

        store
            .apply_tombstone("task", Tombstone::new(100, 400))
            .unwrap();
        assert!(store.get("task", 100).unwrap().is_none());
        assert_eq!(store.tombstones("task").unwrap(), [Tombstone::new(100, 400)]);
    }

    #[test]
    fn changes_classification() {
        let (mut store, clock) = test_store(1000);
        store.add(task(100, 0, "unchanged")).unwrap();
        store.add(task(120, 180, "edited")).unwrap();
        store.add(task(200, 0, "fresh")).unwrap();
        store.add(task(130, 0, "doomed")).unwrap();
        clock.set(220);
        store.remove("task", 130, true).unwrap();

        let changes = store.changes_since(150);
        assert_eq!(changes.len(), 1);
        let task_changes = &changes[0];
        assert_eq!(task_changes.type_name, "task");

        let added: Vec<RecordId> = task_changes.added.iter().map(Record::created).collect();
        let updated: Vec<RecordId> = task_changes.updated.iter().map(Record::created).collect();
        let removed: Vec<RecordId> = task_changes.removed.iter().map(|t| t.created).collect();
        assert_eq!(added, vec![200]);
        assert_eq!(updated, vec![120]);
        assert_eq!(removed, vec![130]);
    }

    #[test]
    fn fresh_record_is_not_also_updated() {
        let (mut store, _) = test_store(1000);
        // Created and modified after the reference point.
        store.add(task(200, 250, "fresh-edit")).unwrap();

        let changes = store.changes_since(150);
        assert_eq!(changes[0].added.len(), 1);
        assert!(changes[0].updated.is_empty());
    }

    #[test]
    fn unchanged_types_are_pruned() {
        let (mut store, _) = test_store(1000);
        store.add(task(200, 0, "x")).unwrap();

        let changes = store.changes_since(150);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].type_name, "task");

        assert!(store.changes_since(500).is_empty());
    }

    #[test]
    fn canonical_form_merges_tombstones() {
        let (mut store, clock) = test_store(1000);
        store.add(task(100, 0, "a")).unwrap();
        store.add(task(300, 0, "c")).unwrap();
        store.add(task(200, 0, "b")).unwrap();
        clock.set(400);
        store.remove("task", 200, true).unwrap();

        let bytes = store.canonical_bytes().unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            concat!(
                r#"{"task":[{"_created":300,"title":"c"},"#,
                r#"{"_created":200,"_deleted":400},"#,
                r#"{"_created":100,"title":"a"}],"note":[]}"#
            )
        );
    }

    #[test]
    fn canonical_roundtrip() {
        let (mut store, clock) = test_store(1000);
        store.add(task(100, 0, "a")).unwrap();
        store.add(task(120, 180, "b")).unwrap();
        clock.set(400);
        store.remove("task", 100, true).unwrap();

        let bytes = store.canonical_bytes().unwrap();

        let (mut reloaded, _) = test_store(0);
        reloaded.load_canonical_bytes(&bytes).unwrap();

        assert_eq!(reloaded.canonical_bytes().unwrap(), bytes);
        assert_eq!(reloaded.max_id(), 120);
        assert_eq!(
            reloaded.tombstones("task").unwrap(),
            [Tombstone::new(100, 400)]
        );
    }

    #[test]
    fn load_rejects_unknown_type() {
        let (mut store, _) = test_store(1000);
        assert!(matches!(
            store.load_canonical_bytes(br#"{"contact":[]}"#),
            Err(CoreError::UnknownType { .. })
        ));
    }

    #[test]
    fn content_hash_matches_bytes() {
        let (mut store, _) = test_store(1000);
        store.add(task(100, 0, "a")).unwrap();

        let hash = store.content_hash().unwrap();
        assert_eq!(hash, sha256_hex(&store.canonical_bytes().unwrap()));
        assert_eq!(hash.len(), 64);
    }

    #[test]
    fn search_filters_active_records() {
        let (mut store, _) = test_store(1000);
        store.add(task(100, 0, "milk")).unwrap();
        store.add(task(200, 0, "bread")).unwrap();

        let hits = store
            .search("task", |r| {
                r.payload()
                    .canonical_fields()
                    .map(|f| f.iter().any(|(_, v)| v.as_text() == Some("milk")))
                    .unwrap_or(false)
            })
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].created(), 100);
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_insertion_order_is_irrelevant(ids in proptest::collection::btree_set(1u64..1_000_000, 1..20)) {
                let ids: Vec<u64> = ids.iter().copied().collect();
                let mut reversed = ids.clone();
                reversed.reverse();

                let (mut a, _) = test_store(1);
                for id in &ids {
                    a.add(task(*id, 0, "r")).unwrap();
                }
                let (mut b, _) = test_store(1);
                for id in &reversed {
                    b.add(task(*id, 0, "r")).unwrap();
                }

                prop_assert_eq!(a.canonical_bytes().unwrap(), b.canonical_bytes().unwrap());
                prop_assert_eq!(a.content_hash().unwrap(), b.content_hash().unwrap());
            }

            #[test]
            fn prop_ids_strictly_increase(now in 1u64..1_000_000, count in 1usize..50) {
                let (mut store, _) = test_store(now);
                let mut last = 0;
                for _ in 0..count {
                    let id = store.new_id();
                    prop_assert!(id > last);
                    last = id;
                }
            }

            #[test]
            fn prop_sort_invariant_after_mutations(ids in proptest::collection::btree_set(1u64..1_000_000, 1..20)) {
                let (mut store, _) = test_store(1);
                for id in &ids {
                    store.add(task(*id, 0, "r")).unwrap();
                }

                let records = store.records("task").unwrap();
                for window in records.windows(2) {
                    prop_assert!(window[0].created() > window[1].created());
                }
            }
        }
    }
}
