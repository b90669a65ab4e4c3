//! Integration tests: engine and server wired through the loopback
//! transport.

use recdb_codec::Value;
use recdb_core::{
    Clock, GenericPayload, LocalCache, ManualClock, Record, RecordStore, Timestamp, TypeRegistry,
};
use recdb_storage::MemoryBackend;
use recdb_sync_engine::{
    HttpTransport, LoopbackClient, LoopbackServer, PreferenceResolver, SyncConfig, SyncEngine,
    SyncError,
};
use recdb_sync_server::{ServerConfig, SyncServer};
use std::sync::Arc;

/// Routes engine requests straight at an in-process sync server.
struct Loopback(Arc<SyncServer>);

impl LoopbackServer for Loopback {
    fn handle_post(&self, path: &str, body: &[u8]) -> Result<Vec<u8>, String> {
        self.0.handle_post(path, body).map_err(|e| e.to_string())
    }

    fn handle_get(&self, path: &str) -> Result<Vec<u8>, String> {
        self.0.handle_get(path).map_err(|e| e.to_string())
    }
}

fn new_server() -> Arc<SyncServer> {
    Arc::new(SyncServer::new(
        ServerConfig::default(),
        TypeRegistry::generic(&["task"]),
        Arc::new(ManualClock::starting_at(1)),
    ))
}

fn new_engine(
    server: &Arc<SyncServer>,
    clock: Arc<ManualClock>,
    cache: LocalCache,
) -> SyncEngine<HttpTransport<LoopbackClient<Loopback>>> {
    let store = RecordStore::new(
        TypeRegistry::generic(&["task"]),
        clock as Arc<dyn Clock>,
    );
    let transport = HttpTransport::new(
        "http://sync.local",
        LoopbackClient::new(Loopback(Arc::clone(server))),
    );
    SyncEngine::new(SyncConfig::new("http://sync.local"), transport, store, cache)
}

fn fresh_cache() -> LocalCache {
    LocalCache::with_password(Box::new(MemoryBackend::new()), "notes", "pw")
}

fn task_record(title: &str) -> Record {
    Record::new(Box::new(GenericPayload::new(
        "task",
        vec![("title".to_string(), Value::from(title))],
    )))
}

fn task_with(created: Timestamp, modified: Timestamp, title: &str) -> Record {
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
fn cold_start_with_empty_stores() {
    // Scenario: no local cache, empty authoritative store.
    let server = new_server();
    let clock = Arc::new(ManualClock::starting_at(5000));
    let engine = new_engine(&server, Arc::clone(&clock), fresh_cache());

    let report = engine.init().unwrap();

    assert_eq!(report.time, 5000);
    assert_eq!(report.hash, server.content_hash().unwrap());
    assert_eq!(engine.last_sync().unwrap(), 5000);
    assert_eq!(engine.stats().reconciliations, 0);
}

#[test]
fn equal_stores_short_circuit_on_hash() {
    // Scenario: both replicas already hold the same record.
    let server = new_server();
    server.with_store(|store| store.add(task_with(100, 0, "shared")).unwrap());

    let cache = fresh_cache();
    let mut seed = RecordStore::new(
        TypeRegistry::generic(&["task"]),
        Arc::new(ManualClock::starting_at(1)) as Arc<dyn Clock>,
    );
    seed.add(task_with(100, 0, "shared")).unwrap();
    let plaintext = String::from_utf8(seed.canonical_bytes().unwrap()).unwrap();
    cache.write_data(&plaintext).unwrap();

    let clock = Arc::new(ManualClock::starting_at(6000));
    let engine = new_engine(&server, clock, cache);

    let report = engine.init().unwrap();

    assert_eq!(report.hash, server.content_hash().unwrap());
    // The hash matched outright; reconcile never ran.
    assert_eq!(engine.stats().reconciliations, 0);
    assert_eq!(engine.stats().syncs_completed, 1);
}

#[test]
fn save_pushes_to_authoritative_store() {
    // Scenario: client adds, server otherwise unchanged.
    let server = new_server();
    let clock = Arc::new(ManualClock::starting_at(5000));
    let engine = new_engine(&server, Arc::clone(&clock), fresh_cache());
    engine.init().unwrap();

    clock.set(7000);
    let mut record = task_record("groceries");
    let report = engine.save(&mut record).unwrap();

    assert_eq!(record.created(), 7000);
    assert!(record.created() > 5000);
    assert_eq!(server.record_count(), 1);
    assert_eq!(report.hash, server.content_hash().unwrap());
    assert_eq!(engine.last_sync().unwrap(), 7000);
}

#[test]
fn conflicting_edits_surface_and_block_the_watermark() {
    // Scenario: both sides edited record 100 since the client's last
    // sync at 150: the server to _modified 400, the client to 500.
    let server = new_server();
    server.with_store(|store| store.add(task_with(100, 400, "server edit")).unwrap());

    let cache = fresh_cache();
    let mut seed = RecordStore::new(
        TypeRegistry::generic(&["task"]),
        Arc::new(ManualClock::starting_at(1)) as Arc<dyn Clock>,
    );
    seed.add(task_with(100, 500, "client edit")).unwrap();
    let plaintext = String::from_utf8(seed.canonical_bytes().unwrap()).unwrap();
    cache.write_data(&plaintext).unwrap();
    cache.set_last_sync(150).unwrap();

    let clock = Arc::new(ManualClock::starting_at(9000));
    let engine = new_engine(&server, clock, cache);

    let err = engine.init().unwrap_err();
    let SyncError::ConflictsPending { conflicts } = err else {
        panic!("expected conflicts, got {err}");
    };

    let versions = conflicts.get("task").unwrap().conflict.get(&100).unwrap();
    assert_eq!(versions.len(), 2);
    assert_eq!(
        versions[0],
        task_with(100, 400, "server edit").to_canonical().unwrap()
    );
    assert_eq!(
        versions[1],
        task_with(100, 500, "client edit").to_canonical().unwrap()
    );

    // Neither replica moved, and the watermark did not advance.
    assert_eq!(engine.last_sync().unwrap(), 150);
    server.with_store(|store| {
        assert_eq!(store.get("task", 100).unwrap().unwrap().modified(), 400);
    });
}

#[test]
fn conflict_resolution_converges_both_replicas() {
    // Same divergence as above, but a client-wins resolver settles it.
    let server = new_server();
    server.with_store(|store| store.add(task_with(100, 400, "server edit")).unwrap());

    let cache = fresh_cache();
    let mut seed = RecordStore::new(
        TypeRegistry::generic(&["task"]),
        Arc::new(ManualClock::starting_at(1)) as Arc<dyn Clock>,
    );
    seed.add(task_with(100, 500, "client edit")).unwrap();
    let plaintext = String::from_utf8(seed.canonical_bytes().unwrap()).unwrap();
    cache.write_data(&plaintext).unwrap();
    cache.set_last_sync(150).unwrap();

    let clock = Arc::new(ManualClock::starting_at(9000));
    let engine = new_engine(&server, clock, cache)
        .with_resolver(Box::new(PreferenceResolver::ClientWins));

    let report = engine.init().unwrap();

    assert_eq!(report.hash, server.content_hash().unwrap());
    assert_eq!(engine.last_sync().unwrap(), 9000);
    server.with_store(|store| {
        let record = store.get("task", 100).unwrap().unwrap();
        assert_eq!(record.modified(), 500);
    });
}

#[test]
fn rapid_batch_saves_get_distinct_increasing_ids() {
    // Scenario: three saves within the same millisecond.
    let server = new_server();
    let clock = Arc::new(ManualClock::starting_at(5000));
    let engine = new_engine(&server, Arc::clone(&clock), fresh_cache());
    engine.init().unwrap();

    let mut ids = Vec::new();
    for title in ["a", "b", "c"] {
        let mut record = task_record(title);
        engine.save(&mut record).unwrap();
        ids.push(record.created());
    }

    assert_eq!(ids, vec![5000, 5001, 5002]);
    let stored: Vec<u64> = engine
        .search("task", |_| true)
        .unwrap()
        .iter()
        .map(Record::created)
        .collect();
    assert_eq!(stored, vec![5002, 5001, 5000], "descending creation order");
    assert_eq!(server.record_count(), 3);
}

#[test]
fn corrupt_cache_fails_init_without_touching_the_watermark() {
    // Scenario: K-data present but sealed under another password.
    let server = new_server();

    let envelope =
        recdb_core::crypto::encrypt(b"{}", "other password", &mut rand::rngs::OsRng).unwrap();
    let document = String::from_utf8(
        recdb_codec::to_canonical_json(&envelope.to_canonical()).unwrap(),
    )
    .unwrap();
    let backend = MemoryBackend::with_entries(vec![("notes-data".to_string(), document)]);
    let cache = LocalCache::with_password(Box::new(backend), "notes", "pw");

    let clock = Arc::new(ManualClock::starting_at(5000));
    let engine = new_engine(&server, clock, cache);

    let err = engine.init().unwrap_err();
    let SyncError::Core { source, .. } = &err else {
        panic!("expected a core error, got {err}");
    };
    assert!(source.is_crypto());
    assert_eq!(engine.last_sync().unwrap(), 0);
}

#[test]
fn edit_and_delete_round_trip_through_the_server() {
    let server = new_server();
    let clock = Arc::new(ManualClock::starting_at(5000));
    let engine = new_engine(&server, Arc::clone(&clock), fresh_cache());
    engine.init().unwrap();

    let mut record = task_record("v1");
    engine.save(&mut record).unwrap();

    clock.set(6000);
    let mut edited = task_with(record.created(), 0, "v2");
    engine.edit(&mut edited).unwrap();
    assert_eq!(edited.modified(), 6000);
    server.with_store(|store| {
        assert_eq!(
            store.get("task", record.created()).unwrap().unwrap().modified(),
            6000
        );
    });

    clock.set(7000);
    engine.delete(&edited).unwrap();
    assert!(engine.search("task", |_| true).unwrap().is_empty());
    assert_eq!(server.record_count(), 0);
    server.with_store(|store| {
        assert_eq!(
            store.tombstones("task").unwrap(),
            [recdb_core::Tombstone::new(record.created(), 7000)]
        );
    });
}

#[test]
fn second_client_converges_through_reconciliation() {
    // Client A saves a record; client B, which has never synced,
    // pulls it down through reconcile.
    let server = new_server();

    let clock_a = Arc::new(ManualClock::starting_at(5000));
    let engine_a = new_engine(&server, Arc::clone(&clock_a), fresh_cache());
    engine_a.init().unwrap();
    let mut record = task_record("shared");
    engine_a.save(&mut record).unwrap();

    let clock_b = Arc::new(ManualClock::starting_at(8000));
    let engine_b = new_engine(&server, clock_b, fresh_cache());
    let report = engine_b.init().unwrap();

    assert_eq!(report.hash, server.content_hash().unwrap());
    let found = engine_b.search("task", |_| true).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].created(), record.created());
    assert_eq!(engine_b.stats().reconciliations, 1);
}

#[test]
fn deletion_propagates_to_other_clients() {
    let server = new_server();

    let clock_a = Arc::new(ManualClock::starting_at(5000));
    let engine_a = new_engine(&server, Arc::clone(&clock_a), fresh_cache());
    engine_a.init().unwrap();
    let mut record = task_record("doomed");
    engine_a.save(&mut record).unwrap();

    // Client B picks the record up.
    let clock_b = Arc::new(ManualClock::starting_at(6000));
    let engine_b = new_engine(&server, Arc::clone(&clock_b), fresh_cache());
    engine_b.init().unwrap();
    assert_eq!(engine_b.search("task", |_| true).unwrap().len(), 1);

    // Client A deletes; client B syncs and sees the tombstone applied.
    clock_a.set(7000);
    engine_a.delete(&record).unwrap();

    clock_b.set(8000);
    let report = engine_b.sync().unwrap();
    assert_eq!(report.hash, server.content_hash().unwrap());
    assert!(engine_b.search("task", |_| true).unwrap().is_empty());
}
