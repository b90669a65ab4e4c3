//! Transport abstraction for the remote authoritative store.

use parking_lot::RwLock;
use recdb_codec::Value;
use recdb_core::Timestamp;
use recdb_sync_protocol::{ChoiceIndex, ReconcileResponse, TypeIndex};

/// A transport-level failure.
///
/// The engine tags it with the state machine state it happened in.
#[derive(Debug, Clone)]
pub struct TransportError {
    /// Error message.
    pub message: String,
    /// Whether the operation can be retried.
    pub retryable: bool,
}

impl TransportError {
    /// Creates a retryable failure.
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a fatal failure.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// The engine's view of the remote authoritative store.
///
/// One method per wire query. Implementations encode the query bodies
/// of `recdb_sync_protocol` and surface non-OK responses as
/// [`TransportError`]s.
pub trait RemoteStore: Send + Sync {
    /// Issues the `hash` query.
    fn fetch_hash(&self) -> TransportResult<String>;

    /// Issues the `add` query, returning the new authoritative hash.
    fn push_add(&self, type_name: &str, instance: &Value) -> TransportResult<String>;

    /// Issues the `edit` query, returning the new authoritative hash.
    fn push_edit(&self, type_name: &str, instance: &Value) -> TransportResult<String>;

    /// Issues the `delete` query, returning the new authoritative hash.
    fn push_delete(&self, type_name: &str, instance: &Value) -> TransportResult<String>;

    /// Issues the `reconcile` query.
    fn reconcile(&self, sync: Timestamp, instances: &TypeIndex)
        -> TransportResult<ReconcileResponse>;

    /// Issues the `resolve` query.
    fn resolve(&self, choices: &ChoiceIndex) -> TransportResult<ReconcileResponse>;
}

/// A programmable transport for unit tests.
#[derive(Debug, Default)]
pub struct MockTransport {
    hash: RwLock<Option<String>>,
    record_hash: RwLock<Option<String>>,
    reconcile: RwLock<Option<ReconcileResponse>>,
    resolve: RwLock<Option<ReconcileResponse>>,
    calls: RwLock<Vec<String>>,
}

impl MockTransport {
    /// Creates a transport with no responses programmed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Programs the `hash` response.
    pub fn set_hash(&self, hash: impl Into<String>) {
        *self.hash.write() = Some(hash.into());
    }

    /// Programs the `add`/`edit`/`delete` response.
    pub fn set_record_hash(&self, hash: impl Into<String>) {
        *self.record_hash.write() = Some(hash.into());
    }

    /// Programs the `reconcile` response.
    pub fn set_reconcile(&self, response: ReconcileResponse) {
        *self.reconcile.write() = Some(response);
    }

    /// Programs the `resolve` response.
    pub fn set_resolve(&self, response: ReconcileResponse) {
        *self.resolve.write() = Some(response);
    }

    /// The queries issued so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.read().clone()
    }

    fn record_call(&self, name: &str) {
        self.calls.write().push(name.to_string());
    }
}

impl RemoteStore for MockTransport {
    fn fetch_hash(&self) -> TransportResult<String> {
        self.record_call("hash");
        self.hash
            .read()
            .clone()
            .ok_or_else(|| TransportError::fatal("no hash response programmed"))
    }

    fn push_add(&self, _type_name: &str, _instance: &Value) -> TransportResult<String> {
        self.record_call("add");
        self.record_hash
            .read()
            .clone()
            .ok_or_else(|| TransportError::fatal("no record response programmed"))
    }

    fn push_edit(&self, _type_name: &str, _instance: &Value) -> TransportResult<String> {
        self.record_call("edit");
        self.record_hash
            .read()
            .clone()
            .ok_or_else(|| TransportError::fatal("no record response programmed"))
    }

    fn push_delete(&self, _type_name: &str, _instance: &Value) -> TransportResult<String> {
        self.record_call("delete");
        self.record_hash
            .read()
            .clone()
            .ok_or_else(|| TransportError::fatal("no record response programmed"))
    }

    fn reconcile(
        &self,
        _sync: Timestamp,
        _instances: &TypeIndex,
    ) -> TransportResult<ReconcileResponse> {
        self.record_call("reconcile");
        self.reconcile
            .read()
            .clone()
            .ok_or_else(|| TransportError::fatal("no reconcile response programmed"))
    }

    fn resolve(&self, _choices: &ChoiceIndex) -> TransportResult<ReconcileResponse> {
        self.record_call("resolve");
        self.resolve
            .read()
            .clone()
            .ok_or_else(|| TransportError::fatal("no resolve response programmed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_returns_programmed_responses() {
        let transport = MockTransport::new();
        transport.set_hash("a".repeat(64));

        assert_eq!(transport.fetch_hash().unwrap(), "a".repeat(64));
        assert_eq!(transport.calls(), vec!["hash"]);
    }

    #[test]
    fn mock_fails_without_programming() {
        let transport = MockTransport::new();
        assert!(transport.fetch_hash().is_err());
        assert!(transport
            .reconcile(0, &TypeIndex::new())
            .is_err());
    }
}
