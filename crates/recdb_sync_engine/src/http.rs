//! HTTP transport implementation.
//!
//! The actual HTTP client is abstracted via a trait to allow different
//! implementations (reqwest, ureq, a platform webview, etc.) and a
//! loopback client for tests.

use crate::transport::{RemoteStore, TransportError, TransportResult};
use recdb_codec::Value;
use recdb_core::Timestamp;
use recdb_sync_protocol::{
    decode_hash_response, ChoiceIndex, Query, ReconcileResponse, TypeIndex, CONTENT_TYPE,
    HASH_PATH, QUERY_PATH,
};

/// A plain HTTP response: status code and body.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body bytes.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// True for any 2xx status.
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP client abstraction.
///
/// Implement this trait to provide the actual HTTP transport. Errors
/// returned here are treated as retryable network failures; non-OK
/// statuses are handled by the transport.
pub trait HttpClient: Send + Sync {
    /// Sends a POST request and returns the response.
    fn post(&self, url: &str, content_type: &str, body: Vec<u8>) -> Result<HttpResponse, String>;

    /// Sends a GET request and returns the response.
    fn get(&self, url: &str) -> Result<HttpResponse, String>;
}

/// HTTP-based transport to the authoritative store.
///
/// All queries POST canonical JSON bodies to the single query
/// endpoint; the content hash is read through the GET mirror.
pub struct HttpTransport<C: HttpClient> {
    base_url: String,
    client: C,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Creates a transport against a base URL.
    pub fn new(base_url: impl Into<String>, client: C) -> Self {
        Self {
            base_url: base_url.into(),
            client,
        }
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn check(response: HttpResponse) -> TransportResult<Vec<u8>> {
        if response.is_ok() {
            return Ok(response.body);
        }
        let message = format!(
            "status {}: {}",
            response.status,
            String::from_utf8_lossy(&response.body)
        );
        // Server-side trouble is worth retrying; client errors are not.
        if response.status >= 500 {
            Err(TransportError::retryable(message))
        } else {
            Err(TransportError::fatal(message))
        }
    }

    fn post_query(&self, query: &Query) -> TransportResult<Vec<u8>> {
        let body = query
            .encode()
            .map_err(|e| TransportError::fatal(format!("failed to encode request: {e}")))?;

        let url = format!("{}{}", self.base_url, QUERY_PATH);
        let response = self
            .client
            .post(&url, CONTENT_TYPE, body)
            .map_err(TransportError::retryable)?;
        Self::check(response)
    }

    fn hash_from(body: &[u8]) -> TransportResult<String> {
        decode_hash_response(body)
            .map_err(|e| TransportError::fatal(format!("invalid hash response: {e}")))
    }
}

impl<C: HttpClient> RemoteStore for HttpTransport<C> {
    fn fetch_hash(&self) -> TransportResult<String> {
        let url = format!("{}{}", self.base_url, HASH_PATH);
        let response = self.client.get(&url).map_err(TransportError::retryable)?;
        Self::hash_from(&Self::check(response)?)
    }

    fn push_add(&self, type_name: &str, instance: &Value) -> TransportResult<String> {
        let body = self.post_query(&Query::Add {
            type_name: type_name.to_string(),
            instance: instance.clone(),
        })?;
        Self::hash_from(&body)
    }

    fn push_edit(&self, type_name: &str, instance: &Value) -> TransportResult<String> {
        let body = self.post_query(&Query::Edit {
            type_name: type_name.to_string(),
            instance: instance.clone(),
        })?;
        Self::hash_from(&body)
    }

    fn push_delete(&self, type_name: &str, instance: &Value) -> TransportResult<String> {
        let body = self.post_query(&Query::Delete {
            type_name: type_name.to_string(),
            instance: instance.clone(),
        })?;
        Self::hash_from(&body)
    }

    fn reconcile(
        &self,
        sync: Timestamp,
        instances: &TypeIndex,
    ) -> TransportResult<ReconcileResponse> {
        let body = self.post_query(&Query::Reconcile {
            sync,
            instances: instances.clone(),
        })?;
        ReconcileResponse::decode(&body)
            .map_err(|e| TransportError::fatal(format!("invalid reconcile response: {e}")))
    }

    fn resolve(&self, choices: &ChoiceIndex) -> TransportResult<ReconcileResponse> {
        let body = self.post_query(&Query::Resolve {
            choices: choices.clone(),
        })?;
        ReconcileResponse::decode(&body)
            .map_err(|e| TransportError::fatal(format!("invalid resolve response: {e}")))
    }
}

/// Trait for servers that can handle loopback requests.
///
/// The sync server implements the same shape; wiring it through
/// [`LoopbackClient`] exercises the full pipeline without sockets.
pub trait LoopbackServer: Send + Sync {
    /// Handles a POST request body and returns the response body.
    fn handle_post(&self, path: &str, body: &[u8]) -> Result<Vec<u8>, String>;

    /// Handles a GET request and returns the response body.
    fn handle_get(&self, path: &str) -> Result<Vec<u8>, String>;
}

/// An HTTP client that routes requests directly to a loopback server.
pub struct LoopbackClient<S: LoopbackServer> {
    server: S,
}

impl<S: LoopbackServer> LoopbackClient<S> {
    /// Creates a loopback client over the given server.
    pub fn new(server: S) -> Self {
        Self { server }
    }
}

impl<S: LoopbackServer> HttpClient for LoopbackClient<S> {
    fn post(&self, url: &str, _content_type: &str, body: Vec<u8>) -> Result<HttpResponse, String> {
        let path = path_of(url);
        match self.server.handle_post(path, &body) {
            Ok(body) => Ok(HttpResponse { status: 200, body }),
            Err(message) => Ok(HttpResponse {
                status: 500,
                body: message.into_bytes(),
            }),
        }
    }

    fn get(&self, url: &str) -> Result<HttpResponse, String> {
        let path = path_of(url);
        match self.server.handle_get(path) {
            Ok(body) => Ok(HttpResponse { status: 200, body }),
            Err(message) => Ok(HttpResponse {
                status: 500,
                body: message.into_bytes(),
            }),
        }
    }
}

fn path_of(url: &str) -> &str {
    url.find("/sync").map_or(url, |i| &url[i..])
}
