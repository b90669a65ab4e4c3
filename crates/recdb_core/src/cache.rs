//! Encrypted local cache.

use crate::clock::Timestamp;
use crate::crypto::{decrypt, encrypt, CipherEnvelope, DEV_PASSWORD};
use crate::error::{CoreError, CoreResult};
use parking_lot::Mutex;
use rand::RngCore;
use recdb_codec::{from_json, sha256_hex, to_canonical_json};
use recdb_storage::KeyValueBackend;
use tracing::debug;

/// The canonical document of an empty record set source.
pub const EMPTY_DOCUMENT: &str = "{}";

/// Encrypted persistence for one replica's record set and sync
/// watermark.
///
/// Two keys live under the configured namespace `K`: `K-data` holds the
/// sealed canonical serialization, `K-sync` the last successful sync
/// timestamp as a decimal string. The backend only ever sees
/// ciphertext and the watermark.
pub struct LocalCache {
    backend: Box<dyn KeyValueBackend>,
    namespace: String,
    password: String,
    rng: Mutex<Box<dyn RngCore + Send>>,
}

impl LocalCache {
    /// Creates a cache over a backend with the development password.
    ///
    /// Real deployments must use [`with_password`](Self::with_password).
    pub fn new(backend: Box<dyn KeyValueBackend>, namespace: impl Into<String>) -> Self {
        Self::with_password(backend, namespace, DEV_PASSWORD)
    }

    /// Creates a cache with a caller-supplied password.
    pub fn with_password(
        backend: Box<dyn KeyValueBackend>,
        namespace: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            namespace: namespace.into(),
            password: password.into(),
            rng: Mutex::new(Box::new(rand::rngs::OsRng)),
        }
    }

    /// Replaces the RNG used for salt and IV generation.
    #[must_use]
    pub fn with_rng(mut self, rng: Box<dyn RngCore + Send>) -> Self {
        self.rng = Mutex::new(rng);
        self
    }

    /// The configured namespace prefix.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn data_key(&self) -> String {
        format!("{}-data", self.namespace)
    }

    fn sync_key(&self) -> String {
        format!("{}-sync", self.namespace)
    }

    /// Reads and decrypts the cached record set.
    ///
    /// Returns `None` when nothing has been written yet; whether to
    /// seed from the remote or start empty is the caller's decision.
    ///
    /// # Errors
    ///
    /// Fails when the stored envelope is malformed or does not decrypt
    /// under the configured password.
    pub fn read_data(&self) -> CoreResult<Option<String>> {
        let Some(stored) = self.backend.get(&self.data_key())? else {
            return Ok(None);
        };

        let envelope = CipherEnvelope::from_canonical(&from_json(stored.as_bytes())?)?;
        let plaintext = decrypt(&envelope, &self.password)?;
        let text = String::from_utf8(plaintext)
            .map_err(|_| CoreError::decryption_failed("plaintext is not UTF-8"))?;
        Ok(Some(text))
    }

    /// Encrypts and stores the record set, returning the lowercase-hex
    /// SHA-256 of the plaintext bytes.
    ///
    /// The returned hash is the pre-encryption content hash, the one
    /// comparable against the authoritative store.
    pub fn write_data(&self, plaintext: &str) -> CoreResult<String> {
        let hash = sha256_hex(plaintext.as_bytes());

        let envelope = {
            let mut rng = self.rng.lock();
            encrypt(plaintext.as_bytes(), &self.password, rng.as_mut())?
        };
        let document = to_canonical_json(&envelope.to_canonical())?;
        let document = String::from_utf8(document)
            .map_err(|_| CoreError::encryption_failed("envelope is not UTF-8"))?;

        self.backend.put(&self.data_key(), &document)?;
        debug!(namespace = %self.namespace, hash = %hash, "cache data written");
        Ok(hash)
    }

    /// Reads the last-sync watermark, 0 before the first sync.
    pub fn last_sync(&self) -> CoreResult<Timestamp> {
        match self.backend.get(&self.sync_key())? {
            None => Ok(0),
            Some(stored) => stored
                .parse::<Timestamp>()
                .map_err(|_| CoreError::InvalidWatermark { value: stored }),
        }
    }

    /// Persists the last-sync watermark.
    pub fn set_last_sync(&self, timestamp: Timestamp) -> CoreResult<()> {
        self.backend
            .put(&self.sync_key(), &timestamp.to_string())?;
        debug!(namespace = %self.namespace, timestamp, "sync watermark advanced");
        Ok(())
    }
}

impl std::fmt::Debug for LocalCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalCache")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recdb_storage::MemoryBackend;

    fn cache() -> LocalCache {
        LocalCache::with_password(Box::new(MemoryBackend::new()), "notes", "pw")
    }

    #[test]
    fn read_missing_returns_none() {
        assert_eq!(cache().read_data().unwrap(), None);
    }

    #[test]
    fn write_then_read() {
        let cache = cache();
        let plaintext = r#"{"task":[{"_created":100,"title":"x"}]}"#;

        cache.write_data(plaintext).unwrap();
        assert_eq!(cache.read_data().unwrap().as_deref(), Some(plaintext));
    }

    #[test]
    fn write_returns_plaintext_hash() {
        let cache = cache();
        let plaintext = EMPTY_DOCUMENT;

        let hash = cache.write_data(plaintext).unwrap();
        assert_eq!(hash, sha256_hex(plaintext.as_bytes()));
    }

    #[test]
    fn stored_value_is_ciphertext() {
        let cache = cache();
        let plaintext = r#"{"task":[{"_created":100,"title":"secret"}]}"#;
        cache.write_data(plaintext).unwrap();

        let raw = cache.backend.get("notes-data").unwrap().unwrap();
        assert!(!raw.contains("secret"));
        assert!(raw.starts_with(r#"{"salt":""#));
    }

    #[test]
    fn wrong_password_fails_read() {
        let backend = Box::new(MemoryBackend::new());
        let writer = LocalCache::with_password(backend, "notes", "pw");
        writer.write_data(EMPTY_DOCUMENT).unwrap();

        let stored = writer.backend.get("notes-data").unwrap().unwrap();
        let reader = LocalCache::with_password(
            Box::new(MemoryBackend::with_entries(vec![(
                "notes-data".to_string(),
                stored,
            )])),
            "notes",
            "other",
        );

        assert!(matches!(
            reader.read_data(),
            Err(CoreError::DecryptionFailed { .. })
        ));
    }

    #[test]
    fn corrupt_envelope_fails_read() {
        let reader = LocalCache::with_password(
            Box::new(MemoryBackend::with_entries(vec![(
                "notes-data".to_string(),
                r#"{"salt":"00"}"#.to_string(),
            )])),
            "notes",
            "pw",
        );

        assert!(reader.read_data().is_err());
    }

    #[test]
    fn watermark_roundtrip() {
        let cache = cache();
        assert_eq!(cache.last_sync().unwrap(), 0);

        cache.set_last_sync(1_700_000_000_000).unwrap();
        assert_eq!(cache.last_sync().unwrap(), 1_700_000_000_000);
    }

    #[test]
    fn garbage_watermark_fails() {
        let cache = LocalCache::with_password(
            Box::new(MemoryBackend::with_entries(vec![(
                "notes-sync".to_string(),
                "not a number".to_string(),
            )])),
            "notes",
            "pw",
        );

        assert!(matches!(
            cache.last_sync(),
            Err(CoreError::InvalidWatermark { .. })
        ));
    }

    #[test]
    fn namespacing_separates_instances() {
        let cache_a = LocalCache::with_password(Box::new(MemoryBackend::new()), "a", "pw");
        assert_eq!(cache_a.data_key(), "a-data");
        assert_eq!(cache_a.sync_key(), "a-sync");
    }
}
