//! File-based key-value backend for persistent storage.

use crate::backend::KeyValueBackend;
use crate::error::{StorageError, StorageResult};
use fs2::FileExt;
use parking_lot::Mutex;
use recdb_codec::{from_json, to_canonical_json, Value};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A file-based key-value backend.
///
/// The whole map is persisted as one canonical document and rewritten
/// on every mutation; the stores kept here are small (one ciphertext
/// blob and one watermark per namespace). An advisory exclusive lock
/// is held for the lifetime of the backend so two processes cannot
/// open the same store.
///
/// # Thread Safety
///
/// This backend is thread-safe and can be shared across threads.
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    inner: Mutex<Inner>,
}

#[derive(Debug)]
struct Inner {
    file: File,
    entries: BTreeMap<String, String>,
}

impl FileBackend {
    /// Opens or creates a key-value store at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened, is locked by
    /// another process, or holds a document that is not a string map.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        file.try_lock_exclusive()
            .map_err(|_| StorageError::Locked {
                path: path.display().to_string(),
            })?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)?;

        let entries = if contents.trim().is_empty() {
            BTreeMap::new()
        } else {
            parse_entries(contents.as_bytes())?
        };

        Ok(Self {
            path: path.to_path_buf(),
            inner: Mutex::new(Inner { file, entries }),
        })
    }

    /// Opens or creates a store, creating parent directories if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if directories cannot be created or the file
    /// cannot be opened.
    pub fn open_with_create_dirs(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::open(path)
    }

    /// Returns the path to the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(inner: &mut Inner) -> StorageResult<()> {
        let fields = inner
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), Value::from(v.as_str())))
            .collect();
        let bytes = to_canonical_json(&Value::Object(fields))?;

        inner.file.seek(SeekFrom::Start(0))?;
        inner.file.set_len(0)?;
        inner.file.write_all(&bytes)?;
        inner.file.sync_all()?;
        Ok(())
    }
}

fn parse_entries(bytes: &[u8]) -> StorageResult<BTreeMap<String, String>> {
    let document = from_json(bytes)?;
    let fields = document
        .as_object()
        .ok_or_else(|| StorageError::corrupt("expected a top-level object"))?;

    let mut entries = BTreeMap::new();
    for (key, value) in fields {
        let text = value
            .as_text()
            .ok_or_else(|| StorageError::corrupt(format!("value for {key:?} is not a string")))?;
        entries.insert(key.clone(), text.to_string());
    }
    Ok(entries)
}

impl KeyValueBackend for FileBackend {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.inner.lock().entries.get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> StorageResult<()> {
        let mut inner = self.inner.lock();
        inner.entries.insert(key.to_string(), value.to_string());
        Self::persist(&mut inner)
    }

    fn remove(&self, key: &str) -> StorageResult<Option<String>> {
        let mut inner = self.inner.lock();
        let previous = inner.entries.remove(key);
        if previous.is_some() {
            Self::persist(&mut inner)?;
        }
        Ok(previous)
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        Ok(self.inner.lock().entries.keys().cloned().collect())
    }
}
