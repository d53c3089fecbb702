//! Local client state store
//!
//! A small embedded key/value store: named buckets of JSON-encoded values,
//! kept in one file under the datacol root. Each write rewrites the file
//! through a temp file and an atomic rename, so a crash leaves either the old
//! or the new document on disk, never a torn one.
//!
//! The store holds an exclusive lock on `state.lock` from [`StateStore::open`]
//! until [`StateStore::close`] (or drop). A second process opening the same
//! root fails fast with [`CoreError::AlreadyLocked`] instead of waiting.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions, TryLockError};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace};

use crate::config::Paths;
use crate::error::{CoreError, Result};

type Bucket = BTreeMap<String, serde_json::Value>;
type Document = BTreeMap<String, Bucket>;

/// File-backed bucket/key store, opened once per process
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    lock_path: PathBuf,
    lock: File,
    document: Mutex<Document>,
}

impl StateStore {
    /// Open (creating if absent) the store under `paths`
    ///
    /// Creates the root directory with owner-only permissions first.
    pub fn open(paths: &Paths) -> Result<Self> {
        paths.ensure_root()?;

        let lock_path = paths.lock_file();
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(|e| CoreError::store_io(&lock_path, e))?;

        match lock.try_lock() {
            Ok(()) => {}
            Err(TryLockError::WouldBlock) => {
                return Err(CoreError::AlreadyLocked { path: lock_path });
            }
            Err(TryLockError::Error(e)) => return Err(CoreError::store_io(&lock_path, e)),
        }

        let path = paths.store_file();
        let existed = path.exists();
        let document = read_document(&path)?;
        debug!(
            "Opened state store at {} ({} buckets)",
            path.display(),
            document.len()
        );

        let store = Self {
            path,
            lock_path,
            lock,
            document: Mutex::new(document),
        };
        if !existed {
            store.write_document(&Document::new())?;
        }
        Ok(store)
    }

    /// Encode `value` and write it under `key` in `bucket`
    ///
    /// On a failed write the in-memory document is rolled back, so readers in
    /// this process never observe a value that is not on disk.
    pub fn persist<T: Serialize + ?Sized>(&self, bucket: &str, key: &str, value: &T) -> Result<()> {
        let encoded = serde_json::to_value(value).map_err(|source| CoreError::Encoding {
            context: format!("{bucket}/{key}"),
            source,
        })?;

        let mut document = self.document();
        let previous = document
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), encoded);

        if let Err(e) = self.write_document(&document) {
            let entries = document.entry(bucket.to_string()).or_default();
            match previous {
                Some(old) => {
                    entries.insert(key.to_string(), old);
                }
                None => {
                    entries.remove(key);
                }
            }
            return Err(e);
        }

        trace!("Persisted {}/{}", bucket, key);
        Ok(())
    }

    /// Decode the value stored under `key` in `bucket`, if any
    pub fn fetch<T: DeserializeOwned>(&self, bucket: &str, key: &str) -> Result<Option<T>> {
        let document = self.document();
        let Some(value) = document.get(bucket).and_then(|b| b.get(key)) else {
            return Ok(None);
        };

        serde_json::from_value(value.clone())
            .map(Some)
            .map_err(|source| CoreError::Encoding {
                context: format!("{bucket}/{key}"),
                source,
            })
    }

    /// Remove `key` from `bucket`; returns whether it existed
    pub fn delete(&self, bucket: &str, key: &str) -> Result<bool> {
        let mut document = self.document();
        let Some(previous) = document.get_mut(bucket).and_then(|b| b.remove(key)) else {
            return Ok(false);
        };

        if let Err(e) = self.write_document(&document) {
            document
                .entry(bucket.to_string())
                .or_default()
                .insert(key.to_string(), previous);
            return Err(e);
        }

        trace!("Deleted {}/{}", bucket, key);
        Ok(true)
    }

    /// Keys in `bucket`, sorted
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.document()
            .get(bucket)
            .map(|b| b.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Release the store lock
    pub fn close(self) -> Result<()> {
        self.lock
            .unlock()
            .map_err(|e| CoreError::store_io(&self.lock_path, e))?;
        debug!("Closed state store at {}", self.path.display());
        Ok(())
    }

    fn document(&self) -> MutexGuard<'_, Document> {
        self.document
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write_document(&self, document: &Document) -> Result<()> {
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let encoded = serde_json::to_vec_pretty(document).map_err(|source| CoreError::Encoding {
            context: self.path.display().to_string(),
            source,
        })?;

        let mut tmp =
            tempfile::NamedTempFile::new_in(dir).map_err(|e| CoreError::store_io(dir, e))?;
        tmp.write_all(&encoded)
            .and_then(|()| tmp.as_file().sync_all())
            .map_err(|e| CoreError::store_io(tmp.path(), e))?;
        tmp.persist(&self.path)
            .map_err(|e| CoreError::store_io(&self.path, e.error))?;

        Ok(())
    }
}

fn read_document(path: &Path) -> Result<Document> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Document::new()),
        Err(e) => return Err(CoreError::store_io(path, e)),
    };

    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Document::new());
    }

    serde_json::from_slice(&bytes).map_err(|source| CoreError::Encoding {
        context: path.display().to_string(),
        source,
    })
}
