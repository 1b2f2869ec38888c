//! Hierarchical key store
//!
//! Flat key-value persistence with path-like keys derived from
//! `(namespace, kind, id)` or `(namespace, mcis, vm)`. Values are
//! JSON-serialized records.
//!
//! # Module Structure
//!
//! - [`keys`] - Deterministic key derivation
//! - [`memory`] - Concurrent in-memory backend
//! - [`file`] - JSON-file backend used by the CLI
//!
//! The store offers no transactions and no compare-and-swap. Callers that
//! need check-then-act atomicity take a [`KeyLocks`] guard.

pub mod file;
pub mod keys;
pub mod memory;

use std::sync::Arc;

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::{Error, Result};

pub use file::FileStore;
pub use memory::MemoryStore;

/// Synchronous key-value store contract.
pub trait KeyValueStore: Send + Sync {
    /// Read a raw value. `Ok(None)` when the key is absent.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Insert or overwrite a raw value.
    fn put(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a key. Returns true if it existed.
    fn delete(&self, key: &str) -> Result<bool>;

    /// All entries whose key starts with `prefix`, ordered by key.
    fn list(&self, prefix: &str) -> Result<Vec<(String, String)>>;
}

/// Read and decode a JSON value.
pub fn get_json<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Result<Option<T>> {
    match store.get(key)? {
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| Error::persistence(format!("failed to decode {}: {}", key, e))),
        None => Ok(None),
    }
}

/// Encode and write a JSON value, returning the stored text.
pub fn put_json<T: Serialize>(store: &dyn KeyValueStore, key: &str, value: &T) -> Result<String> {
    let raw = serde_json::to_string(value)
        .map_err(|e| Error::persistence(format!("failed to encode {}: {}", key, e)))?;
    store.put(key, &raw)?;
    Ok(raw)
}

/// Decode every value under a prefix.
pub fn list_json<T: DeserializeOwned>(store: &dyn KeyValueStore, prefix: &str) -> Result<Vec<T>> {
    store
        .list(prefix)?
        .into_iter()
        .map(|(key, raw)| {
            serde_json::from_str(&raw)
                .map_err(|e| Error::persistence(format!("failed to decode {}: {}", key, e)))
        })
        .collect()
}

type LockMap = DashMap<String, Arc<Mutex<()>>>;

/// Per-key advisory locks.
///
/// Held across a uniqueness check and the matching write so two concurrent
/// requests for the same key cannot both provision remotely. An entry lives
/// only while some caller holds or waits on it.
#[derive(Default, Clone)]
pub struct KeyLocks {
    locks: Arc<LockMap>,
}

/// Exclusive ownership of one key; released on drop
pub struct KeyGuard {
    guard: Option<OwnedMutexGuard<()>>,
    key: String,
    locks: Arc<LockMap>,
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        // The map's own Arc is the only one left when nobody waits.
        self.locks
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive ownership of `key`.
    pub async fn acquire(&self, key: &str) -> KeyGuard {
        let lock = self
            .locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = lock.lock_owned().await;
        KeyGuard {
            guard: Some(guard),
            key: key.to_string(),
            locks: Arc::clone(&self.locks),
        }
    }

    /// Keys currently held or waited on
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
