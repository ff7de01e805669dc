//! Key-value persistence seam.
//!
//! The engine never touches files itself. Durable state goes through a
//! [`KeyValueStore`], and the queue, the mirror and the client identifier all
//! share the same handle.

use crate::error::{Error, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Key holding the serialized operation queue.
pub const QUEUE_KEY: &str = "tally.queue";
/// Key holding the serialized local mirror.
pub const MIRROR_KEY: &str = "tally.mirror";
/// Key holding the per-device client identifier.
pub const CLIENT_ID_KEY: &str = "tally.client_id";

/// A persistent key-value medium local to the device.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;
}

/// Shared storage handle.
pub type SharedStore = Arc<dyn KeyValueStore>;

/// In-memory store. Survives as long as the handle does.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new store wrapped in Arc for sharing.
    pub fn new_shared() -> SharedStore {
        Arc::new(Self::new())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| Error::Storage("memory store lock poisoned".into()))
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }
}

/// Serialize `value` under `key`, logging instead of failing.
///
/// Returns whether the write reached the store.
pub(crate) fn persist_json<T: Serialize>(store: &dyn KeyValueStore, key: &str, value: &T) -> bool {
    let json = match serde_json::to_string(value) {
        Ok(json) => json,
        Err(e) => {
            tracing::warn!(key, error = %e, "Failed to serialize state");
            return false;
        }
    };

    match store.set(key, &json) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(key, error = %e, "Failed to persist state, keeping it in memory");
            false
        }
    }
}

/// Read and parse the JSON stored under `key`.
///
/// Missing, unreadable and corrupt entries all load as `None`.
pub(crate) fn load_json<T, F>(store: &dyn KeyValueStore, key: &str, parse: F) -> Option<T>
where
    F: FnOnce(&str) -> Result<T>,
{
    match store.get(key) {
        Ok(Some(raw)) => match parse(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key, error = %e, "Discarding unreadable persisted state");
                None
            }
        },
        Ok(None) => None,
        Err(e) => {
            tracing::warn!(key, error = %e, "Failed to read persisted state");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert_eq!(store.get("a").unwrap(), None);

        store.set("a", "1").unwrap();
        assert_eq!(store.get("a").unwrap(), Some("1".to_string()));

        store.set("a", "2").unwrap();
        assert_eq!(store.get("a").unwrap(), Some("2".to_string()));

        store.remove("a").unwrap();
        assert_eq!(store.get("a").unwrap(), None);
    }

    #[test]
    fn corrupt_entry_loads_as_none() {
        let store = MemoryStore::new();
        store.set(QUEUE_KEY, "{not json").unwrap();

        let loaded: Option<Vec<u32>> = load_json(&store, QUEUE_KEY, |raw| {
            serde_json::from_str(raw).map_err(|e| Error::InvalidSnapshot(e.to_string()))
        });
        assert!(loaded.is_none());
    }

    #[test]
    fn persist_then_load() {
        let store = MemoryStore::new();
        assert!(persist_json(&store, "k", &vec![1u32, 2, 3]));

        let loaded: Option<Vec<u32>> = load_json(&store, "k", |raw| {
            serde_json::from_str(raw).map_err(|e| Error::InvalidSnapshot(e.to_string()))
        });
        assert_eq!(loaded, Some(vec![1, 2, 3]));
    }
}
