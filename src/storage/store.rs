//! In-Memory Key-Value Store
//!
//! Thread-safe string map shared by replication nodes and shard nodes.

use hashbrown::HashMap;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Thread-safe in-memory key-value store
///
/// Readers share the lock; a write excludes everyone. The guard is never
/// held across an `.await`.
#[derive(Debug, Clone)]
pub struct Store {
    inner: Arc<RwLock<HashMap<String, String>>>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    /// Create a new empty store
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Get value by key, returns None if the key is absent
    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.read().get(key).cloned()
    }

    /// Set key-value pair, returning the previous value
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.inner.write().insert(key.into(), value.into())
    }

    /// Check if key exists
    pub fn exists(&self, key: &str) -> bool {
        self.inner.read().contains_key(key)
    }

    /// Get the number of keys
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Check if store is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the whole map, ordered by key
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.inner
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Get all keys (for debugging/testing)
    pub fn keys(&self) -> Vec<String> {
        self.inner.read().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_basic_operations() {
        let store = Store::new();

        assert_eq!(store.set("key", "value"), None);
        assert_eq!(store.get("key"), Some("value".to_string()));
        assert!(store.exists("key"));

        // Overwrite returns the old value
        assert_eq!(store.set("key", "newer"), Some("value".to_string()));
        assert_eq!(store.get("key"), Some("newer".to_string()));

        assert_eq!(store.get("missing"), None);
        assert!(!store.exists("missing"));
    }

    #[test]
    fn test_snapshot_is_ordered_copy() {
        let store = Store::new();
        store.set("b", "2");
        store.set("a", "1");

        let snap = store.snapshot();
        assert_eq!(snap.keys().collect::<Vec<_>>(), vec!["a", "b"]);

        // Later writes don't leak into an earlier snapshot
        store.set("c", "3");
        assert_eq!(snap.len(), 2);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_concurrent_access() {
        let store = Store::new();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let s = store.clone();
                thread::spawn(move || {
                    for j in 0..50 {
                        let key = format!("key-{}-{}", i, j);
                        s.set(key.clone(), format!("value-{}-{}", i, j));
                        assert!(s.exists(&key));
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(store.len(), 400);
        assert_eq!(store.keys().len(), 400);
    }
}
