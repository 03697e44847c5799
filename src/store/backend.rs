//! Storage Backend Module
//!
//! Defines the three physical cache locations and the key-value interface
//! the two persisted locations are accessed through.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CacheError, Result};

// == Backend ==
/// Physical location of a cache item.
///
/// An item lives in exactly one backend at a time; there is no promotion or
/// demotion between them. Untargeted lookups probe backends in preference
/// order: Memory, then Session, then Local.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// In-process map, fastest, lost on drop
    Memory,
    /// Session-scoped persisted store
    Session,
    /// Durable persisted store
    Local,
}

impl Backend {
    /// Untargeted lookup order.
    pub const PREFERENCE_ORDER: [Backend; 3] = [Backend::Memory, Backend::Session, Backend::Local];
}

// == Key-Value Storage ==
/// Synchronous key-value interface for the session and local backends.
///
/// Mirrors browser storage semantics: string keys and values, a `set` that
/// may fail when a quota is hit, and full key enumeration. Calls must not
/// block for long; the store never holds an implementation across an await
/// point.
pub trait KeyValueStorage: Send + Sync {
    /// A short name for log fields.
    fn name(&self) -> &'static str;

    /// Returns the stored string, or None if absent.
    fn get(&self, key: &str) -> Option<String>;

    /// Stores a string value.
    ///
    /// Fails with `StorageQuotaExceeded` when the store cannot accept the
    /// write, or `StorageUnavailable` when the underlying medium is broken.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Removes a key. Missing keys are ignored.
    fn remove(&self, key: &str);

    /// Enumerates all stored keys.
    fn keys(&self) -> Vec<String>;
}

// == Memory Key-Value Store ==
/// In-memory key-value store with an optional byte quota.
///
/// Stands in for session-scoped browser storage outside a browser, and gives
/// tests a deterministic way to provoke quota failures.
pub struct MemoryKeyValueStore {
    name: &'static str,
    entries: Mutex<HashMap<String, String>>,
    max_bytes: Option<usize>,
}

impl MemoryKeyValueStore {
    /// Creates an unbounded store.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: Mutex::new(HashMap::new()),
            max_bytes: None,
        }
    }

    /// Creates a store that rejects writes once `max_bytes` of key and value
    /// data would be held.
    pub fn with_quota(name: &'static str, max_bytes: usize) -> Self {
        Self {
            name,
            entries: Mutex::new(HashMap::new()),
            max_bytes: Some(max_bytes),
        }
    }

    fn used_bytes(entries: &HashMap<String, String>) -> usize {
        entries.iter().map(|(k, v)| k.len() + v.len()).sum()
    }
}

impl KeyValueStorage for MemoryKeyValueStore {
    fn name(&self) -> &'static str {
        self.name
    }

    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().unwrap().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap();
        if let Some(max) = self.max_bytes {
            let existing = entries.get(key).map(|v| key.len() + v.len()).unwrap_or(0);
            let projected = Self::used_bytes(&entries) - existing + key.len() + value.len();
            if projected > max {
                return Err(CacheError::StorageQuotaExceeded(format!(
                    "{}: {} of {} bytes in use, write of {} bytes rejected",
                    self.name,
                    Self::used_bytes(&entries),
                    max,
                    key.len() + value.len()
                )));
            }
        }
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) {
        self.entries.lock().unwrap().remove(key);
    }

    fn keys(&self) -> Vec<String> {
        self.entries.lock().unwrap().keys().cloned().collect()
    }
}

// == File Key-Value Store ==
/// Durable key-value store keeping one JSON file per key under a directory.
///
/// Cache keys contain characters that are not filesystem-safe, so each file
/// is named by a hex encoding of the key and carries the original key in its
/// body for enumeration.
pub struct FileKeyValueStore {
    dir: PathBuf,
}

#[derive(Serialize, Deserialize)]
struct FileEntry {
    key: String,
    value: String,
}

impl FileKeyValueStore {
    /// Creates the store, creating `dir` if needed.
    pub fn new(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir)
            .map_err(|e| CacheError::StorageUnavailable(format!("{}: {}", dir.display(), e)))?;
        Ok(Self { dir })
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", hex::encode(key)))
    }
}

impl KeyValueStorage for FileKeyValueStore {
    fn name(&self) -> &'static str {
        "file"
    }

    fn get(&self, key: &str) -> Option<String> {
        let contents = fs::read_to_string(self.entry_path(key)).ok()?;
        let entry: FileEntry = serde_json::from_str(&contents).ok()?;
        Some(entry.value)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let entry = FileEntry {
            key: key.to_string(),
            value: value.to_string(),
        };
        let contents = serde_json::to_string(&entry)
            .map_err(|e| CacheError::StorageUnavailable(e.to_string()))?;
        fs::write(self.entry_path(key), contents)
            .map_err(|e| CacheError::StorageUnavailable(format!("{}: {}", self.dir.display(), e)))
    }

    fn remove(&self, key: &str) {
        let path = self.entry_path(key);
        if let Err(e) = fs::remove_file(&path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                debug!(path = %path.display(), error = %e, "Failed to remove cache file");
            }
        }
    }

    fn keys(&self) -> Vec<String> {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        entries
            .flatten()
            .filter_map(|dir_entry| {
                let contents = fs::read_to_string(dir_entry.path()).ok()?;
                let entry: FileEntry = serde_json::from_str(&contents).ok()?;
                Some(entry.key)
            })
            .collect()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_kv_set_and_get() {
        let store = MemoryKeyValueStore::new("session");

        store.set("key1", "value1").unwrap();
        assert_eq!(store.get("key1"), Some("value1".to_string()));
        assert_eq!(store.get("missing"), None);
    }

    #[test]
    fn test_memory_kv_remove() {
        let store = MemoryKeyValueStore::new("session");

        store.set("key1", "value1").unwrap();
        store.remove("key1");
        assert_eq!(store.get("key1"), None);

        // Removing a missing key is a no-op
        store.remove("key1");
    }

    #[test]
    fn test_memory_kv_keys() {
        let store = MemoryKeyValueStore::new("session");

        store.set("a", "1").unwrap();
        store.set("b", "2").unwrap();

        let mut keys = store.keys();
        keys.sort();
        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_memory_kv_quota_rejects_write() {
        let store = MemoryKeyValueStore::with_quota("session", 10);

        store.set("k", "12345").unwrap();
        let result = store.set("k2", "1234567890");
        assert!(matches!(result, Err(CacheError::StorageQuotaExceeded(_))));

        // The first entry is untouched
        assert_eq!(store.get("k"), Some("12345".to_string()));
    }

    #[test]
    fn test_memory_kv_quota_allows_overwrite() {
        let store = MemoryKeyValueStore::with_quota("session", 10);

        store.set("key", "123456").unwrap();
        // Overwrite frees the old value before accounting the new one
        store.set("key", "654321").unwrap();
        assert_eq!(store.get("key"), Some("654321".to_string()));
    }

    #[test]
    fn test_file_kv_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileKeyValueStore::new(dir.path().to_path_buf()).unwrap();

        store.set("cache:GET:https://api.example.com/users", "payload").unwrap();
        assert_eq!(
            store.get("cache:GET:https://api.example.com/users"),
            Some("payload".to_string())
        );
    }

    #[test]
    fn test_file_kv_remove_and_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileKeyValueStore::new(dir.path().to_path_buf()).unwrap();

        store.set("a", "1").unwrap();
        store.set("b", "2").unwrap();

        let mut keys = store.keys();
        keys.sort();
        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);

        store.remove("a");
        assert_eq!(store.get("a"), None);
        assert_eq!(store.keys(), vec!["b".to_string()]);
    }

    #[test]
    fn test_file_kv_key_with_unsafe_characters() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileKeyValueStore::new(dir.path().to_path_buf()).unwrap();

        let key = "GET:https://example.com/a/b?q=1&r=2";
        store.set(key, "v").unwrap();
        assert_eq!(store.get(key), Some("v".to_string()));
    }
}
