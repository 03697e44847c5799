//! Cache Store Module
//!
//! Tiered cache engine combining an in-memory map with two injected
//! persisted key-value backends, with TTL expiration and size-aware
//! eviction.
//!
//! Every public operation is fail-open: storage and parse failures are
//! recovered and logged here, never surfaced to callers.

use std::collections::HashMap;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::CacheConfig;
use crate::error::CacheError;
use crate::store::{
    Backend, CacheItem, CacheStats, KeyValueStorage, WriteOrderTracker, CACHE_KEY_PREFIX,
};

// == Lookup Outcome ==
/// Result of probing a single backend for a key.
enum Lookup {
    /// A valid (non-expired) value was found
    Valid(Value),
    /// An expired item was found and removed
    Expired,
    /// Nothing usable in this backend
    Miss,
}

// == Cache Store ==
/// Tiered cache storage with TTL expiration and size-aware eviction.
///
/// Values must be JSON-serializable; that contract is the caller's to keep
/// and is not enforced at the type level beyond the serde bounds.
pub struct CacheStore {
    /// Memory-backend items, keyed by cache key
    memory: HashMap<String, CacheItem<Value>>,
    /// Write-order tracker backing oldest-first eviction
    write_order: WriteOrderTracker,
    /// Running byte total of memory-backend items
    memory_bytes: usize,
    /// Session-scoped persisted store, None when unavailable
    session: Option<Box<dyn KeyValueStorage>>,
    /// Durable persisted store, None when unavailable
    local: Option<Box<dyn KeyValueStorage>>,
    /// Performance statistics
    stats: CacheStats,
    /// Memory-backend byte ceiling for size-managed writes
    max_memory_bytes: usize,
    /// Default TTL in milliseconds for items without explicit TTL
    default_ttl_ms: u64,
}

impl CacheStore {
    // == Constructor ==
    /// Creates a new CacheStore with only the memory backend configured.
    ///
    /// # Arguments
    /// * `max_memory_bytes` - Byte ceiling enforced by size-managed writes
    /// * `default_ttl_ms` - Default TTL for items stored without explicit TTL
    pub fn new(max_memory_bytes: usize, default_ttl_ms: u64) -> Self {
        Self {
            memory: HashMap::new(),
            write_order: WriteOrderTracker::new(),
            memory_bytes: 0,
            session: None,
            local: None,
            stats: CacheStats::new(),
            max_memory_bytes,
            default_ttl_ms,
        }
    }

    /// Creates a new CacheStore from configuration.
    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.max_memory_bytes, config.default_ttl_ms)
    }

    /// Attaches the session-scoped persisted store.
    pub fn with_session_store(mut self, store: Box<dyn KeyValueStorage>) -> Self {
        self.session = Some(store);
        self
    }

    /// Attaches the durable persisted store.
    pub fn with_local_store(mut self, store: Box<dyn KeyValueStorage>) -> Self {
        self.local = Some(store);
        self
    }

    // == Set ==
    /// Stores a value in the chosen backend.
    ///
    /// For persisted backends, a quota failure triggers one aggressive
    /// cleanup pass and a single retry; a second failure drops the write
    /// with a warning. Never returns an error to the caller.
    ///
    /// # Arguments
    /// * `key` - The cache key
    /// * `data` - The value to store
    /// * `ttl_ms` - Optional TTL in milliseconds (uses the default if None)
    /// * `backend` - Which backend the item lives in
    /// * `metadata` - Optional metadata (invalidation tags and the like)
    pub fn set<T: Serialize>(
        &mut self,
        key: &str,
        data: &T,
        ttl_ms: Option<u64>,
        backend: Backend,
        metadata: Option<HashMap<String, String>>,
    ) {
        let value = match serde_json::to_value(data) {
            Ok(v) => v,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to serialize value, dropping cache write");
                return;
            }
        };
        let size = estimate_size(&value);
        let ttl = ttl_ms.unwrap_or(self.default_ttl_ms);
        let item = CacheItem::new(key.to_string(), value, ttl, size, metadata);

        match backend {
            Backend::Memory => self.insert_memory(item),
            Backend::Session | Backend::Local => self.write_persisted(backend, item),
        }
    }

    // == Get ==
    /// Retrieves a value by key.
    ///
    /// If `backend` is omitted, probes memory, then session, then local,
    /// returning the first valid item found; expired items discovered along
    /// the way are deleted as a side effect. Returns `None` on a full miss.
    /// Every call counts a hit or a miss.
    pub fn get<T: DeserializeOwned>(&mut self, key: &str, backend: Option<Backend>) -> Option<T> {
        let probes: Vec<Backend> = backend
            .map(|b| vec![b])
            .unwrap_or_else(|| Backend::PREFERENCE_ORDER.to_vec());

        for probe in probes {
            if let Lookup::Valid(value) = self.lookup(key, probe) {
                match serde_json::from_value::<T>(value) {
                    Ok(data) => {
                        self.stats.record_hit();
                        debug!(key = %key, backend = ?probe, "Cache hit");
                        return Some(data);
                    }
                    Err(e) => {
                        // Stored shape no longer matches the requested type
                        warn!(key = %key, backend = ?probe, error = %e, "Malformed cache entry removed");
                        self.delete_from(key, probe);
                    }
                }
            }
        }

        self.stats.record_miss();
        debug!(key = %key, backend = ?backend, "Cache miss");
        None
    }

    // == Has ==
    /// Expiry-aware existence check, equivalent to `get(key).is_some()`.
    pub fn has(&mut self, key: &str) -> bool {
        self.get::<Value>(key, None).is_some()
    }

    // == Delete ==
    /// Removes the key from all three backends. Idempotent.
    pub fn delete(&mut self, key: &str) {
        self.remove_memory(key);
        let storage_key = prefixed(key);
        if let Some(kv) = self.session.as_deref() {
            kv.remove(&storage_key);
        }
        if let Some(kv) = self.local.as_deref() {
            kv.remove(&storage_key);
        }
        debug!(key = %key, "Cache delete");
    }

    // == Clear ==
    /// Wipes one backend, or all of them when `backend` is omitted.
    ///
    /// Persisted stores may be shared with unrelated data, so only
    /// cache-prefixed keys are touched.
    pub fn clear(&mut self, backend: Option<Backend>) {
        let targets: Vec<Backend> = backend
            .map(|b| vec![b])
            .unwrap_or_else(|| Backend::PREFERENCE_ORDER.to_vec());

        for target in targets {
            match target {
                Backend::Memory => {
                    self.memory.clear();
                    self.write_order.clear();
                    self.memory_bytes = 0;
                }
                Backend::Session | Backend::Local => {
                    if let Some(kv) = self.persisted(target) {
                        for key in kv.keys() {
                            if key.starts_with(CACHE_KEY_PREFIX) {
                                kv.remove(&key);
                            }
                        }
                    }
                }
            }
        }
        debug!(backend = ?backend, "Cache cleared");
    }

    // == Cleanup ==
    /// Sweeps expired items from all backends.
    ///
    /// When `aggressive` is true, additionally evicts items past half their
    /// TTL, preferring to free soon-to-expire-anyway items over recency
    /// bookkeeping. Returns the number of items removed.
    pub fn cleanup(&mut self, aggressive: bool) -> usize {
        let mut removed = 0;

        // Memory sweep
        let doomed: Vec<(String, bool)> = self
            .memory
            .iter()
            .filter(|(_, item)| item.is_expired() || (aggressive && item.is_past_half_ttl()))
            .map(|(key, item)| (key.clone(), item.is_expired()))
            .collect();
        for (key, was_expired) in doomed {
            self.remove_memory(&key);
            if !was_expired {
                self.stats.record_eviction();
            }
            removed += 1;
        }

        // Persisted sweep, best-effort
        for backend in [Backend::Session, Backend::Local] {
            let mut removed_here = 0;
            let mut evicted_here = 0;
            if let Some(kv) = self.persisted(backend) {
                for storage_key in kv.keys() {
                    if !storage_key.starts_with(CACHE_KEY_PREFIX) {
                        continue;
                    }
                    let Some(raw) = kv.get(&storage_key) else {
                        continue;
                    };
                    match serde_json::from_str::<CacheItem<Value>>(&raw) {
                        Ok(item) => {
                            if item.is_expired() || (aggressive && item.is_past_half_ttl()) {
                                if !item.is_expired() {
                                    evicted_here += 1;
                                }
                                kv.remove(&storage_key);
                                removed_here += 1;
                            }
                        }
                        Err(e) => {
                            warn!(key = %storage_key, backend = ?backend, error = %e, "Malformed cache entry removed during cleanup");
                            kv.remove(&storage_key);
                            removed_here += 1;
                        }
                    }
                }
            }
            self.stats.evictions += evicted_here;
            removed += removed_here;
        }

        self.stats.record_cleanup();
        if removed > 0 {
            debug!(removed, aggressive, "Cache cleanup removed items");
        }
        removed
    }

    // == Set With Memory Management ==
    /// Stores a value in the memory backend, evicting least-recently-written
    /// items first until the configured byte ceiling can accommodate it.
    ///
    /// After this call returns, memory usage never exceeds the ceiling. An
    /// item larger than the ceiling itself is dropped.
    pub fn set_with_memory_management<T: Serialize>(
        &mut self,
        key: &str,
        data: &T,
        ttl_ms: Option<u64>,
    ) {
        let value = match serde_json::to_value(data) {
            Ok(v) => v,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to serialize value, dropping cache write");
                return;
            }
        };
        let size = estimate_size(&value);

        if size > self.max_memory_bytes {
            warn!(
                key = %key,
                size,
                ceiling = self.max_memory_bytes,
                "Item larger than memory ceiling, dropping cache write"
            );
            return;
        }

        // Replacing an existing item frees its bytes before accounting
        self.remove_memory(key);

        while self.memory_bytes + size > self.max_memory_bytes {
            match self.write_order.evict_oldest() {
                Some(oldest) => {
                    debug!(key = %oldest, "Evicting oldest item under memory pressure");
                    if let Some(old) = self.memory.remove(&oldest) {
                        self.memory_bytes = self.memory_bytes.saturating_sub(old.size);
                    }
                    self.stats.record_eviction();
                }
                None => break,
            }
        }

        let ttl = ttl_ms.unwrap_or(self.default_ttl_ms);
        let item = CacheItem::new(key.to_string(), value, ttl, size, None);
        self.insert_memory(item);
    }

    // == Delete By Tags ==
    /// Removes every item, in any backend, carrying at least one of the
    /// given invalidation tags. Returns the number of items removed.
    pub fn delete_by_tags(&mut self, tags: &[String]) -> usize {
        let mut removed = 0;

        let doomed: Vec<String> = self
            .memory
            .values()
            .filter(|item| item.tags().iter().any(|t| tags.contains(t)))
            .map(|item| item.key.clone())
            .collect();
        for key in doomed {
            self.remove_memory(&key);
            removed += 1;
        }

        for backend in [Backend::Session, Backend::Local] {
            let mut removed_here = 0;
            if let Some(kv) = self.persisted(backend) {
                for storage_key in kv.keys() {
                    if !storage_key.starts_with(CACHE_KEY_PREFIX) {
                        continue;
                    }
                    let Some(raw) = kv.get(&storage_key) else {
                        continue;
                    };
                    if let Ok(item) = serde_json::from_str::<CacheItem<Value>>(&raw) {
                        if item.tags().iter().any(|t| tags.contains(t)) {
                            kv.remove(&storage_key);
                            removed_here += 1;
                        }
                    }
                }
            }
            removed += removed_here;
        }

        debug!(tags = ?tags, removed, "Deleted cache items by tag");
        removed
    }

    // == Stats ==
    /// Returns current cache statistics with totals recomputed from the
    /// live store contents.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        let (items, size) = self.totals();
        stats.set_totals(items, size);
        stats
    }

    // == Memory Usage ==
    /// Returns the current byte total of memory-backend items.
    pub fn memory_usage(&self) -> usize {
        self.memory_bytes
    }

    /// Returns the current number of memory-backend items.
    pub fn memory_len(&self) -> usize {
        self.memory.len()
    }

    // == Internal Helpers ==

    fn persisted(&self, backend: Backend) -> Option<&dyn KeyValueStorage> {
        match backend {
            Backend::Memory => None,
            Backend::Session => self.session.as_deref(),
            Backend::Local => self.local.as_deref(),
        }
    }

    fn insert_memory(&mut self, item: CacheItem<Value>) {
        debug!(
            key = %item.key,
            backend = ?Backend::Memory,
            size = item.size,
            ttl_ms = item.ttl,
            "Cache set"
        );
        let key = item.key.clone();
        let size = item.size;
        if let Some(old) = self.memory.insert(key.clone(), item) {
            self.memory_bytes = self.memory_bytes.saturating_sub(old.size);
        }
        self.memory_bytes += size;
        self.write_order.record_write(&key);
    }

    fn write_persisted(&mut self, backend: Backend, item: CacheItem<Value>) {
        let serialized = match serde_json::to_string(&item) {
            Ok(s) => s,
            Err(e) => {
                warn!(key = %item.key, error = %e, "Failed to serialize cache item, dropping write");
                return;
            }
        };
        let storage_key = prefixed(&item.key);

        let first = match self.persisted(backend) {
            Some(kv) => kv.set(&storage_key, &serialized),
            None => {
                debug!(key = %item.key, backend = ?backend, "Backend not configured, dropping cache write");
                return;
            }
        };

        match first {
            Ok(()) => {
                debug!(key = %item.key, backend = ?backend, size = item.size, ttl_ms = item.ttl, "Cache set");
            }
            Err(CacheError::StorageQuotaExceeded(msg)) => {
                debug!(key = %item.key, backend = ?backend, reason = %msg, "Quota hit, running aggressive cleanup and retrying");
                self.cleanup(true);
                let retry = self
                    .persisted(backend)
                    .map(|kv| kv.set(&storage_key, &serialized));
                match retry {
                    Some(Ok(())) => {
                        debug!(key = %item.key, backend = ?backend, size = item.size, "Cache set after quota retry");
                    }
                    Some(Err(e)) => {
                        warn!(key = %item.key, backend = ?backend, error = %e, "Cache write dropped after quota retry");
                    }
                    None => {}
                }
            }
            Err(e) => {
                debug!(key = %item.key, backend = ?backend, error = %e, "Backend unavailable, dropping cache write");
            }
        }
    }

    fn lookup(&mut self, key: &str, backend: Backend) -> Lookup {
        match backend {
            Backend::Memory => {
                match self.memory.get(key) {
                    Some(item) if item.is_expired() => {}
                    Some(item) => return Lookup::Valid(item.data.clone()),
                    None => return Lookup::Miss,
                }
                // Only an expired item falls through to here
                debug!(key = %key, backend = ?backend, "Expired item removed during lookup");
                self.remove_memory(key);
                Lookup::Expired
            }
            Backend::Session | Backend::Local => {
                let storage_key = prefixed(key);
                let Some(kv) = self.persisted(backend) else {
                    return Lookup::Miss;
                };
                let Some(raw) = kv.get(&storage_key) else {
                    return Lookup::Miss;
                };
                match serde_json::from_str::<CacheItem<Value>>(&raw) {
                    Ok(item) if item.is_expired() => {
                        debug!(key = %key, backend = ?backend, "Expired item removed during lookup");
                        kv.remove(&storage_key);
                        Lookup::Expired
                    }
                    Ok(item) => Lookup::Valid(item.data),
                    Err(e) => {
                        warn!(key = %key, backend = ?backend, error = %e, "Malformed cache entry removed");
                        kv.remove(&storage_key);
                        Lookup::Miss
                    }
                }
            }
        }
    }

    fn remove_memory(&mut self, key: &str) {
        if let Some(old) = self.memory.remove(key) {
            self.memory_bytes = self.memory_bytes.saturating_sub(old.size);
            self.write_order.remove(key);
        }
    }

    fn delete_from(&mut self, key: &str, backend: Backend) {
        match backend {
            Backend::Memory => self.remove_memory(key),
            Backend::Session | Backend::Local => {
                if let Some(kv) = self.persisted(backend) {
                    kv.remove(&prefixed(key));
                }
            }
        }
    }

    fn totals(&self) -> (usize, usize) {
        let mut items = self.memory.len();
        let mut size = self.memory_bytes;
        for backend in [Backend::Session, Backend::Local] {
            if let Some(kv) = self.persisted(backend) {
                for key in kv.keys() {
                    if !key.starts_with(CACHE_KEY_PREFIX) {
                        continue;
                    }
                    let Some(raw) = kv.get(&key) else {
                        continue;
                    };
                    if let Ok(item) = serde_json::from_str::<CacheItem<Value>>(&raw) {
                        items += 1;
                        size += item.size;
                    }
                }
            }
        }
        (items, size)
    }
}

/// Applies the cache key prefix used in persisted stores.
fn prefixed(key: &str) -> String {
    format!("{}{}", CACHE_KEY_PREFIX, key)
}

/// Estimates the serialized byte length of a value.
fn estimate_size(value: &Value) -> usize {
    value.to_string().len()
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryKeyValueStore;
    use serde::Deserialize;
    use std::thread::sleep;
    use std::time::Duration;

    fn store_with_all_backends() -> CacheStore {
        CacheStore::new(1024 * 1024, 300_000)
            .with_session_store(Box::new(MemoryKeyValueStore::new("session")))
            .with_local_store(Box::new(MemoryKeyValueStore::new("local")))
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct User {
        id: u64,
        name: String,
    }

    #[test]
    fn test_set_and_get_memory() {
        let mut store = store_with_all_backends();

        store.set("key1", &"value1", None, Backend::Memory, None);
        let value: Option<String> = store.get("key1", None);

        assert_eq!(value, Some("value1".to_string()));
        assert_eq!(store.memory_len(), 1);
    }

    #[test]
    fn test_typed_roundtrip_local() {
        let mut store = store_with_all_backends();
        let user = User {
            id: 42,
            name: "alice".to_string(),
        };

        store.set("user:42", &user, None, Backend::Local, None);
        let loaded: Option<User> = store.get("user:42", Some(Backend::Local));

        assert_eq!(loaded, Some(user));
    }

    #[test]
    fn test_get_nonexistent() {
        let mut store = store_with_all_backends();

        let value: Option<String> = store.get("missing", None);
        assert_eq!(value, None);
        assert_eq!(store.stats().misses, 1);
    }

    #[test]
    fn test_ttl_expiration() {
        let mut store = store_with_all_backends();

        store.set("short", &"value", Some(40), Backend::Memory, None);
        assert!(store.get::<String>("short", None).is_some());

        sleep(Duration::from_millis(80));

        assert!(store.get::<String>("short", None).is_none());
        // The expired item was removed as a side effect of the lookup
        assert_eq!(store.memory_len(), 0);
    }

    #[test]
    fn test_preference_order_memory_wins() {
        let mut store = store_with_all_backends();

        store.set("key", &"from_session", None, Backend::Session, None);
        store.set("key", &"from_memory", None, Backend::Memory, None);

        let value: Option<String> = store.get("key", None);
        assert_eq!(value, Some("from_memory".to_string()));
    }

    #[test]
    fn test_fallthrough_to_persisted() {
        let mut store = store_with_all_backends();

        store.set("session_key", &"s", None, Backend::Session, None);
        store.set("local_key", &"l", None, Backend::Local, None);

        assert_eq!(store.get::<String>("session_key", None), Some("s".to_string()));
        assert_eq!(store.get::<String>("local_key", None), Some("l".to_string()));
    }

    #[test]
    fn test_expired_persisted_removed_during_search() {
        let mut store = store_with_all_backends();

        store.set("key", &"stale", Some(40), Backend::Session, None);
        sleep(Duration::from_millis(80));

        // The untargeted lookup passes through session, removing the
        // expired item before reporting a miss
        assert!(store.get::<String>("key", None).is_none());
        assert!(store.get::<String>("key", Some(Backend::Session)).is_none());
    }

    #[test]
    fn test_has_is_expiry_aware() {
        let mut store = store_with_all_backends();

        store.set("key", &1u32, Some(40), Backend::Memory, None);
        assert!(store.has("key"));

        sleep(Duration::from_millis(80));
        assert!(!store.has("key"));
    }

    #[test]
    fn test_delete_removes_from_all_backends() {
        let mut store = store_with_all_backends();

        store.set("key", &"m", None, Backend::Memory, None);
        store.set("key", &"s", None, Backend::Session, None);
        store.set("key", &"l", None, Backend::Local, None);

        store.delete("key");

        assert!(store.get::<String>("key", None).is_none());
        assert!(store.get::<String>("key", Some(Backend::Session)).is_none());
        assert!(store.get::<String>("key", Some(Backend::Local)).is_none());

        // Idempotent
        store.delete("key");
    }

    #[test]
    fn test_clear_backend_isolation() {
        let mut store = store_with_all_backends();

        store.set("m", &1u32, None, Backend::Memory, None);
        store.set("s", &2u32, None, Backend::Session, None);
        store.set("l", &3u32, None, Backend::Local, None);

        store.clear(Some(Backend::Memory));

        assert!(store.get::<u32>("m", None).is_none());
        assert_eq!(store.get::<u32>("s", None), Some(2));
        assert_eq!(store.get::<u32>("l", None), Some(3));
    }

    #[test]
    fn test_clear_leaves_foreign_keys_alone() {
        let session = MemoryKeyValueStore::new("session");
        session.set("app:settings", "keep me").unwrap();

        let mut store = CacheStore::new(1024, 300_000).with_session_store(Box::new(session));
        store.set("cached", &"v", None, Backend::Session, None);

        store.clear(Some(Backend::Session));

        // The cached entry is gone but the unrelated key survives
        assert!(store.get::<String>("cached", Some(Backend::Session)).is_none());
        let kv = store.persisted(Backend::Session).unwrap();
        assert_eq!(kv.get("app:settings"), Some("keep me".to_string()));
    }

    #[test]
    fn test_cleanup_removes_expired_everywhere() {
        let mut store = store_with_all_backends();

        store.set("m", &"v", Some(40), Backend::Memory, None);
        store.set("s", &"v", Some(40), Backend::Session, None);
        store.set("keep", &"v", Some(60_000), Backend::Memory, None);

        sleep(Duration::from_millis(80));

        let removed = store.cleanup(false);
        assert_eq!(removed, 2);
        assert_eq!(store.get::<String>("keep", None), Some("v".to_string()));
        assert!(store.stats().last_cleanup_time.is_some());
    }

    #[test]
    fn test_cleanup_aggressive_evicts_past_half_ttl() {
        let mut store = store_with_all_backends();

        store.set("old", &"v", Some(100), Backend::Memory, None);
        store.set("fresh", &"v", Some(60_000), Backend::Memory, None);

        // Past half of the 100ms TTL but not yet expired
        sleep(Duration::from_millis(60));

        let removed = store.cleanup(true);
        assert_eq!(removed, 1);
        assert!(store.get::<String>("old", None).is_none());
        assert_eq!(store.get::<String>("fresh", None), Some("v".to_string()));
        assert_eq!(store.stats().evictions, 1);
    }

    #[test]
    fn test_quota_exhausted_write_dropped_silently() {
        let mut store = CacheStore::new(1024, 300_000)
            .with_session_store(Box::new(MemoryKeyValueStore::with_quota("session", 8)));

        // Far larger than the 8-byte quota; both the write and the retry fail
        store.set("key", &"a long value that cannot fit", None, Backend::Session, None);

        assert!(store.get::<String>("key", Some(Backend::Session)).is_none());
    }

    #[test]
    fn test_quota_retry_succeeds_after_cleanup() {
        let payload = "x".repeat(200);
        let mut store = CacheStore::new(1024 * 1024, 300_000)
            .with_session_store(Box::new(MemoryKeyValueStore::with_quota("session", 400)));

        // Fill the quota with an item that expires almost immediately
        store.set("stale", &payload, Some(30), Backend::Session, None);
        sleep(Duration::from_millis(60));

        // First write attempt hits the quota; the aggressive cleanup pass
        // frees the expired item and the retry lands
        store.set("fresh", &payload, Some(60_000), Backend::Session, None);

        assert_eq!(
            store.get::<String>("fresh", Some(Backend::Session)),
            Some(payload)
        );
        assert!(store.get::<String>("stale", Some(Backend::Session)).is_none());
    }

    #[test]
    fn test_malformed_persisted_entry_removed() {
        let session = MemoryKeyValueStore::new("session");
        session
            .set(&format!("{}broken", CACHE_KEY_PREFIX), "{not json")
            .unwrap();

        let mut store = CacheStore::new(1024, 300_000).with_session_store(Box::new(session));

        assert!(store.get::<String>("broken", Some(Backend::Session)).is_none());

        // The malformed entry was removed from the underlying store
        let kv = store.persisted(Backend::Session).unwrap();
        assert_eq!(kv.get(&format!("{}broken", CACHE_KEY_PREFIX)), None);
    }

    #[test]
    fn test_unconfigured_backend_is_permanent_miss() {
        let mut store = CacheStore::new(1024, 300_000);

        // No session store attached: the write is dropped, the read misses,
        // and nothing panics or errors
        store.set("key", &"v", None, Backend::Session, None);
        assert!(store.get::<String>("key", Some(Backend::Session)).is_none());
    }

    #[test]
    fn test_memory_management_respects_ceiling() {
        // Each "x".repeat(40) serializes to 42 bytes with quotes
        let mut store = CacheStore::new(100, 300_000);

        store.set_with_memory_management("a", &"x".repeat(40), None);
        store.set_with_memory_management("b", &"x".repeat(40), None);
        assert_eq!(store.memory_len(), 2);

        // A third item cannot fit; the oldest write is evicted first
        store.set_with_memory_management("c", &"x".repeat(40), None);

        assert!(store.memory_usage() <= 100);
        assert!(store.get::<String>("a", None).is_none());
        assert!(store.get::<String>("b", None).is_some());
        assert!(store.get::<String>("c", None).is_some());
        assert_eq!(store.stats().evictions, 1);
    }

    #[test]
    fn test_memory_management_oversized_item_dropped() {
        let mut store = CacheStore::new(20, 300_000);

        store.set_with_memory_management("big", &"x".repeat(64), None);

        assert_eq!(store.memory_len(), 0);
        assert_eq!(store.memory_usage(), 0);
    }

    #[test]
    fn test_memory_management_overwrite_frees_old_bytes() {
        let mut store = CacheStore::new(100, 300_000);

        store.set_with_memory_management("key", &"x".repeat(40), None);
        store.set_with_memory_management("key", &"y".repeat(40), None);

        assert_eq!(store.memory_len(), 1);
        assert_eq!(store.memory_usage(), 42);
        assert_eq!(store.get::<String>("key", None), Some("y".repeat(40)));
    }

    #[test]
    fn test_stats_counters() {
        let mut store = store_with_all_backends();

        store.set("key1", &"value1", None, Backend::Memory, None);
        let _: Option<String> = store.get("key1", None); // hit
        let _: Option<String> = store.get("nope", None); // miss

        let stats = store.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.total_items, 1);
        assert!(stats.total_size > 0);
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_delete_by_tags_across_backends() {
        let mut store = store_with_all_backends();
        let tagged = HashMap::from([("tags".to_string(), "users,admin".to_string())]);

        store.set("m", &"v", None, Backend::Memory, Some(tagged.clone()));
        store.set("s", &"v", None, Backend::Session, Some(tagged));
        store.set("plain", &"v", None, Backend::Memory, None);

        let removed = store.delete_by_tags(&["users".to_string()]);

        assert_eq!(removed, 2);
        assert!(store.get::<String>("m", None).is_none());
        assert!(store.get::<String>("s", None).is_none());
        assert_eq!(store.get::<String>("plain", None), Some("v".to_string()));
    }
}
