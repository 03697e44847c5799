//! tiercache - A multi-tier client-side request cache
//!
//! Provides TTL-based caching over a memory backend and two injected
//! persisted key-value backends, with per-endpoint fetch strategies,
//! in-flight request deduplication, and background revalidation.
//!
//! Cached values must be JSON-serializable; that contract belongs to the
//! caller and is not enforced beyond the serde bounds. The cache is
//! fail-open: internal storage failures degrade to misses and dropped
//! writes, never to errors at the call site.

pub mod config;
pub mod error;
pub mod request;
pub mod store;
pub mod tasks;

pub use config::CacheConfig;
pub use error::{CacheError, Result};
pub use request::{
    derive_cache_key, CachedResponse, FetchRequest, FetchResponse, Fetcher, ReqwestFetcher,
    RequestCache, Strategy, StrategyConfig, StrategyRegistry,
};
pub use store::{
    Backend, CacheItem, CacheStats, CacheStore, FileKeyValueStore, KeyValueStorage,
    MemoryKeyValueStore,
};
pub use tasks::spawn_cleanup_task;
