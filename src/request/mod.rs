//! Request Cache Module
//!
//! Strategy-driven caching around an HTTP fetch boundary: per-endpoint
//! policies, deterministic cache keys, in-flight deduplication, and
//! background revalidation.

mod cache;
mod client;
mod key;
mod response;
mod strategy;

// Re-export public types
pub use cache::RequestCache;
pub use client::{FetchRequest, FetchResponse, Fetcher, ReqwestFetcher};
pub use key::derive_cache_key;
pub use response::{is_cacheable_status, CachedResponse, CACHEABLE_ERROR_STATUSES};
pub use strategy::{Strategy, StrategyConfig, StrategyRegistry, DEFAULT_TTL_MS};
