//! Configuration Module
//!
//! Handles loading and managing cache configuration from environment variables.

use std::env;

/// Cache configuration parameters.
///
/// All values can be configured via environment variables with sensible
/// defaults. This covers the scalar knobs only; the URL-pattern to strategy
/// table is code-level data passed to the request cache at construction.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Memory-backend byte ceiling for size-managed writes
    pub max_memory_bytes: usize,
    /// Default TTL in milliseconds for items stored without an explicit TTL
    pub default_ttl_ms: u64,
    /// Background cleanup task interval in seconds
    pub cleanup_interval_secs: u64,
}

impl CacheConfig {
    /// Creates a new CacheConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `TIERCACHE_MAX_MEMORY_BYTES` - Memory ceiling in bytes (default: 5242880)
    /// - `TIERCACHE_DEFAULT_TTL_MS` - Default TTL in milliseconds (default: 300000)
    /// - `TIERCACHE_CLEANUP_INTERVAL` - Cleanup frequency in seconds (default: 60)
    pub fn from_env() -> Self {
        Self {
            max_memory_bytes: env::var("TIERCACHE_MAX_MEMORY_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5 * 1024 * 1024),
            default_ttl_ms: env::var("TIERCACHE_DEFAULT_TTL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5 * 60 * 1000),
            cleanup_interval_secs: env::var("TIERCACHE_CLEANUP_INTERVAL")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_memory_bytes: 5 * 1024 * 1024,
            default_ttl_ms: 5 * 60 * 1000,
            cleanup_interval_secs: 60,
        }
    }
}
