//! Error types for the cache library
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for cache operations.
///
/// The cache is fail-open toward callers: storage-level failures
/// (`StorageUnavailable`, `StorageQuotaExceeded`, `MalformedEntry`) are
/// recovered inside the store and logged, never returned from the public
/// API. Only `NoCachedResponse` and an unmasked `Network` error reach the
/// caller as a rejection.
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    /// A backend's underlying storage API is missing or disabled
    #[error("Storage backend unavailable: {0}")]
    StorageUnavailable(String),

    /// Persisted write failed even after a cleanup-and-retry pass
    #[error("Storage quota exceeded: {0}")]
    StorageQuotaExceeded(String),

    /// Persisted entry could not be parsed
    #[error("Malformed cache entry: {0}")]
    MalformedEntry(String),

    /// Cache-only strategy found nothing to serve
    #[error("No cached response available: {0}")]
    NoCachedResponse(String),

    /// Underlying network fetch failed
    #[error("Network request failed: {0}")]
    Network(String),
}

impl From<reqwest::Error> for CacheError {
    fn from(err: reqwest::Error) -> Self {
        CacheError::Network(err.to_string())
    }
}

// == Result Type Alias ==
/// Convenience Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CacheError::NoCachedResponse("GET:/users".to_string());
        assert!(err.to_string().contains("No cached response"));
        assert!(err.to_string().contains("GET:/users"));
    }

    #[test]
    fn test_error_clone_preserves_message() {
        let err = CacheError::Network("connection refused".to_string());
        let cloned = err.clone();
        assert_eq!(err.to_string(), cloned.to_string());
    }
}
