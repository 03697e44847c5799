//! Cache Item Module
//!
//! Defines the structure for individual cache items with TTL support.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

// == Cache Item ==
/// Represents a single cache item with value and metadata.
///
/// `size` is a best-effort estimate of the serialized byte length; it drives
/// eviction heuristics only and is never used for correctness decisions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheItem<T> {
    /// The cache key this item is stored under
    pub key: String,
    /// The stored value
    pub data: T,
    /// Creation timestamp (Unix milliseconds)
    pub timestamp: u64,
    /// Time-to-live in milliseconds
    pub ttl: u64,
    /// Estimated serialized size in bytes
    pub size: usize,
    /// Optional caller-supplied metadata (invalidation tags and the like)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, String>>,
}

impl<T> CacheItem<T> {
    // == Constructor ==
    /// Creates a new cache item stamped with the current time.
    ///
    /// # Arguments
    /// * `key` - The cache key
    /// * `data` - The value to store
    /// * `ttl_ms` - TTL in milliseconds
    /// * `size` - Estimated serialized size in bytes
    /// * `metadata` - Optional metadata map
    pub fn new(
        key: String,
        data: T,
        ttl_ms: u64,
        size: usize,
        metadata: Option<HashMap<String, String>>,
    ) -> Self {
        Self {
            key,
            data,
            timestamp: current_timestamp_ms(),
            ttl: ttl_ms,
            size,
            metadata,
        }
    }

    // == Age ==
    /// Returns the item's age in milliseconds.
    pub fn age_ms(&self) -> u64 {
        current_timestamp_ms().saturating_sub(self.timestamp)
    }

    // == Is Expired ==
    /// Checks if the item has expired.
    ///
    /// Boundary condition: an item is considered expired when its age is
    /// greater than or equal to its TTL, so an item is valid strictly while
    /// `now - timestamp < ttl`.
    pub fn is_expired(&self) -> bool {
        self.age_ms() >= self.ttl
    }

    // == Is Past Half TTL ==
    /// Checks if the item has lived through at least half of its TTL.
    ///
    /// Aggressive cleanup prefers freeing these soon-to-expire-anyway items
    /// over maintaining recency bookkeeping.
    pub fn is_past_half_ttl(&self) -> bool {
        self.age_ms().saturating_mul(2) >= self.ttl
    }

    // == Time To Live ==
    /// Returns remaining TTL in milliseconds, or 0 if the item has expired.
    pub fn ttl_remaining_ms(&self) -> u64 {
        self.ttl.saturating_sub(self.age_ms())
    }

    // == Tags ==
    /// Returns the invalidation tags recorded on this item, if any.
    ///
    /// Tags are stored in the metadata map under the `tags` key as a
    /// comma-separated list.
    pub fn tags(&self) -> Vec<String> {
        self.metadata
            .as_ref()
            .and_then(|m| m.get(TAGS_METADATA_KEY))
            .map(|joined| joined.split(',').map(|t| t.to_string()).collect())
            .unwrap_or_default()
    }
}

/// Metadata key under which invalidation tags are recorded.
pub const TAGS_METADATA_KEY: &str = "tags";

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Time went backwards")
        .as_millis() as u64
}
