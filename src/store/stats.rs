//! Cache Statistics Module
//!
//! Tracks cache performance metrics including hits, misses, and evictions.

use chrono::{DateTime, Utc};
use serde::Serialize;

// == Cache Stats ==
/// Tracks cache performance metrics.
///
/// Counters accumulate as operations run; totals and rates are recomputed on
/// demand from current store contents rather than persisted anywhere.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    /// Number of successful cache retrievals
    pub hits: u64,
    /// Number of failed cache retrievals (key not found or expired)
    pub misses: u64,
    /// Number of items evicted under memory pressure or aggressive cleanup
    pub evictions: u64,
    /// Current number of items across all backends
    pub total_items: usize,
    /// Estimated total size of all items in bytes
    pub total_size: usize,
    /// When the last cleanup sweep finished, if one has run
    pub last_cleanup_time: Option<DateTime<Utc>>,
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no lookups have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    // == Miss Rate ==
    /// Calculates the cache miss rate.
    ///
    /// Returns misses / (hits + misses), or 0.0 if no lookups have been made.
    pub fn miss_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.misses as f64 / total as f64
        }
    }

    // == Record Hit ==
    /// Increments the hit counter.
    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    // == Record Miss ==
    /// Increments the miss counter.
    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    // == Record Eviction ==
    /// Increments the eviction counter.
    pub fn record_eviction(&mut self) {
        self.evictions += 1;
    }

    // == Record Cleanup ==
    /// Stamps the completion of a cleanup sweep.
    pub fn record_cleanup(&mut self) {
        self.last_cleanup_time = Some(Utc::now());
    }

    // == Update Totals ==
    /// Updates the total item count and size estimate.
    pub fn set_totals(&mut self, items: usize, size: usize) {
        self.total_items = items;
        self.total_size = size;
    }
}
