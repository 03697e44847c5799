//! Cached Response Module
//!
//! Captures a completed network response for replay from cache.

use std::collections::HashMap;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CacheError, Result};
use crate::request::FetchResponse;
use crate::store::current_timestamp_ms;

/// HTTP statuses outside 2xx that are still safe to cache: the resource is
/// confirmed absent, which is worth remembering.
pub const CACHEABLE_ERROR_STATUSES: [u16; 2] = [404, 410];

/// Checks whether a response with this status may be written to the store.
pub fn is_cacheable_status(status: u16) -> bool {
    (200..300).contains(&status) || CACHEABLE_ERROR_STATUSES.contains(&status)
}

// == Cached Response ==
/// A completed network response captured for replay from cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedResponse {
    /// Response body, parsed as JSON where possible
    pub data: Value,
    /// HTTP status code
    pub status: u16,
    /// HTTP status reason phrase
    pub status_text: String,
    /// Response headers
    pub headers: HashMap<String, String>,
    /// Capture timestamp (Unix milliseconds)
    pub timestamp: u64,
    /// ETag header, kept for conditional revalidation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    /// Last-Modified header, kept for conditional revalidation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
}

impl CachedResponse {
    // == Constructor ==
    /// Captures a fetch response, stamping it with the current time.
    pub fn from_fetch(response: &FetchResponse) -> Self {
        let etag = header_value(&response.headers, "etag");
        let last_modified = header_value(&response.headers, "last-modified");
        Self {
            data: response.data.clone(),
            status: response.status,
            status_text: response.status_text.clone(),
            headers: response.headers.clone(),
            timestamp: current_timestamp_ms(),
            etag,
            last_modified,
        }
    }

    // == Age ==
    /// Returns milliseconds elapsed since this response was captured.
    pub fn age_ms(&self) -> u64 {
        current_timestamp_ms().saturating_sub(self.timestamp)
    }

    // == Is Success ==
    /// True for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    // == JSON ==
    /// Deserializes the body into a typed value.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.data.clone())
            .map_err(|e| CacheError::MalformedEntry(e.to_string()))
    }
}

/// Case-insensitive header lookup.
fn header_value(headers: &HashMap<String, String>, name: &str) -> Option<String> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.clone())
}
