//! Caching Strategy Module
//!
//! Per-endpoint policy describing how a request interacts with the store
//! and the network.

use crate::store::Backend;

/// Default TTL applied when no pattern matches: five minutes.
pub const DEFAULT_TTL_MS: u64 = 5 * 60 * 1000;

// == Strategy ==
/// How a request interacts with the cache and the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Serve from cache when possible, fetch only on a miss
    CacheFirst,
    /// Fetch first, fall back to cache when the network fails
    NetworkFirst,
    /// Serve cached immediately, refresh in the background once stale
    StaleWhileRevalidate,
    /// Serve from cache only; a miss is an error, the network is never used
    CacheOnly,
    /// Always fetch; the cache is neither read nor written
    NetworkOnly,
}

// == Strategy Config ==
/// Policy attached to a URL pattern.
///
/// Immutable configuration, resolved once per call; not user data.
#[derive(Debug, Clone)]
pub struct StrategyConfig {
    /// The fetch strategy
    pub strategy: Strategy,
    /// TTL for entries written under this policy, in milliseconds
    pub ttl_ms: u64,
    /// Age at which a stale-while-revalidate entry triggers a background
    /// refresh; defaults to the TTL when unset
    pub stale_time_ms: Option<u64>,
    /// Invalidation tags recorded on entries written under this policy
    pub tags: Vec<String>,
    /// Backend entries are written to
    pub backend: Backend,
}

impl StrategyConfig {
    /// Creates a policy with the given strategy and TTL, no stale window,
    /// no tags, memory backend.
    pub fn new(strategy: Strategy, ttl_ms: u64) -> Self {
        Self {
            strategy,
            ttl_ms,
            stale_time_ms: None,
            tags: Vec::new(),
            backend: Backend::Memory,
        }
    }

    /// Sets the stale window for stale-while-revalidate.
    pub fn with_stale_time(mut self, stale_time_ms: u64) -> Self {
        self.stale_time_ms = Some(stale_time_ms);
        self
    }

    /// Sets the invalidation tags.
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Sets the backend written to.
    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self::new(Strategy::NetworkFirst, DEFAULT_TTL_MS)
    }
}

// == Strategy Registry ==
/// Static URL-pattern to policy table.
///
/// Patterns are matched as substrings of the request URL; the first match
/// wins. URLs matching no pattern get the default network-first,
/// five-minute policy.
#[derive(Debug, Clone)]
pub struct StrategyRegistry {
    patterns: Vec<(String, StrategyConfig)>,
    default: StrategyConfig,
}

impl StrategyRegistry {
    /// Creates an empty registry with the standard default policy.
    pub fn new() -> Self {
        Self {
            patterns: Vec::new(),
            default: StrategyConfig::default(),
        }
    }

    /// Registers a policy for a URL substring pattern. Registration order is
    /// match order.
    pub fn with_pattern(mut self, pattern: impl Into<String>, config: StrategyConfig) -> Self {
        self.patterns.push((pattern.into(), config));
        self
    }

    /// Replaces the fallback policy.
    pub fn with_default(mut self, config: StrategyConfig) -> Self {
        self.default = config;
        self
    }

    /// Resolves the policy for a URL.
    pub fn resolve(&self, url: &str) -> &StrategyConfig {
        self.patterns
            .iter()
            .find(|(pattern, _)| url.contains(pattern.as_str()))
            .map(|(_, config)| config)
            .unwrap_or(&self.default)
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_first_match_wins() {
        let registry = StrategyRegistry::new()
            .with_pattern("/users", StrategyConfig::new(Strategy::CacheFirst, 1000))
            .with_pattern("/users/admin", StrategyConfig::new(Strategy::NetworkOnly, 2000));

        let config = registry.resolve("https://api.example.com/users/admin");
        // "/users" was registered first and also matches
        assert_eq!(config.strategy, Strategy::CacheFirst);
        assert_eq!(config.ttl_ms, 1000);
    }

    #[test]
    fn test_registry_substring_match() {
        let registry = StrategyRegistry::new()
            .with_pattern("/events", StrategyConfig::new(Strategy::StaleWhileRevalidate, 1000));

        let config = registry.resolve("https://api.example.com/v2/events?page=1");
        assert_eq!(config.strategy, Strategy::StaleWhileRevalidate);
    }

    #[test]
    fn test_registry_default_fallback() {
        let registry = StrategyRegistry::new()
            .with_pattern("/users", StrategyConfig::new(Strategy::CacheFirst, 1000));

        let config = registry.resolve("https://api.example.com/payments");
        assert_eq!(config.strategy, Strategy::NetworkFirst);
        assert_eq!(config.ttl_ms, DEFAULT_TTL_MS);
    }

    #[test]
    fn test_custom_default() {
        let registry = StrategyRegistry::new()
            .with_default(StrategyConfig::new(Strategy::CacheOnly, 42));

        assert_eq!(registry.resolve("anything").strategy, Strategy::CacheOnly);
    }

    #[test]
    fn test_config_builders() {
        let config = StrategyConfig::new(Strategy::StaleWhileRevalidate, 1000)
            .with_stale_time(200)
            .with_tags(vec!["users".to_string()])
            .with_backend(Backend::Local);

        assert_eq!(config.stale_time_ms, Some(200));
        assert_eq!(config.tags, vec!["users".to_string()]);
        assert_eq!(config.backend, Backend::Local);
    }
}
