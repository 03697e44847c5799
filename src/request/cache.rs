//! Request Cache Module
//!
//! Applies per-endpoint caching strategies to outbound HTTP calls, using
//! the cache store as backing storage, with in-flight request deduplication
//! and non-blocking background revalidation.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{CacheError, Result};
use crate::request::{
    derive_cache_key, is_cacheable_status, CachedResponse, FetchRequest, Fetcher, Strategy,
    StrategyConfig, StrategyRegistry,
};
use crate::store::{CacheStore, TAGS_METADATA_KEY};
use crate::tasks::spawn_cleanup_task;

/// A deduplicated in-flight fetch whose eventual result every joined caller
/// receives a clone of.
type InFlightFetch = Shared<BoxFuture<'static, Result<CachedResponse>>>;

// == Request Cache ==
/// Strategy-driven cache around an HTTP fetch boundary.
///
/// Explicitly constructed and dependency-injected: callers hold an instance,
/// opt into caching per call site, and drive the lifecycle through `init`
/// and `destroy`. There is no ambient global state and no transparent
/// interception of unrelated calls.
pub struct RequestCache {
    /// Backing store, shared with the cleanup task
    store: Arc<RwLock<CacheStore>>,
    /// Outbound network boundary
    fetcher: Arc<dyn Fetcher>,
    /// URL-pattern to policy table
    strategies: StrategyRegistry,
    /// In-flight fetches by cache key; at most one per key at any time
    pending: Arc<Mutex<HashMap<String, InFlightFetch>>>,
    /// Keys with a background refresh in flight
    refreshing: Arc<Mutex<HashSet<String>>>,
    /// Background cleanup interval in seconds
    cleanup_interval_secs: u64,
    /// Handle of the running cleanup task, if initialized
    cleanup_handle: Option<JoinHandle<()>>,
}

impl RequestCache {
    // == Constructor ==
    /// Creates a new RequestCache over the given store and fetcher.
    ///
    /// The periodic cleanup task does not start until `init` is called.
    pub fn new(
        store: CacheStore,
        fetcher: Arc<dyn Fetcher>,
        strategies: StrategyRegistry,
        cleanup_interval_secs: u64,
    ) -> Self {
        Self {
            store: Arc::new(RwLock::new(store)),
            fetcher,
            strategies,
            pending: Arc::new(Mutex::new(HashMap::new())),
            refreshing: Arc::new(Mutex::new(HashSet::new())),
            cleanup_interval_secs,
            cleanup_handle: None,
        }
    }

    // == Init ==
    /// Starts the periodic cleanup task. Idempotent.
    pub fn init(&mut self) {
        if self.cleanup_handle.is_none() {
            self.cleanup_handle = Some(spawn_cleanup_task(
                Arc::clone(&self.store),
                self.cleanup_interval_secs,
            ));
            info!(
                interval_secs = self.cleanup_interval_secs,
                "Request cache initialized"
            );
        }
    }

    // == Destroy ==
    /// Stops the cleanup task and clears the in-flight registries.
    pub fn destroy(&mut self) {
        if let Some(handle) = self.cleanup_handle.take() {
            handle.abort();
        }
        self.pending.lock().unwrap().clear();
        self.refreshing.lock().unwrap().clear();
        info!("Request cache destroyed");
    }

    // == Store Access ==
    /// Returns a handle to the backing store, for stats and direct
    /// maintenance.
    pub fn store(&self) -> Arc<RwLock<CacheStore>> {
        Arc::clone(&self.store)
    }

    // == Fetch ==
    /// Performs a request under the policy resolved from the URL-pattern
    /// registry.
    pub async fn fetch(&self, request: FetchRequest) -> Result<CachedResponse> {
        let config = self.strategies.resolve(&request.url).clone();
        self.fetch_with_strategy(request, &config).await
    }

    // == Fetch With Strategy ==
    /// Performs a request under an explicitly supplied policy.
    pub async fn fetch_with_strategy(
        &self,
        request: FetchRequest,
        config: &StrategyConfig,
    ) -> Result<CachedResponse> {
        let key = derive_cache_key(&request);
        match config.strategy {
            Strategy::CacheFirst => self.cache_first(key, request, config).await,
            Strategy::NetworkFirst => self.network_first(key, request, config).await,
            Strategy::StaleWhileRevalidate => {
                self.stale_while_revalidate(key, request, config).await
            }
            Strategy::CacheOnly => self.cache_only(key).await,
            Strategy::NetworkOnly => self.fetch_deduped(&key, request, None).await,
        }
    }

    // == Prefetch ==
    /// Performs a strategy-driven fetch purely for its caching side effect.
    /// The result, success or failure, is discarded.
    pub async fn prefetch(&self, request: FetchRequest) {
        let url = request.url.clone();
        if let Err(err) = self.fetch(request).await {
            debug!(url = %url, error = %err, "Prefetch failed");
        }
    }

    // == Invalidate By Tags ==
    /// Removes every cached response carrying any of the given tags.
    ///
    /// After this returns, no subsequently served cached response carries
    /// one of the tags. Returns the number of items removed.
    pub async fn invalidate_by_tags(&self, tags: &[String]) -> usize {
        let removed = self.store.write().await.delete_by_tags(tags);
        info!(tags = ?tags, removed, "Invalidated cached responses by tag");
        removed
    }

    // == Strategy: Cache First ==
    /// Hit: return cached without touching the network. Miss: fetch, cache,
    /// return; a fetch failure propagates.
    async fn cache_first(
        &self,
        key: String,
        request: FetchRequest,
        config: &StrategyConfig,
    ) -> Result<CachedResponse> {
        if let Some(cached) = self.lookup(&key).await {
            return Ok(cached);
        }
        self.fetch_deduped(&key, request, Some(config.clone())).await
    }

    // == Strategy: Network First ==
    /// Fetch first; on failure fall back to the cache, propagating the
    /// original error only on a cache miss.
    async fn network_first(
        &self,
        key: String,
        request: FetchRequest,
        config: &StrategyConfig,
    ) -> Result<CachedResponse> {
        match self.fetch_deduped(&key, request, Some(config.clone())).await {
            Ok(response) => Ok(response),
            Err(err) => match self.lookup(&key).await {
                Some(cached) => {
                    warn!(key = %key, error = %err, "Network fetch failed, serving stale response from cache");
                    Ok(cached)
                }
                None => Err(err),
            },
        }
    }

    // == Strategy: Stale While Revalidate ==
    /// Hit: return cached immediately; if past the stale window, schedule
    /// exactly one background refresh for the key. Miss: behave like
    /// cache-first.
    async fn stale_while_revalidate(
        &self,
        key: String,
        request: FetchRequest,
        config: &StrategyConfig,
    ) -> Result<CachedResponse> {
        if let Some(cached) = self.lookup(&key).await {
            let stale_after = config.stale_time_ms.unwrap_or(config.ttl_ms);
            if cached.age_ms() >= stale_after {
                self.schedule_refresh(key, request, config.clone());
            }
            return Ok(cached);
        }
        self.fetch_deduped(&key, request, Some(config.clone())).await
    }

    // == Strategy: Cache Only ==
    /// Hit: return cached. Miss: reject; the caller asked to never touch the
    /// network, so this is the one user-visible cache miss.
    async fn cache_only(&self, key: String) -> Result<CachedResponse> {
        match self.lookup(&key).await {
            Some(cached) => Ok(cached),
            None => Err(CacheError::NoCachedResponse(key)),
        }
    }

    // == Internal Helpers ==

    async fn lookup(&self, key: &str) -> Option<CachedResponse> {
        // Write lock: lookups update hit/miss counters and prune expired items
        self.store.write().await.get::<CachedResponse>(key, None)
    }

    async fn fetch_deduped(
        &self,
        key: &str,
        request: FetchRequest,
        write_policy: Option<StrategyConfig>,
    ) -> Result<CachedResponse> {
        let in_flight = join_or_start_fetch(
            &self.pending,
            &self.store,
            &self.fetcher,
            key,
            request,
            write_policy,
        );
        in_flight.await
    }

    /// Queues a fire-and-forget refresh for a key, unless one is already in
    /// flight. Failures are logged and never affect the caller.
    fn schedule_refresh(&self, key: String, request: FetchRequest, config: StrategyConfig) {
        {
            let mut refreshing = self.refreshing.lock().unwrap();
            if !refreshing.insert(key.clone()) {
                debug!(key = %key, "Background refresh already in flight, skipping");
                return;
            }
        }

        debug!(key = %key, "Scheduling background refresh");
        let pending = Arc::clone(&self.pending);
        let store = Arc::clone(&self.store);
        let fetcher = Arc::clone(&self.fetcher);
        let refreshing = Arc::clone(&self.refreshing);
        tokio::spawn(async move {
            // Yield once so the stale response is returned before any
            // refresh work runs
            tokio::task::yield_now().await;
            let in_flight =
                join_or_start_fetch(&pending, &store, &fetcher, &key, request, Some(config));
            match in_flight.await {
                Ok(_) => debug!(key = %key, "Background refresh completed"),
                Err(err) => warn!(key = %key, error = %err, "Background refresh failed"),
            }
            refreshing.lock().unwrap().remove(&key);
        });
    }
}

impl Drop for RequestCache {
    fn drop(&mut self) {
        if let Some(handle) = self.cleanup_handle.take() {
            handle.abort();
        }
    }
}

/// Joins the in-flight fetch for `key`, or starts one.
///
/// The registry entry is removed when the fetch resolves or rejects, so a
/// failed fetch never leaves a stale in-flight marker behind.
fn join_or_start_fetch(
    pending: &Arc<Mutex<HashMap<String, InFlightFetch>>>,
    store: &Arc<RwLock<CacheStore>>,
    fetcher: &Arc<dyn Fetcher>,
    key: &str,
    request: FetchRequest,
    write_policy: Option<StrategyConfig>,
) -> InFlightFetch {
    let mut map = pending.lock().unwrap();
    if let Some(in_flight) = map.get(key) {
        debug!(key = %key, "Joining in-flight request");
        return in_flight.clone();
    }

    let pending_map = Arc::clone(pending);
    let store = Arc::clone(store);
    let fetcher = Arc::clone(fetcher);
    let key_owned = key.to_string();
    let in_flight = async move {
        let result = fetch_and_store(fetcher, store, &key_owned, request, write_policy).await;
        pending_map.lock().unwrap().remove(&key_owned);
        result
    }
    .boxed()
    .shared();
    map.insert(key.to_string(), in_flight.clone());
    in_flight
}

/// Performs the network fetch and writes cacheable results to the store.
async fn fetch_and_store(
    fetcher: Arc<dyn Fetcher>,
    store: Arc<RwLock<CacheStore>>,
    key: &str,
    request: FetchRequest,
    write_policy: Option<StrategyConfig>,
) -> Result<CachedResponse> {
    debug!(key = %key, method = %request.method, url = %request.url, "Dispatching network fetch");
    let response = fetcher.fetch(&request).await?;
    let cached = CachedResponse::from_fetch(&response);

    if let Some(config) = write_policy {
        if is_cacheable_status(cached.status) {
            let metadata = (!config.tags.is_empty())
                .then(|| HashMap::from([(TAGS_METADATA_KEY.to_string(), config.tags.join(","))]));
            store
                .write()
                .await
                .set(key, &cached, Some(config.ttl_ms), config.backend, metadata);
        } else {
            debug!(key = %key, status = cached.status, "Status not cacheable, returning without caching");
        }
    }

    Ok(cached)
}
