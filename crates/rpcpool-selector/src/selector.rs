use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use rpcpool_common::cache::{cache_key, SelectionCache};
use rpcpool_common::clock::Clock;
use rpcpool_common::config::PoolConfig;
use rpcpool_common::endpoint::{Endpoint, EndpointState};
use rpcpool_common::error::{PoolError, Result};
use rpcpool_common::store::EndpointStore;

/// Picks the best endpoint for a chain and records caller-reported outcomes.
///
/// Selection walks three tiers in order: active endpoints, endpoints in the
/// error state whose backoff window has elapsed, and (only when configured)
/// disabled endpoints. Within a tier the endpoint with the lexicographically
/// smallest `(priority, consecutive_errors)` pair wins; ties resolve to the
/// order the store yielded.
///
/// The selector owns no state beyond its collaborators, the immutable
/// config, and the per-URL lock map that serializes read-modify-write
/// against the store.
pub struct EndpointSelector {
    store: Arc<dyn EndpointStore>,
    cache: Arc<dyn SelectionCache>,
    clock: Arc<dyn Clock>,
    config: PoolConfig,
    url_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl EndpointSelector {
    /// Creates a selector over the given collaborators.
    ///
    /// # Arguments
    /// * `store` - Persistent endpoint store
    /// * `cache` - Short-TTL selection cache
    /// * `clock` - Injected time source driving backoff arithmetic
    /// * `config` - Selection and backoff tunables
    pub fn new(
        store: Arc<dyn EndpointStore>,
        cache: Arc<dyn SelectionCache>,
        clock: Arc<dyn Clock>,
        config: PoolConfig,
    ) -> Self {
        Self {
            store,
            cache,
            clock,
            config,
            url_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the URL of the best currently-eligible endpoint for `chain`.
    ///
    /// # Behavior
    /// 1. A cache hit is returned verbatim without revalidation; cache
    ///    errors count as a miss.
    /// 2. Otherwise the active tier is consulted, then the error tier
    ///    (backoff elapsed only), then the disabled tier when
    ///    `allow_disabled_fallback` is set.
    /// 3. A selected URL is written back to the cache with the configured
    ///    TTL before being returned.
    ///
    /// # Errors
    /// - [`PoolError::NoHealthyEndpoint`] when every tier came up empty
    /// - [`PoolError::Store`] when the store fails
    /// - [`PoolError::Cancelled`] when `cancel` fires at a suspension point
    pub async fn get_best(&self, chain: u64, cancel: &CancellationToken) -> Result<String> {
        if cancel.is_cancelled() {
            return Err(PoolError::Cancelled);
        }

        let key = cache_key(chain, self.config.cache_key_prefix.as_deref());
        if let Some(url) = self.cached_url(&key, chain, cancel).await? {
            return Ok(url);
        }

        let active = self
            .store
            .get_by_chain_and_state(chain, EndpointState::Active, cancel)
            .await?;
        let mut candidate = pick(&active);

        if candidate.is_none() {
            let errored = self
                .store
                .get_by_chain_and_state(chain, EndpointState::Error, cancel)
                .await?;
            let now = self.clock.now();
            let eligible: Vec<Endpoint> = errored
                .into_iter()
                .filter(|e| self.config.backoff.is_elapsed(e, now))
                .collect();
            candidate = pick(&eligible);
            if let Some(ref endpoint) = candidate {
                debug!(chain, url = %endpoint.url, "No active endpoints, retrying one past its backoff window");
            }
        }

        if candidate.is_none() && self.config.allow_disabled_fallback {
            let disabled = self
                .store
                .get_by_chain_and_state(chain, EndpointState::Disabled, cancel)
                .await?;
            candidate = pick(&disabled);
            if let Some(ref endpoint) = candidate {
                warn!(chain, url = %endpoint.url, "Falling back to a disabled endpoint");
            }
        }

        match candidate {
            Some(endpoint) => {
                self.cache_selection(&key, &endpoint.url, cancel).await?;
                Ok(endpoint.url)
            }
            None => Err(PoolError::NoHealthyEndpoint(chain)),
        }
    }

    /// Returns a different endpoint for an in-request retry after
    /// `failed_url` misbehaved.
    ///
    /// Bypasses the cache on the read side, never returns `failed_url`, and
    /// never falls back to disabled endpoints. The winner overwrites the
    /// chain's cache entry so subsequent `get_best` calls follow the retry.
    ///
    /// # Errors
    /// - [`PoolError::InvalidArgument`] when `failed_url` is empty
    /// - [`PoolError::NoHealthyEndpoint`] when no other endpoint is eligible
    pub async fn get_next(
        &self,
        chain: u64,
        failed_url: &str,
        cancel: &CancellationToken,
    ) -> Result<String> {
        if failed_url.is_empty() {
            return Err(PoolError::InvalidArgument(
                "failed_url must not be empty".to_string(),
            ));
        }
        if cancel.is_cancelled() {
            return Err(PoolError::Cancelled);
        }

        let all = self.store.get_by_chain(chain, cancel).await?;
        let now = self.clock.now();
        let eligible: Vec<Endpoint> = all
            .into_iter()
            .filter(|e| e.url != failed_url)
            .filter(|e| match e.state {
                EndpointState::Active => true,
                EndpointState::Error => self.config.backoff.is_elapsed(e, now),
                EndpointState::Disabled => false,
            })
            .collect();

        match pick(&eligible) {
            Some(endpoint) => {
                let key = cache_key(chain, self.config.cache_key_prefix.as_deref());
                self.cache_selection(&key, &endpoint.url, cancel).await?;
                debug!(chain, failed = %failed_url, next = %endpoint.url, "Switched endpoint for retry");
                Ok(endpoint.url)
            }
            None => Err(PoolError::NoHealthyEndpoint(chain)),
        }
    }

    /// Records a successful call against `url`.
    ///
    /// Resets the error counter, restores an errored endpoint to active, and
    /// invalidates the chain's cache entry when the endpoint was carrying
    /// any error signal (so the recovered endpoint re-enters selection
    /// immediately instead of waiting out the TTL). Unknown URLs are a
    /// logged no-op so caller retries never compound a failure.
    pub async fn mark_success(&self, url: &str, cancel: &CancellationToken) -> Result<()> {
        if url.is_empty() {
            return Err(PoolError::InvalidArgument(
                "url must not be empty".to_string(),
            ));
        }
        if cancel.is_cancelled() {
            return Err(PoolError::Cancelled);
        }

        let _guard = self.lock_url(url).await;
        let Some(mut endpoint) = self.store.get_by_url(url, cancel).await? else {
            warn!(%url, "Success reported for unknown endpoint URL, ignoring");
            return Ok(());
        };

        let was_erroring = endpoint.is_erroring();
        endpoint.record_success(self.clock.now());
        self.store.update(endpoint.clone(), cancel).await?;

        if was_erroring {
            info!(%url, chain = endpoint.chain, "Endpoint recovered after reported success");
            self.invalidate_chain(endpoint.chain, cancel).await?;
        }
        Ok(())
    }

    /// Records a failed call against `url` with a human-readable `reason`.
    ///
    /// Increments the consecutive-error counter (trips the endpoint to the
    /// error state at the configured threshold) and always invalidates the
    /// chain's cache entry so no caller keeps being handed a URL that just
    /// failed. Unknown URLs are a logged no-op.
    pub async fn mark_failure(
        &self,
        url: &str,
        reason: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if url.is_empty() {
            return Err(PoolError::InvalidArgument(
                "url must not be empty".to_string(),
            ));
        }
        if cancel.is_cancelled() {
            return Err(PoolError::Cancelled);
        }

        let _guard = self.lock_url(url).await;
        let Some(mut endpoint) = self.store.get_by_url(url, cancel).await? else {
            warn!(%url, "Failure reported for unknown endpoint URL, ignoring");
            return Ok(());
        };

        let tripped =
            endpoint.record_failure(reason, self.config.max_consecutive_errors, self.clock.now());
        self.store.update(endpoint.clone(), cancel).await?;

        if tripped {
            warn!(
                %url,
                chain = endpoint.chain,
                errors = endpoint.consecutive_errors,
                reason = endpoint.error_message.as_deref().unwrap_or_default(),
                "Endpoint moved to error state"
            );
        } else {
            debug!(
                %url,
                errors = endpoint.consecutive_errors,
                "Recorded endpoint failure"
            );
        }

        self.invalidate_chain(endpoint.chain, cancel).await?;
        Ok(())
    }

    /// Cache read that degrades to a miss on backend failure.
    async fn cached_url(
        &self,
        key: &str,
        chain: u64,
        cancel: &CancellationToken,
    ) -> Result<Option<String>> {
        match self.cache.get(key, cancel).await {
            Ok(Some(bytes)) => match String::from_utf8(bytes) {
                Ok(url) => {
                    debug!(chain, %url, "Selection cache hit");
                    Ok(Some(url))
                }
                Err(_) => {
                    warn!(chain, "Discarding non-UTF-8 selection cache entry");
                    Ok(None)
                }
            },
            Ok(None) => Ok(None),
            Err(PoolError::Cancelled) => Err(PoolError::Cancelled),
            Err(e) => {
                debug!(chain, error = %e, "Selection cache read failed, treating as miss");
                Ok(None)
            }
        }
    }

    /// Best-effort cache write; only cancellation propagates.
    async fn cache_selection(
        &self,
        key: &str,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        match self
            .cache
            .set(key, url.as_bytes(), self.config.cache_duration, cancel)
            .await
        {
            Ok(()) => Ok(()),
            Err(PoolError::Cancelled) => Err(PoolError::Cancelled),
            Err(e) => {
                debug!(%url, error = %e, "Selection cache write failed, continuing");
                Ok(())
            }
        }
    }

    /// Best-effort cache invalidation; only cancellation propagates.
    async fn invalidate_chain(&self, chain: u64, cancel: &CancellationToken) -> Result<()> {
        let key = cache_key(chain, self.config.cache_key_prefix.as_deref());
        match self.cache.remove(&key, cancel).await {
            Ok(()) => Ok(()),
            Err(PoolError::Cancelled) => Err(PoolError::Cancelled),
            Err(e) => {
                debug!(chain, error = %e, "Selection cache invalidation failed, continuing");
                Ok(())
            }
        }
    }

    /// Serializes read-modify-write cycles per URL.
    ///
    /// The map only grows, one unit mutex per URL ever marked. Endpoint
    /// counts are small in practice, so no eviction.
    async fn lock_url(&self, url: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.url_locks.lock().await;
            Arc::clone(
                locks
                    .entry(url.to_string())
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            )
        };
        lock.lock_owned().await
    }
}

/// Smallest `(priority, consecutive_errors)` pair wins; first of equals.
fn pick(candidates: &[Endpoint]) -> Option<Endpoint> {
    candidates
        .iter()
        .min_by_key(|e| e.selection_key())
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use rpcpool_common::clock::ManualClock;
    use rpcpool_common::{MemoryEndpointStore, MemorySelectionCache};

    fn start() -> DateTime<Utc> {
        "2024-06-01T12:00:00Z".parse().unwrap()
    }

    struct Fixture {
        clock: Arc<ManualClock>,
        store: Arc<MemoryEndpointStore>,
        selector: EndpointSelector,
        cancel: CancellationToken,
    }

    fn fixture(config: PoolConfig) -> Fixture {
        let clock = Arc::new(ManualClock::new(start()));
        let store = Arc::new(MemoryEndpointStore::new(clock.clone()));
        let cache = Arc::new(MemorySelectionCache::new(clock.clone()));
        let selector =
            EndpointSelector::new(store.clone(), cache, clock.clone(), config);
        Fixture {
            clock,
            store,
            selector,
            cancel: CancellationToken::new(),
        }
    }

    async fn seed(fx: &Fixture, chain: u64, url: &str, priority: u32) {
        let ep = Endpoint::new(chain, url, priority, fx.clock.now());
        fx.store.add(ep, &fx.cancel).await.unwrap();
    }

    #[test]
    fn test_pick_prefers_smallest_key() {
        let now = start();
        let mut a = Endpoint::new(1, "https://a", 2, now);
        a.consecutive_errors = 0;
        let mut b = Endpoint::new(1, "https://b", 1, now);
        b.consecutive_errors = 3;
        let mut c = Endpoint::new(1, "https://c", 1, now);
        c.consecutive_errors = 1;

        let picked = pick(&[a, b, c]).unwrap();
        assert_eq!(picked.url, "https://c");
    }

    #[test]
    fn test_pick_is_stable_on_ties() {
        let now = start();
        let first = Endpoint::new(1, "https://first", 1, now);
        let second = Endpoint::new(1, "https://second", 1, now);
        let picked = pick(&[first, second]).unwrap();
        assert_eq!(picked.url, "https://first");
    }

    #[test]
    fn test_pick_empty_is_none() {
        assert!(pick(&[]).is_none());
    }

    #[tokio::test]
    async fn test_get_next_rejects_empty_url() {
        let fx = fixture(PoolConfig::default());
        let result = fx.selector.get_next(1, "", &fx.cancel).await;
        assert!(matches!(result, Err(PoolError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_mark_success_rejects_empty_url() {
        let fx = fixture(PoolConfig::default());
        let result = fx.selector.mark_success("", &fx.cancel).await;
        assert!(matches!(result, Err(PoolError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_mark_failure_rejects_empty_url() {
        let fx = fixture(PoolConfig::default());
        let result = fx.selector.mark_failure("", "boom", &fx.cancel).await;
        assert!(matches!(result, Err(PoolError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_mark_on_unknown_url_is_a_noop() {
        let fx = fixture(PoolConfig::default());
        fx.selector
            .mark_success("https://nobody", &fx.cancel)
            .await
            .unwrap();
        fx.selector
            .mark_failure("https://nobody", "boom", &fx.cancel)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_no_endpoints_at_all() {
        let fx = fixture(PoolConfig::default());
        let result = fx.selector.get_best(137, &fx.cancel).await;
        assert!(matches!(result, Err(PoolError::NoHealthyEndpoint(137))));
    }

    #[tokio::test]
    async fn test_concurrent_failures_do_not_lose_increments() {
        let fx = fixture(PoolConfig {
            max_consecutive_errors: 100,
            ..Default::default()
        });
        seed(&fx, 1, "https://a", 1).await;

        let selector = Arc::new(fx.selector);
        let mut handles = Vec::new();
        for _ in 0..20 {
            let selector = Arc::clone(&selector);
            let cancel = fx.cancel.clone();
            handles.push(tokio::spawn(async move {
                selector.mark_failure("https://a", "boom", &cancel).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let row = fx
            .store
            .get_by_url("https://a", &fx.cancel)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.consecutive_errors, 20);
    }

    #[tokio::test]
    async fn test_cancelled_token_surfaces() {
        let fx = fixture(PoolConfig::default());
        seed(&fx, 1, "https://a", 1).await;
        fx.cancel.cancel();

        assert!(matches!(
            fx.selector.get_best(1, &fx.cancel).await,
            Err(PoolError::Cancelled)
        ));
        assert!(matches!(
            fx.selector.mark_failure("https://a", "x", &fx.cancel).await,
            Err(PoolError::Cancelled)
        ));
    }
}
