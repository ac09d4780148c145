use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use rpcpool_common::cache::SelectionCache;
use rpcpool_common::clock::Clock;
use rpcpool_common::config::PoolConfig;
use rpcpool_common::endpoint::Endpoint;
use rpcpool_common::error::Result;
use rpcpool_common::prober::BlockNumberProber;
use rpcpool_common::store::EndpointStore;

use crate::health::HealthMonitor;
use crate::selector::EndpointSelector;

/// One handle over the whole engine: selection, outcome marking, and the
/// background health monitor.
///
/// Construction spawns the monitor on the current runtime (it exits on its
/// own when health checks are disabled in the config). Dropping the pool
/// cancels the monitor; call [`EndpointPool::shutdown`] to also wait for it
/// to wind down.
pub struct EndpointPool {
    selector: Arc<EndpointSelector>,
    store: Arc<dyn EndpointStore>,
    cancel: CancellationToken,
    health_handle: Option<JoinHandle<()>>,
}

impl EndpointPool {
    /// Wires the selector and health monitor over the given collaborators.
    ///
    /// # Arguments
    /// * `store` - Persistent endpoint store shared by both components
    /// * `cache` - Short-TTL selection cache
    /// * `prober` - Block-number probe used by the health monitor
    /// * `clock` - Injected time source
    /// * `config` - Shared tunables
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        store: Arc<dyn EndpointStore>,
        cache: Arc<dyn SelectionCache>,
        prober: Arc<dyn BlockNumberProber>,
        clock: Arc<dyn Clock>,
        config: PoolConfig,
    ) -> Self {
        let selector = Arc::new(EndpointSelector::new(
            Arc::clone(&store),
            cache,
            Arc::clone(&clock),
            config.clone(),
        ));

        let cancel = CancellationToken::new();
        let monitor = HealthMonitor::new(Arc::clone(&store), prober, clock, config);
        let health_handle = monitor.spawn(cancel.child_token());
        info!("Endpoint pool initialized");

        Self {
            selector,
            store,
            cancel,
            health_handle: Some(health_handle),
        }
    }

    /// See [`EndpointSelector::get_best`].
    pub async fn get_best(&self, chain: u64, cancel: &CancellationToken) -> Result<String> {
        self.selector.get_best(chain, cancel).await
    }

    /// See [`EndpointSelector::get_next`].
    pub async fn get_next(
        &self,
        chain: u64,
        failed_url: &str,
        cancel: &CancellationToken,
    ) -> Result<String> {
        self.selector.get_next(chain, failed_url, cancel).await
    }

    /// See [`EndpointSelector::mark_success`].
    pub async fn mark_success(&self, url: &str, cancel: &CancellationToken) -> Result<()> {
        self.selector.mark_success(url, cancel).await
    }

    /// See [`EndpointSelector::mark_failure`].
    pub async fn mark_failure(
        &self,
        url: &str,
        reason: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.selector.mark_failure(url, reason, cancel).await
    }

    /// Stored rows for `chain`, for operator display and debugging.
    pub async fn endpoints(&self, chain: u64, cancel: &CancellationToken) -> Result<Vec<Endpoint>> {
        self.store.get_by_chain(chain, cancel).await
    }

    /// The selector, for callers that want to share it across tasks.
    pub fn selector(&self) -> Arc<EndpointSelector> {
        Arc::clone(&self.selector)
    }

    /// Cancels the health monitor and waits for it to stop.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.health_handle.take() {
            let _ = handle.await;
        }
        info!("Endpoint pool shut down");
    }
}

impl Drop for EndpointPool {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rpcpool_common::clock::ManualClock;
    use rpcpool_common::error::ProbeError;
    use rpcpool_common::{Endpoint, MemoryEndpointStore, MemorySelectionCache, PoolError};
    use std::time::Duration;

    struct NeverProber;

    #[async_trait]
    impl BlockNumberProber for NeverProber {
        async fn probe(
            &self,
            _url: &str,
            _timeout: Duration,
            _cancel: &CancellationToken,
        ) -> std::result::Result<u64, ProbeError> {
            Err(ProbeError::Transport("not wired in this test".to_string()))
        }
    }

    fn pool(config: PoolConfig) -> (Arc<MemoryEndpointStore>, EndpointPool) {
        let clock = Arc::new(ManualClock::new("2024-06-01T12:00:00Z".parse().unwrap()));
        let store = Arc::new(MemoryEndpointStore::new(clock.clone()));
        let cache = Arc::new(MemorySelectionCache::new(clock.clone()));
        let pool = EndpointPool::new(
            store.clone(),
            cache,
            Arc::new(NeverProber),
            clock,
            config,
        );
        (store, pool)
    }

    #[tokio::test]
    async fn test_pool_delegates_selection_and_marking() {
        let (store, pool) = pool(PoolConfig::default());
        let cancel = CancellationToken::new();
        let ep = Endpoint::new(1, "https://a", 1, chrono::Utc::now());
        store.add(ep, &cancel).await.unwrap();

        let url = pool.get_best(1, &cancel).await.unwrap();
        assert_eq!(url, "https://a");

        pool.mark_failure(&url, "boom", &cancel).await.unwrap();
        let rows = pool.endpoints(1, &cancel).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].consecutive_errors, 1);

        pool.mark_success(&url, &cancel).await.unwrap();
        let rows = pool.endpoints(1, &cancel).await.unwrap();
        assert_eq!(rows[0].consecutive_errors, 0);

        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_pool_surfaces_no_healthy_endpoint() {
        let (_store, pool) = pool(PoolConfig::default());
        let cancel = CancellationToken::new();
        let result = pool.get_best(42, &cancel).await;
        assert!(matches!(result, Err(PoolError::NoHealthyEndpoint(42))));
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_with_disabled_health_checks() {
        let (_store, pool) = pool(PoolConfig {
            enable_health_checks: false,
            ..Default::default()
        });
        // the monitor has already exited; shutdown must not hang
        tokio::time::timeout(Duration::from_secs(1), pool.shutdown())
            .await
            .expect("shutdown should be immediate");
    }
}
