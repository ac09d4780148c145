use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use rpcpool_common::clock::Clock;
use rpcpool_common::config::PoolConfig;
use rpcpool_common::endpoint::{Endpoint, EndpointState};
use rpcpool_common::error::{PoolError, Result};
use rpcpool_common::prober::BlockNumberProber;
use rpcpool_common::store::EndpointStore;

/// Background task that rehabilitates endpoints stuck in the error state.
///
/// Each sweep loads the whole endpoint table, filters to error-state rows in
/// memory, probes them all concurrently for a current block number, and
/// promotes every responder back to active. Probes do not wait out the
/// selection backoff: a successful probe overrides whatever window the
/// endpoint still had, while a failed probe simply leaves the row for the
/// next round.
///
/// Errors inside a sweep are logged and never terminate the loop; only the
/// cancellation token ends it.
pub struct HealthMonitor {
    store: Arc<dyn EndpointStore>,
    prober: Arc<dyn BlockNumberProber>,
    clock: Arc<dyn Clock>,
    config: PoolConfig,
}

impl HealthMonitor {
    pub fn new(
        store: Arc<dyn EndpointStore>,
        prober: Arc<dyn BlockNumberProber>,
        clock: Arc<dyn Clock>,
        config: PoolConfig,
    ) -> Self {
        Self {
            store,
            prober,
            clock,
            config,
        }
    }

    /// Starts the monitor on the current runtime.
    ///
    /// The returned handle completes when `cancel` fires (or immediately
    /// when health checks are disabled in the config).
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run(cancel).await;
        })
    }

    /// Main loop: sleep, sweep, repeat until cancelled.
    async fn run(self, cancel: CancellationToken) {
        if !self.config.enable_health_checks {
            info!("Health checks disabled, monitor exiting");
            return;
        }
        info!(
            interval_secs = self.config.health_check_interval.as_secs(),
            "Health monitor started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Health monitor cancelled");
                    return;
                }
                _ = tokio::time::sleep(self.config.health_check_interval) => {}
            }

            match self.run_once(&cancel).await {
                Ok(()) => {}
                Err(PoolError::Cancelled) => {
                    info!("Health monitor cancelled");
                    return;
                }
                Err(e) => warn!(error = %e, "Health sweep failed, will retry next interval"),
            }
        }
    }

    /// One probing sweep over every endpoint currently in the error state.
    ///
    /// Public so operators and tests can force an immediate round instead of
    /// waiting out the interval.
    pub async fn run_once(&self, cancel: &CancellationToken) -> Result<()> {
        let endpoints = self.store.get_all(cancel).await?;
        let erroring: Vec<Endpoint> = endpoints
            .into_iter()
            .filter(|e| e.state == EndpointState::Error)
            .collect();

        if erroring.is_empty() {
            debug!("No endpoints in error state, nothing to probe");
            return Ok(());
        }
        info!(count = erroring.len(), "Probing endpoints in error state");

        // One task per probe so a panicking prober takes down only its own
        // probe, not the sweep.
        let probes: Vec<_> = erroring
            .into_iter()
            .map(|endpoint| {
                let prober = Arc::clone(&self.prober);
                let timeout = self.config.request_timeout;
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    let result = prober.probe(&endpoint.url, timeout, &cancel).await;
                    (endpoint, result)
                })
            })
            .collect();

        for joined in futures::future::join_all(probes).await {
            let (endpoint, result) = match joined {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(error = %e, "Probe task failed to complete");
                    continue;
                }
            };
            match result {
                Ok(block) => self.promote(endpoint, block, cancel).await,
                Err(e) => {
                    debug!(
                        url = %endpoint.url,
                        chain = endpoint.chain,
                        error = %e,
                        "Probe failed, endpoint stays in error state"
                    );
                }
            }
        }
        Ok(())
    }

    async fn promote(&self, mut endpoint: Endpoint, block: u64, cancel: &CancellationToken) {
        endpoint.record_success(self.clock.now());
        match self.store.update(endpoint.clone(), cancel).await {
            Ok(()) => {
                info!(
                    url = %endpoint.url,
                    chain = endpoint.chain,
                    block,
                    "Endpoint recovered, promoted to active"
                );
            }
            Err(e) => {
                warn!(url = %endpoint.url, error = %e, "Failed to persist endpoint recovery");
            }
        }
    }
}
