//! rpcpool Selection Engine
//!
//! This crate provides the selection and failover engine of the rpcpool
//! system: given a chain id it returns the URL of the best currently-healthy
//! JSON-RPC endpoint, tracks per-endpoint success/failure, enforces
//! exponential backoff on failed endpoints, and runs a background loop that
//! rehabilitates endpoints that have recovered.
//!
//! # Architecture
//!
//! Three pieces cooperate around the shared endpoint store:
//!
//! 1. **Selection** ([`EndpointSelector`]): walks the eligibility tiers
//!    (active, then backed-off error, then optionally disabled), returns the
//!    endpoint with the smallest `(priority, consecutive_errors)` pair, and
//!    keeps a short-TTL cache entry per chain so a run of identical requests
//!    pins to one URL.
//! 2. **Marking** (also [`EndpointSelector`]): callers report success or
//!    failure for a URL; the selector updates the store, trips endpoints to
//!    the error state at the configured threshold, and invalidates the
//!    chain's cache entry when the health picture changed.
//! 3. **Health probing** ([`HealthMonitor`]): a single background task that
//!    periodically probes every endpoint in the error state for its latest
//!    block number and promotes responders back to active.
//!
//! [`EndpointPool`] wires all three together behind one handle.
//!
//! # Key Design Decisions
//!
//! ## Deterministic selection
//!
//! No randomization and no round-robin: identical requests against an
//! unchanged store return the same URL, which keeps upstream connection
//! reuse effective. Ties beyond `(priority, consecutive_errors)` resolve to
//! store order.
//!
//! ## Per-URL write serialization
//!
//! Concurrent failure reports for one URL must not lose counter increments.
//! The selector serializes its read-modify-write cycles through a lazily
//! grown map of per-URL async locks rather than demanding conditional
//! updates from every store backend.
//!
//! ## Cache degradation
//!
//! A failing cache backend never fails a call: reads degrade to a miss,
//! writes and invalidations are best-effort. Only store errors and
//! cancellation propagate to callers.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use rpcpool_common::{MemoryEndpointStore, MemorySelectionCache, PoolConfig, SystemClock};
//! use rpcpool_selector::{EndpointPool, HttpBlockNumberProber};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> rpcpool_common::Result<()> {
//! let clock = Arc::new(SystemClock);
//! let store = Arc::new(MemoryEndpointStore::new(clock.clone()));
//! let cache = Arc::new(MemorySelectionCache::new(clock.clone()));
//! let prober = Arc::new(HttpBlockNumberProber::new().expect("http client"));
//!
//! let pool = EndpointPool::new(store, cache, prober, clock, PoolConfig::default());
//!
//! let cancel = CancellationToken::new();
//! let url = pool.get_best(1, &cancel).await?;
//! // ... call the endpoint, then report the outcome:
//! pool.mark_success(&url, &cancel).await?;
//! # Ok(())
//! # }
//! ```

pub mod health;
pub mod pool;
pub mod probe_http;
pub mod selector;

pub use health::HealthMonitor;
pub use pool::EndpointPool;
pub use probe_http::HttpBlockNumberProber;
pub use selector::EndpointSelector;
