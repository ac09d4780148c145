//! rpcpool Common Types and Collaborator Interfaces
//!
//! This crate provides the shared domain model and the collaborator seams
//! for the rpcpool endpoint selection system.
//!
//! # Overview
//!
//! rpcpool picks the best currently-healthy JSON-RPC endpoint for a
//! blockchain, tracks per-endpoint success/failure, and rehabilitates
//! endpoints that have recovered. This crate contains everything the engine
//! and its collaborators agree on:
//!
//! - **Domain model**: [`Endpoint`](endpoint::Endpoint) rows with their
//!   [`EndpointState`](endpoint::EndpointState) and error bookkeeping
//! - **Policy**: [`BackoffPolicy`](backoff::BackoffPolicy) and
//!   [`PoolConfig`](config::PoolConfig)
//! - **Collaborator traits**: [`EndpointStore`](store::EndpointStore),
//!   [`SelectionCache`](cache::SelectionCache),
//!   [`BlockNumberProber`](prober::BlockNumberProber) and
//!   [`Clock`](clock::Clock)
//! - **Reference implementations**: in-memory store and cache used by tests
//!   and single-process deployments
//!
//! # Components
//!
//! - [`endpoint`] - Endpoint rows and the Active/Error/Disabled state machine
//! - [`error`] - Error enums shared across the workspace
//! - [`config`] - Tunables with their documented defaults
//! - [`backoff`] - Exponential backoff arithmetic
//! - [`clock`] - Injected time source
//! - [`store`] - Persistent endpoint store seam
//! - [`cache`] - Short-TTL selection cache seam
//! - [`prober`] - Network probe seam

pub mod backoff;
pub mod cache;
pub mod clock;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod prober;
pub mod store;

pub use backoff::BackoffPolicy;
pub use cache::{cache_key, MemorySelectionCache, SelectionCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::PoolConfig;
pub use endpoint::{Endpoint, EndpointState};
pub use error::{PoolError, ProbeError, Result};
pub use prober::BlockNumberProber;
pub use store::{EndpointStore, MemoryEndpointStore};
