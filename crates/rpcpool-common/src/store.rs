use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::clock::Clock;
use crate::endpoint::{Endpoint, EndpointState};
use crate::error::{PoolError, Result};

/// Persistent per-chain endpoint store.
///
/// Implementations may be relational, document-oriented, or in-memory. Every
/// operation accepts a cancellation token and should return
/// [`PoolError::Cancelled`] when it observes a cancelled token at a
/// suspension point. Updates to a single row must be serialized by the
/// backend (a whole-row write under a lock or transaction is enough); the
/// selector layers its own per-URL serialization for read-modify-write on
/// top.
#[async_trait]
pub trait EndpointStore: Send + Sync {
    /// Rows for `chain` in `state`, ordered by
    /// `(priority, consecutive_errors)` ascending.
    async fn get_by_chain_and_state(
        &self,
        chain: u64,
        state: EndpointState,
        cancel: &CancellationToken,
    ) -> Result<Vec<Endpoint>>;

    /// All rows for `chain`, in store order.
    async fn get_by_chain(&self, chain: u64, cancel: &CancellationToken) -> Result<Vec<Endpoint>>;

    /// The first row whose URL matches, if any.
    async fn get_by_url(&self, url: &str, cancel: &CancellationToken)
        -> Result<Option<Endpoint>>;

    async fn get_by_id(&self, id: Uuid, cancel: &CancellationToken) -> Result<Option<Endpoint>>;

    async fn get_all(&self, cancel: &CancellationToken) -> Result<Vec<Endpoint>>;

    /// Inserts a row, stamping `created_at` and `modified_at`.
    async fn add(&self, endpoint: Endpoint, cancel: &CancellationToken) -> Result<()>;

    /// Replaces the row with the same id, stamping `modified_at`.
    async fn update(&self, endpoint: Endpoint, cancel: &CancellationToken) -> Result<()>;
}

/// In-memory endpoint store.
///
/// Rows live in insertion order, which is the "store-defined order" that
/// breaks selection ties. Used by the test suite and suitable for
/// single-process deployments that seed endpoints at startup.
pub struct MemoryEndpointStore {
    rows: RwLock<Vec<Endpoint>>,
    clock: Arc<dyn Clock>,
}

impl MemoryEndpointStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            rows: RwLock::new(Vec::new()),
            clock,
        }
    }

    fn check_cancel(cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(PoolError::Cancelled);
        }
        Ok(())
    }

    fn sort_for_selection(rows: &mut [Endpoint]) {
        rows.sort_by_key(Endpoint::selection_key);
    }
}

#[async_trait]
impl EndpointStore for MemoryEndpointStore {
    async fn get_by_chain_and_state(
        &self,
        chain: u64,
        state: EndpointState,
        cancel: &CancellationToken,
    ) -> Result<Vec<Endpoint>> {
        Self::check_cancel(cancel)?;
        let rows = self.rows.read().await;
        let mut matched: Vec<Endpoint> = rows
            .iter()
            .filter(|e| e.chain == chain && e.state == state)
            .cloned()
            .collect();
        // stable sort keeps insertion order among equal keys
        Self::sort_for_selection(&mut matched);
        Ok(matched)
    }

    async fn get_by_chain(&self, chain: u64, cancel: &CancellationToken) -> Result<Vec<Endpoint>> {
        Self::check_cancel(cancel)?;
        let rows = self.rows.read().await;
        Ok(rows.iter().filter(|e| e.chain == chain).cloned().collect())
    }

    async fn get_by_url(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Endpoint>> {
        Self::check_cancel(cancel)?;
        let rows = self.rows.read().await;
        Ok(rows.iter().find(|e| e.url == url).cloned())
    }

    async fn get_by_id(&self, id: Uuid, cancel: &CancellationToken) -> Result<Option<Endpoint>> {
        Self::check_cancel(cancel)?;
        let rows = self.rows.read().await;
        Ok(rows.iter().find(|e| e.id == id).cloned())
    }

    async fn get_all(&self, cancel: &CancellationToken) -> Result<Vec<Endpoint>> {
        Self::check_cancel(cancel)?;
        Ok(self.rows.read().await.clone())
    }

    async fn add(&self, mut endpoint: Endpoint, cancel: &CancellationToken) -> Result<()> {
        Self::check_cancel(cancel)?;
        let now = self.clock.now();
        endpoint.created_at = now;
        endpoint.modified_at = now;
        let mut rows = self.rows.write().await;
        if rows.iter().any(|e| e.id == endpoint.id) {
            return Err(PoolError::Store(format!(
                "duplicate endpoint id {}",
                endpoint.id
            )));
        }
        rows.push(endpoint);
        Ok(())
    }

    async fn update(&self, mut endpoint: Endpoint, cancel: &CancellationToken) -> Result<()> {
        Self::check_cancel(cancel)?;
        endpoint.modified_at = self.clock.now();
        let mut rows = self.rows.write().await;
        match rows.iter_mut().find(|e| e.id == endpoint.id) {
            Some(slot) => {
                *slot = endpoint;
                Ok(())
            }
            None => Err(PoolError::Store(format!(
                "unknown endpoint id {}",
                endpoint.id
            ))),
        }
    }
}
