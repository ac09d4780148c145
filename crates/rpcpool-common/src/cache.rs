use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::clock::Clock;
use crate::error::{PoolError, Result};

/// Short-TTL key-value cache holding the last chosen URL per chain.
///
/// The selector tolerates a backend that fails on any call: read and write
/// failures degrade to a cache miss. Values are opaque bytes (the selector
/// stores UTF-8 URLs).
#[async_trait]
pub trait SelectionCache: Send + Sync {
    async fn get(&self, key: &str, cancel: &CancellationToken) -> Result<Option<Vec<u8>>>;

    async fn set(
        &self,
        key: &str,
        value: &[u8],
        ttl: Duration,
        cancel: &CancellationToken,
    ) -> Result<()>;

    async fn remove(&self, key: &str, cancel: &CancellationToken) -> Result<()>;
}

/// Cache key for a chain's selection entry.
///
/// `"rpc:best:{chain}"`, with an optional tenant suffix:
/// `"rpc:best:{chain}:{prefix}"`.
pub fn cache_key(chain: u64, prefix: Option<&str>) -> String {
    match prefix {
        Some(prefix) => format!("rpc:best:{chain}:{prefix}"),
        None => format!("rpc:best:{chain}"),
    }
}

struct CacheEntry {
    value: Vec<u8>,
    expires_at: DateTime<Utc>,
}

/// In-memory selection cache with clock-driven TTL.
///
/// Expiry is evaluated lazily on read against the injected clock, so tests
/// advance a [`crate::clock::ManualClock`] instead of sleeping.
pub struct MemorySelectionCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    clock: Arc<dyn Clock>,
}

impl MemorySelectionCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    fn check_cancel(cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(PoolError::Cancelled);
        }
        Ok(())
    }
}

#[async_trait]
impl SelectionCache for MemorySelectionCache {
    async fn get(&self, key: &str, cancel: &CancellationToken) -> Result<Option<Vec<u8>>> {
        Self::check_cancel(cancel)?;
        let now = self.clock.now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if entry.expires_at > now => return Ok(Some(entry.value.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }
        // expired: drop the entry before reporting a miss
        self.entries.write().await.remove(key);
        Ok(None)
    }

    async fn set(
        &self,
        key: &str,
        value: &[u8],
        ttl: Duration,
        cancel: &CancellationToken,
    ) -> Result<()> {
        Self::check_cancel(cancel)?;
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| PoolError::Cache(format!("ttl out of range: {e}")))?;
        let entry = CacheEntry {
            value: value.to_vec(),
            expires_at: self.clock.now() + ttl,
        };
        self.entries.write().await.insert(key.to_string(), entry);
        Ok(())
    }

    async fn remove(&self, key: &str, cancel: &CancellationToken) -> Result<()> {
        Self::check_cancel(cancel)?;
        self.entries.write().await.remove(key);
        Ok(())
    }
}
