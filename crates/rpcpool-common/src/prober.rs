use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::ProbeError;

/// Network probe that asks an endpoint for its latest block number.
///
/// Any non-negative block number counts as "healthy"; the wire format is an
/// implementation detail of the prober. Implementations own the per-call
/// `timeout` (callers do not wrap probes a second time) and must honor the
/// cancellation token at their suspension points.
#[async_trait]
pub trait BlockNumberProber: Send + Sync {
    async fn probe(
        &self,
        url: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> std::result::Result<u64, ProbeError>;
}
