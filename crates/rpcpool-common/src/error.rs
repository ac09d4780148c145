use thiserror::Error;

/// Errors surfaced by the selection engine.
///
/// Collaborator failures are carried as message strings so that store and
/// cache backends of any flavor can map into them. Cache errors never reach
/// callers (the selector degrades to a cache miss); store errors always do.
#[derive(Error, Debug)]
pub enum PoolError {
    /// A caller passed an argument the operation cannot work with, such as
    /// an empty URL. Fatal to the call, not retryable.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Every eligibility tier for the chain came up empty. Callers should
    /// treat this as an operational alert rather than retry.
    #[error("No healthy endpoint for chain {0}")]
    NoHealthyEndpoint(u64),

    /// The endpoint store failed. Propagated to the caller as-is.
    #[error("Store error: {0}")]
    Store(String),

    /// The selection cache failed. Swallowed inside the selector; surfaced
    /// only by cache implementations themselves.
    #[error("Cache error: {0}")]
    Cache(String),

    /// The operation observed a cancelled token at a suspension point.
    #[error("Operation cancelled")]
    Cancelled,
}

/// Errors a block-number probe can fail with.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Probe timeout after {0}ms")]
    Timeout(u64),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Probe cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, PoolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            PoolError::NoHealthyEndpoint(137).to_string(),
            "No healthy endpoint for chain 137"
        );
        assert_eq!(
            PoolError::InvalidArgument("url must not be empty".to_string()).to_string(),
            "Invalid argument: url must not be empty"
        );
        assert_eq!(PoolError::Cancelled.to_string(), "Operation cancelled");
    }

    #[test]
    fn test_error_is_matchable() {
        let err = PoolError::NoHealthyEndpoint(1);
        assert!(matches!(err, PoolError::NoHealthyEndpoint(1)));

        let err = PoolError::Store("connection reset".to_string());
        assert!(matches!(err, PoolError::Store(_)));
    }

    #[test]
    fn test_probe_error_display() {
        assert_eq!(
            ProbeError::Timeout(30000).to_string(),
            "Probe timeout after 30000ms"
        );
        assert_eq!(
            ProbeError::Protocol("missing result".to_string()).to_string(),
            "Protocol error: missing result"
        );
    }
}
