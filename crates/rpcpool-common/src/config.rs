use std::time::Duration;

use crate::backoff::BackoffPolicy;

/// Tunables for the selection engine and health monitor.
///
/// Every field has a documented default; construct with
/// `PoolConfig::default()` and override what you need:
///
/// ```rust
/// use rpcpool_common::PoolConfig;
/// use std::time::Duration;
///
/// let config = PoolConfig {
///     max_consecutive_errors: 3,
///     cache_duration: Duration::from_secs(60),
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// TTL on cache entries written by the selector
    ///
    /// Default: 300 seconds
    pub cache_duration: Duration,
    /// Failure count at which an active endpoint trips to the error state
    ///
    /// Default: 5
    pub max_consecutive_errors: u32,
    /// Per-probe network timeout in the health monitor
    ///
    /// Default: 30 seconds
    pub request_timeout: Duration,
    /// Whether `get_best` may fall back to a disabled endpoint when nothing
    /// healthier exists
    ///
    /// Default: false
    pub allow_disabled_fallback: bool,
    /// Sleep between health monitor sweeps
    ///
    /// Default: 5 minutes
    pub health_check_interval: Duration,
    /// When false, the health monitor logs a notice and exits at startup
    ///
    /// Default: true
    pub enable_health_checks: bool,
    /// Exponential backoff applied to endpoints in the error state
    ///
    /// Default: base 1 minute, cap 30 minutes
    pub backoff: BackoffPolicy,
    /// Optional suffix appended to cache keys to isolate tenants sharing one
    /// cache backend
    ///
    /// Default: none
    pub cache_key_prefix: Option<String>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            cache_duration: Duration::from_secs(300),
            max_consecutive_errors: 5,
            request_timeout: Duration::from_secs(30),
            allow_disabled_fallback: false,
            health_check_interval: Duration::from_secs(5 * 60),
            enable_health_checks: true,
            backoff: BackoffPolicy::default(),
            cache_key_prefix: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = PoolConfig::default();
        assert_eq!(config.cache_duration, Duration::from_secs(300));
        assert_eq!(config.max_consecutive_errors, 5);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert!(!config.allow_disabled_fallback);
        assert_eq!(config.health_check_interval, Duration::from_secs(300));
        assert!(config.enable_health_checks);
        assert_eq!(config.backoff.base, Duration::from_secs(60));
        assert_eq!(config.backoff.max, Duration::from_secs(1800));
        assert!(config.cache_key_prefix.is_none());
    }

    #[test]
    fn test_config_override() {
        let config = PoolConfig {
            allow_disabled_fallback: true,
            cache_key_prefix: Some("staging".to_string()),
            ..Default::default()
        };
        assert!(config.allow_disabled_fallback);
        assert_eq!(config.cache_key_prefix.as_deref(), Some("staging"));
        // untouched fields keep their defaults
        assert_eq!(config.max_consecutive_errors, 5);
    }
}
