use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::endpoint::Endpoint;

/// Exponential backoff policy for failing endpoints.
///
/// An endpoint that has failed `n` consecutive times must wait
/// `min(base * 2^(n-1), max)` after its last failure before it is eligible
/// for selection again.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Delay after the first failure
    ///
    /// Default: 1 minute
    pub base: Duration,
    /// Cap on the delay regardless of the failure count
    ///
    /// Default: 30 minutes
    pub max: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(60),
            max: Duration::from_secs(30 * 60),
        }
    }
}

impl BackoffPolicy {
    /// Calculates the minimum delay before an endpoint with
    /// `consecutive_errors` failures may be retried.
    ///
    /// # Formula
    /// ```text
    /// delay(0) = 0
    /// delay(n) = min(base * 2^(n-1), max)    for n >= 1
    /// ```
    ///
    /// Large counts saturate instead of overflowing.
    ///
    /// # Example
    /// ```rust
    /// use rpcpool_common::BackoffPolicy;
    /// use std::time::Duration;
    ///
    /// let policy = BackoffPolicy::default();
    /// assert_eq!(policy.delay(1), Duration::from_secs(60));
    /// assert_eq!(policy.delay(5), Duration::from_secs(16 * 60));
    /// assert_eq!(policy.delay(6), Duration::from_secs(30 * 60));
    /// ```
    pub fn delay(&self, consecutive_errors: u32) -> Duration {
        if consecutive_errors == 0 {
            return Duration::ZERO;
        }
        let exponent = (consecutive_errors - 1).min(63);
        let factor = 1u64.checked_shl(exponent).unwrap_or(u64::MAX);
        let base_ms = self.base.as_millis().min(u128::from(u64::MAX)) as u64;
        let max_ms = self.max.as_millis().min(u128::from(u64::MAX)) as u64;
        Duration::from_millis(base_ms.saturating_mul(factor).min(max_ms))
    }

    /// Whether `endpoint`'s backoff window has elapsed at `now`.
    ///
    /// An endpoint with no `last_error_at` is always eligible. The state
    /// invariants forbid that combination for `Error` rows, but the
    /// arithmetic must not fault on it.
    pub fn is_elapsed(&self, endpoint: &Endpoint, now: DateTime<Utc>) -> bool {
        let Some(last_error_at) = endpoint.last_error_at else {
            return true;
        };
        match chrono::Duration::from_std(self.delay(endpoint.consecutive_errors)) {
            Ok(delay) => now >= last_error_at + delay,
            Err(_) => false,
        }
    }
}
