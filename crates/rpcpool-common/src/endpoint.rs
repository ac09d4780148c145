use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Health state of an endpoint.
///
/// State ownership matters: the selector and the health monitor move
/// endpoints between `Active` and `Error`, while `Disabled` is reserved for
/// operators. The engine never writes `Disabled` and never moves a disabled
/// endpoint out of it, even when it records successes or failures against
/// one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointState {
    /// In rotation and considered healthy
    Active,
    /// Tripped after too many consecutive failures; eligible again once its
    /// backoff window elapses or a probe succeeds
    Error,
    /// Taken out of rotation by an operator; only an operator puts it back
    Disabled,
}

/// One JSON-RPC endpoint row: a `(chain, URL)` pair with state and error
/// bookkeeping.
///
/// Rows are created by operators, mutated by the selector and the health
/// monitor, and never destroyed by the engine. `modified_at` is refreshed on
/// every write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Opaque stable identifier
    pub id: Uuid,
    /// Integer chain id (1 = Ethereum mainnet, 137 = Polygon, ...)
    pub chain: u64,
    /// The JSON-RPC endpoint URL
    pub url: String,
    /// Current health state
    pub state: EndpointState,
    /// Lower is preferred
    pub priority: u32,
    /// Failures since the last success; reset to 0 on any success
    pub consecutive_errors: u32,
    /// Last failure reason; `None` when no current error
    pub error_message: Option<String>,
    /// When the most recent failure happened; `None` when no current error
    pub last_error_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

/// Placeholder recorded when a failure is reported without a reason.
pub const UNKNOWN_ERROR_REASON: &str = "unknown";

impl Endpoint {
    /// Creates a new active endpoint row.
    ///
    /// # Arguments
    /// * `chain` - Integer chain id
    /// * `url` - The JSON-RPC endpoint URL
    /// * `priority` - Selection priority, lower preferred
    /// * `now` - Creation timestamp (from the injected clock)
    pub fn new(chain: u64, url: impl Into<String>, priority: u32, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            chain,
            url: url.into(),
            state: EndpointState::Active,
            priority,
            consecutive_errors: 0,
            error_message: None,
            last_error_at: None,
            created_at: now,
            modified_at: now,
        }
    }

    /// The lexicographic selection key: smallest wins.
    pub fn selection_key(&self) -> (u32, u32) {
        (self.priority, self.consecutive_errors)
    }

    /// Whether this endpoint currently carries any error signal.
    pub fn is_erroring(&self) -> bool {
        self.state == EndpointState::Error || self.consecutive_errors > 0
    }

    /// Applies a reported success: clears the error counter and message and
    /// restores an `Error` endpoint to `Active`.
    ///
    /// A `Disabled` endpoint keeps its state; only operators re-enable.
    pub fn record_success(&mut self, now: DateTime<Utc>) {
        self.consecutive_errors = 0;
        self.error_message = None;
        self.last_error_at = None;
        if self.state == EndpointState::Error {
            self.state = EndpointState::Active;
        }
        self.modified_at = now;
    }

    /// Applies a reported failure: bumps the counter, records the reason and
    /// timestamp, and trips an `Active` endpoint to `Error` once the counter
    /// reaches `max_consecutive_errors`.
    ///
    /// Empty reasons are stored as [`UNKNOWN_ERROR_REASON`]. A `Disabled`
    /// endpoint keeps its state but still accumulates bookkeeping.
    ///
    /// # Returns
    /// `true` if this failure moved the endpoint into the `Error` state
    pub fn record_failure(
        &mut self,
        reason: &str,
        max_consecutive_errors: u32,
        now: DateTime<Utc>,
    ) -> bool {
        self.consecutive_errors = self.consecutive_errors.saturating_add(1);
        self.error_message = Some(if reason.trim().is_empty() {
            UNKNOWN_ERROR_REASON.to_string()
        } else {
            reason.to_string()
        });
        self.last_error_at = Some(now);
        self.modified_at = now;

        let tripped = self.state == EndpointState::Active
            && self.consecutive_errors >= max_consecutive_errors;
        if tripped {
            self.state = EndpointState::Error;
        }
        tripped
    }
}
