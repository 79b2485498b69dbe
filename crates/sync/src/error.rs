//! Error types for the synchronizer.

use alloy::primitives::B256;
use thiserror::Error;

/// Error type covering every failure mode of the synchronizer, from
/// configuration problems to RPC faults and persistence failures.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Missing or invalid configuration. Fatal at startup.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A retryable RPC fault: connection reset, rate limit, timeout.
    #[error("Transient RPC error: {0}")]
    TransientRpc(String),

    /// Transient faults kept failing until the retry budget ran out.
    #[error("RPC retries exhausted after {attempts} attempts: {last_error}")]
    RetryExhausted {
        /// Total attempts made, including the first call.
        attempts: u32,
        /// The last transient error observed.
        last_error: String,
    },

    /// A non-retryable RPC fault: bad address, malformed ABI, unknown method.
    #[error("Fatal RPC error: {0}")]
    FatalRpc(String),

    /// A single log could not be decoded into a recognized event.
    ///
    /// The poller logs these and skips the event; one bad log must not
    /// block the rest of the stream.
    #[error("Failed to decode log {tx_hash}#{log_index}: {reason}")]
    Decode {
        /// Transaction hash of the offending log.
        tx_hash: B256,
        /// Log index within the transaction.
        log_index: u64,
        /// What went wrong.
        reason: String,
    },

    /// Any write failure not classifiable as a duplicate key.
    #[error("Database error: {0}")]
    Persistence(#[from] sqlx::Error),

    /// Attempt to move the cursor backwards.
    #[error("Cursor regression: requested {requested}, current {current}")]
    CursorRegression {
        /// The height the caller asked for.
        requested: u64,
        /// The persisted height.
        current: u64,
    },

    /// Event payload could not be serialized for persistence.
    #[error("Payload serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Catch-all for runtime plumbing failures (task joins, channel drops).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SyncError {
    /// Returns `true` if this error is safe to retry at the call site.
    ///
    /// | Variant          | Retried | Reason                                  |
    /// |------------------|---------|-----------------------------------------|
    /// | `TransientRpc`   | yes     | Network blip, HTTP 429 / 503, timeout   |
    /// | `RetryExhausted` | no      | Budget already spent                    |
    /// | `FatalRpc`       | no      | Bad filter or ABI will not self-heal    |
    /// | `Decode`         | no      | Bad data will not self-heal             |
    /// | `Persistence`    | no      | Schema and constraint issues are stable |
    /// | `Config`         | no      | Operator error                          |
    pub fn is_transient(&self) -> bool {
        matches!(self, SyncError::TransientRpc(_))
    }

    /// Returns `true` if the supervisor should restart the poller after
    /// this error rather than stop and surface it.
    ///
    /// An exhausted retry budget usually means the endpoint is down, not
    /// misconfigured; the supervisor waits and tries again.
    pub fn is_restartable(&self) -> bool {
        matches!(
            self,
            SyncError::TransientRpc(_) | SyncError::RetryExhausted { .. }
        )
    }
}

/// Result type alias for synchronizer operations.
pub type Result<T> = std::result::Result<T, SyncError>;
