//! Retry with exponential backoff for transient RPC failures.
//!
//! This module provides:
//! - [`RetryPolicy`] — attempt budget and delay bounds.
//! - [`backoff_delay`] — exponential delay calculator with full jitter.
//! - [`with_retry`] — drives an async operation through the policy.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

use crate::error::{Result, SyncError};

/// Retry budget and delay bounds for transient RPC faults.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first call.
    pub max_attempts: u32,

    /// Base delay before the first retry, in milliseconds.
    pub base_delay_ms: u64,

    /// Upper bound on any single delay, in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    /// Policy with a given attempt budget and default delay bounds.
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }
}

/// Computes the delay before the next retry.
///
/// `attempt` is 1-indexed: `attempt = 1` is the delay before the first
/// retry. The exponential ceiling is `base * 2^(attempt - 1)` capped at
/// `max_delay_ms`; the actual delay is drawn uniformly from `[0, ceiling]`
/// (full jitter).
pub fn backoff_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(20);
    let ceiling = policy
        .base_delay_ms
        .saturating_mul(1u64 << exp)
        .min(policy.max_delay_ms);

    // Uniform draw without a rand dependency: scale by the subsecond
    // nanosecond count of the current instant.
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos() as u64;
    let ms = if ceiling == 0 {
        0
    } else {
        nanos % (ceiling + 1)
    };

    Duration::from_millis(ms)
}

/// Calls `op` until it succeeds, fails with a non-transient error, or the
/// attempt budget is spent.
///
/// Non-transient errors are returned immediately. When the budget runs out
/// the last transient error is wrapped in [`SyncError::RetryExhausted`].
pub async fn with_retry<F, Fut, T>(policy: &RetryPolicy, label: &str, op: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() => {
                if attempt >= policy.max_attempts {
                    return Err(SyncError::RetryExhausted {
                        attempts: attempt,
                        last_error: err.to_string(),
                    });
                }

                let delay = backoff_delay(policy, attempt);
                warn!(
                    call = label,
                    attempt,
                    max = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Transient RPC error, retrying"
                );
                sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}
