//! Polling scheduler: the synchronizer's main control loop.
//!
//! Each tick walks `Fetching -> Decoding -> Writing`: read the head, fetch
//! logs for the next window, decode them, hand the events to the writer,
//! and let the writer's transaction advance the cursor. Ticks are strictly
//! serial; a shutdown signal is honored between steps, never mid-write.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::storage::Storage;
use crate::supervisor::SyncHealth;

use super::events::{decode_log, DecodedEvent};
use super::provider::LedgerRpc;

/// Outcome of a single tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The safe head has not moved past the cursor; nothing to do.
    Idle,

    /// A window was fetched and applied.
    Synced(TickReport),
}

/// Counters for one synced window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// First block of the window
    pub from: u64,

    /// Last block of the window (new cursor value)
    pub to: u64,

    /// Raw logs returned by the node
    pub fetched: u64,

    /// Events applied for the first time
    pub applied: u64,

    /// Events dropped by the idempotency key
    pub deduped: u64,

    /// Recognized logs that failed to decode and were skipped
    pub decode_skipped: u64,
}

/// The polling scheduler.
pub struct Poller<R: LedgerRpc> {
    rpc: Arc<R>,
    storage: Storage,
    config: SyncConfig,
    health: Arc<SyncHealth>,
    shutdown: watch::Receiver<bool>,
}

impl<R: LedgerRpc> Poller<R> {
    /// Create a new poller.
    pub fn new(
        rpc: Arc<R>,
        storage: Storage,
        config: SyncConfig,
        health: Arc<SyncHealth>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            rpc,
            storage,
            config,
            health,
            shutdown,
        }
    }

    /// Run the tick loop until shutdown or a non-restartable error.
    ///
    /// Transient faults that survive the RPC adapter's own retry budget
    /// put the loop into backoff: the tick is dropped, the cursor is left
    /// alone, and the next interval tick starts over.
    pub async fn run(mut self) -> Result<()> {
        let mut interval = tokio::time::interval(self.config.poll_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            poll_interval_ms = self.config.poll_interval_ms,
            max_window_blocks = self.config.max_window_blocks,
            confirmations = self.config.confirmations,
            "Poller starting"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                changed = self.shutdown.changed() => {
                    // A dropped sender counts as shutdown.
                    if changed.is_err() || *self.shutdown.borrow() {
                        info!("Poller received shutdown signal");
                        return Ok(());
                    }
                    continue;
                }
            }
            if *self.shutdown.borrow() {
                info!("Poller received shutdown signal");
                return Ok(());
            }

            match tokio::time::timeout(self.config.tick_budget(), self.tick()).await {
                Ok(Ok(TickOutcome::Idle)) => {
                    debug!("Tick idle: no new stable blocks");
                }
                Ok(Ok(TickOutcome::Synced(report))) => {
                    info!(
                        from = report.from,
                        to = report.to,
                        fetched = report.fetched,
                        applied = report.applied,
                        deduped = report.deduped,
                        decode_skipped = report.decode_skipped,
                        "Window synced"
                    );
                }
                Ok(Err(err)) if err.is_transient() => {
                    warn!(error = %err, "Tick failed on transient fault, backing off");
                    self.health.record_error(&err);
                }
                Ok(Err(err)) => return Err(err),
                Err(_) => {
                    warn!(
                        budget_ms = self.config.tick_budget().as_millis() as u64,
                        "Tick exceeded its budget, aborted without advancing the cursor"
                    );
                }
            }
        }
    }

    /// Execute one tick: fetch, decode, and apply the next window.
    pub async fn tick(&mut self) -> Result<TickOutcome> {
        // Fetching
        let head = self.rpc.head_block().await?;
        let safe_head = head.saturating_sub(self.config.confirmations);
        let cursor = self.storage.get_cursor().await?.last_processed_block;

        self.health.record_head(head);

        if safe_head <= cursor {
            return Ok(TickOutcome::Idle);
        }

        let from = cursor + 1;
        let to = safe_head.min(cursor.saturating_add(self.config.max_window_blocks));

        let logs = self.rpc.logs(from, to).await?;

        if self.shutdown_requested() {
            return Ok(TickOutcome::Idle);
        }

        // Decoding
        let (events, decode_skipped) = decode_batch(&logs)?;

        if self.shutdown_requested() {
            return Ok(TickOutcome::Idle);
        }

        // Writing: the writer commits per block and advances the cursor
        // inside each transaction.
        let report = self.storage.apply_events(&events, to).await?;
        self.health.record_last_block(to);

        Ok(TickOutcome::Synced(TickReport {
            from,
            to,
            fetched: logs.len() as u64,
            applied: report.applied,
            deduped: report.deduped,
            decode_skipped,
        }))
    }

    fn shutdown_requested(&self) -> bool {
        *self.shutdown.borrow()
    }
}

/// Decode a fetched batch, skipping undecodable logs.
///
/// Unrecognized topics are ignored silently; recognized logs that fail to
/// decode are logged with their coordinates and counted, and the batch
/// continues. One bad event must not block sync.
pub(crate) fn decode_batch(
    logs: &[alloy::rpc::types::Log],
) -> Result<(Vec<DecodedEvent>, u64)> {
    let mut events = Vec::with_capacity(logs.len());
    let mut decode_skipped = 0u64;

    for log in logs {
        match decode_log(log) {
            Ok(Some(event)) => events.push(event),
            Ok(None) => {}
            Err(SyncError::Decode {
                tx_hash,
                log_index,
                reason,
            }) => {
                warn!(
                    tx_hash = %tx_hash,
                    log_index,
                    reason = %reason,
                    "Skipping undecodable log"
                );
                decode_skipped += 1;
            }
            Err(other) => return Err(other),
        }
    }

    Ok((events, decode_skipped))
}
