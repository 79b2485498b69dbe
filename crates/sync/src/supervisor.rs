//! Supervisor: owns the poller's lifecycle and exposes health.
//!
//! One supervisor instance exists per configured `(rpc, contract)` pair
//! and is injected into callers rather than accessed globally. On poller
//! failure it classifies the cause: restartable faults wait out one poll
//! interval and start a fresh poller; everything else stops the service
//! and is surfaced through [`HealthSnapshot::last_error`].

use std::sync::{Arc, RwLock};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::listener::{LedgerRpc, Poller};
use crate::storage::Storage;

/// Read-only view of the synchronizer's health.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthSnapshot {
    /// Whether the poller is currently running
    pub running: bool,

    /// Last block the writer committed
    pub last_block: u64,

    /// Last head observed on the chain
    pub head_block: u64,

    /// Blocks between head and the cursor
    pub lag: u64,

    /// Most recent error, if any
    pub last_error: Option<String>,
}

#[derive(Debug, Default)]
struct HealthInner {
    running: bool,
    last_block: u64,
    head_block: u64,
    last_error: Option<String>,
}

/// Shared health state updated by the poller and read by callers.
#[derive(Debug, Default)]
pub struct SyncHealth {
    inner: RwLock<HealthInner>,
}

impl SyncHealth {
    fn set_running(&self, running: bool) {
        self.inner.write().expect("health lock").running = running;
    }

    /// Record the chain head observed by the last tick.
    pub fn record_head(&self, head: u64) {
        self.inner.write().expect("health lock").head_block = head;
    }

    /// Record the last block committed by the writer.
    pub fn record_last_block(&self, block: u64) {
        self.inner.write().expect("health lock").last_block = block;
    }

    /// Record the most recent error.
    pub fn record_error(&self, err: &SyncError) {
        self.inner.write().expect("health lock").last_error = Some(err.to_string());
    }

    /// Take a consistent snapshot.
    pub fn snapshot(&self) -> HealthSnapshot {
        let inner = self.inner.read().expect("health lock");
        HealthSnapshot {
            running: inner.running,
            last_block: inner.last_block,
            head_block: inner.head_block,
            lag: inner.head_block.saturating_sub(inner.last_block),
            last_error: inner.last_error.clone(),
        }
    }
}

/// Owns the poller task: start, stop, restart-on-fault, health.
pub struct Supervisor<R: LedgerRpc + 'static> {
    rpc: Arc<R>,
    storage: Storage,
    config: SyncConfig,
    health: Arc<SyncHealth>,
    shutdown_tx: watch::Sender<bool>,
    handle: Option<JoinHandle<Result<()>>>,
}

impl<R: LedgerRpc + 'static> Supervisor<R> {
    /// Create a supervisor for one `(rpc, contract)` pair.
    pub fn new(rpc: Arc<R>, storage: Storage, config: SyncConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            rpc,
            storage,
            config,
            health: Arc::new(SyncHealth::default()),
            shutdown_tx,
            handle: None,
        }
    }

    /// Handle for reading health from other tasks.
    pub fn health_handle(&self) -> Arc<SyncHealth> {
        self.health.clone()
    }

    /// Current health snapshot.
    pub fn health(&self) -> HealthSnapshot {
        self.health.snapshot()
    }

    /// Spawn the supervised poller loop. Idempotent while running.
    pub fn start(&mut self) {
        if self.handle.is_some() {
            warn!("Supervisor already started");
            return;
        }

        let rpc = self.rpc.clone();
        let storage = self.storage.clone();
        let config = self.config.clone();
        let health = self.health.clone();
        let shutdown_rx = self.shutdown_tx.subscribe();

        self.handle = Some(tokio::spawn(supervise(
            rpc, storage, config, health, shutdown_rx,
        )));
    }

    /// Wait for the supervised loop to finish on its own.
    ///
    /// Resolves with the terminal error on a non-restartable fault, or
    /// `Ok(())` after a clean shutdown.
    pub async fn join(&mut self) -> Result<()> {
        let Some(handle) = self.handle.as_mut() else {
            return Ok(());
        };

        let result = match handle.await {
            Ok(result) => result,
            Err(e) => Err(SyncError::Internal(format!("supervisor task panicked: {}", e))),
        };
        self.handle = None;
        result
    }

    /// Graceful shutdown: stop scheduling ticks, await the in-flight tick
    /// up to a grace deadline, then abort.
    pub async fn stop(&mut self) -> Result<()> {
        info!("Supervisor stopping");
        let _ = self.shutdown_tx.send(true);

        let Some(handle) = self.handle.take() else {
            return Ok(());
        };

        // Same grace as the tick budget: a healthy tick always fits.
        let grace = self.config.tick_budget();
        let abort = handle.abort_handle();
        match tokio::time::timeout(grace, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(SyncError::Internal(format!(
                "supervisor task panicked: {}",
                e
            ))),
            Err(_) => {
                warn!(
                    grace_ms = grace.as_millis() as u64,
                    "Grace deadline hit, aborting poller"
                );
                abort.abort();
                Ok(())
            }
        }
    }
}

/// The supervised loop: run a poller, classify its exit, restart or stop.
async fn supervise<R: LedgerRpc>(
    rpc: Arc<R>,
    storage: Storage,
    config: SyncConfig,
    health: Arc<SyncHealth>,
    shutdown_rx: watch::Receiver<bool>,
) -> Result<()> {
    loop {
        let poller = Poller::new(
            rpc.clone(),
            storage.clone(),
            config.clone(),
            health.clone(),
            shutdown_rx.clone(),
        );

        health.set_running(true);
        let result = poller.run().await;
        health.set_running(false);

        match result {
            Ok(()) => {
                info!("Poller stopped cleanly");
                return Ok(());
            }
            Err(err) if err.is_restartable() && !*shutdown_rx.borrow() => {
                health.record_error(&err);
                warn!(
                    error = %err,
                    delay_ms = config.poll_interval_ms,
                    "Poller failed on a restartable fault, restarting"
                );
                tokio::time::sleep(config.poll_interval()).await;
            }
            Err(err) => {
                health.record_error(&err);
                error!(error = %err, "Poller failed fatally, stopping");
                return Err(err);
            }
        }
    }
}
