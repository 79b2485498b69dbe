//! RPC adapter for the chain node.
//!
//! [`LedgerRpc`] is the narrow interface the rest of the synchronizer
//! consumes; [`HttpLedgerRpc`] wraps a single HTTP endpoint with per-call
//! timeouts, transient/fatal fault classification, and retry with backoff.

use alloy::primitives::{Address, B256};
use alloy::providers::{Provider, ProviderBuilder, RootProvider};
use alloy::rpc::types::{Filter, Log, TransactionReceipt};
use alloy::transports::http::{Client, Http};
use async_trait::async_trait;
use std::time::Duration;

use crate::error::{Result, SyncError};
use crate::retry::{with_retry, RetryPolicy};

use super::events::recognized_signatures;

/// Node interface consumed by the poller and backfill driver.
///
/// Implementations surface faults already classified as transient or fatal
/// and must return logs ordered by `(block_number, log_index)` ascending,
/// which is what JSON-RPC `eth_getLogs` guarantees.
#[async_trait]
pub trait LedgerRpc: Send + Sync {
    /// Current head block of the chain.
    async fn head_block(&self) -> Result<u64>;

    /// Logs emitted by the monitored contract in `[from, to]`, filtered to
    /// the recognized event signatures.
    async fn logs(&self, from: u64, to: u64) -> Result<Vec<Log>>;

    /// Receipt lookup for verification and re-org probes.
    async fn tx_receipt(&self, tx_hash: B256) -> Result<Option<TransactionReceipt>>;
}

/// HTTP RPC adapter over one endpoint.
#[derive(Clone)]
pub struct HttpLedgerRpc {
    provider: RootProvider<Http<Client>>,
    contract: Address,
    call_timeout: Duration,
    retry: RetryPolicy,
}

impl HttpLedgerRpc {
    /// Create a new adapter for `rpc_url` watching `contract`.
    pub fn new(
        rpc_url: &str,
        contract: Address,
        call_timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let url = rpc_url
            .parse()
            .map_err(|e| SyncError::Config(format!("Invalid RPC URL {}: {}", rpc_url, e)))?;

        let provider = ProviderBuilder::new().on_http(url);

        Ok(Self {
            provider,
            contract,
            call_timeout,
            retry,
        })
    }

    /// Run one RPC call under the per-call timeout, classifying the outcome.
    async fn call<T, Fut>(&self, label: &str, fut: Fut) -> Result<T>
    where
        Fut: std::future::Future<Output = std::result::Result<T, alloy::transports::TransportError>>,
    {
        match tokio::time::timeout(self.call_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(classify(label, &err.to_string())),
            Err(_) => Err(SyncError::TransientRpc(format!(
                "{} timed out after {:?}",
                label, self.call_timeout
            ))),
        }
    }
}

#[async_trait]
impl LedgerRpc for HttpLedgerRpc {
    async fn head_block(&self) -> Result<u64> {
        with_retry(&self.retry, "eth_blockNumber", || async {
            self.call("eth_blockNumber", self.provider.get_block_number())
                .await
        })
        .await
    }

    async fn logs(&self, from: u64, to: u64) -> Result<Vec<Log>> {
        if from > to {
            return Err(SyncError::Internal(format!(
                "invalid log range: {} > {}",
                from, to
            )));
        }

        let filter = Filter::new()
            .address(self.contract)
            .event_signature(recognized_signatures())
            .from_block(from)
            .to_block(to);

        with_retry(&self.retry, "eth_getLogs", || {
            let filter = filter.clone();
            async move { self.call("eth_getLogs", self.provider.get_logs(&filter)).await }
        })
        .await
    }

    async fn tx_receipt(&self, tx_hash: B256) -> Result<Option<TransactionReceipt>> {
        with_retry(&self.retry, "eth_getTransactionReceipt", || async {
            self.call(
                "eth_getTransactionReceipt",
                self.provider.get_transaction_receipt(tx_hash),
            )
            .await
        })
        .await
    }
}

/// Classify an RPC failure as transient or fatal.
///
/// Connection drops, rate limits, and server overload are transient and
/// worth retrying; everything else (bad filter, malformed ABI, unknown
/// method) will not self-heal and aborts the tick.
fn classify(label: &str, message: &str) -> SyncError {
    const TRANSIENT_MARKERS: &[&str] = &[
        "timeout",
        "timed out",
        "connection",
        "reset",
        "broken pipe",
        "rate limit",
        "too many requests",
        "429",
        "502",
        "503",
        "504",
        "temporarily unavailable",
    ];

    let lowered = message.to_lowercase();
    if TRANSIENT_MARKERS.iter().any(|m| lowered.contains(m)) {
        SyncError::TransientRpc(format!("{}: {}", label, message))
    } else {
        SyncError::FatalRpc(format!("{}: {}", label, message))
    }
}
