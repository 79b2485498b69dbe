//! CareChain Ledger Synchronizer.
//!
//! Background service that observes the append-only medicine-inventory
//! ledger on chain and projects its events into the relational store that
//! serves user-facing queries. The chain stays the auditable source of
//! truth; this crate keeps the read side caught up.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────┐
//! │  carechain-sync (this crate)       │
//! │                                    │
//! │  ┌──────────────┐                  │
//! │  │  RPC Adapter │ ← Chain RPC      │
//! │  │  (listener)  │   eth_getLogs    │
//! │  └──────┬───────┘                  │
//! │         │ raw logs                 │
//! │  ┌──────▼───────┐                  │
//! │  │   Decoder    │  3 event kinds   │
//! │  └──────┬───────┘                  │
//! │         │ typed events             │
//! │  ┌──────▼───────┐                  │
//! │  │    Writer    │ ← SQLite         │
//! │  │ (per-block   │   idempotent on  │
//! │  │  txn+cursor) │   (tx_hash,      │
//! │  └──────────────┘    log_index)    │
//! │                                    │
//! │  Poller drives ticks; Backfill     │
//! │  reuses the same path one-shot;    │
//! │  Supervisor owns lifecycle+health. │
//! └────────────────────────────────────┘
//! ```
//!
//! # Separation of Concerns
//!
//! - **listener**: RPC adapter, decoder, poller, backfill driver
//! - **storage**: cursor, projections, idempotency records, writer
//! - **supervisor**: lifecycle, restart policy, health
//!
//! The user-facing application reads the projected tables through its own
//! service; this crate is strictly read-side with respect to the chain and
//! write-side with respect to the database.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod listener;
pub mod retry;
pub mod storage;
pub mod supervisor;

pub use error::{Result, SyncError};
