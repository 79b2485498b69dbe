//! Ledger event listening.
//!
//! This module provides:
//! - The RPC adapter and its retrying HTTP implementation
//! - Event type definitions and decoding
//! - The polling scheduler and the one-shot backfill driver

pub mod backfill;
pub mod events;
pub mod poller;
pub mod provider;

pub use backfill::{BackfillDriver, BackfillReport};
pub use events::DecodedEvent;
pub use poller::{Poller, TickOutcome, TickReport};
pub use provider::{HttpLedgerRpc, LedgerRpc};
