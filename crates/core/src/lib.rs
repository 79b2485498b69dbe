//! # CareChain Core
//!
//! Ledger event model shared across CareChain services.
//!
//! The community-health platform keeps its medicine-inventory ledger on
//! chain; this crate defines the typed view of that ledger that the rest of
//! the system consumes: the recognized event kinds, their payload schemas,
//! and the status/action vocabulary persisted alongside projected rows.
//!
//! ## Features
//!
//! - **Ethereum Types**: Uses Alloy primitives for Address and B256
//! - **Event Model**: `EventKind`, kind-specific payloads, `EventPayload`
//! - **Persisted Vocabulary**: `ChainStatus`, action/entity type strings

#![warn(missing_docs)]

pub mod error;
pub mod types;

// Re-export commonly used items
pub use error::{CoreError, Result};
pub use types::*;

// Re-export Alloy primitives for convenience
pub use alloy_primitives::{Address, B256};
