//! Database types for the synchronizer storage layer.

use alloy::primitives::{Address, B256};
use carechain_core::ChainStatus;

/// Cursor record (singleton).
///
/// Tracks the highest block whose events have all been committed, plus a
/// start marker for observability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorRecord {
    /// Highest fully-processed block number
    pub last_processed_block: u64,

    /// Unix timestamp of first start
    pub started_at: i64,

    /// Unix timestamp of last advance
    pub updated_at: i64,
}

/// One row per observed ledger event, keyed on `(tx_hash, log_index)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerTxRecord {
    /// Transaction hash of the event
    pub tx_hash: B256,

    /// Block number where the event occurred
    pub block_number: u64,

    /// Log index within the block
    pub log_index: u64,

    /// Action type string (e.g. "GRANT_STAFF_ROLE")
    pub action_type: String,

    /// Entity type string (e.g. "inventory_item")
    pub entity_type: String,

    /// Domain entity the event refers to, when it has one
    pub entity_id: Option<i64>,

    /// Address that performed the action, when the event carries one
    pub actor_address: Option<Address>,

    /// Opaque JSON payload of the decoded event
    pub payload_json: String,

    /// Chain status; always `Confirmed` once recorded
    pub status: ChainStatus,

    /// Unix timestamp when the record was written
    pub confirmed_at: i64,
}

/// Relational projection of one on-chain inventory item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryItemRow {
    /// Chain-assigned ordinal index (primary key)
    pub chain_index: u64,

    /// Medicine name
    pub name: String,

    /// Manufacturer batch number
    pub batch_number: String,

    /// Free-form notes
    pub notes: String,

    /// Unit quantity registered on chain
    pub quantity: u64,

    /// Expiration date (unix seconds)
    pub expiration_date: i64,

    /// Storage location
    pub location: String,

    /// On-chain registration timestamp (unix seconds)
    pub chain_timestamp: i64,

    /// Transaction hash of the registering event
    pub chain_tx_hash: Option<B256>,

    /// Sync status relative to the chain
    pub chain_status: ChainStatus,

    /// Unix timestamp of the last sync touch
    pub last_synced_at: i64,
}

/// One append-only audit trail entry projected from a HistoryLogged event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntryRow {
    /// Row id
    pub id: i64,

    /// Table the change applies to
    pub table_name: String,

    /// Identifier of the changed record
    pub record_id: u64,

    /// Action performed
    pub action: String,

    /// Name of the field that changed
    pub field_changed: String,

    /// Previous value
    pub old_value: String,

    /// New value
    pub new_value: String,

    /// Human-readable description
    pub description: String,

    /// When the change happened (unix seconds)
    pub changed_at: i64,

    /// Transaction hash of the notarizing event
    pub tx_hash: B256,

    /// Log index of the notarizing event
    pub log_index: u64,
}

/// Database statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseStats {
    /// Total number of ledger transaction records
    pub ledger_record_count: u64,

    /// Total number of projected inventory items
    pub inventory_count: u64,

    /// Total number of audit trail entries
    pub audit_count: u64,

    /// Last processed block number
    pub last_processed_block: u64,
}
