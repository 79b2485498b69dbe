//! Core types for the CareChain ledger event model.

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CoreError;

// Re-export Alloy types for convenience
pub use alloy_primitives::Address as EthAddress;
pub use alloy_primitives::B256 as Bytes32;

/// The event kinds recognized on the medicine-inventory ledger.
///
/// Logs carrying any other topic signature are ignored by the synchronizer
/// so that future contract deployments can add events without breaking sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// A medicine batch was registered on chain.
    InventoryAdded,

    /// A change to an operational record was notarized on chain.
    HistoryLogged,

    /// A staff role was granted by an admin.
    StaffRoleGranted,
}

impl EventKind {
    /// Action type string persisted on the ledger transaction record.
    pub const fn action_type(&self) -> &'static str {
        match self {
            EventKind::InventoryAdded => "ADD_INVENTORY",
            EventKind::HistoryLogged => "LOG_HISTORY",
            EventKind::StaffRoleGranted => "GRANT_STAFF_ROLE",
        }
    }

    /// Entity type string persisted on the ledger transaction record.
    pub const fn entity_type(&self) -> &'static str {
        match self {
            EventKind::InventoryAdded => "inventory_item",
            EventKind::HistoryLogged => "audit_log",
            EventKind::StaffRoleGranted => "staff_role",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::InventoryAdded => "InventoryAdded",
            EventKind::HistoryLogged => "HistoryLogged",
            EventKind::StaffRoleGranted => "StaffRoleGranted",
        };
        write!(f, "{}", name)
    }
}

/// Sync status of a projected row relative to the chain.
///
/// Rows pre-inserted by the write side start as `Pending` and transition to
/// `Confirmed` once the synchronizer observes the corresponding event.
/// Rows first created by the synchronizer are `Confirmed` from the start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChainStatus {
    /// Written optimistically, not yet observed on chain.
    Pending,

    /// Observed in a confirmed block.
    Confirmed,
}

impl ChainStatus {
    /// Convert to database string representation.
    pub const fn as_str(&self) -> &'static str {
        match self {
            ChainStatus::Pending => "PENDING",
            ChainStatus::Confirmed => "CONFIRMED",
        }
    }
}

impl std::str::FromStr for ChainStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(ChainStatus::Pending),
            "CONFIRMED" => Ok(ChainStatus::Confirmed),
            other => Err(CoreError::UnknownChainStatus(other.to_string())),
        }
    }
}

/// Payload of an `InventoryAdded` event.
///
/// Field layout mirrors the on-chain event; timestamps are unix seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryAddedPayload {
    /// Chain-assigned ordinal index of the inventory item.
    pub index: u64,
    /// Medicine name.
    pub name: String,
    /// Manufacturer batch number.
    pub batch_number: String,
    /// Free-form notes.
    pub notes: String,
    /// Unit quantity registered.
    pub quantity: u64,
    /// Expiration date (unix seconds).
    pub expiration_date: u64,
    /// Storage location.
    pub location: String,
    /// On-chain registration timestamp (unix seconds).
    pub timestamp: u64,
}

/// Payload of a `HistoryLogged` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryLoggedPayload {
    /// Identifier of the record the change applies to.
    pub record_id: u64,
    /// Action performed (e.g. "UPDATE").
    pub action: String,
    /// Name of the field that changed.
    pub field_changed: String,
    /// Previous value.
    pub old_value: String,
    /// New value.
    pub new_value: String,
    /// Human-readable description of the change.
    pub description: String,
    /// When the change happened (unix seconds).
    pub timestamp: u64,
}

/// Payload of a `StaffRoleGranted` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffRoleGrantedPayload {
    /// Address receiving the staff role.
    pub staff: Address,
    /// Admin address that granted the role.
    pub admin: Address,
}

/// Kind-specific payload of a decoded ledger event.
///
/// Persisted as opaque JSON on the ledger transaction record so that new
/// event kinds can be added without a schema migration; typed projections
/// live in their own tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum EventPayload {
    /// See [`InventoryAddedPayload`].
    InventoryAdded(InventoryAddedPayload),
    /// See [`HistoryLoggedPayload`].
    HistoryLogged(HistoryLoggedPayload),
    /// See [`StaffRoleGrantedPayload`].
    StaffRoleGranted(StaffRoleGrantedPayload),
}

impl EventPayload {
    /// The kind this payload belongs to.
    pub const fn kind(&self) -> EventKind {
        match self {
            EventPayload::InventoryAdded(_) => EventKind::InventoryAdded,
            EventPayload::HistoryLogged(_) => EventKind::HistoryLogged,
            EventPayload::StaffRoleGranted(_) => EventKind::StaffRoleGranted,
        }
    }
}
