//! Event type definitions and decoding for the medicine-inventory ledger.
//!
//! Decoding is deterministic and pure: raw logs in, typed events out.
//! Logs carrying an unrecognized topic signature decode to `None` so that
//! future contract deployments cannot break the synchronizer.

use alloy::primitives::B256;
use alloy::rpc::types::Log;
use alloy::sol;
use alloy::sol_types::SolEvent;

use carechain_core::{
    EventKind, EventPayload, HistoryLoggedPayload, InventoryAddedPayload, StaffRoleGrantedPayload,
};

use crate::error::{Result, SyncError};

// Ledger events, field-for-field as emitted by the inventory contract.
sol! {
    /// A medicine batch was registered on chain.
    #[derive(Debug, PartialEq, Eq)]
    event InventoryAdded(
        uint256 indexed itemIndex,
        string name,
        string batchNumber,
        string notes,
        uint256 quantity,
        uint256 expirationDate,
        string location,
        uint256 timestamp
    );

    /// A change to an operational record was notarized on chain.
    #[derive(Debug, PartialEq, Eq)]
    event HistoryLogged(
        uint256 indexed recordId,
        string action,
        string fieldChanged,
        string oldValue,
        string newValue,
        string description,
        uint256 timestamp
    );

    /// A staff role was granted by an admin.
    #[derive(Debug, PartialEq, Eq)]
    event StaffRoleGranted(
        address indexed staff,
        address indexed admin
    );
}

/// The three topic signatures the synchronizer filters for.
pub fn recognized_signatures() -> Vec<B256> {
    vec![
        InventoryAdded::SIGNATURE_HASH,
        HistoryLogged::SIGNATURE_HASH,
        StaffRoleGranted::SIGNATURE_HASH,
    ]
}

/// A decoded ledger event with its block coordinates.
///
/// `(tx_hash, log_index)` uniquely identifies the event and is the
/// idempotency key for all downstream writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedEvent {
    /// Block number where the event occurred
    pub block_number: u64,

    /// Log index within the block
    pub log_index: u64,

    /// Transaction hash
    pub tx_hash: B256,

    /// Kind-specific payload
    pub payload: EventPayload,
}

impl DecodedEvent {
    /// The kind of this event.
    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }

    /// Serialize the payload as the opaque JSON persisted on the
    /// ledger transaction record.
    pub fn payload_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.payload)?)
    }
}

/// Decode a raw log into a [`DecodedEvent`].
///
/// Returns `Ok(None)` for logs whose topic signature is not one of the
/// three recognized kinds. Returns [`SyncError::Decode`] when a recognized
/// log is missing coordinates or its data does not match the event shape.
pub fn decode_log(log: &Log) -> Result<Option<DecodedEvent>> {
    let Some(topic0) = log.topic0().copied() else {
        return Ok(None);
    };

    if topic0 != InventoryAdded::SIGNATURE_HASH
        && topic0 != HistoryLogged::SIGNATURE_HASH
        && topic0 != StaffRoleGranted::SIGNATURE_HASH
    {
        return Ok(None);
    }

    let tx_hash = log.transaction_hash.unwrap_or(B256::ZERO);
    let log_index = log
        .log_index
        .ok_or_else(|| decode_err(tx_hash, 0, "log missing log_index"))?;
    let block_number = log
        .block_number
        .ok_or_else(|| decode_err(tx_hash, log_index, "log missing block_number"))?;
    if tx_hash == B256::ZERO {
        return Err(decode_err(tx_hash, log_index, "log missing transaction_hash"));
    }

    let payload = if topic0 == InventoryAdded::SIGNATURE_HASH {
        let ev = InventoryAdded::decode_log(log.as_ref(), true)
            .map_err(|e| decode_err(tx_hash, log_index, &e.to_string()))?;
        EventPayload::InventoryAdded(InventoryAddedPayload {
            index: to_u64(ev.itemIndex, tx_hash, log_index, "itemIndex")?,
            name: ev.name.clone(),
            batch_number: ev.batchNumber.clone(),
            notes: ev.notes.clone(),
            quantity: to_u64(ev.quantity, tx_hash, log_index, "quantity")?,
            expiration_date: to_u64(ev.expirationDate, tx_hash, log_index, "expirationDate")?,
            location: ev.location.clone(),
            timestamp: to_u64(ev.timestamp, tx_hash, log_index, "timestamp")?,
        })
    } else if topic0 == HistoryLogged::SIGNATURE_HASH {
        let ev = HistoryLogged::decode_log(log.as_ref(), true)
            .map_err(|e| decode_err(tx_hash, log_index, &e.to_string()))?;
        EventPayload::HistoryLogged(HistoryLoggedPayload {
            record_id: to_u64(ev.recordId, tx_hash, log_index, "recordId")?,
            action: ev.action.clone(),
            field_changed: ev.fieldChanged.clone(),
            old_value: ev.oldValue.clone(),
            new_value: ev.newValue.clone(),
            description: ev.description.clone(),
            timestamp: to_u64(ev.timestamp, tx_hash, log_index, "timestamp")?,
        })
    } else {
        let ev = StaffRoleGranted::decode_log(log.as_ref(), true)
            .map_err(|e| decode_err(tx_hash, log_index, &e.to_string()))?;
        EventPayload::StaffRoleGranted(StaffRoleGrantedPayload {
            staff: ev.staff,
            admin: ev.admin,
        })
    };

    Ok(Some(DecodedEvent {
        block_number,
        log_index,
        tx_hash,
        payload,
    }))
}

fn decode_err(tx_hash: B256, log_index: u64, reason: &str) -> SyncError {
    SyncError::Decode {
        tx_hash,
        log_index,
        reason: reason.to_string(),
    }
}

fn to_u64(
    value: alloy::primitives::U256,
    tx_hash: B256,
    log_index: u64,
    field: &str,
) -> Result<u64> {
    u64::try_from(value).map_err(|_| decode_err(tx_hash, log_index, &format!("{} out of range", field)))
}
