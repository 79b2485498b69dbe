//! Ledger transaction record queries.
//!
//! Writes happen in [`crate::storage::writer`]; this module is the read
//! side used by the status surface, staff-role consumers, and tests.

use alloy::primitives::{Address, B256};
use sqlx::Row;

use super::{LedgerTxRecord, Storage};
use crate::error::{Result, SyncError};

impl Storage {
    /// Fetch one record by its idempotency key.
    pub async fn get_ledger_record(
        &self,
        tx_hash: B256,
        log_index: u64,
    ) -> Result<Option<LedgerTxRecord>> {
        let row = sqlx::query(
            r#"
            SELECT tx_hash, block_number, log_index,
                   action_type, entity_type, entity_id, actor_address,
                   payload_json, status, confirmed_at
            FROM ledger_tx_records
            WHERE tx_hash = ? AND log_index = ?
            "#,
        )
        .bind(tx_hash.as_slice())
        .bind(log_index as i64)
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_ledger_record).transpose()
    }

    /// Count of rows sharing an idempotency key. Always 0 or 1 given the
    /// unique constraint; kept queryable so invariant tests can assert it.
    pub async fn count_ledger_records_for_key(
        &self,
        tx_hash: B256,
        log_index: u64,
    ) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM ledger_tx_records WHERE tx_hash = ? AND log_index = ?",
        )
        .bind(tx_hash.as_slice())
        .bind(log_index as i64)
        .fetch_one(&self.pool)
        .await?;

        Ok(count as u64)
    }

    /// Latest role grant observed for `staff`, if any.
    ///
    /// The grant rows themselves are the authoritative state; the latest
    /// row per address wins.
    pub async fn latest_staff_grant(&self, staff: Address) -> Result<Option<LedgerTxRecord>> {
        // Compare against the same JSON encoding the writer produced.
        let staff_json = serde_json::to_value(staff)?;
        let staff_str = staff_json.as_str().unwrap_or_default().to_string();

        let row = sqlx::query(
            r#"
            SELECT tx_hash, block_number, log_index,
                   action_type, entity_type, entity_id, actor_address,
                   payload_json, status, confirmed_at
            FROM ledger_tx_records
            WHERE action_type = 'GRANT_STAFF_ROLE'
              AND json_extract(payload_json, '$.staff') = ?
            ORDER BY block_number DESC, log_index DESC
            LIMIT 1
            "#,
        )
        .bind(staff_str)
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_ledger_record).transpose()
    }
}

fn row_to_ledger_record(row: sqlx::sqlite::SqliteRow) -> Result<LedgerTxRecord> {
    let tx_hash_bytes: Vec<u8> = row.get("tx_hash");
    let actor_bytes: Option<Vec<u8>> = row.get("actor_address");
    let status_str: String = row.get("status");

    let actor_address = match actor_bytes {
        Some(bytes) if bytes.len() == Address::len_bytes() => {
            Some(Address::from_slice(&bytes))
        }
        Some(bytes) => {
            return Err(SyncError::Internal(format!(
                "actor_address has {} bytes, expected {}",
                bytes.len(),
                Address::len_bytes()
            )))
        }
        None => None,
    };

    Ok(LedgerTxRecord {
        tx_hash: B256::from_slice(&tx_hash_bytes),
        block_number: row.get::<i64, _>("block_number") as u64,
        log_index: row.get::<i64, _>("log_index") as u64,
        action_type: row.get("action_type"),
        entity_type: row.get("entity_type"),
        entity_id: row.get("entity_id"),
        actor_address,
        payload_json: row.get("payload_json"),
        status: status_str
            .parse()
            .map_err(|e| SyncError::Internal(format!("bad status column: {}", e)))?,
        confirmed_at: row.get("confirmed_at"),
    })
}
