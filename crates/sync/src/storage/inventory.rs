//! Inventory projection queries.

use alloy::primitives::B256;
use sqlx::Row;

use super::{InventoryItemRow, Storage};
use crate::error::{Result, SyncError};

impl Storage {
    /// Fetch one projected item by its chain-assigned index.
    pub async fn get_inventory_item(&self, chain_index: u64) -> Result<Option<InventoryItemRow>> {
        let row = sqlx::query(
            r#"
            SELECT chain_index, name, batch_number, notes,
                   quantity, expiration_date, location, chain_timestamp,
                   chain_tx_hash, chain_status, last_synced_at
            FROM inventory_items
            WHERE chain_index = ?
            "#,
        )
        .bind(chain_index as i64)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else { return Ok(None) };

        let tx_hash_bytes: Option<Vec<u8>> = row.get("chain_tx_hash");
        let status_str: String = row.get("chain_status");

        Ok(Some(InventoryItemRow {
            chain_index: row.get::<i64, _>("chain_index") as u64,
            name: row.get("name"),
            batch_number: row.get("batch_number"),
            notes: row.get("notes"),
            quantity: row.get::<i64, _>("quantity") as u64,
            expiration_date: row.get("expiration_date"),
            location: row.get("location"),
            chain_timestamp: row.get("chain_timestamp"),
            chain_tx_hash: tx_hash_bytes.map(|b| B256::from_slice(&b)),
            chain_status: status_str
                .parse()
                .map_err(|e| SyncError::Internal(format!("bad chain_status column: {}", e)))?,
            last_synced_at: row.get("last_synced_at"),
        }))
    }

    /// Pre-insert a `PENDING` row on behalf of the write side.
    ///
    /// The platform's request path inserts optimistically while its ledger
    /// transaction is in flight; the synchronizer later flips the row to
    /// `CONFIRMED` when the event is observed.
    pub async fn insert_pending_item(
        &self,
        chain_index: u64,
        name: &str,
        batch_number: &str,
        quantity: u64,
        expiration_date: i64,
        location: &str,
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO inventory_items (
                chain_index, name, batch_number, notes,
                quantity, expiration_date, location, chain_timestamp,
                chain_tx_hash, chain_status, last_synced_at
            )
            VALUES (?, ?, ?, '', ?, ?, ?, 0, NULL, 'PENDING', ?)
            "#,
        )
        .bind(chain_index as i64)
        .bind(name)
        .bind(batch_number)
        .bind(quantity as i64)
        .bind(expiration_date)
        .bind(location)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
