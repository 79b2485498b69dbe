//! Audit trail queries.

use alloy::primitives::B256;
use sqlx::Row;

use super::{AuditEntryRow, Storage};
use crate::error::Result;

impl Storage {
    /// All audit entries for `record_id`, oldest first.
    pub async fn list_audit_entries(&self, record_id: u64) -> Result<Vec<AuditEntryRow>> {
        let rows = sqlx::query(
            r#"
            SELECT id, table_name, record_id, action, field_changed,
                   old_value, new_value, description, changed_at,
                   tx_hash, log_index
            FROM audit_log
            WHERE record_id = ?
            ORDER BY changed_at ASC, id ASC
            "#,
        )
        .bind(record_id as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let tx_hash_bytes: Vec<u8> = row.get("tx_hash");
                AuditEntryRow {
                    id: row.get("id"),
                    table_name: row.get("table_name"),
                    record_id: row.get::<i64, _>("record_id") as u64,
                    action: row.get("action"),
                    field_changed: row.get("field_changed"),
                    old_value: row.get("old_value"),
                    new_value: row.get("new_value"),
                    description: row.get("description"),
                    changed_at: row.get("changed_at"),
                    tx_hash: B256::from_slice(&tx_hash_bytes),
                    log_index: row.get::<i64, _>("log_index") as u64,
                }
            })
            .collect())
    }
}
