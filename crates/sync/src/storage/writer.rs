//! Projection writer: applies decoded events to the relational store.
//!
//! All writes for a single block form one transaction, and the cursor is
//! advanced inside that transaction. The `(tx_hash, log_index)` unique
//! constraint on `ledger_tx_records` is the sole concurrency control:
//! replaying any part of the stream is safe, and a concurrent backfill
//! cannot create duplicate rows.

use std::collections::BTreeMap;

use alloy::primitives::Address;
use carechain_core::{ChainStatus, EventPayload};
use sqlx::{Sqlite, Transaction};
use tracing::debug;

use super::Storage;
use crate::error::Result;
use crate::listener::events::DecodedEvent;

/// Logical table the on-chain audit trail refers to.
const AUDITED_TABLE: &str = "inventory_items";

/// Outcome counters for one `apply_events` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Events applied for the first time.
    pub applied: u64,

    /// Events skipped because their idempotency key already existed.
    pub deduped: u64,
}

impl Storage {
    /// Apply decoded events and advance the cursor to `upper_block`.
    ///
    /// Events are grouped per block and applied in `(block_number,
    /// log_index)` order; each block commits as one transaction carrying
    /// its cursor advance. A trailing guarded update covers windows whose
    /// upper bound holds no events. The cursor never regresses, so
    /// re-applying a historical window (backfill) is safe.
    pub async fn apply_events(
        &self,
        events: &[DecodedEvent],
        upper_block: u64,
    ) -> Result<ApplyReport> {
        let mut by_block: BTreeMap<u64, Vec<&DecodedEvent>> = BTreeMap::new();
        for event in events {
            by_block.entry(event.block_number).or_default().push(event);
        }

        let mut report = ApplyReport::default();

        for (block_number, mut block_events) in by_block {
            block_events.sort_by_key(|e| e.log_index);

            let mut tx = self.pool.begin().await?;

            for event in block_events {
                if Self::record_event(&mut tx, event).await? {
                    Self::project_event(&mut tx, event).await?;
                    report.applied += 1;
                } else {
                    debug!(
                        tx_hash = %event.tx_hash,
                        log_index = event.log_index,
                        "Event already applied, skipping"
                    );
                    report.deduped += 1;
                }
            }

            Self::advance_cursor_in_tx(&mut tx, block_number).await?;
            tx.commit().await?;
        }

        // Windows can end on blocks without events; the guarded update
        // still moves the cursor over them.
        let mut tx = self.pool.begin().await?;
        Self::advance_cursor_in_tx(&mut tx, upper_block).await?;
        tx.commit().await?;

        Ok(report)
    }

    /// Insert the idempotency row for `event`.
    ///
    /// Returns `false` when the `(tx_hash, log_index)` key already exists,
    /// in which case the event must not be re-projected.
    async fn record_event(
        tx: &mut Transaction<'_, Sqlite>,
        event: &DecodedEvent,
    ) -> Result<bool> {
        let kind = event.kind();
        let (entity_id, actor): (Option<i64>, Option<Address>) = match &event.payload {
            EventPayload::InventoryAdded(p) => (Some(p.index as i64), None),
            EventPayload::HistoryLogged(p) => (Some(p.record_id as i64), None),
            EventPayload::StaffRoleGranted(p) => (None, Some(p.admin)),
        };

        let payload_json = event.payload_json()?;
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            INSERT INTO ledger_tx_records (
                tx_hash, block_number, log_index,
                action_type, entity_type, entity_id, actor_address,
                payload_json, status, confirmed_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(tx_hash, log_index) DO NOTHING
            "#,
        )
        .bind(event.tx_hash.as_slice())
        .bind(event.block_number as i64)
        .bind(event.log_index as i64)
        .bind(kind.action_type())
        .bind(kind.entity_type())
        .bind(entity_id)
        .bind(actor.as_ref().map(|a| a.as_slice().to_vec()))
        .bind(payload_json)
        .bind(ChainStatus::Confirmed.as_str())
        .bind(now)
        .execute(&mut **tx)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Apply the kind-specific projection for `event`.
    async fn project_event(tx: &mut Transaction<'_, Sqlite>, event: &DecodedEvent) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        match &event.payload {
            EventPayload::InventoryAdded(p) => {
                // A row may already exist when the write side pre-inserted
                // it optimistically; only sync metadata is touched then.
                sqlx::query(
                    r#"
                    INSERT INTO inventory_items (
                        chain_index, name, batch_number, notes,
                        quantity, expiration_date, location, chain_timestamp,
                        chain_tx_hash, chain_status, last_synced_at
                    )
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 'CONFIRMED', ?)
                    ON CONFLICT(chain_index) DO UPDATE SET
                        chain_tx_hash = excluded.chain_tx_hash,
                        chain_status = 'CONFIRMED',
                        last_synced_at = excluded.last_synced_at
                    "#,
                )
                .bind(p.index as i64)
                .bind(&p.name)
                .bind(&p.batch_number)
                .bind(&p.notes)
                .bind(p.quantity as i64)
                .bind(p.expiration_date as i64)
                .bind(&p.location)
                .bind(p.timestamp as i64)
                .bind(event.tx_hash.as_slice())
                .bind(now)
                .execute(&mut **tx)
                .await?;
            }
            EventPayload::HistoryLogged(p) => {
                sqlx::query(
                    r#"
                    INSERT INTO audit_log (
                        table_name, record_id, action, field_changed,
                        old_value, new_value, description, changed_at,
                        tx_hash, log_index
                    )
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(AUDITED_TABLE)
                .bind(p.record_id as i64)
                .bind(&p.action)
                .bind(&p.field_changed)
                .bind(&p.old_value)
                .bind(&p.new_value)
                .bind(&p.description)
                .bind(p.timestamp as i64)
                .bind(event.tx_hash.as_slice())
                .bind(event.log_index as i64)
                .execute(&mut **tx)
                .await?;
            }
            EventPayload::StaffRoleGranted(_) => {
                // The ledger transaction record is the grant; consumers
                // read the latest row per staff address.
            }
        }

        Ok(())
    }

    /// Guarded cursor advance inside a write transaction. Never regresses.
    async fn advance_cursor_in_tx(
        tx: &mut Transaction<'_, Sqlite>,
        new_height: u64,
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            UPDATE sync_cursor
            SET last_processed_block = ?, updated_at = ?
            WHERE id = 1 AND last_processed_block < ?
            "#,
        )
        .bind(new_height as i64)
        .bind(now)
        .bind(new_height as i64)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::B256;
    use carechain_core::{
        HistoryLoggedPayload, InventoryAddedPayload, StaffRoleGrantedPayload,
    };
    use tempfile::NamedTempFile;

    async fn setup_storage() -> (Storage, NamedTempFile) {
        let temp_db = NamedTempFile::new().unwrap();
        let storage = Storage::new_with_path(temp_db.path()).await.unwrap();
        storage.run_migrations().await.unwrap();
        (storage, temp_db)
    }

    fn inventory_event(index: u64, block: u64, log_index: u64, tx_byte: u8) -> DecodedEvent {
        DecodedEvent {
            block_number: block,
            log_index,
            tx_hash: B256::repeat_byte(tx_byte),
            payload: EventPayload::InventoryAdded(InventoryAddedPayload {
                index,
                name: "Amoxicillin".to_string(),
                batch_number: "B-2031".to_string(),
                notes: String::new(),
                quantity: 100,
                expiration_date: 1_790_000_000,
                location: "Shelf A3".to_string(),
                timestamp: 1_758_000_000,
            }),
        }
    }

    fn history_event(record_id: u64, block: u64, log_index: u64, tx_byte: u8) -> DecodedEvent {
        DecodedEvent {
            block_number: block,
            log_index,
            tx_hash: B256::repeat_byte(tx_byte),
            payload: EventPayload::HistoryLogged(HistoryLoggedPayload {
                record_id,
                action: "UPDATE".to_string(),
                field_changed: "quantity".to_string(),
                old_value: "100".to_string(),
                new_value: "88".to_string(),
                description: "dispensed".to_string(),
                timestamp: 1_758_000_100 + log_index,
            }),
        }
    }

    #[tokio::test]
    async fn test_apply_single_inventory_event() {
        let (storage, _temp_db) = setup_storage().await;

        let event = inventory_event(1, 3, 0, 0xaa);
        let report = storage.apply_events(&[event.clone()], 5).await.unwrap();

        assert_eq!(report.applied, 1);
        assert_eq!(report.deduped, 0);
        assert_eq!(storage.get_cursor().await.unwrap().last_processed_block, 5);

        let item = storage.get_inventory_item(1).await.unwrap().unwrap();
        assert_eq!(item.name, "Amoxicillin");
        assert_eq!(item.chain_status, ChainStatus::Confirmed);
        assert_eq!(item.chain_tx_hash, Some(event.tx_hash));

        let record = storage
            .get_ledger_record(event.tx_hash, event.log_index)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.action_type, "ADD_INVENTORY");
        assert_eq!(record.entity_id, Some(1));

        storage.close().await;
    }

    #[tokio::test]
    async fn test_replay_is_idempotent() {
        let (storage, _temp_db) = setup_storage().await;

        let events = vec![inventory_event(1, 3, 0, 0xaa), history_event(1, 3, 1, 0xaa)];

        let first = storage.apply_events(&events, 5).await.unwrap();
        assert_eq!(first.applied, 2);

        let second = storage.apply_events(&events, 5).await.unwrap();
        assert_eq!(second.applied, 0);
        assert_eq!(second.deduped, 2);

        let stats = storage.stats().await.unwrap();
        assert_eq!(stats.ledger_record_count, 2);
        assert_eq!(stats.inventory_count, 1);
        assert_eq!(stats.audit_count, 1);

        storage.close().await;
    }

    #[tokio::test]
    async fn test_pending_row_transitions_to_confirmed() {
        let (storage, _temp_db) = setup_storage().await;

        // Optimistic pre-insertion by the write side.
        storage
            .insert_pending_item(4, "Ibuprofen", "B-88", 50, 1_780_000_000, "Shelf B1")
            .await
            .unwrap();

        let before = storage.get_inventory_item(4).await.unwrap().unwrap();
        assert_eq!(before.chain_status, ChainStatus::Pending);
        assert_eq!(before.chain_tx_hash, None);

        let mut event = inventory_event(4, 10, 0, 0xbc);
        if let EventPayload::InventoryAdded(ref mut p) = event.payload {
            p.name = "Ibuprofen".to_string();
        }
        storage.apply_events(&[event.clone()], 10).await.unwrap();

        let after = storage.get_inventory_item(4).await.unwrap().unwrap();
        assert_eq!(after.chain_status, ChainStatus::Confirmed);
        assert_eq!(after.chain_tx_hash, Some(event.tx_hash));
        // Domain columns written by the write side are left alone.
        assert_eq!(after.name, before.name);
        assert_eq!(after.quantity, before.quantity);

        storage.close().await;
    }

    #[tokio::test]
    async fn test_audit_entries_append_in_order() {
        let (storage, _temp_db) = setup_storage().await;

        let events = vec![
            history_event(7, 20, 0, 0xd0),
            history_event(7, 20, 1, 0xd0),
            history_event(7, 21, 0, 0xd1),
        ];
        storage.apply_events(&events, 21).await.unwrap();

        let entries = storage.list_audit_entries(7).await.unwrap();
        assert_eq!(entries.len(), 3);
        assert!(entries.windows(2).all(|w| w[0].changed_at <= w[1].changed_at));
        assert_eq!(entries[0].table_name, AUDITED_TABLE);

        storage.close().await;
    }

    #[tokio::test]
    async fn test_staff_grant_writes_only_ledger_record() {
        let (storage, _temp_db) = setup_storage().await;

        let staff = Address::repeat_byte(0x0a);
        let admin = Address::repeat_byte(0x0b);
        let event = DecodedEvent {
            block_number: 12,
            log_index: 0,
            tx_hash: B256::repeat_byte(0xee),
            payload: EventPayload::StaffRoleGranted(StaffRoleGrantedPayload { staff, admin }),
        };

        storage.apply_events(&[event], 12).await.unwrap();

        let stats = storage.stats().await.unwrap();
        assert_eq!(stats.ledger_record_count, 1);
        assert_eq!(stats.inventory_count, 0);
        assert_eq!(stats.audit_count, 0);

        let grant = storage.latest_staff_grant(staff).await.unwrap().unwrap();
        assert_eq!(grant.action_type, "GRANT_STAFF_ROLE");
        assert_eq!(grant.actor_address, Some(admin));
        assert!(grant.payload_json.contains("staff"));

        storage.close().await;
    }

    #[tokio::test]
    async fn test_empty_window_still_advances_cursor() {
        let (storage, _temp_db) = setup_storage().await;

        let report = storage.apply_events(&[], 17).await.unwrap();
        assert_eq!(report, ApplyReport::default());
        assert_eq!(storage.get_cursor().await.unwrap().last_processed_block, 17);

        storage.close().await;
    }

    #[tokio::test]
    async fn test_historical_replay_does_not_regress_cursor() {
        let (storage, _temp_db) = setup_storage().await;

        storage
            .apply_events(&[inventory_event(1, 90, 0, 0xaa)], 100)
            .await
            .unwrap();
        assert_eq!(
            storage.get_cursor().await.unwrap().last_processed_block,
            100
        );

        // Backfill re-applies an old window with a lower upper bound.
        let report = storage
            .apply_events(&[inventory_event(1, 90, 0, 0xaa)], 90)
            .await
            .unwrap();
        assert_eq!(report.deduped, 1);
        assert_eq!(
            storage.get_cursor().await.unwrap().last_processed_block,
            100
        );

        storage.close().await;
    }
}
