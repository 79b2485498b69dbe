//! Cursor storage operations.
//!
//! The cursor is the commit point of the whole pipeline: it never regresses
//! and is only advanced after the writer has committed every event up to
//! and including the new height.

use sqlx::Row;

use super::{CursorRecord, Storage};
use crate::error::{Result, SyncError};

impl Storage {
    /// Get the current cursor.
    pub async fn get_cursor(&self) -> Result<CursorRecord> {
        let row = sqlx::query(
            r#"
            SELECT last_processed_block, started_at, updated_at
            FROM sync_cursor
            WHERE id = 1
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(CursorRecord {
            last_processed_block: row.get::<i64, _>("last_processed_block") as u64,
            started_at: row.get("started_at"),
            updated_at: row.get("updated_at"),
        })
    }

    /// Advance the cursor to `new_height`.
    ///
    /// Fails with [`SyncError::CursorRegression`] if `new_height` is below
    /// the persisted value. Equal heights are a no-op.
    pub async fn advance_cursor(&self, new_height: u64) -> Result<()> {
        let current = self.get_cursor().await?.last_processed_block;
        if new_height < current {
            return Err(SyncError::CursorRegression {
                requested: new_height,
                current,
            });
        }

        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            UPDATE sync_cursor
            SET last_processed_block = ?, updated_at = ?
            WHERE id = 1 AND last_processed_block <= ?
            "#,
        )
        .bind(new_height as i64)
        .bind(now)
        .bind(new_height as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Seed the cursor on a fresh database so that syncing begins at
    /// `start_block`.
    ///
    /// The poller fetches from `cursor + 1`, so the seeded value is
    /// `start_block - 1`.
    pub async fn initialize_cursor(&self, start_block: u64) -> Result<()> {
        let initial = start_block.saturating_sub(1);
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            UPDATE sync_cursor
            SET last_processed_block = ?, started_at = ?, updated_at = ?
            WHERE id = 1
            "#,
        )
        .bind(initial as i64)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
