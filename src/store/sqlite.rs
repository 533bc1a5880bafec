use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use crate::db::models::SlotRow;
use crate::error::Result;
use crate::store::SnapshotStore;
use crate::types::{SlotRecord, SlotSnapshot};

/// Baseline kept in the `slots` table, one row per record, keyed by position.
/// The `baseline_meta` row records that a save happened, so an empty baseline
/// loads back as `Some(empty)`.
pub struct SqliteSnapshotStore {
    pool: sqlx::SqlitePool,
}

impl SqliteSnapshotStore {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SnapshotStore for SqliteSnapshotStore {
    async fn load(&self) -> Result<Option<SlotSnapshot>> {
        let saved: Option<(i64,)> = sqlx::query_as("SELECT slots FROM baseline_meta WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;
        if saved.is_none() {
            return Ok(None);
        }

        let rows: Vec<SlotRow> = sqlx::query_as(
            "SELECT date, court, sport, time FROM slots ORDER BY position",
        )
        .fetch_all(&self.pool)
        .await?;

        let records: Vec<SlotRecord> = rows.into_iter().map(SlotRecord::from).collect();
        Ok(Some(SlotSnapshot::new(records)))
    }

    async fn save(&self, snapshot: &SlotSnapshot) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM slots").execute(&mut *tx).await?;
        for (position, slot) in snapshot.records().iter().enumerate() {
            sqlx::query(
                "INSERT INTO slots (position, date, court, sport, time) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(position as i64)
            .bind(&slot.date)
            .bind(&slot.court)
            .bind(&slot.sport)
            .bind(&slot.time)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            r#"
            INSERT INTO baseline_meta (id, saved_at, slots) VALUES (1, ?, ?)
            ON CONFLICT (id) DO UPDATE SET saved_at = excluded.saved_at, slots = excluded.slots
            "#,
        )
        .bind(Utc::now().timestamp_millis())
        .bind(snapshot.len() as i64)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!(slots = snapshot.len(), "Baseline replaced in SQLite");
        Ok(())
    }
}
