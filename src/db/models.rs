//! Row types for the tables in `migrations/`.

use crate::types::SlotRecord;

#[derive(Debug, sqlx::FromRow)]
pub struct SlotRow {
    pub date: String,
    pub court: String,
    pub sport: String,
    pub time: String,
}

impl From<SlotRow> for SlotRecord {
    fn from(row: SlotRow) -> Self {
        SlotRecord {
            date: row.date,
            court: row.court,
            sport: row.sport,
            time: row.time,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct CycleRow {
    pub id: i64,
    pub started_at: i64,
    pub finished_at: i64,
    pub outcome: String,
    pub slots_fetched: i64,
    pub failed_dates: String,
    pub alerted: i64,
    pub notified: i64,
    pub persisted: i64,
}
