use tokio::sync::mpsc;
use tracing::error;

use crate::error::Result;
use crate::types::CycleReport;

/// Receives CycleReports from the watcher and appends them to the `cycles` table.
/// Runs as a dedicated background task so ledger writes never delay a cycle.
pub struct DbWriter {
    pool: sqlx::SqlitePool,
    report_rx: mpsc::Receiver<CycleReport>,
}

impl DbWriter {
    pub fn new(pool: sqlx::SqlitePool, report_rx: mpsc::Receiver<CycleReport>) -> Self {
        Self { pool, report_rx }
    }

    pub async fn run(mut self) {
        while let Some(report) = self.report_rx.recv().await {
            if let Err(e) = write_cycle(&self.pool, &report).await {
                error!("DB write error: {e}");
            }
        }
    }
}

pub async fn write_cycle(pool: &sqlx::SqlitePool, r: &CycleReport) -> Result<()> {
    let failed_dates = serde_json::to_string(&r.failed_dates)?;

    sqlx::query(
        r#"
        INSERT INTO cycles (
            started_at, finished_at, outcome, slots_fetched,
            failed_dates, alerted, notified, persisted
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(r.started_at.timestamp_millis())
    .bind(r.finished_at.timestamp_millis())
    .bind(r.outcome.to_string())
    .bind(r.slots_fetched as i64)
    .bind(failed_dates)
    .bind(r.alerted as i64)
    .bind(i64::from(r.notified))
    .bind(i64::from(r.persisted))
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connect_in_memory;
    use crate::db::models::CycleRow;
    use crate::types::CycleOutcome;
    use chrono::Utc;

    fn report(outcome: CycleOutcome) -> CycleReport {
        let now = Utc::now();
        CycleReport {
            started_at: now,
            finished_at: now,
            outcome,
            slots_fetched: 4,
            failed_dates: vec!["2025-04-22".to_string()],
            alerted: 4,
            notified: true,
            persisted: true,
        }
    }

    #[tokio::test]
    async fn writer_drains_channel_into_cycles_table() {
        let pool = connect_in_memory().await.unwrap();
        let (tx, rx) = mpsc::channel(4);
        let writer = DbWriter::new(pool.clone(), rx);

        tx.send(report(CycleOutcome::Changed)).await.unwrap();
        tx.send(report(CycleOutcome::Unchanged)).await.unwrap();
        drop(tx);
        writer.run().await;

        let rows: Vec<CycleRow> = sqlx::query_as("SELECT * FROM cycles ORDER BY id")
            .fetch_all(&pool)
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].outcome, "changed");
        assert_eq!(rows[0].failed_dates, r#"["2025-04-22"]"#);
        assert_eq!(rows[0].notified, 1);
        assert_eq!(rows[1].outcome, "unchanged");
    }
}
