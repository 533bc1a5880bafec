use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::api::health::HealthState;
use crate::config::Config;
use crate::detector::{ChangeDetector, Verdict};
use crate::error::{AppError, Result};
use crate::fetcher::{polling_window, SlotFetcher};
use crate::notifier::Notifier;
use crate::store::SnapshotStore;
use crate::types::{CycleOutcome, CycleReport, SlotSnapshot};

/// Drives the fetch → compare → notify → persist cycle on a fixed interval.
///
/// The first tick fires immediately, so a cycle runs at startup. Each tick runs
/// its cycle on a separate task; a tick that lands while a cycle is still in
/// flight is dropped rather than queued.
pub struct SlotWatcher {
    cfg: Config,
    fetcher: SlotFetcher,
    detector: ChangeDetector,
    notifier: Notifier,
    store: Arc<dyn SnapshotStore>,
    health: Arc<HealthState>,
    report_tx: Option<mpsc::Sender<CycleReport>>,
    in_flight: Mutex<()>,
}

impl SlotWatcher {
    pub fn new(
        cfg: Config,
        fetcher: SlotFetcher,
        notifier: Notifier,
        store: Arc<dyn SnapshotStore>,
        health: Arc<HealthState>,
        report_tx: Option<mpsc::Sender<CycleReport>>,
    ) -> Self {
        let detector = ChangeDetector::new(cfg.compare_mode);
        Self {
            cfg,
            fetcher,
            detector,
            notifier,
            store,
            health,
            report_tx,
            in_flight: Mutex::new(()),
        }
    }

    pub async fn run(self: Arc<Self>) {
        let mut ticker = interval(Duration::from_secs(self.cfg.poll_interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            interval_secs = self.cfg.poll_interval_secs,
            window_days = self.cfg.window_days,
            mode = %self.detector.mode(),
            "Slot watcher started",
        );

        loop {
            ticker.tick().await;
            let watcher = Arc::clone(&self);
            tokio::spawn(async move {
                // In-flight skips are already logged and counted.
                let _ = watcher.try_run_cycle().await;
            });
        }
    }

    /// Run one cycle now unless another is still running.
    pub async fn try_run_cycle(&self) -> Result<CycleReport> {
        let Ok(_guard) = self.in_flight.try_lock() else {
            warn!("Previous cycle still in flight, skipping this one");
            self.health.inc_skipped();
            return Err(AppError::CycleInFlight);
        };

        let report = self.run_cycle(Utc::now().date_naive()).await;
        self.health.record_cycle(&report);

        self.forward_to_ledger(&report);
        Ok(report)
    }

    /// Never blocks the cycle: a full or closed ledger channel drops the report.
    fn forward_to_ledger(&self, report: &CycleReport) {
        let Some(tx) = &self.report_tx else {
            return;
        };
        match tx.try_send(report.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(outcome = %report.outcome, "Cycle ledger channel full, report dropped");
            }
            Err(TrySendError::Closed(_)) => {
                error!(outcome = %report.outcome, "Cycle ledger writer has stopped, report dropped");
            }
        }
    }

    /// Hold the overlap guard as a running cycle would.
    #[cfg(test)]
    pub(crate) async fn hold_in_flight(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.in_flight.lock().await
    }

    /// One full cycle for the window starting at `today`. Never fails: every
    /// error is logged and reflected in the report.
    pub async fn run_cycle(&self, today: NaiveDate) -> CycleReport {
        let started_at = Utc::now();

        let baseline = match self.store.load().await {
            Ok(baseline) => baseline,
            Err(e) => {
                error!("Failed to load baseline, skipping cycle: {e}");
                return CycleReport {
                    started_at,
                    finished_at: Utc::now(),
                    outcome: CycleOutcome::StoreUnavailable,
                    slots_fetched: 0,
                    failed_dates: Vec::new(),
                    alerted: 0,
                    notified: false,
                    persisted: false,
                };
            }
        };
        self.health
            .set_baseline_size(baseline.as_ref().map_or(0, SlotSnapshot::len));

        let dates = polling_window(today, self.cfg.window_days);
        let fetched = self.fetcher.fetch_window(&dates).await;
        let fresh = fetched.snapshot;

        let mut report = CycleReport {
            started_at,
            finished_at: started_at,
            outcome: CycleOutcome::Unchanged,
            slots_fetched: fresh.len(),
            failed_dates: fetched.failed_dates,
            alerted: 0,
            notified: false,
            persisted: false,
        };

        match self.detector.evaluate(&fresh, baseline.as_ref()) {
            Verdict::NoSlots => {
                info!("No available slots");
                report.outcome = CycleOutcome::NoSlots;
            }
            Verdict::Unchanged => {
                info!(slots = fresh.len(), "No changes in slot availability");
            }
            Verdict::Changed { alert, diff } => {
                report.outcome = CycleOutcome::Changed;
                info!(
                    slots = fresh.len(),
                    added = diff.added.len(),
                    removed = diff.removed.len(),
                    "Slot availability changed: +{} -{}",
                    diff.added.len(),
                    diff.removed.len(),
                );

                // Notify before persisting: a failed save must not swallow an alert.
                if alert.is_empty() {
                    info!("No newly opened slots, refreshing baseline without alert");
                } else {
                    report.alerted = alert.len();
                    match self.notifier.notify(&alert).await {
                        Ok(()) => report.notified = true,
                        Err(e) => error!("Failed to send notification: {e}"),
                    }
                }

                match self.store.save(&fresh).await {
                    Ok(()) => {
                        report.persisted = true;
                        self.health.set_baseline_size(fresh.len());
                    }
                    Err(e) => error!("Failed to persist baseline, it stays stale: {e}"),
                }
            }
        }

        report.finished_at = Utc::now();
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::fetcher::ScheduleSource;
    use crate::notifier::{Mailer, OutboundEmail};
    use crate::store::memory::MemorySnapshotStore;
    use crate::types::SlotRecord;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    const TODAY: &str = "2025-04-20";

    /// Serves configured courts per date; any other date has no courts.
    #[derive(Default)]
    struct FakeSource {
        days: StdMutex<HashMap<String, serde_json::Value>>,
    }

    impl FakeSource {
        fn set_day(&self, date: &str, courts: serde_json::Value) {
            self.days.lock().unwrap().insert(date.to_string(), courts);
        }
    }

    #[async_trait]
    impl ScheduleSource for FakeSource {
        async fn fetch_day(&self, date: &str) -> Result<serde_json::Value> {
            let courts = self
                .days
                .lock()
                .unwrap()
                .get(date)
                .cloned()
                .unwrap_or_else(|| json!([]));
            Ok(json!({ "dates": { (date): courts } }))
        }
    }

    #[derive(Default)]
    struct RecordingMailer {
        sent: StdMutex<Vec<OutboundEmail>>,
        fail: bool,
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, email: &OutboundEmail) -> Result<()> {
            if self.fail {
                return Err(AppError::Io(std::io::Error::other("smtp down")));
            }
            self.sent.lock().unwrap().push(email.clone());
            Ok(())
        }
    }

    fn tennis_court(number: u32, reservable: &[&str]) -> serde_json::Value {
        let schedule: serde_json::Map<String, serde_json::Value> = reservable
            .iter()
            .map(|t| (t.to_string(), json!({ "referenceType": "RESERVABLE" })))
            .collect();
        json!({ "courtNumber": number, "sports": [{ "name": "Tennis" }], "schedule": schedule })
    }

    fn test_config() -> Config {
        Config::from_lookup(|key| match key {
            "LOCATION_ID" => Some("venue-1".to_string()),
            "DRY_RUN" => Some("true".to_string()),
            "EMAIL_TO" => Some("you@example.com".to_string()),
            _ => None,
        })
        .unwrap()
    }

    struct Harness {
        source: Arc<FakeSource>,
        mailer: Arc<RecordingMailer>,
        store: Arc<MemorySnapshotStore>,
        health: Arc<HealthState>,
        watcher: SlotWatcher,
    }

    fn harness(mailer: RecordingMailer, store: MemorySnapshotStore) -> Harness {
        let cfg = test_config();
        let source = Arc::new(FakeSource::default());
        let mailer = Arc::new(mailer);
        let store = Arc::new(store);
        let health = Arc::new(HealthState::new());
        let watcher = SlotWatcher::new(
            cfg.clone(),
            SlotFetcher::new(source.clone()),
            Notifier::new(mailer.clone(), &cfg),
            store.clone(),
            health.clone(),
            None,
        );
        Harness { source, mailer, store, health, watcher }
    }

    fn today() -> NaiveDate {
        NaiveDate::parse_from_str(TODAY, "%Y-%m-%d").unwrap()
    }

    fn one_slot() -> SlotSnapshot {
        SlotSnapshot::new(vec![SlotRecord {
            date: TODAY.to_string(),
            court: "1".to_string(),
            sport: "Tennis".to_string(),
            time: "18:00".to_string(),
        }])
    }

    #[tokio::test]
    async fn first_run_alerts_once_and_persists_snapshot() {
        let h = harness(RecordingMailer::default(), MemorySnapshotStore::default());
        h.source.set_day(TODAY, json!([tennis_court(1, &["18:00"])]));

        let report = h.watcher.run_cycle(today()).await;

        assert_eq!(report.outcome, CycleOutcome::Changed);
        assert!(report.notified && report.persisted);
        assert_eq!(h.mailer.sent.lock().unwrap().len(), 1);
        assert_eq!(h.store.current(), Some(one_slot()));
        assert_eq!(h.store.save_count(), 1);
    }

    #[tokio::test]
    async fn repeat_cycle_with_same_slots_is_silent() {
        let h = harness(RecordingMailer::default(), MemorySnapshotStore::default());
        h.source.set_day(TODAY, json!([tennis_court(1, &["18:00"])]));

        h.watcher.run_cycle(today()).await;
        let report = h.watcher.run_cycle(today()).await;

        assert_eq!(report.outcome, CycleOutcome::Unchanged);
        assert_eq!(h.mailer.sent.lock().unwrap().len(), 1);
        assert_eq!(h.store.save_count(), 1);
    }

    #[tokio::test]
    async fn empty_window_keeps_existing_baseline() {
        let h = harness(
            RecordingMailer::default(),
            MemorySnapshotStore::with_baseline(one_slot()),
        );

        let report = h.watcher.run_cycle(today()).await;

        assert_eq!(report.outcome, CycleOutcome::NoSlots);
        assert!(h.mailer.sent.lock().unwrap().is_empty());
        assert_eq!(h.store.current(), Some(one_slot()));
        assert_eq!(h.store.save_count(), 0);
    }

    #[tokio::test]
    async fn mail_failure_does_not_block_persistence() {
        let h = harness(
            RecordingMailer { fail: true, ..Default::default() },
            MemorySnapshotStore::default(),
        );
        h.source.set_day(TODAY, json!([tennis_court(1, &["18:00"])]));

        let report = h.watcher.run_cycle(today()).await;

        assert!(!report.notified);
        assert!(report.persisted);
        assert_eq!(h.store.current(), Some(one_slot()));
    }

    #[tokio::test]
    async fn save_failure_still_sends_alert() {
        let h = harness(
            RecordingMailer::default(),
            MemorySnapshotStore { fail_save: true, ..Default::default() },
        );
        h.source.set_day(TODAY, json!([tennis_court(1, &["18:00"])]));

        let report = h.watcher.run_cycle(today()).await;

        assert!(report.notified);
        assert!(!report.persisted);
        assert_eq!(h.mailer.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unreadable_baseline_skips_cycle() {
        let h = harness(
            RecordingMailer::default(),
            MemorySnapshotStore { fail_load: true, ..Default::default() },
        );
        h.source.set_day(TODAY, json!([tennis_court(1, &["18:00"])]));

        let report = h.watcher.run_cycle(today()).await;

        assert_eq!(report.outcome, CycleOutcome::StoreUnavailable);
        assert!(h.mailer.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn overlapping_cycle_is_skipped() {
        let h = harness(RecordingMailer::default(), MemorySnapshotStore::default());

        let guard = h.watcher.hold_in_flight().await;
        let err = h.watcher.try_run_cycle().await.unwrap_err();
        assert!(matches!(err, AppError::CycleInFlight));
        assert_eq!(h.health.cycles_skipped(), 1);
        assert_eq!(h.health.cycles_run(), 0);
        drop(guard);

        h.watcher.try_run_cycle().await.unwrap();
        assert_eq!(h.health.cycles_run(), 1);
    }

    #[tokio::test]
    async fn completed_cycles_reach_the_ledger_channel() {
        let (tx, mut rx) = mpsc::channel(4);
        let watcher = ledger_watcher(tx);

        watcher.try_run_cycle().await.unwrap();

        let report = rx.try_recv().unwrap();
        assert_eq!(report.outcome, CycleOutcome::NoSlots);
        assert_eq!(report.failed_dates, Vec::<String>::new());
    }

    fn ledger_watcher(tx: mpsc::Sender<CycleReport>) -> SlotWatcher {
        let cfg = test_config();
        SlotWatcher::new(
            cfg.clone(),
            SlotFetcher::new(Arc::new(FakeSource::default())),
            Notifier::new(Arc::new(RecordingMailer::default()), &cfg),
            Arc::new(MemorySnapshotStore::default()),
            Arc::new(HealthState::new()),
            Some(tx),
        )
    }

    #[tokio::test]
    async fn stopped_ledger_writer_does_not_fail_the_cycle() {
        let (tx, rx) = mpsc::channel(4);
        drop(rx);
        let watcher = ledger_watcher(tx);

        let report = watcher.try_run_cycle().await.unwrap();
        assert_eq!(report.outcome, CycleOutcome::NoSlots);
    }

    #[tokio::test]
    async fn full_ledger_channel_drops_newest_report() {
        let (tx, mut rx) = mpsc::channel(1);
        let watcher = ledger_watcher(tx);

        watcher.try_run_cycle().await.unwrap();
        watcher.try_run_cycle().await.unwrap();

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }
}
