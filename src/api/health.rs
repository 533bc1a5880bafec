//! Shared health state for the /health endpoint.
//! Updated by the watcher at the end of every cycle.

use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::types::{CycleOutcome, CycleReport};

#[derive(Default)]
pub struct HealthState {
    pub cycles_run: AtomicU64,
    /// Ticks dropped because the previous cycle was still in flight.
    pub cycles_skipped: AtomicU64,
    pub notifications_sent: AtomicU64,
    /// Unix millis of the last finished cycle (0 = none yet).
    pub last_cycle_at_ms: AtomicI64,
    /// Slots in the baseline as of the last cycle that read or wrote it.
    pub baseline_size: AtomicUsize,
    last_outcome: Mutex<Option<CycleOutcome>>,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_cycle(&self, report: &CycleReport) {
        self.cycles_run.fetch_add(1, Ordering::Relaxed);
        if report.notified {
            self.notifications_sent.fetch_add(1, Ordering::Relaxed);
        }
        self.last_cycle_at_ms
            .store(report.finished_at.timestamp_millis(), Ordering::Relaxed);
        if let Ok(mut last) = self.last_outcome.lock() {
            *last = Some(report.outcome);
        }
    }

    pub fn inc_skipped(&self) {
        self.cycles_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_baseline_size(&self, n: usize) {
        self.baseline_size.store(n, Ordering::Relaxed);
    }

    pub fn cycles_run(&self) -> u64 {
        self.cycles_run.load(Ordering::Relaxed)
    }

    pub fn cycles_skipped(&self) -> u64 {
        self.cycles_skipped.load(Ordering::Relaxed)
    }

    pub fn notifications_sent(&self) -> u64 {
        self.notifications_sent.load(Ordering::Relaxed)
    }

    pub fn last_cycle_at_ms(&self) -> i64 {
        self.last_cycle_at_ms.load(Ordering::Relaxed)
    }

    pub fn baseline_size(&self) -> usize {
        self.baseline_size.load(Ordering::Relaxed)
    }

    pub fn last_outcome(&self) -> Option<CycleOutcome> {
        self.last_outcome.lock().ok().and_then(|o| *o)
    }
}
