use tracing::debug;

use crate::config::CompareMode;
use crate::detector::diff::SlotDiff;
use crate::types::{SlotRecord, SlotSnapshot};

/// True when `fresh` differs from `baseline` by canonical serialization.
/// Order-sensitive and field-complete. An absent baseline differs from anything.
pub fn detect_change(fresh: &SlotSnapshot, baseline: Option<&SlotSnapshot>) -> bool {
    match baseline {
        None => true,
        Some(old) => fresh.canonical() != old.canonical(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Nothing reservable anywhere in the window. Never alerts, never persists.
    NoSlots,
    Unchanged,
    /// The fresh snapshot replaces the baseline. `alert` is what goes in the
    /// email; it may be empty in `added` mode when slots only disappeared.
    Changed { alert: Vec<SlotRecord>, diff: SlotDiff },
}

pub struct ChangeDetector {
    mode: CompareMode,
}

impl ChangeDetector {
    pub fn new(mode: CompareMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> CompareMode {
        self.mode
    }

    pub fn evaluate(&self, fresh: &SlotSnapshot, baseline: Option<&SlotSnapshot>) -> Verdict {
        if fresh.is_empty() {
            return Verdict::NoSlots;
        }

        let diff = SlotDiff::between(baseline, fresh);
        debug!(
            mode = %self.mode,
            added = diff.added.len(),
            removed = diff.removed.len(),
            "Compared {} fresh slots against baseline of {}",
            fresh.len(),
            baseline.map_or(0, SlotSnapshot::len),
        );

        match self.mode {
            CompareMode::Strict => {
                if detect_change(fresh, baseline) {
                    Verdict::Changed {
                        alert: fresh.records().to_vec(),
                        diff,
                    }
                } else {
                    Verdict::Unchanged
                }
            }
            CompareMode::Added => {
                if diff.is_empty() {
                    Verdict::Unchanged
                } else {
                    Verdict::Changed {
                        alert: diff.added.clone(),
                        diff,
                    }
                }
            }
        }
    }
}
