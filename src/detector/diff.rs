use std::collections::HashSet;

use crate::types::{SlotKey, SlotRecord, SlotSnapshot};

/// Set difference between two snapshots keyed by (date, court, time).
/// Ordering is ignored; `added` keeps the fresh snapshot's order and `removed`
/// the baseline's.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotDiff {
    pub added: Vec<SlotRecord>,
    pub removed: Vec<SlotRecord>,
}

impl SlotDiff {
    pub fn between(baseline: Option<&SlotSnapshot>, fresh: &SlotSnapshot) -> Self {
        let old: &[SlotRecord] = baseline.map(|b| b.records()).unwrap_or(&[]);

        let old_keys: HashSet<SlotKey<'_>> = old.iter().map(SlotRecord::key).collect();
        let new_keys: HashSet<SlotKey<'_>> = fresh.records().iter().map(SlotRecord::key).collect();

        let added = fresh
            .records()
            .iter()
            .filter(|r| !old_keys.contains(&r.key()))
            .cloned()
            .collect();
        let removed = old
            .iter()
            .filter(|r| !new_keys.contains(&r.key()))
            .cloned()
            .collect();

        Self { added, removed }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}
