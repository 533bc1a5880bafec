use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Slots
// ---------------------------------------------------------------------------

/// One reservable time block on a court for a given day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotRecord {
    /// ISO calendar date, `YYYY-MM-DD`.
    pub date: String,
    pub court: String,
    /// Comma-joined activity names for the court.
    pub sport: String,
    /// Upstream time-block key, e.g. `18:00`.
    pub time: String,
}

impl SlotRecord {
    pub fn key(&self) -> SlotKey<'_> {
        SlotKey {
            date: &self.date,
            court: &self.court,
            time: &self.time,
        }
    }
}

/// Identity of a slot for set comparison. Sport is a property of the court
/// listing, not of the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotKey<'a> {
    pub date: &'a str,
    pub court: &'a str,
    pub time: &'a str,
}

/// All reservable slots seen across the polling window in one cycle, in fetch
/// order. Equality is order-sensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotSnapshot(Vec<SlotRecord>);

impl SlotSnapshot {
    pub fn new(records: Vec<SlotRecord>) -> Self {
        Self(records)
    }

    pub fn records(&self) -> &[SlotRecord] {
        &self.0
    }

    pub fn into_records(self) -> Vec<SlotRecord> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Compact JSON of the ordered record list. Two snapshots are the same
    /// baseline iff these strings are byte-identical.
    pub fn canonical(&self) -> String {
        // Only string fields: serialization cannot fail.
        serde_json::to_string(&self.0).unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Upstream schedule response
// ---------------------------------------------------------------------------

/// `GET /locations/{id}/schedule?startDate=...` body.
///
/// `dates` keeps the upstream key order (serde_json `preserve_order`).
#[derive(Debug, Deserialize)]
pub struct ScheduleResponse {
    pub dates: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourtSchedule {
    pub court_number: CourtNumber,
    pub sports: Vec<Sport>,
    /// time-block key → entry, in upstream order.
    pub schedule: serde_json::Map<String, serde_json::Value>,
}

/// Courts are numbered by some venues and named by others.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CourtNumber {
    Number(serde_json::Number),
    Text(String),
}

impl std::fmt::Display for CourtNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CourtNumber::Number(n) => write!(f, "{n}"),
            CourtNumber::Text(s) => write!(f, "{s}"),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Sport {
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeBlock {
    pub reference_type: Option<String>,
}

// ---------------------------------------------------------------------------
// Cycle reporting
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleOutcome {
    /// Nothing reservable in the whole window. No alert, baseline untouched.
    NoSlots,
    Unchanged,
    Changed,
    /// Baseline could not be read; the cycle was abandoned.
    StoreUnavailable,
}

impl std::fmt::Display for CycleOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CycleOutcome::NoSlots => "no_slots",
            CycleOutcome::Unchanged => "unchanged",
            CycleOutcome::Changed => "changed",
            CycleOutcome::StoreUnavailable => "store_unavailable",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcome: CycleOutcome,
    pub slots_fetched: usize,
    pub failed_dates: Vec<String>,
    /// Slots listed in the outgoing alert (0 when no alert was due).
    pub alerted: usize,
    pub notified: bool,
    pub persisted: bool,
}
