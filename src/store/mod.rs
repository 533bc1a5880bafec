//! Baseline persistence. Single slot, overwrite semantics.

pub mod file;
pub mod sqlite;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::SlotSnapshot;

pub use file::FileSnapshotStore;
pub use sqlite::SqliteSnapshotStore;

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// The current baseline, or `None` if nothing has been saved yet. A saved
    /// empty snapshot loads as `Some(empty)`.
    async fn load(&self) -> Result<Option<SlotSnapshot>>;
    /// Replace the baseline wholesale.
    async fn save(&self, snapshot: &SlotSnapshot) -> Result<()>;
}
