use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

use crate::error::Result;
use crate::store::SnapshotStore;
use crate::types::SlotSnapshot;

/// Baseline kept as a JSON array on disk.
pub struct FileSnapshotStore {
    path: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn load(&self) -> Result<Option<SlotSnapshot>> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let snapshot: SlotSnapshot = serde_json::from_slice(&raw)?;
        Ok(Some(snapshot))
    }

    async fn save(&self, snapshot: &SlotSnapshot) -> Result<()> {
        let raw = serde_json::to_vec(snapshot)?;
        // Write beside the target, then rename over it.
        let tmp = self.temp_path();
        tokio::fs::write(&tmp, &raw).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), slots = snapshot.len(), "Baseline written");
        Ok(())
    }
}
