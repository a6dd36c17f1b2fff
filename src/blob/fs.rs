//! Filesystem-backed snapshot vault.

use std::path::PathBuf;

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::group::GroupConfiguration;
use crate::store::StoreError;

use super::SnapshotVault;

/// Stores each snapshot as pretty-printed JSON under
/// `<root>/<group id>/<digest prefix>-<random>.json`. The digest prefix
/// makes identical configurations recognizable on disk without opening
/// the files.
#[derive(Debug, Clone)]
pub struct FsVault {
    root: PathBuf,
}

impl FsVault {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl SnapshotVault for FsVault {
    async fn store_snapshot(
        &self,
        group_id: Uuid,
        configuration: &GroupConfiguration,
    ) -> Result<String, StoreError> {
        let dir = self.root.join(group_id.to_string());
        tokio::fs::create_dir_all(&dir).await?;

        let digest = configuration.digest();
        let prefix = &digest[..digest.len().min(8)];
        let path = dir.join(format!("{prefix}-{}.json", Uuid::new_v4()));
        let payload = serde_json::to_vec_pretty(configuration)?;
        tokio::fs::write(&path, payload).await?;

        tracing::debug!(group = %group_id, path = %path.display(), "Snapshot written");
        Ok(path.to_string_lossy().into_owned())
    }
}
