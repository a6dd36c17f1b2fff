//! Snapshot storage for backup payloads.

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::group::GroupConfiguration;
use crate::store::StoreError;

mod fs;

pub use fs::FsVault;

/// Writes configuration snapshots to durable storage. The returned locator
/// is opaque to callers and recorded on the backup row.
#[async_trait]
pub trait SnapshotVault: Send + Sync {
    async fn store_snapshot(
        &self,
        group_id: Uuid,
        configuration: &GroupConfiguration,
    ) -> Result<String, StoreError>;
}
