//! Configuration backups and their storage references.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::group::GroupConfiguration;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "backup_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BackupType {
    Manual,
    Scheduled,
}

/// Insert-only backup row. `configuration` is the snapshot restores read
/// from; `storage_locator` is an opaque vault reference that is only ever
/// round-tripped, never interpreted.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Backup {
    pub id: Uuid,
    pub group_id: Uuid,
    pub name: String,
    pub backup_type: BackupType,
    #[sqlx(json)]
    pub configuration: GroupConfiguration,
    pub storage_locator: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateBackup {
    pub name: Option<String>,
    pub actor: String,
}
