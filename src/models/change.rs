//! Append-only change ledger entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::group::GroupConfiguration;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "change_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Create,
    Update,
    Backup,
    Restore,
    Rollback,
}

/// One ledger entry. Immutable once written: the store supports insert and
/// read only, never update or delete.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ChangeRecord {
    pub id: Uuid,
    pub group_id: Uuid,
    pub change_type: ChangeType,
    #[sqlx(json(nullable))]
    pub previous_state: Option<GroupConfiguration>,
    #[sqlx(json)]
    pub new_state: GroupConfiguration,
    pub summary: String,
    pub actor: String,
    pub can_rollback: bool,
    pub rollback_backup_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl ChangeRecord {
    /// A change can be undone only when it was flagged reversible and
    /// carries the snapshot to return to.
    pub fn is_rollbackable(&self) -> bool {
        self.can_rollback && self.previous_state.is_some()
    }
}

/// Body for mutating endpoints that only need to attribute the action.
#[derive(Debug, Clone, Deserialize)]
pub struct ActorRequest {
    pub actor: String,
}
