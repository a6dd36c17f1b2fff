//! Append-only change ledger.
//!
//! Entries are immutable once written; corrections land as new entries.
//! Rollback entries are terminal so undo never chains more than one level
//! deep.

use chrono::Utc;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::change::{ChangeRecord, ChangeType};
use crate::models::group::{GroupConfiguration, SecurityGroup};
use crate::store::Store;

/// Builds an entry without persisting it. Rollback entries are forced
/// terminal here no matter what the caller passed.
#[allow(clippy::too_many_arguments)]
pub fn build(
    group: &SecurityGroup,
    change_type: ChangeType,
    previous_state: Option<GroupConfiguration>,
    new_state: GroupConfiguration,
    actor: &str,
    summary: String,
    can_rollback: bool,
    rollback_backup_id: Option<Uuid>,
) -> ChangeRecord {
    let can_rollback = can_rollback && change_type != ChangeType::Rollback;
    ChangeRecord {
        id: Uuid::now_v7(),
        group_id: group.id,
        change_type,
        previous_state,
        new_state,
        summary,
        actor: actor.to_string(),
        can_rollback,
        rollback_backup_id,
        created_at: Utc::now(),
    }
}

/// Appends one entry to the ledger.
pub async fn record(store: &dyn Store, change: &ChangeRecord) -> Result<(), AppError> {
    store.insert_change(change).await?;
    tracing::info!(
        change = %change.id,
        group = %change.group_id,
        kind = ?change.change_type,
        actor = %change.actor,
        "Change recorded"
    );
    Ok(())
}

/// Entries for one group, newest first.
pub async fn list_changes(
    store: &dyn Store,
    group_id: Uuid,
    limit: i64,
) -> Result<Vec<ChangeRecord>, AppError> {
    store
        .get_group(group_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("security group {group_id} not found")))?;
    let changes = store.list_changes(group_id, limit).await?;
    Ok(changes)
}

/// Loads a change and verifies it can seed a rollback: it must exist under
/// this group, carry a previous state, and not itself be terminal.
pub async fn find_rollbackable(
    store: &dyn Store,
    group_id: Uuid,
    change_id: Uuid,
) -> Result<ChangeRecord, AppError> {
    let change = store
        .get_change(group_id, change_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("change record {change_id} not found")))?;
    if !change.can_rollback {
        return Err(AppError::NotRollbackable(format!(
            "change record {change_id} is terminal"
        )));
    }
    if change.previous_state.is_none() {
        return Err(AppError::NotRollbackable(format!(
            "change record {change_id} records no previous state"
        )));
    }
    Ok(change)
}
