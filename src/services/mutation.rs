//! Mutation paths: rule updates, backups, restores, and rollbacks.
//!
//! Every write follows the same protocol under the group's lock: snapshot
//! the current configuration, apply to the authority, then commit the
//! mirror and the ledger. The protocol runs on a detached task so a caller
//! dropping the request cannot cancel it between the authority apply and
//! the local commit.

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::blob::SnapshotVault;
use crate::cloud::CloudClient;
use crate::errors::AppError;
use crate::models::backup::{Backup, BackupType, CreateBackup};
use crate::models::change::{ChangeRecord, ChangeType};
use crate::models::group::{GroupConfiguration, SecurityGroup};
use crate::models::rule::{validate_rules, RuleInput, RuleSet};
use crate::store::Store;

use super::ledger;
use super::locks::GroupLocks;

/// Shared handles the mutation paths operate on.
#[derive(Clone)]
pub struct MutationDeps {
    pub store: Arc<dyn Store>,
    pub cloud: Arc<dyn CloudClient>,
    pub vault: Arc<dyn SnapshotVault>,
    pub locks: GroupLocks,
}

/// Result of a mutating operation. `degraded` is raised when the authority
/// accepted the change but a local write afterwards failed: the change
/// stands, and `warning` names the part of the local record that is
/// behind.
#[derive(Debug, Clone, Serialize)]
pub struct MutationOutcome {
    pub group: SecurityGroup,
    pub change: ChangeRecord,
    pub degraded: bool,
    pub warning: Option<String>,
}

/// Replaces a group's rule set, authority first.
pub async fn mutate_rules(
    deps: &MutationDeps,
    group_id: Uuid,
    inputs: Vec<RuleInput>,
    actor: String,
) -> Result<MutationOutcome, AppError> {
    let target = RuleSet::from_rules(validate_rules(inputs)?);
    let deps = deps.clone();
    run_detached(async move {
        let group = load_group(deps.store.as_ref(), group_id).await?;
        let _guard = deps
            .locks
            .for_group(&group.external_id)
            .await
            .lock_owned()
            .await;
        // Re-read under the lock; an earlier writer may have advanced the
        // state between the first load and the acquisition.
        let mut group = load_group(deps.store.as_ref(), group_id).await?;

        let previous = group.configuration();
        deps.cloud
            .apply_rule_set(&group.external_id, &target)
            .await
            .map_err(|e| AppError::ExternalApply(e.to_string()))?;

        // The authority accepted; the mirror moves to the applied rules
        // without a re-fetch.
        group.set_rule_set(target);
        let now = Utc::now();
        group.stale = false;
        group.last_sync = Some(now);
        group.updated_at = now;

        let new_state = group.configuration();
        let diff = RuleSet::diff(&previous.rule_set(), &new_state.rule_set());
        let summary = format!(
            "rules updated: {}; config {}",
            diff.describe(),
            short_digest(&new_state)
        );
        let change = ledger::build(
            &group,
            ChangeType::Update,
            Some(previous),
            new_state,
            &actor,
            summary,
            true,
            None,
        );
        commit(&deps, group, change).await
    })
    .await
}

/// Snapshots the current configuration into the vault and the backup
/// catalog. Purely local, so any failure aborts cleanly.
pub async fn create_backup(
    deps: &MutationDeps,
    group_id: Uuid,
    request: CreateBackup,
) -> Result<Backup, AppError> {
    let deps = deps.clone();
    run_detached(async move {
        let group = load_group(deps.store.as_ref(), group_id).await?;
        let _guard = deps
            .locks
            .for_group(&group.external_id)
            .await
            .lock_owned()
            .await;
        let mut group = load_group(deps.store.as_ref(), group_id).await?;

        let configuration = group.configuration();
        let now = Utc::now();
        let name = request
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| format!("backup-{}", now.format("%Y%m%dT%H%M%SZ")));

        let locator = deps.vault.store_snapshot(group.id, &configuration).await?;
        let backup = Backup {
            id: Uuid::new_v4(),
            group_id: group.id,
            name,
            backup_type: BackupType::Manual,
            configuration: configuration.clone(),
            storage_locator: locator,
            created_by: request.actor.clone(),
            created_at: now,
        };
        deps.store.insert_backup(&backup).await?;

        group.last_backup = Some(now);
        group.updated_at = now;
        deps.store.update_group(&group).await?;

        let change = ledger::build(
            &group,
            ChangeType::Backup,
            None,
            configuration,
            &request.actor,
            format!("backup '{}' created", backup.name),
            false,
            Some(backup.id),
        );
        ledger::record(deps.store.as_ref(), &change).await?;

        tracing::info!(group = %group.external_id, backup = %backup.id, "Backup created");
        Ok(backup)
    })
    .await
}

/// Re-applies a backup's rule set, authority first. Tags are not restored;
/// the authority owns them and keeps its current values.
pub async fn restore_from_backup(
    deps: &MutationDeps,
    group_id: Uuid,
    backup_id: Uuid,
    actor: String,
) -> Result<MutationOutcome, AppError> {
    let deps = deps.clone();
    run_detached(async move {
        let group = load_group(deps.store.as_ref(), group_id).await?;
        let _guard = deps
            .locks
            .for_group(&group.external_id)
            .await
            .lock_owned()
            .await;
        let mut group = load_group(deps.store.as_ref(), group_id).await?;

        let backup = deps
            .store
            .get_backup(group.id, backup_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("backup {backup_id} not found")))?;

        let previous = group.configuration();
        let target = backup.configuration.rule_set();
        deps.cloud
            .apply_rule_set(&group.external_id, &target)
            .await
            .map_err(|e| AppError::ExternalApply(e.to_string()))?;

        group.set_rule_set(target);
        let now = Utc::now();
        group.stale = false;
        group.last_sync = Some(now);
        group.updated_at = now;

        let new_state = group.configuration();
        let summary = format!(
            "restored from backup '{}'; config {}",
            backup.name,
            short_digest(&new_state)
        );
        let change = ledger::build(
            &group,
            ChangeType::Restore,
            Some(previous),
            new_state,
            &actor,
            summary,
            true,
            Some(backup.id),
        );
        commit(&deps, group, change).await
    })
    .await
}

/// Re-applies the previous state recorded on a ledger entry, authority
/// first. The resulting entry is terminal, so undo never chains.
pub async fn rollback(
    deps: &MutationDeps,
    group_id: Uuid,
    change_id: Uuid,
    actor: String,
) -> Result<MutationOutcome, AppError> {
    let deps = deps.clone();
    run_detached(async move {
        let group = load_group(deps.store.as_ref(), group_id).await?;
        let _guard = deps
            .locks
            .for_group(&group.external_id)
            .await
            .lock_owned()
            .await;
        let mut group = load_group(deps.store.as_ref(), group_id).await?;

        let target_change =
            ledger::find_rollbackable(deps.store.as_ref(), group.id, change_id).await?;
        let snapshot = target_change.previous_state.clone().ok_or_else(|| {
            AppError::NotRollbackable(format!(
                "change record {change_id} records no previous state"
            ))
        })?;

        let previous = group.configuration();
        let target = snapshot.rule_set();
        deps.cloud
            .apply_rule_set(&group.external_id, &target)
            .await
            .map_err(|e| AppError::ExternalApply(e.to_string()))?;

        group.set_rule_set(target);
        let now = Utc::now();
        group.stale = false;
        group.last_sync = Some(now);
        group.updated_at = now;

        let new_state = group.configuration();
        let summary = format!(
            "rolled back change {}; config {}",
            target_change.id,
            short_digest(&new_state)
        );
        let change = ledger::build(
            &group,
            ChangeType::Rollback,
            Some(previous),
            new_state,
            &actor,
            summary,
            false,
            None,
        );
        commit(&deps, group, change).await
    })
    .await
}

/// Backups for one group, newest first.
pub async fn list_backups(store: &dyn Store, group_id: Uuid) -> Result<Vec<Backup>, AppError> {
    load_group(store, group_id).await?;
    let backups = store.list_backups(group_id).await?;
    Ok(backups)
}

async fn load_group(store: &dyn Store, group_id: Uuid) -> Result<SecurityGroup, AppError> {
    store
        .get_group(group_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("security group {group_id} not found")))
}

/// Leading digest characters, enough to recognize a configuration in the
/// ledger without quoting the whole hash.
fn short_digest(configuration: &GroupConfiguration) -> String {
    let digest = configuration.digest();
    digest[..digest.len().min(12)].to_string()
}

/// Commits mirror and ledger after a successful authority apply. Failures
/// here cannot un-apply the change, so they degrade the outcome instead of
/// failing it.
async fn commit(
    deps: &MutationDeps,
    group: SecurityGroup,
    change: ChangeRecord,
) -> Result<MutationOutcome, AppError> {
    let mut warnings = Vec::new();

    if let Err(e) = deps.store.update_group(&group).await {
        tracing::error!(
            group = %group.external_id,
            error = %e,
            "Mirror commit failed after authority apply"
        );
        warnings.push("mirror not updated; content converges on the next read".to_string());
    }
    if let Err(e) = ledger::record(deps.store.as_ref(), &change).await {
        tracing::error!(
            group = %group.external_id,
            error = %e,
            "Ledger append failed after authority apply"
        );
        warnings.push("change not recorded; the audit trail is missing this entry".to_string());
    }

    let degraded = !warnings.is_empty();
    let warning = degraded.then(|| warnings.join("; "));
    Ok(MutationOutcome {
        group,
        change,
        degraded,
        warning,
    })
}

/// Runs the mutation on its own task so the protocol survives the caller
/// dropping the request mid-flight.
async fn run_detached<F, T>(operation: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, AppError>> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(operation)
        .await
        .map_err(|e| AppError::Internal(format!("mutation task failed: {e}")))?
}
