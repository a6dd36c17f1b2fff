//! Sync-on-read reconciliation between the authority and the local mirror.
//!
//! The authority always wins on content. Reads refresh the mirror before
//! serving; when the authority cannot be reached the last-synced copy is
//! served with its stale flag raised instead of failing the read.

use chrono::Utc;
use uuid::Uuid;

use crate::cloud::{CloudClient, CloudError, CloudObservation};
use crate::errors::AppError;
use crate::models::change::ChangeType;
use crate::models::group::{GroupFilter, SecurityGroup};
use crate::models::pagination::{PagedResult, Pagination};
use crate::store::Store;

use super::ledger;

/// Upserts one authoritative observation into the mirror. Content fields
/// are overwritten and tags replaced wholesale; derived fields (score,
/// risk, backup timestamp) are left for their own flows.
pub async fn sync_group(
    store: &dyn Store,
    observation: &CloudObservation,
) -> Result<SecurityGroup, AppError> {
    let now = Utc::now();
    match store
        .get_group_by_external_id(&observation.external_id)
        .await?
    {
        Some(mut group) => {
            group.name = observation.name.clone();
            group.resource_group = observation.resource_group.clone();
            group.region = observation.region.clone();
            group.subscription_id = observation.subscription_id.clone();
            group.tenant_id = observation.tenant_id.clone();
            group.tags = observation.tags.clone();
            group.set_rule_set(observation.rules.clone());
            group.stale = false;
            group.last_sync = Some(now);
            group.updated_at = now;
            store.update_group(&group).await?;
            Ok(group)
        }
        None => {
            let group = SecurityGroup {
                id: Uuid::new_v4(),
                external_id: observation.external_id.clone(),
                name: observation.name.clone(),
                resource_group: observation.resource_group.clone(),
                region: observation.region.clone(),
                subscription_id: observation.subscription_id.clone(),
                tenant_id: observation.tenant_id.clone(),
                tags: observation.tags.clone(),
                inbound_rules: observation.rules.inbound.clone(),
                outbound_rules: observation.rules.outbound.clone(),
                compliance_score: None,
                risk_level: None,
                stale: false,
                last_sync: Some(now),
                last_backup: None,
                created_at: now,
                updated_at: now,
            };
            store.insert_group(&group).await?;
            let change = ledger::build(
                &group,
                ChangeType::Create,
                None,
                group.configuration(),
                "reconciler",
                "mirrored from authority".to_string(),
                false,
                None,
            );
            ledger::record(store, &change).await?;
            tracing::info!(group = %group.external_id, "New security group mirrored");
            Ok(group)
        }
    }
}

/// Loads one group, refreshed from the authority. A fetch failure degrades
/// to the last-synced copy with the stale flag raised; reads never fail on
/// authority trouble.
pub async fn get_group_synced(
    store: &dyn Store,
    cloud: &dyn CloudClient,
    id: Uuid,
) -> Result<SecurityGroup, AppError> {
    let group = store
        .get_group(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("security group {id} not found")))?;

    match fetch_observation(cloud, &group).await {
        Ok(observation) => sync_group(store, &observation).await,
        Err(e) => {
            tracing::warn!(
                group = %group.external_id,
                error = %e,
                "Authority refresh failed, serving last-synced copy"
            );
            mark_stale(store, group).await
        }
    }
}

/// Reconciles the full authority listing into the mirror, then serves the
/// filtered local page. When the listing itself fails, the served rows are
/// marked stale instead.
pub async fn reconcile_and_list(
    store: &dyn Store,
    cloud: &dyn CloudClient,
    filter: &GroupFilter,
    pagination: &Pagination,
) -> Result<PagedResult<SecurityGroup>, AppError> {
    let authority_reachable = match cloud.list_groups().await {
        Ok(observations) => {
            for observation in &observations {
                sync_group(store, observation).await?;
            }
            true
        }
        Err(e) => {
            tracing::warn!(error = %e, "Authority listing failed, serving last-synced mirror");
            false
        }
    };

    let (mut items, total) = store.list_groups(filter, pagination).await?;
    if !authority_reachable {
        for group in &mut items {
            if !group.stale {
                group.stale = true;
                group.updated_at = Utc::now();
                store.update_group(group).await?;
            }
        }
    }
    Ok(PagedResult::new(items, total, pagination))
}

/// Removes a group from the mirror. Local only; the authority copy is not
/// touched and the group reappears on the next listing if it still exists
/// there.
pub async fn delete_group(store: &dyn Store, id: Uuid) -> Result<(), AppError> {
    let group = store
        .get_group(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("security group {id} not found")))?;
    store.delete_group(id).await?;
    tracing::info!(group = %group.external_id, "Security group removed from mirror");
    Ok(())
}

async fn fetch_observation(
    cloud: &dyn CloudClient,
    group: &SecurityGroup,
) -> Result<CloudObservation, CloudError> {
    let rules = cloud.fetch_rule_set(&group.external_id).await?;
    let metadata = cloud.fetch_metadata(&group.external_id).await?;
    Ok(CloudObservation {
        external_id: group.external_id.clone(),
        name: metadata.name,
        resource_group: metadata.resource_group,
        region: metadata.region,
        subscription_id: group.subscription_id.clone(),
        tenant_id: group.tenant_id.clone(),
        tags: metadata.tags,
        rules,
    })
}

async fn mark_stale(store: &dyn Store, mut group: SecurityGroup) -> Result<SecurityGroup, AppError> {
    if !group.stale {
        group.stale = true;
        group.updated_at = Utc::now();
        store.update_group(&group).await?;
    }
    Ok(group)
}
