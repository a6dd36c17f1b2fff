//! In-memory store with the same contract as the Postgres store. Used by
//! deterministic tests and credential-less local runs.

use std::collections::BTreeMap;

use tokio::sync::RwLock;
use uuid::Uuid;

use async_trait::async_trait;

use crate::models::backup::Backup;
use crate::models::change::ChangeRecord;
use crate::models::golden::GoldenRule;
use crate::models::group::{GroupFilter, SecurityGroup};
use crate::models::pagination::Pagination;

use super::{Store, StoreError};

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    groups: BTreeMap<Uuid, SecurityGroup>,
    changes: Vec<ChangeRecord>,
    backups: Vec<Backup>,
    golden_rules: BTreeMap<Uuid, GoldenRule>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn matches_filter(group: &SecurityGroup, filter: &GroupFilter) -> bool {
    if let Some(ref region) = filter.region {
        if &group.region != region {
            return false;
        }
    }
    if let Some(ref resource_group) = filter.resource_group {
        if &group.resource_group != resource_group {
            return false;
        }
    }
    if let Some(risk) = filter.risk_level {
        if group.risk_level != Some(risk) {
            return false;
        }
    }
    if let Some(ref search) = filter.search {
        let needle = search.to_lowercase();
        if !group.name.to_lowercase().contains(&needle)
            && !group.external_id.to_lowercase().contains(&needle)
        {
            return false;
        }
    }
    true
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_group(&self, group: &SecurityGroup) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if inner.groups.contains_key(&group.id)
            || inner
                .groups
                .values()
                .any(|g| g.external_id == group.external_id)
        {
            return Err(StoreError::Conflict(format!(
                "security group '{}' already mirrored",
                group.external_id
            )));
        }
        inner.groups.insert(group.id, group.clone());
        Ok(())
    }

    async fn update_group(&self, group: &SecurityGroup) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if let Some(existing) = inner.groups.get_mut(&group.id) {
            *existing = group.clone();
        }
        Ok(())
    }

    async fn get_group(&self, id: Uuid) -> Result<Option<SecurityGroup>, StoreError> {
        Ok(self.inner.read().await.groups.get(&id).cloned())
    }

    async fn get_group_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<SecurityGroup>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .groups
            .values()
            .find(|g| g.external_id == external_id)
            .cloned())
    }

    async fn list_groups(
        &self,
        filter: &GroupFilter,
        pagination: &Pagination,
    ) -> Result<(Vec<SecurityGroup>, i64), StoreError> {
        let inner = self.inner.read().await;
        let mut matched: Vec<SecurityGroup> = inner
            .groups
            .values()
            .filter(|g| matches_filter(g, filter))
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.name.cmp(&b.name));
        let total = matched.len() as i64;
        Ok((pagination.window(matched), total))
    }

    // Changes and backups outlive the group row: they are audit history.
    async fn delete_group(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        Ok(inner.groups.remove(&id).is_some())
    }

    async fn insert_change(&self, change: &ChangeRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if inner.changes.iter().any(|c| c.id == change.id) {
            return Err(StoreError::Conflict(format!(
                "change record {} already written",
                change.id
            )));
        }
        inner.changes.push(change.clone());
        Ok(())
    }

    async fn list_changes(
        &self,
        group_id: Uuid,
        limit: i64,
    ) -> Result<Vec<ChangeRecord>, StoreError> {
        let inner = self.inner.read().await;
        let mut changes: Vec<ChangeRecord> = inner
            .changes
            .iter()
            .filter(|c| c.group_id == group_id)
            .cloned()
            .collect();
        changes.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        changes.truncate(limit.max(0) as usize);
        Ok(changes)
    }

    async fn get_change(
        &self,
        group_id: Uuid,
        change_id: Uuid,
    ) -> Result<Option<ChangeRecord>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .changes
            .iter()
            .find(|c| c.group_id == group_id && c.id == change_id)
            .cloned())
    }

    async fn insert_backup(&self, backup: &Backup) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if inner.backups.iter().any(|b| b.id == backup.id) {
            return Err(StoreError::Conflict(format!(
                "backup {} already written",
                backup.id
            )));
        }
        inner.backups.push(backup.clone());
        Ok(())
    }

    async fn list_backups(&self, group_id: Uuid) -> Result<Vec<Backup>, StoreError> {
        let inner = self.inner.read().await;
        let mut backups: Vec<Backup> = inner
            .backups
            .iter()
            .filter(|b| b.group_id == group_id)
            .cloned()
            .collect();
        backups.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(backups)
    }

    async fn get_backup(
        &self,
        group_id: Uuid,
        backup_id: Uuid,
    ) -> Result<Option<Backup>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .backups
            .iter()
            .find(|b| b.group_id == group_id && b.id == backup_id)
            .cloned())
    }

    async fn insert_golden_rule(&self, rule: &GoldenRule) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if inner.golden_rules.contains_key(&rule.id) {
            return Err(StoreError::Conflict(format!(
                "golden rule {} already exists",
                rule.id
            )));
        }
        inner.golden_rules.insert(rule.id, rule.clone());
        Ok(())
    }

    async fn update_golden_rule(&self, rule: &GoldenRule) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if let Some(existing) = inner.golden_rules.get_mut(&rule.id) {
            *existing = rule.clone();
        }
        Ok(())
    }

    async fn get_golden_rule(&self, id: Uuid) -> Result<Option<GoldenRule>, StoreError> {
        Ok(self.inner.read().await.golden_rules.get(&id).cloned())
    }

    async fn list_golden_rules(
        &self,
        include_inactive: bool,
    ) -> Result<Vec<GoldenRule>, StoreError> {
        let inner = self.inner.read().await;
        let mut rules: Vec<GoldenRule> = inner
            .golden_rules
            .values()
            .filter(|r| include_inactive || r.is_active)
            .cloned()
            .collect();
        rules.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rules)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::change::ChangeType;
    use crate::models::group::GroupConfiguration;
    use chrono::{TimeZone, Utc};

    fn group(name: &str, external_id: &str) -> SecurityGroup {
        let now = Utc::now();
        SecurityGroup {
            id: Uuid::new_v4(),
            external_id: external_id.to_string(),
            name: name.to_string(),
            resource_group: "rg-platform".to_string(),
            region: "westeurope".to_string(),
            subscription_id: "sub-1".to_string(),
            tenant_id: None,
            tags: BTreeMap::new(),
            inbound_rules: Vec::new(),
            outbound_rules: Vec::new(),
            compliance_score: None,
            risk_level: None,
            stale: false,
            last_sync: None,
            last_backup: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn change(group_id: Uuid, created_at: chrono::DateTime<Utc>) -> ChangeRecord {
        ChangeRecord {
            id: Uuid::now_v7(),
            group_id,
            change_type: ChangeType::Update,
            previous_state: Some(GroupConfiguration::default()),
            new_state: GroupConfiguration::default(),
            summary: "rules updated".to_string(),
            actor: "tester".to_string(),
            can_rollback: true,
            rollback_backup_id: None,
            created_at,
        }
    }

    #[tokio::test]
    async fn group_round_trip_and_lookup() {
        let store = MemoryStore::new();
        let g = group("nsg-web", "ext-1");
        store.insert_group(&g).await.unwrap();

        assert_eq!(store.get_group(g.id).await.unwrap().unwrap().name, "nsg-web");
        assert_eq!(
            store
                .get_group_by_external_id("ext-1")
                .await
                .unwrap()
                .unwrap()
                .id,
            g.id
        );
        assert!(store.get_group(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_external_id_conflicts() {
        let store = MemoryStore::new();
        store.insert_group(&group("nsg-a", "ext-1")).await.unwrap();
        let err = store
            .insert_group(&group("nsg-b", "ext-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn list_groups_filters_by_search() {
        let store = MemoryStore::new();
        store.insert_group(&group("nsg-web", "ext-1")).await.unwrap();
        store.insert_group(&group("nsg-db", "ext-2")).await.unwrap();

        let filter = GroupFilter {
            search: Some("WEB".to_string()),
            ..Default::default()
        };
        let (items, total) = store
            .list_groups(&filter, &Pagination::default())
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(items[0].name, "nsg-web");
    }

    #[tokio::test]
    async fn changes_are_most_recent_first_with_id_tiebreak() {
        let store = MemoryStore::new();
        let g = group("nsg-web", "ext-1");
        let t0 = Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2025, 6, 1, 11, 0, 0).unwrap();

        let early = change(g.id, t0);
        let tied_a = change(g.id, t1);
        let tied_b = change(g.id, t1);
        store.insert_change(&early).await.unwrap();
        store.insert_change(&tied_a).await.unwrap();
        store.insert_change(&tied_b).await.unwrap();

        let listed = store.list_changes(g.id, 10).await.unwrap();
        assert_eq!(listed.len(), 3);
        // tied_b was generated after tied_a, so its v7 id sorts later
        assert_eq!(listed[0].id, tied_b.id);
        assert_eq!(listed[1].id, tied_a.id);
        assert_eq!(listed[2].id, early.id);

        let limited = store.list_changes(g.id, 1).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn delete_group_reports_existence() {
        let store = MemoryStore::new();
        let g = group("nsg-web", "ext-1");
        store.insert_group(&g).await.unwrap();
        assert!(store.delete_group(g.id).await.unwrap());
        assert!(!store.delete_group(g.id).await.unwrap());
    }

    #[test]
    fn filter_matching() {
        let g = group("nsg-web", "ext-1");
        assert!(matches_filter(&g, &GroupFilter::default()));
        assert!(matches_filter(
            &g,
            &GroupFilter {
                region: Some("westeurope".to_string()),
                ..Default::default()
            }
        ));
        assert!(!matches_filter(
            &g,
            &GroupFilter {
                region: Some("northeurope".to_string()),
                ..Default::default()
            }
        ));
    }
}
