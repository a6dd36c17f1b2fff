//! Deterministic in-process control plane. Backs the engine's tests and
//! credential-less local runs; failures are injected per call family.

use std::collections::BTreeMap;

use tokio::sync::Mutex;

use async_trait::async_trait;

use crate::models::rule::RuleSet;

use super::{CloudClient, CloudError, CloudObservation, ResourceMetadata};

#[derive(Debug, Default)]
pub struct FakeCloud {
    state: Mutex<FakeState>,
}

#[derive(Debug, Default)]
struct FakeState {
    groups: BTreeMap<String, CloudObservation>,
    fail_fetch: bool,
    fail_apply: bool,
    fail_list: bool,
    applied: Vec<(String, RuleSet)>,
}

impl FakeCloud {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers or replaces one authoritative group.
    pub async fn seed(&self, observation: CloudObservation) {
        let mut state = self.state.lock().await;
        state
            .groups
            .insert(observation.external_id.clone(), observation);
    }

    pub async fn remove(&self, external_id: &str) {
        self.state.lock().await.groups.remove(external_id);
    }

    pub async fn set_fail_fetch(&self, fail: bool) {
        self.state.lock().await.fail_fetch = fail;
    }

    pub async fn set_fail_apply(&self, fail: bool) {
        self.state.lock().await.fail_apply = fail;
    }

    pub async fn set_fail_list(&self, fail: bool) {
        self.state.lock().await.fail_list = fail;
    }

    /// Every successful apply, in order.
    pub async fn applied(&self) -> Vec<(String, RuleSet)> {
        self.state.lock().await.applied.clone()
    }
}

#[async_trait]
impl CloudClient for FakeCloud {
    async fn fetch_rule_set(&self, scope_id: &str) -> Result<RuleSet, CloudError> {
        let state = self.state.lock().await;
        if state.fail_fetch {
            return Err(CloudError::Transport("injected fetch failure".to_string()));
        }
        state
            .groups
            .get(scope_id)
            .map(|g| g.rules.clone())
            .ok_or_else(|| CloudError::NotFound(scope_id.to_string()))
    }

    async fn fetch_metadata(&self, scope_id: &str) -> Result<ResourceMetadata, CloudError> {
        let state = self.state.lock().await;
        if state.fail_fetch {
            return Err(CloudError::Transport("injected fetch failure".to_string()));
        }
        state
            .groups
            .get(scope_id)
            .map(|g| ResourceMetadata {
                name: g.name.clone(),
                resource_group: g.resource_group.clone(),
                region: g.region.clone(),
                tags: g.tags.clone(),
            })
            .ok_or_else(|| CloudError::NotFound(scope_id.to_string()))
    }

    async fn apply_rule_set(&self, scope_id: &str, rules: &RuleSet) -> Result<(), CloudError> {
        let mut state = self.state.lock().await;
        if state.fail_apply {
            return Err(CloudError::Rejected("injected apply failure".to_string()));
        }
        let group = state
            .groups
            .get_mut(scope_id)
            .ok_or_else(|| CloudError::NotFound(scope_id.to_string()))?;
        group.rules = rules.clone();
        state
            .applied
            .push((scope_id.to_string(), rules.clone()));
        Ok(())
    }

    async fn list_groups(&self) -> Result<Vec<CloudObservation>, CloudError> {
        let state = self.state.lock().await;
        if state.fail_list {
            return Err(CloudError::Transport("injected list failure".to_string()));
        }
        Ok(state.groups.values().cloned().collect())
    }
}
