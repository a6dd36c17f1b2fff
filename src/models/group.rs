//! Security group mirror model and configuration snapshots.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::FromRow;
use uuid::Uuid;

use super::rule::{Rule, RuleSet};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, PartialOrd, Ord)]
#[sqlx(type_name = "risk_level", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

/// Locally mirrored security group. The external authority owns the rules
/// and tags (ground truth); the mirror owns score, risk, staleness, and
/// timestamps as derived fields.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SecurityGroup {
    pub id: Uuid,
    pub external_id: String,
    pub name: String,
    pub resource_group: String,
    pub region: String,
    pub subscription_id: String,
    pub tenant_id: Option<String>,
    #[sqlx(json)]
    pub tags: BTreeMap<String, String>,
    #[sqlx(json)]
    pub inbound_rules: Vec<Rule>,
    #[sqlx(json)]
    pub outbound_rules: Vec<Rule>,
    pub compliance_score: Option<f32>,
    pub risk_level: Option<RiskLevel>,
    pub stale: bool,
    pub last_sync: Option<DateTime<Utc>>,
    pub last_backup: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SecurityGroup {
    pub fn rule_set(&self) -> RuleSet {
        RuleSet::new(self.inbound_rules.clone(), self.outbound_rules.clone())
    }

    pub fn set_rule_set(&mut self, rules: RuleSet) {
        self.inbound_rules = rules.inbound;
        self.outbound_rules = rules.outbound;
    }

    /// Full configuration snapshot: the unit recorded in the ledger and
    /// stored by backups.
    pub fn configuration(&self) -> GroupConfiguration {
        GroupConfiguration {
            inbound: self.inbound_rules.clone(),
            outbound: self.outbound_rules.clone(),
            tags: self.tags.clone(),
        }
    }
}

/// Point-in-time snapshot of a group's rules and tags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupConfiguration {
    pub inbound: Vec<Rule>,
    pub outbound: Vec<Rule>,
    pub tags: BTreeMap<String, String>,
}

impl GroupConfiguration {
    pub fn rule_set(&self) -> RuleSet {
        RuleSet::new(self.inbound.clone(), self.outbound.clone())
    }

    /// Content digest of the canonical snapshot. Tag ordering is already
    /// deterministic (sorted map), so equal configurations hash equal.
    pub fn digest(&self) -> String {
        let canonical = GroupConfiguration {
            inbound: self.inbound.iter().map(Rule::canonical).collect(),
            outbound: self.outbound.iter().map(Rule::canonical).collect(),
            tags: self.tags.clone(),
        };
        let payload = serde_json::to_vec(&canonical).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(&payload);
        hex::encode(hasher.finalize())
    }
}

/// List-view filters, all optional and combinable.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GroupFilter {
    pub region: Option<String>,
    pub resource_group: Option<String>,
    pub risk_level: Option<RiskLevel>,
    pub search: Option<String>,
}
