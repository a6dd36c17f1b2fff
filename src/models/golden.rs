//! Golden rule templates: the compliance baseline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::rule::{Rule, RuleInput, RuleSet};

/// Administrator-authored reference template. Read-mostly: the engine
/// scores against it but never mutates it; deactivation is the only
/// lifecycle transition.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GoldenRule {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    #[sqlx(json)]
    pub inbound_rules: Vec<Rule>,
    #[sqlx(json)]
    pub outbound_rules: Vec<Rule>,
    pub compliance_rules: Option<serde_json::Value>,
    pub is_active: bool,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GoldenRule {
    pub fn rule_set(&self) -> RuleSet {
        RuleSet::new(self.inbound_rules.clone(), self.outbound_rules.clone())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateGoldenRule {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub rules: Vec<RuleInput>,
    #[serde(default)]
    pub compliance_rules: Option<serde_json::Value>,
    pub created_by: String,
}
