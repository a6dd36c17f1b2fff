//! Golden rule template management.

use chrono::Utc;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::golden::{CreateGoldenRule, GoldenRule};
use crate::models::rule::{validate_rules, RuleSet};
use crate::store::Store;

/// Validates and persists a new template. At least one rule is required;
/// an empty template would score every group at zero.
pub async fn create_golden_rule(
    store: &dyn Store,
    payload: CreateGoldenRule,
) -> Result<GoldenRule, AppError> {
    let name = payload.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::validation("golden rule name must not be empty"));
    }
    if payload.rules.is_empty() {
        return Err(AppError::validation(
            "golden rule must contain at least one rule",
        ));
    }
    // Templates are stored canonical; the scorer compares canonical forms.
    let rules = RuleSet::from_rules(validate_rules(payload.rules)?).canonical();

    let now = Utc::now();
    let golden = GoldenRule {
        id: Uuid::new_v4(),
        name,
        description: payload.description,
        inbound_rules: rules.inbound,
        outbound_rules: rules.outbound,
        compliance_rules: payload.compliance_rules,
        is_active: true,
        created_by: payload.created_by,
        created_at: now,
        updated_at: now,
    };
    store.insert_golden_rule(&golden).await?;
    tracing::info!(
        golden_rule = %golden.name,
        rules = golden.rule_set().rule_count(),
        "Golden rule created"
    );
    Ok(golden)
}

pub async fn get_golden_rule(store: &dyn Store, id: Uuid) -> Result<GoldenRule, AppError> {
    store
        .get_golden_rule(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("golden rule {id} not found")))
}

pub async fn list_golden_rules(
    store: &dyn Store,
    include_inactive: bool,
) -> Result<Vec<GoldenRule>, AppError> {
    let rules = store.list_golden_rules(include_inactive).await?;
    Ok(rules)
}

/// Retires a template. Deactivation is soft: groups already scored against
/// it keep their results, but new scoring runs refuse it.
pub async fn deactivate_golden_rule(store: &dyn Store, id: Uuid) -> Result<GoldenRule, AppError> {
    let mut golden = get_golden_rule(store, id).await?;
    if golden.is_active {
        golden.is_active = false;
        golden.updated_at = Utc::now();
        store.update_golden_rule(&golden).await?;
        tracing::info!(golden_rule = %golden.name, "Golden rule deactivated");
    }
    Ok(golden)
}
