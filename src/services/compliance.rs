//! Compliance scoring against golden rule templates.
//!
//! Matching is content-first: a template rule earns full weight when some
//! live rule equals it in everything but name, and partial credit when a
//! live rule of the same name matches the critical fields (direction,
//! access, protocol, ports, prefixes) but drifted on priority or
//! description. An any-to-any allow rule dominates the classification
//! regardless of the computed score.

use std::collections::BTreeSet;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::group::RiskLevel;
use crate::models::rule::{Rule, RuleSet};
use crate::store::Store;

/// Matching weights. `partial` is the credit for name-matched rules whose
/// non-critical fields drifted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ComplianceWeights {
    pub full: f32,
    pub partial: f32,
}

impl Default for ComplianceWeights {
    fn default() -> Self {
        Self {
            full: 1.0,
            partial: 0.5,
        }
    }
}

/// Outcome of scoring one live rule set against one template. Written back
/// onto the group's score and risk fields, not persisted on its own.
#[derive(Debug, Clone, Serialize)]
pub struct ComplianceAnalysis {
    pub score: f32,
    pub risk_level: RiskLevel,
    pub missing_rules: Vec<String>,
    pub extra_rules: Vec<String>,
    pub open_rules: Vec<String>,
    pub recommendations: Vec<String>,
}

/// Scores `live` against `template`. Neither input is mutated.
pub fn analyze(live: &RuleSet, template: &RuleSet, weights: &ComplianceWeights) -> ComplianceAnalysis {
    let live_rules: Vec<&Rule> = live.all_rules().collect();

    let matched: f32 = template
        .all_rules()
        .map(|t| matched_weight(t, &live_rules, weights))
        .sum();
    let score = 100.0 * matched / template.rule_count().max(1) as f32;
    let score = (score * 10.0).round() / 10.0; // Round to 1 decimal

    let (missing_rules, extra_rules) = name_presence(live, template);

    let mut open_rules: Vec<String> = live_rules
        .iter()
        .filter(|r| r.is_open_allow())
        .map(|r| r.name.clone())
        .collect();
    open_rules.sort();
    open_rules.dedup();

    let mut risk_level = score_to_risk(score);
    if !open_rules.is_empty() && risk_level < RiskLevel::High {
        risk_level = RiskLevel::High;
    }

    let mut recommendations = Vec::new();
    for name in &missing_rules {
        recommendations.push(format!("add rule '{name}' from the golden template"));
    }
    for name in &open_rules {
        recommendations.push(format!(
            "restrict source/destination from '*' on rule '{name}'"
        ));
    }

    ComplianceAnalysis {
        score,
        risk_level,
        missing_rules,
        extra_rules,
        open_rules,
        recommendations,
    }
}

/// Weight earned by one template rule against the live rules.
fn matched_weight(template_rule: &Rule, live: &[&Rule], weights: &ComplianceWeights) -> f32 {
    if live.iter().any(|r| r.content_eq(template_rule)) {
        return weights.full;
    }
    if live
        .iter()
        .any(|r| r.name == template_rule.name && r.critical_eq(template_rule))
    {
        return weights.partial;
    }
    0.0
}

/// Template names absent from live and live names absent from the
/// template, computed per direction.
fn name_presence(live: &RuleSet, template: &RuleSet) -> (Vec<String>, Vec<String>) {
    let mut missing = Vec::new();
    let mut extra = Vec::new();
    for (template_rules, live_rules) in [
        (&template.inbound, &live.inbound),
        (&template.outbound, &live.outbound),
    ] {
        let template_names: BTreeSet<&str> =
            template_rules.iter().map(|r| r.name.as_str()).collect();
        let live_names: BTreeSet<&str> = live_rules.iter().map(|r| r.name.as_str()).collect();
        missing.extend(
            template_names
                .difference(&live_names)
                .map(|n| n.to_string()),
        );
        extra.extend(live_names.difference(&template_names).map(|n| n.to_string()));
    }
    missing.sort();
    extra.sort();
    (missing, extra)
}

/// Map compliance score to risk level, absent the open-rule override.
pub fn score_to_risk(score: f32) -> RiskLevel {
    if score >= 90.0 {
        RiskLevel::Low
    } else if score >= 70.0 {
        RiskLevel::Medium
    } else if score >= 40.0 {
        RiskLevel::High
    } else {
        RiskLevel::Critical
    }
}

/// Loads the group and template, runs the analysis, and writes score and
/// risk back onto the group. Fails with `NotFound` when either is missing
/// or the template is inactive.
pub async fn score_compliance(
    store: &dyn Store,
    group_id: Uuid,
    golden_rule_id: Uuid,
    weights: &ComplianceWeights,
) -> Result<ComplianceAnalysis, AppError> {
    let mut group = store
        .get_group(group_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("security group {group_id} not found")))?;
    let golden = store
        .get_golden_rule(golden_rule_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("golden rule {golden_rule_id} not found")))?;
    if !golden.is_active {
        return Err(AppError::NotFound(format!(
            "golden rule {golden_rule_id} is inactive"
        )));
    }

    let analysis = analyze(&group.rule_set(), &golden.rule_set(), weights);

    group.compliance_score = Some(analysis.score);
    group.risk_level = Some(analysis.risk_level);
    group.updated_at = Utc::now();
    store.update_group(&group).await?;

    tracing::info!(
        group = %group.external_id,
        golden_rule = %golden.name,
        score = analysis.score,
        risk = ?analysis.risk_level,
        "Compliance scored"
    );
    Ok(analysis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::golden::GoldenRule;
    use crate::models::group::SecurityGroup;
    use crate::models::rule::{Direction, RuleAccess};
    use crate::store::MemoryStore;
    use std::collections::BTreeMap;

    fn rule(name: &str, priority: i32, port: &str) -> Rule {
        Rule {
            name: name.to_string(),
            priority,
            direction: Direction::Inbound,
            access: RuleAccess::Allow,
            protocol: "tcp".to_string(),
            source_port_range: "*".to_string(),
            destination_port_range: port.to_string(),
            source_address_prefix: Some("10.0.0.0/8".to_string()),
            source_address_prefixes: Vec::new(),
            destination_address_prefix: Some("10.1.0.0/16".to_string()),
            destination_address_prefixes: Vec::new(),
            description: None,
            etag: None,
            provisioning_state: None,
        }
    }

    fn open_rule(name: &str) -> Rule {
        let mut r = rule(name, 4000, "*");
        r.source_address_prefix = Some("*".to_string());
        r.destination_address_prefix = Some("*".to_string());
        r
    }

    fn four_rule_template() -> RuleSet {
        RuleSet::new(
            vec![
                rule("allow-https", 100, "443"),
                rule("allow-ssh", 110, "22"),
                rule("allow-dns", 120, "53"),
                rule("allow-smtp", 130, "25"),
            ],
            vec![],
        )
    }

    #[test]
    fn three_of_four_matches_with_one_extra_scores_75_medium() {
        let template = four_rule_template();
        let live = RuleSet::new(
            vec![
                rule("allow-https", 100, "443"),
                rule("allow-ssh", 110, "22"),
                rule("allow-dns", 120, "53"),
                rule("allow-rdp", 140, "3389"),
            ],
            vec![],
        );

        let analysis = analyze(&live, &template, &ComplianceWeights::default());

        // 100 * 3.0 / 4
        assert_eq!(analysis.score, 75.0);
        assert_eq!(analysis.risk_level, RiskLevel::Medium);
        assert_eq!(analysis.missing_rules, vec!["allow-smtp".to_string()]);
        assert_eq!(analysis.extra_rules, vec!["allow-rdp".to_string()]);
        assert!(analysis.open_rules.is_empty());
        assert_eq!(
            analysis.recommendations,
            vec!["add rule 'allow-smtp' from the golden template".to_string()]
        );
    }

    #[test]
    fn content_match_earns_full_weight_regardless_of_name() {
        let template = RuleSet::new(vec![rule("allow-https", 100, "443")], vec![]);
        let live = RuleSet::new(vec![rule("permit-https", 100, "443")], vec![]);

        let analysis = analyze(&live, &template, &ComplianceWeights::default());

        // Matching is by content; name presence is reported separately.
        assert_eq!(analysis.score, 100.0);
        assert_eq!(analysis.risk_level, RiskLevel::Low);
        assert_eq!(analysis.missing_rules, vec!["allow-https".to_string()]);
        assert_eq!(analysis.extra_rules, vec!["permit-https".to_string()]);
    }

    #[test]
    fn name_match_with_drifted_priority_earns_partial_credit() {
        let template = RuleSet::new(vec![rule("allow-https", 100, "443")], vec![]);
        let mut drifted = rule("allow-https", 350, "443");
        drifted.description = Some("moved down".to_string());
        let live = RuleSet::new(vec![drifted], vec![]);

        let analysis = analyze(&live, &template, &ComplianceWeights::default());

        // 100 * 0.5 / 1
        assert_eq!(analysis.score, 50.0);
        assert_eq!(analysis.risk_level, RiskLevel::High);
    }

    #[test]
    fn partial_credit_weight_is_configurable() {
        let template = RuleSet::new(vec![rule("allow-https", 100, "443")], vec![]);
        let live = RuleSet::new(vec![rule("allow-https", 350, "443")], vec![]);
        let weights = ComplianceWeights {
            full: 1.0,
            partial: 0.25,
        };

        let analysis = analyze(&live, &template, &weights);
        assert_eq!(analysis.score, 25.0);
    }

    #[test]
    fn critical_field_drift_earns_nothing() {
        let template = RuleSet::new(vec![rule("allow-https", 100, "443")], vec![]);
        let live = RuleSet::new(vec![rule("allow-https", 100, "8443")], vec![]);

        let analysis = analyze(&live, &template, &ComplianceWeights::default());
        assert_eq!(analysis.score, 0.0);
        assert_eq!(analysis.risk_level, RiskLevel::Critical);
    }

    #[test]
    fn open_rule_elevates_risk_to_at_least_high() {
        let template = four_rule_template();
        let mut live = four_rule_template();
        live.inbound.push(open_rule("allow-any"));

        let analysis = analyze(&live, &template, &ComplianceWeights::default());

        // Full template match, but the open rule dominates.
        assert_eq!(analysis.score, 100.0);
        assert_eq!(analysis.risk_level, RiskLevel::High);
        assert_eq!(analysis.open_rules, vec!["allow-any".to_string()]);
        assert!(analysis
            .recommendations
            .contains(&"restrict source/destination from '*' on rule 'allow-any'".to_string()));
    }

    #[test]
    fn open_rule_never_lowers_a_critical_classification() {
        let template = four_rule_template();
        let live = RuleSet::new(vec![open_rule("allow-any")], vec![]);

        let analysis = analyze(&live, &template, &ComplianceWeights::default());
        assert_eq!(analysis.score, 0.0);
        assert_eq!(analysis.risk_level, RiskLevel::Critical);
    }

    #[test]
    fn adding_a_missing_template_rule_never_decreases_the_score() {
        let template = four_rule_template();
        let mut live = RuleSet::new(
            vec![rule("allow-https", 100, "443"), rule("allow-ssh", 110, "22")],
            vec![],
        );

        let before = analyze(&live, &template, &ComplianceWeights::default()).score;
        live.inbound.push(rule("allow-dns", 120, "53"));
        let after = analyze(&live, &template, &ComplianceWeights::default()).score;

        assert!(after >= before);
        assert_eq!(before, 50.0);
        assert_eq!(after, 75.0);
    }

    #[test]
    fn empty_template_scores_zero() {
        let live = four_rule_template();
        let analysis = analyze(&live, &RuleSet::default(), &ComplianceWeights::default());
        assert_eq!(analysis.score, 0.0);
        assert_eq!(analysis.risk_level, RiskLevel::Critical);
    }

    #[test]
    fn risk_boundaries() {
        assert_eq!(score_to_risk(100.0), RiskLevel::Low);
        assert_eq!(score_to_risk(90.0), RiskLevel::Low);
        assert_eq!(score_to_risk(89.9), RiskLevel::Medium);
        assert_eq!(score_to_risk(70.0), RiskLevel::Medium);
        assert_eq!(score_to_risk(69.9), RiskLevel::High);
        assert_eq!(score_to_risk(40.0), RiskLevel::High);
        assert_eq!(score_to_risk(39.9), RiskLevel::Critical);
        assert_eq!(score_to_risk(0.0), RiskLevel::Critical);
    }

    fn group_with(rules: Vec<Rule>) -> SecurityGroup {
        let now = Utc::now();
        SecurityGroup {
            id: Uuid::new_v4(),
            external_id: "ext-1".to_string(),
            name: "nsg-web".to_string(),
            resource_group: "rg-platform".to_string(),
            region: "westeurope".to_string(),
            subscription_id: "sub-1".to_string(),
            tenant_id: None,
            tags: BTreeMap::new(),
            inbound_rules: rules,
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

    fn golden(rules: Vec<Rule>, is_active: bool) -> GoldenRule {
        let now = Utc::now();
        GoldenRule {
            id: Uuid::new_v4(),
            name: "web-baseline".to_string(),
            description: None,
            inbound_rules: rules,
            outbound_rules: Vec::new(),
            compliance_rules: None,
            is_active,
            created_by: "admin".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn scoring_persists_score_and_risk_on_the_group() {
        let store = MemoryStore::new();
        let group = group_with(vec![rule("allow-https", 100, "443")]);
        let template = golden(vec![rule("allow-https", 100, "443")], true);
        store.insert_group(&group).await.unwrap();
        store.insert_golden_rule(&template).await.unwrap();

        let analysis =
            score_compliance(&store, group.id, template.id, &ComplianceWeights::default())
                .await
                .unwrap();
        assert_eq!(analysis.score, 100.0);

        let stored = store.get_group(group.id).await.unwrap().unwrap();
        assert_eq!(stored.compliance_score, Some(100.0));
        assert_eq!(stored.risk_level, Some(RiskLevel::Low));
    }

    #[tokio::test]
    async fn inactive_template_is_not_found() {
        let store = MemoryStore::new();
        let group = group_with(vec![rule("allow-https", 100, "443")]);
        let template = golden(vec![rule("allow-https", 100, "443")], false);
        store.insert_group(&group).await.unwrap();
        store.insert_golden_rule(&template).await.unwrap();

        let err = score_compliance(&store, group.id, template.id, &ComplianceWeights::default())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
