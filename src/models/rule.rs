//! Security rule model: canonical forms, equality semantics, and rule set diffing.

use serde::{Deserialize, Serialize};

use crate::errors::AppError;

const WILDCARD: &str = "*";

// -- Enums --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Inbound,
    Outbound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAccess {
    Allow,
    Deny,
}

// -- Rule --

/// A single security rule as mirrored from the external authority.
///
/// `etag` and `provisioning_state` are transient control-plane fields; they
/// ride along for observability but are excluded from every comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub name: String,
    pub priority: i32,
    pub direction: Direction,
    pub access: RuleAccess,
    pub protocol: String,
    pub source_port_range: String,
    pub destination_port_range: String,
    #[serde(default)]
    pub source_address_prefix: Option<String>,
    #[serde(default)]
    pub source_address_prefixes: Vec<String>,
    #[serde(default)]
    pub destination_address_prefix: Option<String>,
    #[serde(default)]
    pub destination_address_prefixes: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub etag: Option<String>,
    #[serde(default)]
    pub provisioning_state: Option<String>,
}

impl Rule {
    /// Canonical form used for all equality checks: protocol lowercased
    /// (wildcard preserved), port ranges trimmed, prefix lists sorted, a
    /// one-entry prefix list collapsed into the single-prefix field, empty
    /// descriptions treated as absent, transient fields cleared.
    ///
    /// Idempotent: `r.canonical().canonical() == r.canonical()`.
    pub fn canonical(&self) -> Rule {
        let (source_address_prefix, source_address_prefixes) =
            canonical_prefixes(&self.source_address_prefix, &self.source_address_prefixes);
        let (destination_address_prefix, destination_address_prefixes) = canonical_prefixes(
            &self.destination_address_prefix,
            &self.destination_address_prefixes,
        );
        Rule {
            name: self.name.trim().to_string(),
            priority: self.priority,
            direction: self.direction,
            access: self.access,
            protocol: canonical_protocol(&self.protocol),
            source_port_range: self.source_port_range.trim().to_string(),
            destination_port_range: self.destination_port_range.trim().to_string(),
            source_address_prefix,
            source_address_prefixes,
            destination_address_prefix,
            destination_address_prefixes,
            description: self
                .description
                .as_deref()
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(String::from),
            etag: None,
            provisioning_state: None,
        }
    }

    /// Full equality of canonical forms. Wildcards (`*`) compare equal only
    /// to other wildcards, which falls out of plain string comparison.
    pub fn semantic_eq(&self, other: &Rule) -> bool {
        self.canonical() == other.canonical()
    }

    /// Equality of canonical forms ignoring the rule name.
    pub fn content_eq(&self, other: &Rule) -> bool {
        let mut a = self.canonical();
        let mut b = other.canonical();
        a.name.clear();
        b.name.clear();
        a == b
    }

    /// Equality of the critical fields only: direction, access, protocol,
    /// port ranges, and address prefixes. Name, priority, and description
    /// are not consulted.
    pub fn critical_eq(&self, other: &Rule) -> bool {
        let a = self.canonical();
        let b = other.canonical();
        a.direction == b.direction
            && a.access == b.access
            && a.protocol == b.protocol
            && a.source_port_range == b.source_port_range
            && a.destination_port_range == b.destination_port_range
            && a.source_address_prefix == b.source_address_prefix
            && a.source_address_prefixes == b.source_address_prefixes
            && a.destination_address_prefix == b.destination_address_prefix
            && a.destination_address_prefixes == b.destination_address_prefixes
    }

    /// An allow rule whose source and destination both normalize to the
    /// single wildcard prefix. Such a rule dominates risk classification.
    pub fn is_open_allow(&self) -> bool {
        let c = self.canonical();
        c.access == RuleAccess::Allow
            && c.source_address_prefix.as_deref() == Some(WILDCARD)
            && c.destination_address_prefix.as_deref() == Some(WILDCARD)
    }
}

fn canonical_protocol(protocol: &str) -> String {
    let trimmed = protocol.trim();
    if trimmed == WILDCARD {
        WILDCARD.to_string()
    } else {
        trimmed.to_lowercase()
    }
}

/// Single-value and one-entry-list prefix forms are equivalent; the
/// canonical representation is the single field. Longer lists are sorted.
fn canonical_prefixes(
    single: &Option<String>,
    list: &[String],
) -> (Option<String>, Vec<String>) {
    let mut entries: Vec<String> = match single.as_deref().map(str::trim) {
        Some(value) if !value.is_empty() => vec![value.to_string()],
        _ => list
            .iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect(),
    };
    entries.sort();
    if entries.len() == 1 {
        (Some(entries.remove(0)), Vec::new())
    } else {
        (None, entries)
    }
}

// -- Rule ingestion --

/// Wire-side rule payload. Mandatory classification fields arrive as
/// options so that missing values surface as validation errors instead of
/// deserialization failures with no context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleInput {
    pub name: String,
    pub priority: i32,
    pub direction: Option<Direction>,
    pub access: Option<RuleAccess>,
    pub protocol: Option<String>,
    #[serde(default)]
    pub source_port_range: Option<String>,
    #[serde(default)]
    pub destination_port_range: Option<String>,
    #[serde(default)]
    pub source_address_prefix: Option<String>,
    #[serde(default)]
    pub source_address_prefixes: Vec<String>,
    #[serde(default)]
    pub destination_address_prefix: Option<String>,
    #[serde(default)]
    pub destination_address_prefixes: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl RuleInput {
    /// Validates the payload into a [`Rule`]. Missing direction, access, or
    /// protocol is rejected, never coerced.
    pub fn into_rule(self) -> Result<Rule, AppError> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::validation("rule name must not be empty"));
        }
        let direction = self.direction.ok_or_else(|| {
            AppError::validation(format!("rule '{name}' is missing a direction"))
        })?;
        let access = self
            .access
            .ok_or_else(|| AppError::validation(format!("rule '{name}' is missing an access")))?;
        let protocol = match self.protocol.as_deref().map(str::trim) {
            Some(p) if !p.is_empty() => p.to_string(),
            _ => {
                return Err(AppError::validation(format!(
                    "rule '{name}' is missing a protocol"
                )))
            }
        };
        if self.priority <= 0 {
            return Err(AppError::validation(format!(
                "rule '{name}' has an invalid priority {}",
                self.priority
            )));
        }
        let source_port_range = require_port(&self.source_port_range, &name, "source")?;
        let destination_port_range =
            require_port(&self.destination_port_range, &name, "destination")?;
        validate_prefixes(
            &self.source_address_prefix,
            &self.source_address_prefixes,
            &name,
            "source",
        )?;
        validate_prefixes(
            &self.destination_address_prefix,
            &self.destination_address_prefixes,
            &name,
            "destination",
        )?;

        Ok(Rule {
            name,
            priority: self.priority,
            direction,
            access,
            protocol,
            source_port_range,
            destination_port_range,
            source_address_prefix: self.source_address_prefix,
            source_address_prefixes: self.source_address_prefixes,
            destination_address_prefix: self.destination_address_prefix,
            destination_address_prefixes: self.destination_address_prefixes,
            description: self.description,
            etag: None,
            provisioning_state: None,
        })
    }
}

fn require_port(value: &Option<String>, rule: &str, side: &str) -> Result<String, AppError> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(AppError::validation(format!(
            "rule '{rule}' is missing a {side} port range"
        ))),
    }
}

fn validate_prefixes(
    single: &Option<String>,
    list: &[String],
    rule: &str,
    side: &str,
) -> Result<(), AppError> {
    let has_single = single.as_deref().map(str::trim).is_some_and(|v| !v.is_empty());
    let has_list = list.iter().any(|p| !p.trim().is_empty());
    if has_single && has_list {
        return Err(AppError::validation(format!(
            "rule '{rule}' sets both a single {side} address prefix and a prefix list"
        )));
    }
    if !has_single && !has_list {
        return Err(AppError::validation(format!(
            "rule '{rule}' is missing a {side} address prefix"
        )));
    }
    Ok(())
}

/// Validates a batch of wire rules; the first malformed rule aborts.
pub fn validate_rules(inputs: Vec<RuleInput>) -> Result<Vec<Rule>, AppError> {
    inputs.into_iter().map(RuleInput::into_rule).collect()
}

// -- Rule sets --

/// Ordered inbound and outbound rule sequences for one security group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    pub inbound: Vec<Rule>,
    pub outbound: Vec<Rule>,
}

impl RuleSet {
    pub fn new(inbound: Vec<Rule>, outbound: Vec<Rule>) -> Self {
        Self { inbound, outbound }
    }

    /// Splits an already-validated flat rule list by direction, preserving
    /// relative order within each direction.
    pub fn from_rules(rules: Vec<Rule>) -> Self {
        let mut set = RuleSet::default();
        for rule in rules {
            match rule.direction {
                Direction::Inbound => set.inbound.push(rule),
                Direction::Outbound => set.outbound.push(rule),
            }
        }
        set
    }

    pub fn canonical(&self) -> RuleSet {
        RuleSet {
            inbound: self.inbound.iter().map(Rule::canonical).collect(),
            outbound: self.outbound.iter().map(Rule::canonical).collect(),
        }
    }

    pub fn semantic_eq(&self, other: &RuleSet) -> bool {
        self.canonical() == other.canonical()
    }

    pub fn all_rules(&self) -> impl Iterator<Item = &Rule> {
        self.inbound.iter().chain(self.outbound.iter())
    }

    pub fn rule_count(&self) -> usize {
        self.inbound.len() + self.outbound.len()
    }

    /// Added / removed / modified rule names between two snapshots, keyed by
    /// direction and name. Used for ledger summaries.
    pub fn diff(previous: &RuleSet, current: &RuleSet) -> RuleSetDiff {
        let mut diff = RuleSetDiff::default();
        let prev: Vec<(&Rule, Direction)> = previous
            .all_rules()
            .map(|r| (r, r.direction))
            .collect();
        let curr: Vec<(&Rule, Direction)> = current.all_rules().map(|r| (r, r.direction)).collect();

        for (rule, direction) in &curr {
            match prev
                .iter()
                .find(|(p, d)| *d == *direction && p.name == rule.name)
            {
                None => diff.added.push(rule.name.clone()),
                Some((p, _)) if !p.semantic_eq(rule) => diff.modified.push(rule.name.clone()),
                Some(_) => {}
            }
        }
        for (rule, direction) in &prev {
            if !curr
                .iter()
                .any(|(c, d)| *d == *direction && c.name == rule.name)
            {
                diff.removed.push(rule.name.clone());
            }
        }
        diff.added.sort();
        diff.removed.sort();
        diff.modified.sort();
        diff
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSetDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub modified: Vec<String>,
}

impl RuleSetDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }

    /// Deterministic one-line description for change summaries.
    pub fn describe(&self) -> String {
        if self.is_empty() {
            return "no rule changes".to_string();
        }
        let mut parts = Vec::new();
        if !self.added.is_empty() {
            parts.push(format!("added {}", self.added.join(", ")));
        }
        if !self.removed.is_empty() {
            parts.push(format!("removed {}", self.removed.join(", ")));
        }
        if !self.modified.is_empty() {
            parts.push(format!("modified {}", self.modified.join(", ")));
        }
        parts.join("; ")
    }
}
