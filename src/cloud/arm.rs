//! REST client for the ARM-style control plane.
//!
//! Scope ids are resource paths
//! (`/subscriptions/{sub}/resourceGroups/{rg}/providers/.../networkSecurityGroups/{name}`);
//! the wire format wraps rule fields in a `properties` envelope with
//! capitalized enum values.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use async_trait::async_trait;

use crate::models::rule::{Direction, Rule, RuleAccess, RuleInput, RuleSet};

use super::{CloudClient, CloudError, CloudObservation, ResourceMetadata};

const API_VERSION: &str = "2023-09-01";

#[derive(Debug, Clone)]
pub struct ArmClient {
    http: reqwest::Client,
    base_url: String,
    subscription_id: String,
    tenant_id: Option<String>,
    token: String,
    timeout_secs: u64,
}

impl ArmClient {
    pub fn new(
        base_url: impl Into<String>,
        subscription_id: impl Into<String>,
        tenant_id: Option<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, CloudError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CloudError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            subscription_id: subscription_id.into(),
            tenant_id,
            token: token.into(),
            timeout_secs: timeout.as_secs(),
        })
    }

    fn resource_url(&self, scope_id: &str) -> String {
        format!("{}{scope_id}?api-version={API_VERSION}", self.base_url)
    }

    fn list_url(&self) -> String {
        format!(
            "{}/subscriptions/{}/providers/Microsoft.Network/networkSecurityGroups?api-version={API_VERSION}",
            self.base_url, self.subscription_id
        )
    }

    fn map_transport(&self, e: reqwest::Error) -> CloudError {
        if e.is_timeout() {
            CloudError::Timeout(self.timeout_secs)
        } else {
            CloudError::Transport(e.to_string())
        }
    }

    async fn fetch_group(&self, scope_id: &str) -> Result<ArmSecurityGroup, CloudError> {
        let response = self
            .http
            .get(self.resource_url(scope_id))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(CloudError::NotFound(scope_id.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CloudError::Rejected(format!("status {status}: {body}")));
        }
        response
            .json::<ArmSecurityGroup>()
            .await
            .map_err(|e| CloudError::Transport(format!("decoding response: {e}")))
    }
}

#[async_trait]
impl CloudClient for ArmClient {
    async fn fetch_rule_set(&self, scope_id: &str) -> Result<RuleSet, CloudError> {
        let group = self.fetch_group(scope_id).await?;
        rule_set_from_wire(group.properties.security_rules)
    }

    async fn fetch_metadata(&self, scope_id: &str) -> Result<ResourceMetadata, CloudError> {
        let group = self.fetch_group(scope_id).await?;
        let name = group
            .name
            .ok_or_else(|| CloudError::InvalidPayload(format!("{scope_id} has no name")))?;
        let resource_group = parse_resource_group(scope_id).ok_or_else(|| {
            CloudError::InvalidPayload(format!("{scope_id} is not a resource path"))
        })?;
        Ok(ResourceMetadata {
            name,
            resource_group,
            region: group.location.unwrap_or_default(),
            tags: group.tags,
        })
    }

    async fn apply_rule_set(&self, scope_id: &str, rules: &RuleSet) -> Result<(), CloudError> {
        let body = ArmSecurityGroup {
            id: None,
            name: None,
            location: None,
            etag: None,
            tags: BTreeMap::new(),
            properties: ArmNsgProperties {
                security_rules: rules.all_rules().map(rule_to_wire).collect(),
                provisioning_state: None,
            },
        };

        let response = self
            .http
            .put(self.resource_url(scope_id))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(CloudError::NotFound(scope_id.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CloudError::Rejected(format!("status {status}: {body}")));
        }
        Ok(())
    }

    async fn list_groups(&self) -> Result<Vec<CloudObservation>, CloudError> {
        let response = self
            .http
            .get(self.list_url())
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CloudError::Rejected(format!("status {status}: {body}")));
        }
        let envelope = response
            .json::<ArmListEnvelope>()
            .await
            .map_err(|e| CloudError::Transport(format!("decoding response: {e}")))?;

        // A malformed entry poisons neither the listing nor its siblings.
        let mut observations = Vec::with_capacity(envelope.value.len());
        for group in envelope.value {
            match self.observation_from_wire(group) {
                Ok(obs) => observations.push(obs),
                Err(e) => tracing::warn!(error = %e, "skipping unreadable security group"),
            }
        }
        Ok(observations)
    }
}

impl ArmClient {
    fn observation_from_wire(
        &self,
        group: ArmSecurityGroup,
    ) -> Result<CloudObservation, CloudError> {
        let external_id = group
            .id
            .ok_or_else(|| CloudError::InvalidPayload("listed group has no id".to_string()))?;
        let name = group.name.ok_or_else(|| {
            CloudError::InvalidPayload(format!("{external_id} has no name"))
        })?;
        let resource_group = parse_resource_group(&external_id).ok_or_else(|| {
            CloudError::InvalidPayload(format!("{external_id} is not a resource path"))
        })?;
        Ok(CloudObservation {
            external_id,
            name,
            resource_group,
            region: group.location.unwrap_or_default(),
            subscription_id: self.subscription_id.clone(),
            tenant_id: self.tenant_id.clone(),
            tags: group.tags,
            rules: rule_set_from_wire(group.properties.security_rules)?,
        })
    }
}

// -- Wire format --

#[derive(Debug, Deserialize)]
struct ArmListEnvelope {
    #[serde(default)]
    value: Vec<ArmSecurityGroup>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArmSecurityGroup {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    etag: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    tags: BTreeMap<String, String>,
    #[serde(default)]
    properties: ArmNsgProperties,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArmNsgProperties {
    #[serde(default)]
    security_rules: Vec<ArmSecurityRule>,
    #[serde(skip_serializing_if = "Option::is_none")]
    provisioning_state: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArmSecurityRule {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    etag: Option<String>,
    #[serde(default)]
    properties: ArmRuleProperties,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArmRuleProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    priority: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    direction: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    access: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    protocol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_port_range: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    destination_port_range: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_address_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    source_address_prefixes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    destination_address_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    destination_address_prefixes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    provisioning_state: Option<String>,
}

fn parse_direction(value: &str) -> Option<Direction> {
    match value.trim().to_lowercase().as_str() {
        "inbound" => Some(Direction::Inbound),
        "outbound" => Some(Direction::Outbound),
        _ => None,
    }
}

fn parse_access(value: &str) -> Option<RuleAccess> {
    match value.trim().to_lowercase().as_str() {
        "allow" => Some(RuleAccess::Allow),
        "deny" => Some(RuleAccess::Deny),
        _ => None,
    }
}

fn direction_to_wire(direction: Direction) -> &'static str {
    match direction {
        Direction::Inbound => "Inbound",
        Direction::Outbound => "Outbound",
    }
}

fn access_to_wire(access: RuleAccess) -> &'static str {
    match access {
        RuleAccess::Allow => "Allow",
        RuleAccess::Deny => "Deny",
    }
}

/// Extracts the resource group segment from an ARM resource path.
fn parse_resource_group(scope_id: &str) -> Option<String> {
    let mut segments = scope_id.split('/').filter(|s| !s.is_empty());
    while let Some(segment) = segments.next() {
        if segment.eq_ignore_ascii_case("resourceGroups") {
            return segments.next().map(str::to_string);
        }
    }
    None
}

fn rule_from_wire(wire: ArmSecurityRule) -> Result<Rule, CloudError> {
    let name = wire.name.clone().unwrap_or_default();
    let props = wire.properties;
    let invalid = |msg: String| CloudError::InvalidPayload(msg);

    let direction = match props.direction.as_deref() {
        None => None,
        Some(raw) => Some(parse_direction(raw).ok_or_else(|| {
            invalid(format!("rule '{name}' has an unknown direction '{raw}'"))
        })?),
    };
    let access = match props.access.as_deref() {
        None => None,
        Some(raw) => Some(
            parse_access(raw)
                .ok_or_else(|| invalid(format!("rule '{name}' has an unknown access '{raw}'")))?,
        ),
    };
    let priority = props
        .priority
        .ok_or_else(|| invalid(format!("rule '{name}' is missing a priority")))?;

    let input = RuleInput {
        name,
        priority,
        direction,
        access,
        protocol: props.protocol,
        source_port_range: props.source_port_range,
        destination_port_range: props.destination_port_range,
        source_address_prefix: props.source_address_prefix,
        source_address_prefixes: props.source_address_prefixes,
        destination_address_prefix: props.destination_address_prefix,
        destination_address_prefixes: props.destination_address_prefixes,
        description: props.description,
    };
    let mut rule = input
        .into_rule()
        .map_err(|e| CloudError::InvalidPayload(e.to_string()))?;
    rule.etag = wire.etag;
    rule.provisioning_state = props.provisioning_state;
    Ok(rule)
}

fn rule_set_from_wire(wires: Vec<ArmSecurityRule>) -> Result<RuleSet, CloudError> {
    let mut rules = Vec::with_capacity(wires.len());
    for wire in wires {
        rules.push(rule_from_wire(wire)?);
    }
    Ok(RuleSet::from_rules(rules))
}

fn rule_to_wire(rule: &Rule) -> ArmSecurityRule {
    ArmSecurityRule {
        name: Some(rule.name.clone()),
        etag: None,
        properties: ArmRuleProperties {
            priority: Some(rule.priority),
            direction: Some(direction_to_wire(rule.direction).to_string()),
            access: Some(access_to_wire(rule.access).to_string()),
            protocol: Some(rule.protocol.clone()),
            source_port_range: Some(rule.source_port_range.clone()),
            destination_port_range: Some(rule.destination_port_range.clone()),
            source_address_prefix: rule.source_address_prefix.clone(),
            source_address_prefixes: rule.source_address_prefixes.clone(),
            destination_address_prefix: rule.destination_address_prefix.clone(),
            destination_address_prefixes: rule.destination_address_prefixes.clone(),
            description: rule.description.clone(),
            provisioning_state: None,
        },
    }
}
