//! Cloud control-plane boundary.
//!
//! The engine never talks to the authority directly; it goes through
//! [`CloudClient`], which keeps the reconciler and mutation paths testable
//! with an in-process double.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::models::rule::RuleSet;

pub mod arm;
pub mod fake;

pub use arm::ArmClient;
pub use fake::FakeCloud;

#[derive(Debug, thiserror::Error)]
pub enum CloudError {
    /// The authority does not know the scope id.
    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// The authority answered with a non-success status.
    #[error("authority rejected the request: {0}")]
    Rejected(String),

    /// The authority answered with a payload the rule model refuses.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("transport error: {0}")]
    Transport(String),
}

/// Everything the authority reports about one security group.
#[derive(Debug, Clone)]
pub struct CloudObservation {
    pub external_id: String,
    pub name: String,
    pub resource_group: String,
    pub region: String,
    pub subscription_id: String,
    pub tenant_id: Option<String>,
    pub tags: BTreeMap<String, String>,
    pub rules: RuleSet,
}

/// Placement and tag subset of an observation.
#[derive(Debug, Clone)]
pub struct ResourceMetadata {
    pub name: String,
    pub resource_group: String,
    pub region: String,
    pub tags: BTreeMap<String, String>,
}

/// Control-plane contract. All calls are bounded by the client's configured
/// timeout; a timeout is a failure, never a success.
#[async_trait]
pub trait CloudClient: Send + Sync {
    /// Authoritative rule set for one scope id.
    async fn fetch_rule_set(&self, scope_id: &str) -> Result<RuleSet, CloudError>;

    /// Authoritative name, placement, and tags for one scope id.
    async fn fetch_metadata(&self, scope_id: &str) -> Result<ResourceMetadata, CloudError>;

    /// Pushes a complete rule set to the authority.
    async fn apply_rule_set(&self, scope_id: &str, rules: &RuleSet) -> Result<(), CloudError>;

    /// All security groups visible in the configured subscription scope.
    async fn list_groups(&self) -> Result<Vec<CloudObservation>, CloudError>;
}
