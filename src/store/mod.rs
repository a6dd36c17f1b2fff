//! Durable store abstraction for the mirror and its ledgers.
//!
//! Change records and backups are insert-only at the trait level: there is
//! deliberately no update or delete surface for them.

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::backup::Backup;
use crate::models::change::ChangeRecord;
use crate::models::golden::GoldenRule;
use crate::models::group::{GroupFilter, SecurityGroup};
use crate::models::pagination::Pagination;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Repository contract shared by the Postgres store and the in-memory
/// store. Identifiers and timestamps are generated by the callers so both
/// implementations behave identically.
#[async_trait]
pub trait Store: Send + Sync {
    async fn insert_group(&self, group: &SecurityGroup) -> Result<(), StoreError>;

    /// Full-row update keyed by id. Updating a missing row is a no-op.
    async fn update_group(&self, group: &SecurityGroup) -> Result<(), StoreError>;

    async fn get_group(&self, id: Uuid) -> Result<Option<SecurityGroup>, StoreError>;

    async fn get_group_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<SecurityGroup>, StoreError>;

    /// Filtered page of groups plus the unpaged total.
    async fn list_groups(
        &self,
        filter: &GroupFilter,
        pagination: &Pagination,
    ) -> Result<(Vec<SecurityGroup>, i64), StoreError>;

    /// Removes the mirror row only. Returns whether a row existed.
    async fn delete_group(&self, id: Uuid) -> Result<bool, StoreError>;

    async fn insert_change(&self, change: &ChangeRecord) -> Result<(), StoreError>;

    /// Most-recent-first, ordered by creation time with the time-ordered id
    /// as tie-break.
    async fn list_changes(
        &self,
        group_id: Uuid,
        limit: i64,
    ) -> Result<Vec<ChangeRecord>, StoreError>;

    async fn get_change(
        &self,
        group_id: Uuid,
        change_id: Uuid,
    ) -> Result<Option<ChangeRecord>, StoreError>;

    async fn insert_backup(&self, backup: &Backup) -> Result<(), StoreError>;

    async fn list_backups(&self, group_id: Uuid) -> Result<Vec<Backup>, StoreError>;

    async fn get_backup(
        &self,
        group_id: Uuid,
        backup_id: Uuid,
    ) -> Result<Option<Backup>, StoreError>;

    async fn insert_golden_rule(&self, rule: &GoldenRule) -> Result<(), StoreError>;

    async fn update_golden_rule(&self, rule: &GoldenRule) -> Result<(), StoreError>;

    async fn get_golden_rule(&self, id: Uuid) -> Result<Option<GoldenRule>, StoreError>;

    async fn list_golden_rules(
        &self,
        include_inactive: bool,
    ) -> Result<Vec<GoldenRule>, StoreError>;

    /// Cheap readiness probe.
    async fn ping(&self) -> Result<(), StoreError>;
}
