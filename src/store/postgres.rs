//! Postgres-backed store. Rule sets and configuration snapshots live in
//! JSONB columns; enums map onto Postgres enum types.

use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use async_trait::async_trait;

use crate::models::backup::Backup;
use crate::models::change::ChangeRecord;
use crate::models::golden::GoldenRule;
use crate::models::group::{GroupFilter, SecurityGroup};
use crate::models::pagination::Pagination;

use super::{Store, StoreError};

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn insert_group(&self, group: &SecurityGroup) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO security_groups (id, external_id, name, resource_group, region,
                subscription_id, tenant_id, tags, inbound_rules, outbound_rules,
                compliance_score, risk_level, stale, last_sync, last_backup,
                created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(group.id)
        .bind(&group.external_id)
        .bind(&group.name)
        .bind(&group.resource_group)
        .bind(&group.region)
        .bind(&group.subscription_id)
        .bind(&group.tenant_id)
        .bind(Json(&group.tags))
        .bind(Json(&group.inbound_rules))
        .bind(Json(&group.outbound_rules))
        .bind(group.compliance_score)
        .bind(group.risk_level)
        .bind(group.stale)
        .bind(group.last_sync)
        .bind(group.last_backup)
        .bind(group.created_at)
        .bind(group.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                StoreError::Conflict(format!(
                    "security group '{}' already mirrored",
                    group.external_id
                ))
            }
            _ => StoreError::Database(e),
        })?;
        Ok(())
    }

    async fn update_group(&self, group: &SecurityGroup) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE security_groups SET
                name = $2,
                resource_group = $3,
                region = $4,
                subscription_id = $5,
                tenant_id = $6,
                tags = $7,
                inbound_rules = $8,
                outbound_rules = $9,
                compliance_score = $10,
                risk_level = $11,
                stale = $12,
                last_sync = $13,
                last_backup = $14,
                updated_at = $15
            WHERE id = $1
            "#,
        )
        .bind(group.id)
        .bind(&group.name)
        .bind(&group.resource_group)
        .bind(&group.region)
        .bind(&group.subscription_id)
        .bind(&group.tenant_id)
        .bind(Json(&group.tags))
        .bind(Json(&group.inbound_rules))
        .bind(Json(&group.outbound_rules))
        .bind(group.compliance_score)
        .bind(group.risk_level)
        .bind(group.stale)
        .bind(group.last_sync)
        .bind(group.last_backup)
        .bind(group.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_group(&self, id: Uuid) -> Result<Option<SecurityGroup>, StoreError> {
        let group =
            sqlx::query_as::<_, SecurityGroup>("SELECT * FROM security_groups WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(group)
    }

    async fn get_group_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<SecurityGroup>, StoreError> {
        let group = sqlx::query_as::<_, SecurityGroup>(
            "SELECT * FROM security_groups WHERE external_id = $1",
        )
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(group)
    }

    async fn list_groups(
        &self,
        filter: &GroupFilter,
        pagination: &Pagination,
    ) -> Result<(Vec<SecurityGroup>, i64), StoreError> {
        let mut conditions: Vec<String> = Vec::new();
        let mut param_index = 0u32;

        // Build dynamic WHERE clauses
        if filter.region.is_some() {
            param_index += 1;
            conditions.push(format!("region = ${param_index}"));
        }
        if filter.resource_group.is_some() {
            param_index += 1;
            conditions.push(format!("resource_group = ${param_index}"));
        }
        if filter.risk_level.is_some() {
            param_index += 1;
            conditions.push(format!("risk_level = ${param_index}"));
        }
        if filter.search.is_some() {
            param_index += 1;
            conditions.push(format!(
                "(name ILIKE ${param_index} OR external_id ILIKE ${param_index})"
            ));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let count_sql = format!("SELECT COUNT(*) FROM security_groups {where_clause}");
        let data_sql = format!(
            "SELECT * FROM security_groups {where_clause} ORDER BY name ASC LIMIT {} OFFSET {}",
            pagination.limit(),
            pagination.offset()
        );

        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        let mut data_query = sqlx::query_as::<_, SecurityGroup>(&data_sql);

        // Bind parameters in the same order for both queries
        macro_rules! bind_both {
            ($val:expr) => {
                count_query = count_query.bind($val);
                data_query = data_query.bind($val);
            };
        }

        if let Some(ref region) = filter.region {
            bind_both!(region);
        }
        if let Some(ref rg) = filter.resource_group {
            bind_both!(rg);
        }
        if let Some(risk) = filter.risk_level {
            bind_both!(risk);
        }
        if let Some(ref search) = filter.search {
            let pattern = format!("%{search}%");
            count_query = count_query.bind(pattern.clone());
            data_query = data_query.bind(pattern);
        }

        let total = count_query.fetch_one(&self.pool).await?;
        let items = data_query.fetch_all(&self.pool).await?;

        Ok((items, total))
    }

    async fn delete_group(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM security_groups WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_change(&self, change: &ChangeRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO change_records (id, group_id, change_type, previous_state,
                new_state, summary, actor, can_rollback, rollback_backup_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(change.id)
        .bind(change.group_id)
        .bind(change.change_type)
        .bind(change.previous_state.as_ref().map(Json))
        .bind(Json(&change.new_state))
        .bind(&change.summary)
        .bind(&change.actor)
        .bind(change.can_rollback)
        .bind(change.rollback_backup_id)
        .bind(change.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_changes(
        &self,
        group_id: Uuid,
        limit: i64,
    ) -> Result<Vec<ChangeRecord>, StoreError> {
        let changes = sqlx::query_as::<_, ChangeRecord>(
            "SELECT * FROM change_records WHERE group_id = $1 \
             ORDER BY created_at DESC, id DESC LIMIT $2",
        )
        .bind(group_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(changes)
    }

    async fn get_change(
        &self,
        group_id: Uuid,
        change_id: Uuid,
    ) -> Result<Option<ChangeRecord>, StoreError> {
        let change = sqlx::query_as::<_, ChangeRecord>(
            "SELECT * FROM change_records WHERE group_id = $1 AND id = $2",
        )
        .bind(group_id)
        .bind(change_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(change)
    }

    async fn insert_backup(&self, backup: &Backup) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO backups (id, group_id, name, backup_type, configuration,
                storage_locator, created_by, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(backup.id)
        .bind(backup.group_id)
        .bind(&backup.name)
        .bind(backup.backup_type)
        .bind(Json(&backup.configuration))
        .bind(&backup.storage_locator)
        .bind(&backup.created_by)
        .bind(backup.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_backups(&self, group_id: Uuid) -> Result<Vec<Backup>, StoreError> {
        let backups = sqlx::query_as::<_, Backup>(
            "SELECT * FROM backups WHERE group_id = $1 ORDER BY created_at DESC, id DESC",
        )
        .bind(group_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(backups)
    }

    async fn get_backup(
        &self,
        group_id: Uuid,
        backup_id: Uuid,
    ) -> Result<Option<Backup>, StoreError> {
        let backup = sqlx::query_as::<_, Backup>(
            "SELECT * FROM backups WHERE group_id = $1 AND id = $2",
        )
        .bind(group_id)
        .bind(backup_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(backup)
    }

    async fn insert_golden_rule(&self, rule: &GoldenRule) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO golden_rules (id, name, description, inbound_rules, outbound_rules,
                compliance_rules, is_active, created_by, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(rule.id)
        .bind(&rule.name)
        .bind(&rule.description)
        .bind(Json(&rule.inbound_rules))
        .bind(Json(&rule.outbound_rules))
        .bind(&rule.compliance_rules)
        .bind(rule.is_active)
        .bind(&rule.created_by)
        .bind(rule.created_at)
        .bind(rule.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_golden_rule(&self, rule: &GoldenRule) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE golden_rules SET
                name = $2,
                description = $3,
                inbound_rules = $4,
                outbound_rules = $5,
                compliance_rules = $6,
                is_active = $7,
                updated_at = $8
            WHERE id = $1
            "#,
        )
        .bind(rule.id)
        .bind(&rule.name)
        .bind(&rule.description)
        .bind(Json(&rule.inbound_rules))
        .bind(Json(&rule.outbound_rules))
        .bind(&rule.compliance_rules)
        .bind(rule.is_active)
        .bind(rule.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_golden_rule(&self, id: Uuid) -> Result<Option<GoldenRule>, StoreError> {
        let rule = sqlx::query_as::<_, GoldenRule>("SELECT * FROM golden_rules WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(rule)
    }

    async fn list_golden_rules(
        &self,
        include_inactive: bool,
    ) -> Result<Vec<GoldenRule>, StoreError> {
        let sql = if include_inactive {
            "SELECT * FROM golden_rules ORDER BY name ASC"
        } else {
            "SELECT * FROM golden_rules WHERE is_active = true ORDER BY name ASC"
        };
        let rules = sqlx::query_as::<_, GoldenRule>(sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rules)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }
}
