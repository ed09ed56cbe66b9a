//! PostgreSQL store implementation.

use std::time::Duration;

use async_trait::async_trait;
use byoc_config::ConfigResolved;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;

use crate::config::DatabaseConfig;
use crate::error::{ControlError, ControlResult};
use crate::types::{
    AddonInstallRecord, DeploymentRecord, DeploymentStatus, StackName, StatusUpdate, TenantId,
    Transition,
};

use super::{AddonStore, ConfigStore, DeploymentFilter, DeploymentStore};

const DEPLOYMENT_COLUMNS: &str = "stack_name, tenant_id, environment, region, role_arn, \
     status, run_id, outputs, error, created_at, updated_at";

/// PostgreSQL-backed store for deployments, configurations and addon installs.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect to PostgreSQL and create a new store.
    ///
    /// The required tables are created if they don't exist.
    pub async fn new(url: &str) -> ControlResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await?;

        Self::from_pool(pool).await
    }

    /// Connect using the pool settings from configuration.
    pub async fn connect(config: &DatabaseConfig) -> ControlResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(&config.url)
            .await?;

        Self::from_pool(pool).await
    }

    /// Create a store from an existing connection pool.
    pub async fn from_pool(pool: PgPool) -> ControlResult<Self> {
        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    /// Ensure the required tables exist.
    async fn ensure_schema(&self) -> ControlResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS deployments (
                stack_name TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                environment TEXT NOT NULL,
                region TEXT NOT NULL,
                role_arn TEXT NOT NULL,
                status TEXT NOT NULL,
                run_id TEXT,
                outputs JSONB,
                error TEXT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tenant_configs (
                tenant_id TEXT PRIMARY KEY,
                config JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS addon_installs (
                stack_name TEXT NOT NULL,
                addon_name TEXT NOT NULL,
                command_id TEXT,
                host_id TEXT,
                dispatched_at TIMESTAMPTZ NOT NULL,
                error TEXT,
                PRIMARY KEY (stack_name, addon_name)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_deployments_tenant
            ON deployments (tenant_id)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_deployments_status
            ON deployments (status)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_deployments_created_at
            ON deployments (created_at DESC)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Parse a row into a DeploymentRecord.
    fn row_to_record(row: &PgRow) -> ControlResult<DeploymentRecord> {
        let stack_name: String = row.get("stack_name");
        let tenant_id: String = row.get("tenant_id");
        let status_str: String = row.get("status");
        let created_at: DateTime<Utc> = row.get("created_at");
        let updated_at: DateTime<Utc> = row.get("updated_at");

        let status: DeploymentStatus = status_str.parse().map_err(|e| {
            ControlError::Serialisation(format!("failed to parse status '{status_str}': {e}"))
        })?;

        Ok(DeploymentRecord {
            tenant_id: TenantId::new(tenant_id),
            environment: row.get("environment"),
            stack_name: StackName::from_raw(stack_name),
            region: row.get("region"),
            role_arn: row.get("role_arn"),
            status,
            run_id: row.get("run_id"),
            outputs: row.get("outputs"),
            error: row.get("error"),
            created_at,
            updated_at,
        })
    }

    async fn current_status(&self, stack: &StackName) -> ControlResult<Option<DeploymentStatus>> {
        let row = sqlx::query("SELECT status FROM deployments WHERE stack_name = $1")
            .bind(stack.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| {
            let status_str: String = r.get("status");
            status_str.parse().map_err(|e| {
                ControlError::Serialisation(format!("failed to parse status '{status_str}': {e}"))
            })
        })
        .transpose()
    }
}

#[async_trait]
impl DeploymentStore for PostgresStore {
    async fn insert(&self, record: &DeploymentRecord) -> ControlResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO deployments (
                stack_name, tenant_id, environment, region, role_arn,
                status, run_id, outputs, error, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (stack_name) DO NOTHING
            "#,
        )
        .bind(record.stack_name.as_str())
        .bind(record.tenant_id.as_str())
        .bind(&record.environment)
        .bind(&record.region)
        .bind(&record.role_arn)
        .bind(record.status.as_str())
        .bind(&record.run_id)
        .bind(&record.outputs)
        .bind(&record.error)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ControlError::conflict(format!(
                "deployment {} already exists",
                record.stack_name
            )));
        }

        Ok(())
    }

    async fn get(&self, stack: &StackName) -> ControlResult<Option<DeploymentRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {DEPLOYMENT_COLUMNS} FROM deployments WHERE stack_name = $1"
        ))
        .bind(stack.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => Ok(Some(Self::row_to_record(&r)?)),
            None => Ok(None),
        }
    }

    async fn transition(
        &self,
        stack: &StackName,
        expected: &[DeploymentStatus],
        update: StatusUpdate,
    ) -> ControlResult<Transition> {
        let expected: Vec<&str> = expected.iter().map(DeploymentStatus::as_str).collect();
        let (set_run_id, run_id) = update.run_id.as_sql();
        let (set_outputs, outputs) = update.outputs.as_sql();
        let (set_error, error) = update.error.as_sql();

        let row = sqlx::query(&format!(
            r#"
            UPDATE deployments
            SET status = $1,
                run_id = CASE WHEN $2 THEN $3 ELSE run_id END,
                outputs = CASE WHEN $4 THEN $5 ELSE outputs END,
                error = CASE WHEN $6 THEN $7 ELSE error END,
                updated_at = NOW()
            WHERE stack_name = $8 AND status = ANY($9)
            RETURNING {DEPLOYMENT_COLUMNS}
            "#
        ))
        .bind(update.status.as_str())
        .bind(set_run_id)
        .bind(run_id)
        .bind(set_outputs)
        .bind(outputs)
        .bind(set_error)
        .bind(error)
        .bind(stack.as_str())
        .bind(&expected)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(r) = row {
            return Ok(Transition::Applied(Self::row_to_record(&r)?));
        }

        match self.current_status(stack).await? {
            Some(status) => Ok(Transition::Rejected(status)),
            None => Err(ControlError::not_found(format!("deployment {stack}"))),
        }
    }

    async fn list(&self, filter: &DeploymentFilter) -> ControlResult<Vec<DeploymentRecord>> {
        let mut query = format!("SELECT {DEPLOYMENT_COLUMNS} FROM deployments WHERE 1=1");

        let mut params: Vec<String> = Vec::new();

        if let Some(ref tenant_id) = filter.tenant_id {
            params.push(tenant_id.as_str().to_owned());
            query.push_str(&format!(" AND tenant_id = ${}", params.len()));
        }

        if let Some(status) = filter.status {
            params.push(status.as_str().to_owned());
            query.push_str(&format!(" AND status = ${}", params.len()));
        }

        query.push_str(" ORDER BY created_at DESC");

        if let Some(limit) = filter.limit {
            query.push_str(&format!(" LIMIT {limit}"));
        }

        if let Some(offset) = filter.offset {
            query.push_str(&format!(" OFFSET {offset}"));
        }

        let mut sqlx_query = sqlx::query(&query);
        for param in &params {
            sqlx_query = sqlx_query.bind(param);
        }

        let rows = sqlx_query.fetch_all(&self.pool).await?;

        rows.iter().map(Self::row_to_record).collect()
    }
}

#[async_trait]
impl ConfigStore for PostgresStore {
    async fn save(&self, config: &ConfigResolved) -> ControlResult<()> {
        let config_json = serde_json::to_value(config).map_err(|e| {
            ControlError::Serialisation(format!("failed to serialise config: {e}"))
        })?;

        sqlx::query(
            r#"
            INSERT INTO tenant_configs (tenant_id, config, created_at, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (tenant_id) DO UPDATE
            SET config = EXCLUDED.config, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&config.tenant_id)
        .bind(&config_json)
        .bind(config.created_at)
        .bind(config.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, tenant_id: &TenantId) -> ControlResult<Option<ConfigResolved>> {
        let row = sqlx::query("SELECT config FROM tenant_configs WHERE tenant_id = $1")
            .bind(tenant_id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| row_to_config(&r)).transpose()
    }

    async fn delete(&self, tenant_id: &TenantId) -> ControlResult<bool> {
        let result = sqlx::query("DELETE FROM tenant_configs WHERE tenant_id = $1")
            .bind(tenant_id.as_str())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list(&self) -> ControlResult<Vec<ConfigResolved>> {
        let rows = sqlx::query("SELECT config FROM tenant_configs ORDER BY tenant_id")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_config).collect()
    }
}

fn row_to_config(row: &PgRow) -> ControlResult<ConfigResolved> {
    let config_json: serde_json::Value = row.get("config");
    serde_json::from_value(config_json)
        .map_err(|e| ControlError::Serialisation(format!("failed to deserialise config: {e}")))
}

#[async_trait]
impl AddonStore for PostgresStore {
    async fn put(&self, stack: &StackName, record: &AddonInstallRecord) -> ControlResult<()> {
        sqlx::query(
            r#"
            INSERT INTO addon_installs (
                stack_name, addon_name, command_id, host_id, dispatched_at, error
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (stack_name, addon_name) DO UPDATE
            SET command_id = EXCLUDED.command_id,
                host_id = EXCLUDED.host_id,
                dispatched_at = EXCLUDED.dispatched_at,
                error = EXCLUDED.error
            "#,
        )
        .bind(stack.as_str())
        .bind(&record.addon_name)
        .bind(&record.command_id)
        .bind(&record.host_id)
        .bind(record.dispatched_at)
        .bind(&record.error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(
        &self,
        stack: &StackName,
        addon_name: &str,
    ) -> ControlResult<Option<AddonInstallRecord>> {
        let row = sqlx::query(
            r#"
            SELECT addon_name, command_id, host_id, dispatched_at, error
            FROM addon_installs
            WHERE stack_name = $1 AND addon_name = $2
            "#,
        )
        .bind(stack.as_str())
        .bind(addon_name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| AddonInstallRecord {
            addon_name: r.get("addon_name"),
            command_id: r.get("command_id"),
            host_id: r.get("host_id"),
            dispatched_at: r.get("dispatched_at"),
            error: r.get("error"),
        }))
    }
}

impl std::fmt::Debug for PostgresStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresStore").finish_non_exhaustive()
    }
}
