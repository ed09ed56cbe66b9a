//! Storage backends.
//!
//! Three narrow interfaces cover everything the control plane persists:
//! deployment records, resolved tenant configurations and addon install
//! records. The primary implementation uses PostgreSQL; an in-memory
//! implementation is provided for testing and as a fallback.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

use async_trait::async_trait;
use byoc_config::ConfigResolved;

use crate::error::{ControlError, ControlResult};
use crate::types::{
    AddonInstallRecord, DeploymentRecord, DeploymentStatus, StackName, StatusUpdate, TenantId,
    Transition,
};

/// Filter criteria for listing deployments.
#[derive(Debug, Clone, Default)]
pub struct DeploymentFilter {
    /// Filter by tenant.
    pub tenant_id: Option<TenantId>,
    /// Filter by status.
    pub status: Option<DeploymentStatus>,
    /// Maximum number of results.
    pub limit: Option<u32>,
    /// Offset for pagination.
    pub offset: Option<u32>,
}

impl DeploymentFilter {
    /// Create a new empty filter.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            tenant_id: None,
            status: None,
            limit: None,
            offset: None,
        }
    }

    /// Filter by tenant.
    #[must_use]
    pub fn with_tenant(mut self, tenant_id: TenantId) -> Self {
        self.tenant_id = Some(tenant_id);
        self
    }

    /// Filter by status.
    #[must_use]
    pub const fn with_status(mut self, status: DeploymentStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Set maximum results.
    #[must_use]
    pub const fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Set pagination offset.
    #[must_use]
    pub const fn with_offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Whether a record passes the filter, ignoring pagination.
    #[must_use]
    pub fn matches(&self, record: &DeploymentRecord) -> bool {
        if let Some(ref tenant_id) = self.tenant_id {
            if &record.tenant_id != tenant_id {
                return false;
            }
        }
        if let Some(status) = self.status {
            if record.status != status {
                return false;
            }
        }
        true
    }
}

/// Backend for deployment records.
///
/// Records are keyed by stack name and never deleted.
#[async_trait]
pub trait DeploymentStore: Send + Sync {
    /// Insert a new record.
    ///
    /// Returns a conflict error if a record for the stack already exists.
    async fn insert(&self, record: &DeploymentRecord) -> ControlResult<()>;

    /// Get a record by stack name.
    async fn get(&self, stack: &StackName) -> ControlResult<Option<DeploymentRecord>>;

    /// Conditionally apply a status update.
    ///
    /// The update is applied only if the stored status is one of `expected`;
    /// the check and the write are atomic. Returns a not-found error if the
    /// record does not exist.
    async fn transition(
        &self,
        stack: &StackName,
        expected: &[DeploymentStatus],
        update: StatusUpdate,
    ) -> ControlResult<Transition>;

    /// List records matching the filter, newest first.
    async fn list(&self, filter: &DeploymentFilter) -> ControlResult<Vec<DeploymentRecord>>;

    /// Get the record for a tenant environment.
    ///
    /// Returns a conflict error if the stack name is held by a different
    /// tenant environment.
    async fn get_owned(
        &self,
        tenant: &TenantId,
        environment: &str,
    ) -> ControlResult<Option<DeploymentRecord>> {
        let stack = StackName::new(tenant, environment);
        match self.get(&stack).await? {
            Some(record) if !record.is_owned_by(tenant, environment) => Err(ControlError::conflict(
                format!("stack name {stack} is already used by another tenant environment"),
            )),
            record => Ok(record),
        }
    }
}

/// Backend for resolved tenant configurations, keyed by tenant.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Insert or replace a tenant's configuration.
    async fn save(&self, config: &ConfigResolved) -> ControlResult<()>;

    /// Get a tenant's configuration.
    async fn get(&self, tenant_id: &TenantId) -> ControlResult<Option<ConfigResolved>>;

    /// Delete a tenant's configuration. Returns whether one existed.
    async fn delete(&self, tenant_id: &TenantId) -> ControlResult<bool>;

    /// List every configuration, ordered by tenant.
    async fn list(&self) -> ControlResult<Vec<ConfigResolved>>;

    /// Whether a tenant has a configuration.
    async fn exists(&self, tenant_id: &TenantId) -> ControlResult<bool> {
        Ok(self.get(tenant_id).await?.is_some())
    }
}

/// Backend for addon install records, keyed by stack and addon name.
#[async_trait]
pub trait AddonStore: Send + Sync {
    /// Insert or overwrite the record for `record.addon_name` on a stack.
    async fn put(&self, stack: &StackName, record: &AddonInstallRecord) -> ControlResult<()>;

    /// Get the latest record for an addon on a stack.
    async fn get(
        &self,
        stack: &StackName,
        addon_name: &str,
    ) -> ControlResult<Option<AddonInstallRecord>>;
}
