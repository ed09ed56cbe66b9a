//! In-memory store for testing.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;
use byoc_config::ConfigResolved;

use crate::error::{ControlError, ControlResult};
use crate::types::{
    AddonInstallRecord, DeploymentRecord, DeploymentStatus, StackName, StatusUpdate, TenantId,
    Transition,
};

use super::{AddonStore, ConfigStore, DeploymentFilter, DeploymentStore};

/// In-memory store for testing.
///
/// This implementation is not suitable for production use as data is lost
/// when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    deployments: RwLock<HashMap<StackName, DeploymentRecord>>,
    configs: RwLock<BTreeMap<String, ConfigResolved>>,
    addons: RwLock<HashMap<(StackName, String), AddonInstallRecord>>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeploymentStore for MemoryStore {
    async fn insert(&self, record: &DeploymentRecord) -> ControlResult<()> {
        let mut deployments = self
            .deployments
            .write()
            .map_err(|_| ControlError::internal("lock poisoned"))?;

        if deployments.contains_key(&record.stack_name) {
            return Err(ControlError::conflict(format!(
                "deployment {} already exists",
                record.stack_name
            )));
        }

        deployments.insert(record.stack_name.clone(), record.clone());
        Ok(())
    }

    async fn get(&self, stack: &StackName) -> ControlResult<Option<DeploymentRecord>> {
        let deployments = self
            .deployments
            .read()
            .map_err(|_| ControlError::internal("lock poisoned"))?;

        Ok(deployments.get(stack).cloned())
    }

    async fn transition(
        &self,
        stack: &StackName,
        expected: &[DeploymentStatus],
        update: StatusUpdate,
    ) -> ControlResult<Transition> {
        let mut deployments = self
            .deployments
            .write()
            .map_err(|_| ControlError::internal("lock poisoned"))?;

        let record = deployments
            .get_mut(stack)
            .ok_or_else(|| ControlError::not_found(format!("deployment {stack}")))?;

        if !expected.contains(&record.status) {
            return Ok(Transition::Rejected(record.status));
        }

        update.apply(record);
        Ok(Transition::Applied(record.clone()))
    }

    async fn list(&self, filter: &DeploymentFilter) -> ControlResult<Vec<DeploymentRecord>> {
        let deployments = self
            .deployments
            .read()
            .map_err(|_| ControlError::internal("lock poisoned"))?;

        let mut results: Vec<_> = deployments
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();

        results.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        #[allow(clippy::as_conversions)]
        let offset = filter.offset.unwrap_or(0) as usize;
        let results: Vec<_> = results.into_iter().skip(offset).collect();

        if let Some(limit) = filter.limit {
            #[allow(clippy::as_conversions)]
            Ok(results.into_iter().take(limit as usize).collect())
        } else {
            Ok(results)
        }
    }
}

#[async_trait]
impl ConfigStore for MemoryStore {
    async fn save(&self, config: &ConfigResolved) -> ControlResult<()> {
        let mut configs = self
            .configs
            .write()
            .map_err(|_| ControlError::internal("lock poisoned"))?;

        configs.insert(config.tenant_id.clone(), config.clone());
        Ok(())
    }

    async fn get(&self, tenant_id: &TenantId) -> ControlResult<Option<ConfigResolved>> {
        let configs = self
            .configs
            .read()
            .map_err(|_| ControlError::internal("lock poisoned"))?;

        Ok(configs.get(tenant_id.as_str()).cloned())
    }

    async fn delete(&self, tenant_id: &TenantId) -> ControlResult<bool> {
        let mut configs = self
            .configs
            .write()
            .map_err(|_| ControlError::internal("lock poisoned"))?;

        Ok(configs.remove(tenant_id.as_str()).is_some())
    }

    async fn list(&self) -> ControlResult<Vec<ConfigResolved>> {
        let configs = self
            .configs
            .read()
            .map_err(|_| ControlError::internal("lock poisoned"))?;

        Ok(configs.values().cloned().collect())
    }
}

#[async_trait]
impl AddonStore for MemoryStore {
    async fn put(&self, stack: &StackName, record: &AddonInstallRecord) -> ControlResult<()> {
        let mut addons = self
            .addons
            .write()
            .map_err(|_| ControlError::internal("lock poisoned"))?;

        addons.insert((stack.clone(), record.addon_name.clone()), record.clone());
        Ok(())
    }

    async fn get(
        &self,
        stack: &StackName,
        addon_name: &str,
    ) -> ControlResult<Option<AddonInstallRecord>> {
        let addons = self
            .addons
            .read()
            .map_err(|_| ControlError::internal("lock poisoned"))?;

        Ok(addons
            .get(&(stack.clone(), addon_name.to_owned()))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byoc_config::{resolve, ConfigInput};
    use chrono::Utc;

    fn test_config(tenant: &str) -> ConfigResolved {
        resolve(&ConfigInput::new(
            tenant,
            "arn:aws:iam::123456789012:role/byoc",
            "external-1234",
        ))
        .expect("resolve")
    }

    fn test_record(tenant: &str, environment: &str) -> DeploymentRecord {
        DeploymentRecord::new(&test_config(tenant), environment)
    }

    #[tokio::test]
    async fn insert_and_get() {
        let store = MemoryStore::new();
        let record = test_record("acme", "prod");

        DeploymentStore::insert(&store, &record)
            .await
            .expect("insert failed");

        let retrieved = DeploymentStore::get(&store, &record.stack_name)
            .await
            .expect("get failed")
            .expect("deployment not found");

        assert_eq!(retrieved.stack_name.as_str(), "acme-prod");
        assert_eq!(retrieved.tenant_id.as_str(), "acme");
        assert_eq!(retrieved.region, "us-east-1");
        assert_eq!(retrieved.status, DeploymentStatus::Pending);
    }

    #[tokio::test]
    async fn duplicate_insert_is_a_conflict() {
        let store = MemoryStore::new();
        let record = test_record("acme", "prod");

        DeploymentStore::insert(&store, &record)
            .await
            .expect("first insert failed");
        assert!(matches!(
            DeploymentStore::insert(&store, &record).await,
            Err(ControlError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn transition_is_conditional() {
        let store = MemoryStore::new();
        let record = test_record("acme", "prod");
        let stack = record.stack_name.clone();
        DeploymentStore::insert(&store, &record)
            .await
            .expect("insert failed");

        let applied = store
            .transition(
                &stack,
                &[DeploymentStatus::Pending],
                StatusUpdate::to(DeploymentStatus::InProgress).with_run_id("run-1"),
            )
            .await
            .expect("transition failed");
        let Transition::Applied(updated) = applied else {
            panic!("expected transition to apply");
        };
        assert_eq!(updated.status, DeploymentStatus::InProgress);
        assert_eq!(updated.run_id.as_deref(), Some("run-1"));

        let rejected = store
            .transition(
                &stack,
                &[DeploymentStatus::Pending],
                StatusUpdate::to(DeploymentStatus::Failed).with_error("late"),
            )
            .await
            .expect("transition failed");
        assert_eq!(rejected, Transition::Rejected(DeploymentStatus::InProgress));

        let stored = DeploymentStore::get(&store, &stack)
            .await
            .expect("get failed")
            .expect("not found");
        assert_eq!(stored.status, DeploymentStatus::InProgress);
        assert!(stored.error.is_none());
    }

    #[tokio::test]
    async fn transition_missing_record_is_not_found() {
        let store = MemoryStore::new();
        let result = store
            .transition(
                &StackName::from_raw("ghost-prod"),
                &DeploymentStatus::ALL,
                StatusUpdate::to(DeploymentStatus::Failed),
            )
            .await;
        assert!(matches!(result, Err(ControlError::NotFound(_))));
    }

    #[tokio::test]
    async fn list_with_filters() {
        let store = MemoryStore::new();
        DeploymentStore::insert(&store, &test_record("acme", "prod"))
            .await
            .expect("insert failed");
        DeploymentStore::insert(&store, &test_record("acme", "staging"))
            .await
            .expect("insert failed");
        DeploymentStore::insert(&store, &test_record("globex", "prod"))
            .await
            .expect("insert failed");

        let acme = DeploymentStore::list(
            &store,
            &DeploymentFilter::new().with_tenant(TenantId::new("acme")),
        )
        .await
        .expect("list failed");
        assert_eq!(acme.len(), 2);

        let pending = DeploymentStore::list(
            &store,
            &DeploymentFilter::new()
                .with_status(DeploymentStatus::Pending)
                .with_limit(2),
        )
        .await
        .expect("list failed");
        assert_eq!(pending.len(), 2);

        let succeeded = DeploymentStore::list(
            &store,
            &DeploymentFilter::new().with_status(DeploymentStatus::Succeeded),
        )
        .await
        .expect("list failed");
        assert!(succeeded.is_empty());
    }

    #[tokio::test]
    async fn config_save_get_delete() {
        let store = MemoryStore::new();
        let tenant = TenantId::new("acme");

        assert!(!store.exists(&tenant).await.expect("exists failed"));
        store.save(&test_config("acme")).await.expect("save failed");
        store.save(&test_config("globex")).await.expect("save failed");
        assert!(store.exists(&tenant).await.expect("exists failed"));

        let listed = ConfigStore::list(&store).await.expect("list failed");
        let tenants: Vec<_> = listed.iter().map(|c| c.tenant_id.as_str()).collect();
        assert_eq!(tenants, vec!["acme", "globex"]);

        assert!(store.delete(&tenant).await.expect("delete failed"));
        assert!(!store.delete(&tenant).await.expect("delete failed"));
        assert!(ConfigStore::get(&store, &tenant)
            .await
            .expect("get failed")
            .is_none());
    }

    #[tokio::test]
    async fn addon_records_are_overwritten() {
        let store = MemoryStore::new();
        let stack = StackName::from_raw("acme-prod");

        for command in ["cmd-1", "cmd-2"] {
            store
                .put(
                    &stack,
                    &AddonInstallRecord {
                        addon_name: "argocd".to_owned(),
                        command_id: Some(command.to_owned()),
                        host_id: Some("i-0abc".to_owned()),
                        dispatched_at: Utc::now(),
                        error: None,
                    },
                )
                .await
                .expect("put failed");
        }

        let record = AddonStore::get(&store, &stack, "argocd")
            .await
            .expect("get failed")
            .expect("not found");
        assert_eq!(record.command_id.as_deref(), Some("cmd-2"));
        assert!(AddonStore::get(&store, &stack, "other")
            .await
            .expect("get failed")
            .is_none());
    }
}
