//! Addon installation on provisioned clusters.

use std::sync::Arc;
use std::time::Duration;

use byoc_config::ConfigResolved;
use chrono::Utc;
use tracing::{info, warn};

use crate::config::AddonsConfig;
use crate::error::{ControlError, ControlResult};
use crate::executor::{CommandPayload, RemoteExecutor};
use crate::store::{AddonStore, ConfigStore, DeploymentStore};
use crate::types::{
    AddonInstallRecord, AddonInstallResult, AddonInstallStatus, DeploymentStatus, StackName,
    TenantId,
};

use super::payload::{repo_password_parameter, ArgoCdScript, ARGOCD, KNOWN_ADDONS};

/// Deployment output naming the host commands run on.
pub const HOST_OUTPUT: &str = "access_node_instance_id";

/// Deployment output naming the cluster.
pub const CLUSTER_OUTPUT: &str = "eks_cluster_name";

/// Everything needed to dispatch to a provisioned cluster.
struct InstallTarget {
    config: ConfigResolved,
    stack: StackName,
    environment: String,
    host_id: String,
    cluster_name: String,
}

/// Installs cluster addons by dispatching scripts to the access node.
pub struct AddonInstaller {
    configs: Arc<dyn ConfigStore>,
    deployments: Arc<dyn DeploymentStore>,
    addons: Arc<dyn AddonStore>,
    executor: Arc<dyn RemoteExecutor>,
    config: AddonsConfig,
}

impl AddonInstaller {
    /// Create a new installer.
    pub fn new(
        configs: Arc<dyn ConfigStore>,
        deployments: Arc<dyn DeploymentStore>,
        addons: Arc<dyn AddonStore>,
        executor: Arc<dyn RemoteExecutor>,
        config: AddonsConfig,
    ) -> Self {
        Self {
            configs,
            deployments,
            addons,
            executor,
            config,
        }
    }

    /// Wait between deployment success and the automatic install.
    #[must_use]
    pub const fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.config.settle_delay_secs)
    }

    /// Names of the addons enabled in a configuration.
    #[must_use]
    pub fn enabled_addons(config: &ConfigResolved) -> Vec<&'static str> {
        KNOWN_ADDONS
            .iter()
            .copied()
            .filter(|name| match *name {
                ARGOCD => config.addons.argocd.enabled,
                _ => false,
            })
            .collect()
    }

    fn ensure_known(addon: &str) -> ControlResult<()> {
        if KNOWN_ADDONS.contains(&addon) {
            Ok(())
        } else {
            Err(ControlError::not_found(format!("unknown addon: {addon}")))
        }
    }

    async fn target(&self, tenant: &TenantId, environment: &str) -> ControlResult<InstallTarget> {
        let config = self
            .configs
            .get(tenant)
            .await?
            .ok_or_else(|| ControlError::not_found(format!("configuration for tenant {tenant}")))?;

        let stack = StackName::new(tenant, environment);
        let record = self
            .deployments
            .get_owned(tenant, environment)
            .await?
            .ok_or_else(|| ControlError::not_found(format!("deployment {stack}")))?;

        if record.status != DeploymentStatus::Succeeded {
            return Err(ControlError::precondition(format!(
                "deployment {stack} must be SUCCEEDED, current status: {}",
                record.status
            )));
        }

        let host_id = record.output(HOST_OUTPUT).ok_or_else(|| {
            ControlError::precondition("access node is not available in deployment outputs")
        })?;
        let cluster_name = record.output(CLUSTER_OUTPUT).ok_or_else(|| {
            ControlError::precondition("cluster name not found in deployment outputs")
        })?;

        Ok(InstallTarget {
            host_id: host_id.to_owned(),
            cluster_name: cluster_name.to_owned(),
            config,
            stack,
            environment: environment.to_owned(),
        })
    }

    /// Dispatch the install for one addon.
    ///
    /// Returns as soon as the command has been accepted by the executor.
    pub async fn install(
        &self,
        tenant: &TenantId,
        environment: &str,
        addon: &str,
    ) -> ControlResult<AddonInstallResult> {
        Self::ensure_known(addon)?;
        let target = self.target(tenant, environment).await?;
        self.dispatch(&target, addon).await
    }

    /// Dispatch the install for every enabled addon.
    pub async fn install_all(
        &self,
        tenant: &TenantId,
        environment: &str,
    ) -> ControlResult<Vec<AddonInstallResult>> {
        let target = self.target(tenant, environment).await?;
        let enabled = Self::enabled_addons(&target.config);
        if enabled.is_empty() {
            return Err(ControlError::precondition(format!(
                "no addons are enabled for tenant {tenant}"
            )));
        }

        let mut results = Vec::with_capacity(enabled.len());
        for addon in enabled {
            results.push(self.dispatch(&target, addon).await?);
        }
        Ok(results)
    }

    async fn dispatch(&self, target: &InstallTarget, addon: &str) -> ControlResult<AddonInstallResult> {
        let payload = match addon {
            ARGOCD => self.argocd_payload(target).await?,
            other => return Err(ControlError::not_found(format!("unknown addon: {other}"))),
        };

        let command_id = self.executor.submit(&target.host_id, &payload).await?;
        let dispatched_at = Utc::now();

        self.addons
            .put(
                &target.stack,
                &AddonInstallRecord {
                    addon_name: addon.to_owned(),
                    command_id: Some(command_id.clone()),
                    host_id: Some(target.host_id.clone()),
                    dispatched_at,
                    error: None,
                },
            )
            .await?;

        info!(
            stack = %target.stack,
            addon,
            command_id = %command_id,
            host_id = %target.host_id,
            "addon install dispatched"
        );

        Ok(AddonInstallResult {
            addon_name: addon.to_owned(),
            status: AddonInstallStatus::InProgress,
            command_id: Some(command_id),
            host_id: Some(target.host_id.clone()),
            started_at: Some(dispatched_at),
            output: None,
            error: None,
        })
    }

    async fn argocd_payload(&self, target: &InstallTarget) -> ControlResult<CommandPayload> {
        let argocd = &target.config.addons.argocd;
        if !argocd.enabled {
            return Err(ControlError::precondition(
                "argocd is not enabled in the tenant configuration",
            ));
        }

        let password = argocd
            .repository
            .as_ref()
            .and_then(|r| r.password.as_deref())
            .map(str::trim)
            .filter(|p| !p.is_empty());

        let parameter = match password {
            Some(password) => {
                let name = repo_password_parameter(&target.config.tenant_id, &target.environment);
                self.executor.put_parameter(&name, password, true).await?;
                Some(name)
            }
            None => None,
        };

        let script = ArgoCdScript {
            tenant_id: &target.config.tenant_id,
            cluster_name: &target.cluster_name,
            region: &target.config.account.region,
            argocd,
            password_parameter: parameter.as_deref(),
        }
        .render();

        Ok(CommandPayload {
            script,
            timeout_secs: self.config.command_timeout_secs,
            comment: format!("Install {ARGOCD} for {}", target.stack),
        })
    }

    /// Report the progress of an install.
    ///
    /// Without a command id the most recently dispatched one is used. A
    /// command the executor cannot see yet is reported as pending.
    pub async fn status(
        &self,
        tenant: &TenantId,
        environment: &str,
        addon: &str,
        command_id: Option<&str>,
    ) -> ControlResult<AddonInstallResult> {
        Self::ensure_known(addon)?;
        let stack = StackName::new(tenant, environment);
        self.deployments.get_owned(tenant, environment).await?;
        let record = self.addons.get(&stack, addon).await?;

        let (command_id, host_id, started_at) = match (command_id, record) {
            (Some(command_id), record) => {
                let started_at = record
                    .as_ref()
                    .filter(|r| r.command_id.as_deref() == Some(command_id))
                    .map(|r| r.dispatched_at);
                let host_id = match record.and_then(|r| r.host_id) {
                    Some(host_id) => host_id,
                    None => self.current_host(&stack).await?,
                };
                (command_id.to_owned(), host_id, started_at)
            }
            (None, None) => {
                return Err(ControlError::not_found(format!(
                    "no {addon} installation found for {stack}"
                )));
            }
            (None, Some(record)) => match (record.command_id, record.host_id) {
                (Some(command_id), Some(host_id)) => {
                    (command_id, host_id, Some(record.dispatched_at))
                }
                (command_id, host_id) => {
                    return Ok(AddonInstallResult {
                        addon_name: addon.to_owned(),
                        status: AddonInstallStatus::Failed,
                        command_id,
                        host_id,
                        started_at: Some(record.dispatched_at),
                        output: None,
                        error: record.error,
                    });
                }
            },
        };

        let invocation = self.executor.query(&command_id, &host_id).await?;
        let (status, output, error) = match invocation {
            None => (AddonInstallStatus::Pending, None, None),
            Some(invocation) => (
                AddonInstallStatus::from_native(&invocation.status),
                invocation.output.filter(|s| !s.is_empty()),
                invocation.error.filter(|s| !s.is_empty()),
            ),
        };

        Ok(AddonInstallResult {
            addon_name: addon.to_owned(),
            status,
            command_id: Some(command_id),
            host_id: Some(host_id),
            started_at,
            output,
            error,
        })
    }

    async fn current_host(&self, stack: &StackName) -> ControlResult<String> {
        let record = self
            .deployments
            .get(stack)
            .await?
            .ok_or_else(|| ControlError::not_found(format!("deployment {stack}")))?;
        record
            .output(HOST_OUTPUT)
            .map(str::to_owned)
            .ok_or_else(|| {
                ControlError::precondition("access node is not available in deployment outputs")
            })
    }

    /// Wait for the settling delay, then install every enabled addon.
    ///
    /// Failures are written to the addon record so status queries report
    /// them.
    pub async fn install_after_settle(&self, tenant: TenantId, environment: String) -> ControlResult<()> {
        let delay = self.settle_delay();
        let stack = StackName::new(&tenant, &environment);
        info!(stack = %stack, delay_secs = delay.as_secs(), "scheduling addon install");
        tokio::time::sleep(delay).await;

        let Some(config) = self.configs.get(&tenant).await? else {
            warn!(stack = %stack, "configuration removed before addon install");
            return Ok(());
        };

        for addon in Self::enabled_addons(&config) {
            match self.install(&tenant, &environment, addon).await {
                Ok(result) => info!(
                    stack = %stack,
                    addon,
                    command_id = result.command_id.as_deref().unwrap_or_default(),
                    "automatic addon install dispatched"
                ),
                Err(e) => {
                    warn!(stack = %stack, addon, error = %e, "automatic addon install failed");
                    self.addons
                        .put(
                            &stack,
                            &AddonInstallRecord {
                                addon_name: addon.to_owned(),
                                command_id: None,
                                host_id: None,
                                dispatched_at: Utc::now(),
                                error: Some(e.to_string()),
                            },
                        )
                        .await?;
                }
            }
        }

        Ok(())
    }
}

impl std::fmt::Debug for AddonInstaller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AddonInstaller")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
