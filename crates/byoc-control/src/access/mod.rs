//! Operator access to private clusters through the access node.
//!
//! A deployment with a private access node reports its host in the outputs.
//! Operators reach the cluster by opening a session on that host, which
//! needs three private service endpoints in the cluster network.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::addons::{CLUSTER_OUTPUT, HOST_OUTPUT};
use crate::error::{ControlError, ControlResult};
use crate::hosts::HostController;
use crate::store::DeploymentStore;
use crate::types::{DeploymentRecord, DeploymentStatus, StackName, TenantId};

/// Deployment output naming the cluster network.
pub const NETWORK_OUTPUT: &str = "vpc_id";

/// Endpoint services a session needs, by short name.
pub const SESSION_ENDPOINTS: [&str; 3] = ["ssm", "ssmmessages", "ec2messages"];

const RUNNING: &str = "running";

/// State of the access node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessNodeStatus {
    /// Whether the deployment has an access node.
    pub enabled: bool,
    /// Host identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
    /// Native host state; absent when the provider does not know the host.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_state: Option<String>,
    /// Zone the host runs in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub availability_zone: Option<String>,
    /// Private address.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_ip: Option<String>,
}

impl AccessNodeStatus {
    const fn disabled() -> Self {
        Self {
            enabled: false,
            instance_id: None,
            instance_state: None,
            availability_zone: None,
            private_ip: None,
        }
    }

    fn is_running(&self) -> bool {
        self.instance_state.as_deref() == Some(RUNNING)
    }
}

/// Access readiness of a tenant environment.
#[derive(Debug, Clone, Serialize)]
pub struct AccessStatus {
    /// Tenant.
    pub tenant_id: String,
    /// Environment.
    pub environment: String,
    /// Cluster name, empty when not reported.
    pub cluster_name: String,
    /// Access node state.
    pub access_node: AccessNodeStatus,
    /// Whether each required endpoint exists, by short name.
    pub vpc_endpoints: BTreeMap<String, bool>,
    /// Whether a session can be opened now.
    pub ready: bool,
    /// Everything preventing a session.
    pub issues: Vec<String>,
}

/// How to open a session on the access node.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    /// Tenant.
    pub tenant_id: String,
    /// Environment.
    pub environment: String,
    /// Host to connect to.
    pub instance_id: String,
    /// Region of the host.
    pub region: String,
    /// Command that opens the session.
    pub start_session_command: String,
    /// Command that configures cluster credentials inside the session.
    pub configure_kubectl_command: String,
    /// Step-by-step instructions.
    pub instructions: Vec<String>,
}

/// Result of a start or stop request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PowerResult {
    /// `starting` or `stopping`.
    pub status: &'static str,
    /// Host the request was sent to.
    pub instance_id: String,
}

/// Reports on and powers the access node of a deployment.
pub struct AccessNodes {
    deployments: Arc<dyn DeploymentStore>,
    hosts: Arc<dyn HostController>,
}

impl AccessNodes {
    /// Create a new access node service.
    pub fn new(deployments: Arc<dyn DeploymentStore>, hosts: Arc<dyn HostController>) -> Self {
        Self { deployments, hosts }
    }

    async fn ready_record(
        &self,
        tenant: &TenantId,
        environment: &str,
    ) -> ControlResult<DeploymentRecord> {
        let record = self
            .deployments
            .get_owned(tenant, environment)
            .await?
            .ok_or_else(|| {
                ControlError::not_found(format!(
                    "deployment {}",
                    StackName::new(tenant, environment)
                ))
            })?;
        if record.status != DeploymentStatus::Succeeded {
            return Err(ControlError::precondition(format!(
                "deployment {} is not ready, current status: {}",
                record.stack_name, record.status
            )));
        }
        Ok(record)
    }

    fn host_id(record: &DeploymentRecord) -> ControlResult<String> {
        record.output(HOST_OUTPUT).map(str::to_owned).ok_or_else(|| {
            ControlError::precondition("access node is not enabled for this deployment")
        })
    }

    async fn node_status(&self, record: &DeploymentRecord) -> ControlResult<AccessNodeStatus> {
        let Some(host_id) = record.output(HOST_OUTPUT) else {
            return Ok(AccessNodeStatus::disabled());
        };

        let details = self.hosts.describe(host_id).await?;
        Ok(AccessNodeStatus {
            enabled: true,
            instance_id: Some(host_id.to_owned()),
            instance_state: details.as_ref().map(|d| d.state.clone()),
            availability_zone: details.as_ref().and_then(|d| d.availability_zone.clone()),
            private_ip: details.and_then(|d| d.private_ip),
        })
    }

    async fn endpoints(&self, record: &DeploymentRecord) -> BTreeMap<String, bool> {
        let services = match record.output(NETWORK_OUTPUT) {
            None => Vec::new(),
            Some(network_id) => match self.hosts.endpoint_services(network_id).await {
                Ok(services) => services,
                Err(e) => {
                    warn!(stack = %record.stack_name, error = %e, "failed to list network endpoints");
                    Vec::new()
                }
            },
        };

        SESSION_ENDPOINTS
            .iter()
            .map(|short| {
                let full = format!("com.amazonaws.{}.{short}", record.region);
                ((*short).to_owned(), services.contains(&full))
            })
            .collect()
    }

    /// Report whether a session can be opened, and why not.
    pub async fn status(&self, tenant: &TenantId, environment: &str) -> ControlResult<AccessStatus> {
        let record = self.ready_record(tenant, environment).await?;
        let access_node = self.node_status(&record).await?;
        let vpc_endpoints = self.endpoints(&record).await;

        let mut issues = Vec::new();
        if !access_node.enabled {
            issues.push("access node is not enabled in the deployment configuration".to_owned());
        } else if !access_node.is_running() {
            issues.push(format!(
                "access node is not running (state: {})",
                access_node.instance_state.as_deref().unwrap_or("unknown")
            ));
        }
        for (short, present) in &vpc_endpoints {
            if !present {
                issues.push(format!("VPC endpoint for {short} is not configured"));
            }
        }

        Ok(AccessStatus {
            tenant_id: tenant.to_string(),
            environment: environment.to_owned(),
            cluster_name: record.output(CLUSTER_OUTPUT).unwrap_or_default().to_owned(),
            access_node,
            vpc_endpoints,
            ready: issues.is_empty(),
            issues,
        })
    }

    /// Build the commands for a session on a running access node.
    pub async fn session(&self, tenant: &TenantId, environment: &str) -> ControlResult<SessionInfo> {
        let record = self.ready_record(tenant, environment).await?;
        let host_id = Self::host_id(&record)?;

        let node = self.node_status(&record).await?;
        if !node.is_running() {
            return Err(ControlError::precondition(format!(
                "access node is not running, current state: {}",
                node.instance_state.as_deref().unwrap_or("unknown")
            )));
        }

        let region = record.region.clone();
        let cluster_name = record.output(CLUSTER_OUTPUT).unwrap_or_default();
        let start_session_command =
            format!("aws ssm start-session --target {host_id} --region {region}");
        let configure_kubectl_command =
            format!("aws eks update-kubeconfig --name {cluster_name} --region {region}");

        let instructions = vec![
            "1. Install the AWS CLI and the Session Manager plugin locally".to_owned(),
            "2. Configure AWS credentials with access to the tenant account".to_owned(),
            format!("3. Start a session: {start_session_command}"),
            "4. Inside the session, install kubectl if it is missing".to_owned(),
            format!("5. Configure kubectl: {configure_kubectl_command}"),
            "6. Verify access: kubectl get nodes".to_owned(),
        ];

        Ok(SessionInfo {
            tenant_id: tenant.to_string(),
            environment: environment.to_owned(),
            instance_id: host_id,
            region,
            start_session_command,
            configure_kubectl_command,
            instructions,
        })
    }

    /// Start a stopped access node.
    pub async fn start(&self, tenant: &TenantId, environment: &str) -> ControlResult<PowerResult> {
        let record = self.ready_record(tenant, environment).await?;
        let host_id = Self::host_id(&record)?;
        self.hosts.start(&host_id).await?;
        info!(stack = %record.stack_name, host_id = %host_id, "access node starting");
        Ok(PowerResult {
            status: "starting",
            instance_id: host_id,
        })
    }

    /// Stop the access node while it is not needed.
    pub async fn stop(&self, tenant: &TenantId, environment: &str) -> ControlResult<PowerResult> {
        let record = self.ready_record(tenant, environment).await?;
        let host_id = Self::host_id(&record)?;
        self.hosts.stop(&host_id).await?;
        info!(stack = %record.stack_name, host_id = %host_id, "access node stopping");
        Ok(PowerResult {
            status: "stopping",
            instance_id: host_id,
        })
    }
}

impl std::fmt::Debug for AccessNodes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessNodes").finish_non_exhaustive()
    }
}
