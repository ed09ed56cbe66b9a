//! Pulumi Deployments API client.

use std::time::Duration;

use async_trait::async_trait;
use byoc_config::{ConfigResolved, Subnet};
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::error::{ControlError, ControlResult};
use crate::types::{Operation, StackName};

use super::{ProvisioningEngine, RunStatus};

/// Engine backed by Pulumi Deployments.
///
/// Stacks live under `{organization}/{project}`. The program is fetched from
/// git on every run; configuration is pushed as pre-run `pulumi config set`
/// commands so the stack settings are the single source of truth.
pub struct PulumiEngine {
    client: Client,
    base_url: String,
    organization: String,
    project: String,
    token: SecretString,
    repo_url: String,
    repo_branch: String,
    repo_dir: String,
}

#[derive(Deserialize)]
struct TriggerResponse {
    id: String,
}

#[derive(Deserialize)]
struct RunResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: Option<String>,
}

impl PulumiEngine {
    /// Create a new client from configuration.
    ///
    /// An access token and a repository URL are required.
    pub fn new(config: &EngineConfig) -> ControlResult<Self> {
        let token = config
            .access_token
            .clone()
            .ok_or_else(|| ControlError::Config("engine.access_token is required".to_owned()))?;
        let repo_url = config
            .repo_url
            .clone()
            .ok_or_else(|| ControlError::Config("engine.repo_url is required".to_owned()))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(ControlError::Http)?;

        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_owned(),
            organization: config.organization.clone(),
            project: config.project.clone(),
            token: SecretString::from(token),
            repo_url,
            repo_branch: config.repo_branch.clone(),
            repo_dir: config.repo_dir.clone(),
        })
    }

    fn stack_url(&self, stack: &StackName) -> String {
        format!(
            "{}/api/stacks/{}/{}/{}",
            self.base_url, self.organization, self.project, stack
        )
    }

    fn stack_id(&self, stack: &StackName) -> String {
        format!("{}/{}/{}", self.organization, self.project, stack)
    }

    fn authorised(&self, request: RequestBuilder) -> RequestBuilder {
        request.header(AUTHORIZATION, format!("token {}", self.token.expose_secret()))
    }
}

#[async_trait]
impl ProvisioningEngine for PulumiEngine {
    async fn ensure_stack(&self, stack: &StackName) -> ControlResult<()> {
        let url = format!(
            "{}/api/stacks/{}/{}",
            self.base_url, self.organization, self.project
        );
        let response = self
            .authorised(self.client.post(&url))
            .json(&json!({ "stackName": stack.as_str() }))
            .send()
            .await
            .map_err(ControlError::Http)?;

        match response.status() {
            status if status.is_success() => {
                info!(stack = %stack, "stack created");
                Ok(())
            }
            StatusCode::CONFLICT => {
                debug!(stack = %stack, "stack already exists");
                Ok(())
            }
            status => Err(ControlError::engine(format!(
                "failed to create stack {stack}: {status}"
            ))),
        }
    }

    async fn configure(&self, stack: &StackName, config: &ConfigResolved) -> ControlResult<()> {
        let url = format!("{}/deployments/settings", self.stack_url(stack));
        let settings = json!({
            "sourceContext": {
                "git": {
                    "repoUrl": self.repo_url,
                    "branch": format!("refs/heads/{}", self.repo_branch),
                    "repoDir": self.repo_dir,
                }
            },
            "operationContext": {
                "preRunCommands": pre_run_commands(&self.stack_id(stack), config)?,
                "environmentVariables": {
                    "AWS_REGION": config.account.region,
                },
            },
        });

        let response = self
            .authorised(self.client.post(&url))
            .json(&settings)
            .send()
            .await
            .map_err(ControlError::Http)?;

        if !response.status().is_success() {
            return Err(ControlError::engine(format!(
                "failed to configure stack {stack}: {}",
                response.status()
            )));
        }

        Ok(())
    }

    async fn trigger(&self, stack: &StackName, operation: Operation) -> ControlResult<String> {
        let url = format!("{}/deployments", self.stack_url(stack));
        let response = self
            .authorised(self.client.post(&url))
            .json(&json!({
                "operation": operation.as_str(),
                "inheritSettings": true,
            }))
            .send()
            .await
            .map_err(ControlError::Http)?;

        if !response.status().is_success() {
            return Err(ControlError::engine(format!(
                "failed to trigger {operation} on {stack}: {}",
                response.status()
            )));
        }

        let body: TriggerResponse = response.json().await.map_err(ControlError::Http)?;
        Ok(body.id)
    }

    async fn run_status(&self, stack: &StackName, run_id: &str) -> ControlResult<RunStatus> {
        let url = format!("{}/deployments/{run_id}", self.stack_url(stack));
        let response = self
            .authorised(self.client.get(&url))
            .send()
            .await
            .map_err(ControlError::Http)?;

        match response.status() {
            StatusCode::OK => {
                let body: RunResponse = response.json().await.map_err(ControlError::Http)?;
                Ok(RunStatus::parse(&body.status, body.message))
            }
            status => Err(ControlError::engine(format!(
                "failed to get run {run_id} for {stack}: {status}"
            ))),
        }
    }

    async fn outputs(&self, stack: &StackName) -> ControlResult<serde_json::Value> {
        let url = format!("{}/export", self.stack_url(stack));
        let response = self
            .authorised(self.client.get(&url))
            .send()
            .await
            .map_err(ControlError::Http)?;

        if !response.status().is_success() {
            return Err(ControlError::engine(format!(
                "failed to export stack {stack}: {}",
                response.status()
            )));
        }

        let export: serde_json::Value = response.json().await.map_err(ControlError::Http)?;
        Ok(stack_outputs(&export))
    }
}

impl std::fmt::Debug for PulumiEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PulumiEngine")
            .field("base_url", &self.base_url)
            .field("organization", &self.organization)
            .field("project", &self.project)
            .finish_non_exhaustive()
    }
}

/// Outputs of the root stack resource in a stack export.
fn stack_outputs(export: &serde_json::Value) -> serde_json::Value {
    export
        .pointer("/deployment/resources")
        .and_then(serde_json::Value::as_array)
        .and_then(|resources| {
            resources
                .iter()
                .find(|r| r.get("type").and_then(serde_json::Value::as_str) == Some("pulumi:pulumi:Stack"))
        })
        .and_then(|r| r.get("outputs"))
        .cloned()
        .unwrap_or_else(|| json!({}))
}

/// A single stack configuration value.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ConfigEntry {
    key: &'static str,
    value: String,
    secret: bool,
}

impl ConfigEntry {
    fn plain(key: &'static str, value: impl Into<String>) -> Self {
        Self {
            key,
            value: value.into(),
            secret: false,
        }
    }

    fn flag(key: &'static str, value: bool) -> Self {
        Self::plain(key, value.to_string())
    }

    fn secret(key: &'static str, value: impl Into<String>) -> Self {
        Self {
            key,
            value: value.into(),
            secret: true,
        }
    }

    /// Render as a shell command. Single quotes in the value are escaped.
    fn command(&self, stack_id: &str) -> String {
        let secret = if self.secret { "--secret " } else { "" };
        let value = self.value.replace('\'', r"'\''");
        format!(
            "pulumi config set --stack {stack_id} {secret}{} '{value}'",
            self.key
        )
    }
}

fn joined<T: ToString>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

fn subnets_json(subnets: &[Subnet]) -> ControlResult<String> {
    Ok(serde_json::to_string(subnets)?)
}

/// Map a resolved configuration onto stack configuration keys.
fn config_entries(config: &ConfigResolved) -> ControlResult<Vec<ConfigEntry>> {
    let network = &config.network;
    let endpoints = &network.endpoints;
    let cluster = &config.cluster;
    let access = &cluster.access;

    let mut entries = vec![
        ConfigEntry::plain("customerId", &config.tenant_id),
        ConfigEntry::plain("environment", &config.environment),
        ConfigEntry::plain("customerRoleArn", &config.account.role_arn),
        ConfigEntry::secret("externalId", &config.account.external_id),
        ConfigEntry::plain("awsRegion", &config.account.region),
        ConfigEntry::plain("availabilityZones", config.account.availability_zones.join(",")),
        ConfigEntry::plain("vpcCidr", network.cidr_block.to_string()),
        ConfigEntry::plain("natGatewayStrategy", network.nat_gateway_strategy.as_str()),
    ];

    if !network.secondary_cidr_blocks.is_empty() {
        entries.push(ConfigEntry::plain(
            "secondaryCidrBlocks",
            joined(&network.secondary_cidr_blocks),
        ));
    }

    entries.push(ConfigEntry::plain(
        "publicSubnets",
        subnets_json(&network.public_subnets)?,
    ));
    entries.push(ConfigEntry::plain(
        "privateSubnets",
        subnets_json(&network.private_subnets)?,
    ));
    if !network.pod_subnets.is_empty() {
        entries.push(ConfigEntry::plain(
            "podSubnets",
            subnets_json(&network.pod_subnets)?,
        ));
    }

    entries.extend([
        ConfigEntry::flag("vpcEndpointS3", endpoints.s3),
        ConfigEntry::flag("vpcEndpointDynamodb", endpoints.dynamodb),
        ConfigEntry::flag("vpcEndpointEcrApi", endpoints.ecr_api),
        ConfigEntry::flag("vpcEndpointEcrDkr", endpoints.ecr_dkr),
        ConfigEntry::flag("vpcEndpointSts", endpoints.sts),
        ConfigEntry::flag("vpcEndpointLogs", endpoints.logs),
        ConfigEntry::flag("vpcEndpointEc2", endpoints.ec2),
        ConfigEntry::flag("vpcEndpointSsm", endpoints.ssm),
        ConfigEntry::flag("vpcEndpointSsmMessages", endpoints.ssmmessages),
        ConfigEntry::flag("vpcEndpointEc2Messages", endpoints.ec2messages),
        ConfigEntry::flag("vpcEndpointElb", endpoints.elasticloadbalancing),
        ConfigEntry::flag("vpcEndpointAutoscaling", endpoints.autoscaling),
        ConfigEntry::flag("enableDnsHostnames", network.enable_dns_hostnames),
        ConfigEntry::flag("enableDnsSupport", network.enable_dns_support),
        ConfigEntry::plain("eksVersion", &cluster.version),
        ConfigEntry::plain("eksMode", cluster.mode.as_str()),
        ConfigEntry::plain("serviceIpv4Cidr", cluster.service_cidr.to_string()),
        ConfigEntry::flag("endpointPrivateAccess", access.endpoint_private_access),
        ConfigEntry::flag("endpointPublicAccess", access.endpoint_public_access),
        ConfigEntry::flag(
            "bootstrapClusterCreatorAdmin",
            access.bootstrap_cluster_creator_admin,
        ),
        ConfigEntry::plain("authenticationMode", access.authentication_mode.as_str()),
    ]);

    if !access.public_access_cidrs.is_empty() {
        entries.push(ConfigEntry::plain(
            "publicAccessCidrs",
            joined(&access.public_access_cidrs),
        ));
    }

    entries.push(ConfigEntry::flag(
        "accessNodeEnabled",
        access.access_node.enabled,
    ));
    if access.access_node.enabled {
        entries.push(ConfigEntry::plain(
            "accessNodeInstanceType",
            &access.access_node.instance_type,
        ));
    }

    entries.push(ConfigEntry::flag("loggingEnabled", cluster.logging.enabled));
    if cluster.logging.enabled && !cluster.logging.types.is_empty() {
        let types: Vec<&str> = cluster.logging.types.iter().map(|t| t.as_str()).collect();
        entries.push(ConfigEntry::plain("loggingTypes", types.join(",")));
    }

    entries.push(ConfigEntry::flag(
        "encryptionEnabled",
        cluster.encryption.enabled,
    ));
    if let byoc_config::model::KeySource::Customer { ref key_arn } = cluster.encryption.key {
        if cluster.encryption.enabled {
            entries.push(ConfigEntry::plain("encryptionKmsKeyArn", key_arn));
        }
    }

    entries.extend([
        ConfigEntry::flag("zonalShiftEnabled", cluster.zonal_shift_enabled),
        ConfigEntry::flag("deletionProtection", cluster.deletion_protection),
        ConfigEntry::plain(
            "managedAddons",
            serde_json::to_string(&cluster.managed_addons)?,
        ),
        ConfigEntry::plain("nodeGroups", serde_json::to_string(&cluster.node_groups)?),
        ConfigEntry::plain("tags", serde_json::to_string(&config.tags)?),
        ConfigEntry::flag("argoCDEnabled", config.addons.argocd.enabled),
    ]);

    Ok(entries)
}

/// Commands run before every operation to load the stack configuration.
fn pre_run_commands(stack_id: &str, config: &ConfigResolved) -> ControlResult<Vec<String>> {
    Ok(config_entries(config)?
        .iter()
        .map(|entry| entry.command(stack_id))
        .collect())
}
