//! Tenant configuration data model.
//!
//! [`ConfigInput`] is the sparse document a tenant submits. Every field that
//! may be omitted is an `Option` or has a serde default. [`ConfigResolved`] is
//! the fully-expanded form produced by [`crate::resolve`]: no optional
//! placeholders remain and every CIDR is a typed [`Ipv4Net`].

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};

/// Free-form tag map. Ordered so that resolved configs compare and serialise
/// deterministically.
pub type Tags = BTreeMap<String, String>;

// =============================================================================
// Shared enums
// =============================================================================

/// Outbound NAT gateway layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NatGatewayStrategy {
    /// No NAT gateway; private subnets have no default route to the internet.
    None,
    /// One shared NAT gateway.
    #[default]
    Single,
    /// One NAT gateway per availability zone.
    OnePerAz,
}

impl NatGatewayStrategy {
    /// Get the strategy name as a static string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Single => "single",
            Self::OnePerAz => "one_per_az",
        }
    }
}

impl fmt::Display for NatGatewayStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the cluster's compute and core addons are operated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterMode {
    /// Fully managed compute; node groups and core networking addons are
    /// operated by the provider.
    #[default]
    Auto,
    /// Self-managed node groups and addons.
    Managed,
}

impl ClusterMode {
    /// Get the mode name as a static string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Managed => "managed",
        }
    }
}

/// Cluster API authentication mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthenticationMode {
    /// Access entries only.
    Api,
    /// Access entries and the legacy config map.
    #[default]
    ApiAndConfigMap,
    /// Legacy config map only.
    ConfigMap,
}

impl AuthenticationMode {
    /// Get the mode as the provider spells it.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Api => "API",
            Self::ApiAndConfigMap => "API_AND_CONFIG_MAP",
            Self::ConfigMap => "CONFIG_MAP",
        }
    }
}

/// Control-plane log stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterLogType {
    /// API server.
    Api,
    /// Audit log.
    Audit,
    /// Authenticator.
    Authenticator,
    /// Controller manager.
    ControllerManager,
    /// Scheduler.
    Scheduler,
}

impl ClusterLogType {
    /// Get the log type name as a static string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Api => "api",
            Self::Audit => "audit",
            Self::Authenticator => "authenticator",
            Self::ControllerManager => "controllerManager",
            Self::Scheduler => "scheduler",
        }
    }
}

/// Node group purchasing option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CapacityType {
    /// On-demand instances.
    #[default]
    OnDemand,
    /// Spot instances.
    Spot,
}

/// Conflict handling when a managed addon already has a configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Replace the existing configuration.
    Overwrite,
    /// Keep the existing configuration.
    Preserve,
    /// Leave the existing configuration alone and report.
    None,
}

/// Address tier a subnet belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubnetTier {
    /// Internet-facing subnets.
    Public,
    /// Private subnets for nodes and internal load balancers.
    Private,
    /// Pod networking subnets carved from a secondary range.
    Pod,
}

impl SubnetTier {
    /// Get the tier name as a static string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
            Self::Pod => "pod",
        }
    }

    /// Name of the tier's list field in both input and resolved documents.
    #[must_use]
    pub const fn field(&self) -> &'static str {
        match self {
            Self::Public => "public_subnets",
            Self::Private => "private_subnets",
            Self::Pod => "pod_subnets",
        }
    }

    /// Load-balancer discovery tag key for subnets of this tier.
    #[must_use]
    pub const fn role_tag(&self) -> &'static str {
        match self {
            Self::Public => "kubernetes.io/role/elb",
            Self::Private | Self::Pod => "kubernetes.io/role/internal-elb",
        }
    }

    /// All tiers in reporting order.
    pub const ALL: [Self; 3] = [Self::Public, Self::Private, Self::Pod];
}

impl fmt::Display for SubnetTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Input
// =============================================================================

/// Sparse, tenant-supplied configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigInput {
    /// Tenant identifier.
    #[serde(default)]
    pub tenant_id: String,
    /// Environment name.
    #[serde(default = "default_environment")]
    pub environment: String,
    /// Account access reference.
    #[serde(default)]
    pub account: AccountInput,
    /// Network layout.
    #[serde(default)]
    pub network: Option<NetworkInput>,
    /// Cluster settings.
    #[serde(default)]
    pub cluster: Option<ClusterInput>,
    /// Cluster-level addons.
    #[serde(default)]
    pub addons: Option<AddonsInput>,
    /// User tags applied to every resource.
    #[serde(default)]
    pub tags: Tags,
}

fn default_environment() -> String {
    "prod".to_owned()
}

impl ConfigInput {
    /// Create a minimal input for a tenant.
    #[must_use]
    pub fn new(
        tenant_id: impl Into<String>,
        role_arn: impl Into<String>,
        external_id: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            environment: default_environment(),
            account: AccountInput {
                role_arn: role_arn.into(),
                external_id: external_id.into(),
                region: default_region(),
            },
            network: None,
            cluster: None,
            addons: None,
            tags: Tags::new(),
        }
    }
}

/// Account access reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInput {
    /// Role assumed to provision into the tenant account.
    #[serde(default)]
    pub role_arn: String,
    /// External id presented when assuming the role.
    #[serde(default)]
    pub external_id: String,
    /// Region to deploy into.
    #[serde(default = "default_region")]
    pub region: String,
}

fn default_region() -> String {
    "us-east-1".to_owned()
}

impl Default for AccountInput {
    fn default() -> Self {
        Self {
            role_arn: String::new(),
            external_id: String::new(),
            region: default_region(),
        }
    }
}

/// Network input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInput {
    /// Primary VPC range.
    #[serde(default)]
    pub cidr_block: Option<String>,
    /// Additional VPC ranges.
    #[serde(default)]
    pub secondary_cidr_blocks: Vec<String>,
    /// NAT layout.
    #[serde(default)]
    pub nat_gateway_strategy: Option<NatGatewayStrategy>,
    /// Custom public subnets; bypasses allocation for the tier.
    #[serde(default)]
    pub public_subnets: Option<Vec<SubnetInput>>,
    /// Custom private subnets; bypasses allocation for the tier.
    #[serde(default)]
    pub private_subnets: Option<Vec<SubnetInput>>,
    /// Custom pod subnets; bypasses allocation for the tier.
    #[serde(default)]
    pub pod_subnets: Option<Vec<SubnetInput>>,
    /// Interface and gateway endpoints.
    #[serde(default)]
    pub endpoints: Option<Endpoints>,
    /// DNS hostnames toggle.
    #[serde(default)]
    pub enable_dns_hostnames: Option<bool>,
    /// DNS resolution toggle.
    #[serde(default)]
    pub enable_dns_support: Option<bool>,
    /// Tags for network resources.
    #[serde(default)]
    pub tags: Tags,
}

impl NetworkInput {
    /// Custom subnets supplied for a tier, if any.
    #[must_use]
    pub fn custom_subnets(&self, tier: SubnetTier) -> Option<&[SubnetInput]> {
        match tier {
            SubnetTier::Public => self.public_subnets.as_deref(),
            SubnetTier::Private => self.private_subnets.as_deref(),
            SubnetTier::Pod => self.pod_subnets.as_deref(),
        }
    }
}

/// A caller-supplied subnet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubnetInput {
    /// Subnet range.
    pub cidr_block: String,
    /// Availability zone.
    pub availability_zone: String,
    /// Display name; derived from the tenant and zone when absent.
    #[serde(default)]
    pub name: Option<String>,
    /// Subnet-specific tags; these win over role and global tags.
    #[serde(default)]
    pub tags: Tags,
}

/// Network endpoint feature flags.
///
/// Used directly in both input and resolved form since every flag has a
/// concrete default.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoints {
    /// Object storage gateway endpoint.
    #[serde(default = "default_true")]
    pub s3: bool,
    /// Key-value store gateway endpoint.
    #[serde(default)]
    pub dynamodb: bool,
    /// Image registry API.
    #[serde(default)]
    pub ecr_api: bool,
    /// Image registry data plane.
    #[serde(default)]
    pub ecr_dkr: bool,
    /// Security token service.
    #[serde(default)]
    pub sts: bool,
    /// Log ingestion.
    #[serde(default)]
    pub logs: bool,
    /// Compute API.
    #[serde(default)]
    pub ec2: bool,
    /// Systems manager.
    #[serde(default)]
    pub ssm: bool,
    /// Session manager messages.
    #[serde(default)]
    pub ssmmessages: bool,
    /// Compute messages.
    #[serde(default)]
    pub ec2messages: bool,
    /// Load balancer API.
    #[serde(default)]
    pub elasticloadbalancing: bool,
    /// Autoscaling API.
    #[serde(default)]
    pub autoscaling: bool,
}

const fn default_true() -> bool {
    true
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            s3: true,
            dynamodb: false,
            ecr_api: false,
            ecr_dkr: false,
            sts: false,
            logs: false,
            ec2: false,
            ssm: false,
            ssmmessages: false,
            ec2messages: false,
            elasticloadbalancing: false,
            autoscaling: false,
        }
    }
}

/// Cluster input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterInput {
    /// Kubernetes version.
    #[serde(default)]
    pub version: Option<String>,
    /// Operating mode.
    #[serde(default)]
    pub mode: Option<ClusterMode>,
    /// Kubernetes service address range.
    #[serde(default)]
    pub service_cidr: Option<String>,
    /// Endpoint access settings.
    #[serde(default)]
    pub access: Option<AccessInput>,
    /// Control-plane logging toggle.
    #[serde(default)]
    pub logging_enabled: Option<bool>,
    /// Control-plane log streams.
    #[serde(default)]
    pub logging_types: Option<Vec<ClusterLogType>>,
    /// Secrets encryption toggle.
    #[serde(default)]
    pub encryption_enabled: Option<bool>,
    /// Customer-managed key for secrets encryption.
    #[serde(default)]
    pub encryption_key_arn: Option<String>,
    /// Zonal shift toggle.
    #[serde(default)]
    pub zonal_shift_enabled: Option<bool>,
    /// Deletion protection toggle.
    #[serde(default)]
    pub deletion_protection: Option<bool>,
    /// Per-addon overrides keyed by addon name.
    #[serde(default)]
    pub managed_addons: BTreeMap<String, ManagedAddonInput>,
    /// Node groups; ignored in auto mode.
    #[serde(default)]
    pub node_groups: Option<Vec<NodeGroupInput>>,
    /// Cluster tags.
    #[serde(default)]
    pub tags: Tags,
}

/// Cluster endpoint access input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessInput {
    /// Private endpoint toggle.
    #[serde(default)]
    pub endpoint_private_access: Option<bool>,
    /// Public endpoint toggle.
    #[serde(default)]
    pub endpoint_public_access: Option<bool>,
    /// Allow-list for the public endpoint.
    #[serde(default)]
    pub public_access_cidrs: Vec<String>,
    /// Authentication mode.
    #[serde(default)]
    pub authentication_mode: Option<AuthenticationMode>,
    /// Grant the creating principal cluster-admin.
    #[serde(default)]
    pub bootstrap_cluster_creator_admin: Option<bool>,
    /// Additional access entries.
    #[serde(default)]
    pub access_entries: Vec<AccessEntry>,
    /// Private access node.
    #[serde(default)]
    pub access_node: Option<AccessNodeInput>,
}

/// Access entry granting a principal cluster permissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessEntry {
    /// Principal ARN.
    pub principal_arn: String,
    /// Kubernetes groups to bind.
    #[serde(default)]
    pub kubernetes_groups: Vec<String>,
    /// Access policy ARNs to associate.
    #[serde(default)]
    pub policy_arns: Vec<String>,
}

/// Private access node input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessNodeInput {
    /// Whether to provision the node.
    #[serde(default)]
    pub enabled: Option<bool>,
    /// Instance type.
    #[serde(default)]
    pub instance_type: Option<String>,
}

/// Managed addon override.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManagedAddonInput {
    /// Enable or disable the addon.
    #[serde(default)]
    pub enabled: Option<bool>,
    /// Pinned version.
    #[serde(default)]
    pub version: Option<String>,
    /// Addon configuration values.
    #[serde(default)]
    pub configuration: BTreeMap<String, serde_json::Value>,
}

/// Node group input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeGroupInput {
    /// Group name.
    pub name: String,
    /// Instance types.
    #[serde(default)]
    pub instance_types: Option<Vec<String>>,
    /// Purchasing option.
    #[serde(default)]
    pub capacity_type: Option<CapacityType>,
    /// Machine image family.
    #[serde(default)]
    pub ami_type: Option<String>,
    /// Root volume size.
    #[serde(default)]
    pub disk_size_gib: Option<u32>,
    /// Desired node count.
    #[serde(default)]
    pub desired_size: Option<u32>,
    /// Minimum node count.
    #[serde(default)]
    pub min_size: Option<u32>,
    /// Maximum node count.
    #[serde(default)]
    pub max_size: Option<u32>,
    /// Kubernetes node labels.
    #[serde(default)]
    pub labels: Tags,
    /// Group tags.
    #[serde(default)]
    pub tags: Tags,
}

/// Cluster-level addon input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddonsInput {
    /// GitOps controller.
    #[serde(default)]
    pub argocd: Option<ArgoCdInput>,
}

/// GitOps controller input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgoCdInput {
    /// Install the controller.
    #[serde(default)]
    pub enabled: Option<bool>,
    /// API server replicas.
    #[serde(default)]
    pub server_replicas: Option<u32>,
    /// Repository server replicas.
    #[serde(default)]
    pub repo_server_replicas: Option<u32>,
    /// High availability mode.
    #[serde(default)]
    pub ha_enabled: Option<bool>,
    /// Source repository.
    #[serde(default)]
    pub repository: Option<RepositoryInput>,
    /// Path of the root application inside the repository.
    #[serde(default)]
    pub root_app_path: Option<String>,
    /// Helm chart version.
    #[serde(default)]
    pub chart_version: Option<String>,
}

/// Source repository input.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryInput {
    /// Clone URL.
    pub url: String,
    /// Username.
    #[serde(default)]
    pub username: Option<String>,
    /// Password or token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl fmt::Debug for RepositoryInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepositoryInput")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

// =============================================================================
// Resolved
// =============================================================================

/// Fully resolved tenant configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigResolved {
    /// Tenant identifier.
    pub tenant_id: String,
    /// Environment name.
    pub environment: String,
    /// Account access.
    pub account: AccountResolved,
    /// Network layout.
    pub network: NetworkResolved,
    /// Cluster settings.
    pub cluster: ClusterResolved,
    /// Cluster-level addons.
    pub addons: AddonsResolved,
    /// Global tag map.
    pub tags: Tags,
    /// When this configuration was first resolved.
    pub created_at: DateTime<Utc>,
    /// When this configuration was last resolved.
    pub updated_at: DateTime<Utc>,
}

impl ConfigResolved {
    /// Stable stack identifier, `{tenant}-{environment}`.
    #[must_use]
    pub fn stack_name(&self) -> String {
        format!("{}-{}", self.tenant_id, self.environment)
    }
}

/// Resolved account access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountResolved {
    /// Role assumed to provision into the tenant account.
    pub role_arn: String,
    /// External id presented when assuming the role.
    pub external_id: String,
    /// Region.
    pub region: String,
    /// Availability zones derived from the region.
    pub availability_zones: Vec<String>,
}

/// Resolved network layout.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkResolved {
    /// Primary VPC range.
    pub cidr_block: Ipv4Net,
    /// Additional VPC ranges.
    pub secondary_cidr_blocks: Vec<Ipv4Net>,
    /// NAT layout.
    pub nat_gateway_strategy: NatGatewayStrategy,
    /// Public subnets.
    pub public_subnets: Vec<Subnet>,
    /// Private subnets.
    pub private_subnets: Vec<Subnet>,
    /// Pod subnets.
    pub pod_subnets: Vec<Subnet>,
    /// Endpoint flags.
    pub endpoints: Endpoints,
    /// DNS hostnames toggle.
    pub enable_dns_hostnames: bool,
    /// DNS resolution toggle.
    pub enable_dns_support: bool,
    /// Tags for network resources.
    pub tags: Tags,
}

impl NetworkResolved {
    /// Subnets of one tier.
    #[must_use]
    pub fn tier(&self, tier: SubnetTier) -> &[Subnet] {
        match tier {
            SubnetTier::Public => &self.public_subnets,
            SubnetTier::Private => &self.private_subnets,
            SubnetTier::Pod => &self.pod_subnets,
        }
    }

    /// Every subnet across all tiers, with its tier and index within it.
    pub fn subnets(&self) -> impl Iterator<Item = (SubnetTier, usize, &Subnet)> {
        SubnetTier::ALL.into_iter().flat_map(move |tier| {
            self.tier(tier)
                .iter()
                .enumerate()
                .map(move |(i, subnet)| (tier, i, subnet))
        })
    }

    /// Primary range followed by the secondary ranges.
    pub fn ranges(&self) -> impl Iterator<Item = &Ipv4Net> {
        std::iter::once(&self.cidr_block).chain(self.secondary_cidr_blocks.iter())
    }
}

/// A resolved subnet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subnet {
    /// Subnet range.
    pub cidr_block: Ipv4Net,
    /// Availability zone.
    pub availability_zone: String,
    /// Display name.
    pub name: String,
    /// Merged tag map.
    pub tags: Tags,
}

/// Resolved cluster settings.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterResolved {
    /// Kubernetes version.
    pub version: String,
    /// Operating mode.
    pub mode: ClusterMode,
    /// Kubernetes service address range.
    pub service_cidr: Ipv4Net,
    /// Endpoint access.
    pub access: AccessResolved,
    /// Control-plane logging.
    pub logging: LoggingResolved,
    /// Secrets encryption.
    pub encryption: EncryptionResolved,
    /// Zonal shift toggle.
    pub zonal_shift_enabled: bool,
    /// Deletion protection toggle.
    pub deletion_protection: bool,
    /// Every known managed addon, keyed by name.
    pub managed_addons: BTreeMap<String, ManagedAddon>,
    /// Node groups; empty in auto mode.
    pub node_groups: Vec<NodeGroup>,
    /// Cluster tags.
    pub tags: Tags,
}

/// Resolved endpoint access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessResolved {
    /// Private endpoint toggle.
    pub endpoint_private_access: bool,
    /// Public endpoint toggle.
    pub endpoint_public_access: bool,
    /// Allow-list for the public endpoint.
    pub public_access_cidrs: Vec<Ipv4Net>,
    /// Authentication mode.
    pub authentication_mode: AuthenticationMode,
    /// Grant the creating principal cluster-admin.
    pub bootstrap_cluster_creator_admin: bool,
    /// Additional access entries.
    pub access_entries: Vec<AccessEntry>,
    /// Private access node.
    pub access_node: AccessNode,
}

impl AccessResolved {
    /// Whether only the private endpoint is reachable.
    #[must_use]
    pub const fn is_private_only(&self) -> bool {
        self.endpoint_private_access && !self.endpoint_public_access
    }

    /// Whether only the public endpoint is reachable.
    #[must_use]
    pub const fn is_public_only(&self) -> bool {
        self.endpoint_public_access && !self.endpoint_private_access
    }
}

/// Resolved private access node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessNode {
    /// Whether the node is provisioned.
    pub enabled: bool,
    /// Instance type.
    pub instance_type: String,
}

/// Resolved control-plane logging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingResolved {
    /// Logging toggle.
    pub enabled: bool,
    /// Enabled streams; empty when logging is off.
    pub types: Vec<ClusterLogType>,
}

/// Resolved secrets encryption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionResolved {
    /// Encryption toggle.
    pub enabled: bool,
    /// Key used when enabled.
    pub key: KeySource,
}

/// Where the secrets encryption key comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KeySource {
    /// A key created and managed alongside the cluster.
    ProviderManaged,
    /// A customer-managed key.
    Customer {
        /// Key ARN.
        key_arn: String,
    },
}

/// A resolved managed addon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagedAddon {
    /// Whether the addon is installed.
    pub enabled: bool,
    /// Version, `latest` unless pinned.
    pub version: String,
    /// Addon configuration values.
    pub configuration: BTreeMap<String, serde_json::Value>,
    /// Conflict handling on create.
    pub resolve_conflicts_on_create: ConflictPolicy,
    /// Conflict handling on update.
    pub resolve_conflicts_on_update: ConflictPolicy,
}

/// A resolved node group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeGroup {
    /// Group name.
    pub name: String,
    /// Instance types.
    pub instance_types: Vec<String>,
    /// Purchasing option.
    pub capacity_type: CapacityType,
    /// Machine image family.
    pub ami_type: String,
    /// Root volume size.
    pub disk_size_gib: u32,
    /// Desired node count.
    pub desired_size: u32,
    /// Minimum node count.
    pub min_size: u32,
    /// Maximum node count.
    pub max_size: u32,
    /// Kubernetes node labels.
    pub labels: Tags,
    /// Group tags.
    pub tags: Tags,
}

/// Resolved cluster-level addons.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddonsResolved {
    /// GitOps controller.
    pub argocd: ArgoCd,
}

/// Resolved GitOps controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgoCd {
    /// Install the controller.
    pub enabled: bool,
    /// API server replicas.
    pub server_replicas: u32,
    /// Repository server replicas.
    pub repo_server_replicas: u32,
    /// High availability mode.
    pub ha_enabled: bool,
    /// Source repository.
    pub repository: Option<Repository>,
    /// Path of the root application inside the repository.
    pub root_app_path: String,
    /// Helm chart version.
    pub chart_version: String,
}

/// Resolved source repository.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    /// Clone URL.
    pub url: String,
    /// Username.
    pub username: String,
    /// Password or token. Never rendered into remote payloads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl fmt::Debug for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_defaults_from_minimal_json() {
        let json = r#"{
            "tenant_id": "acme",
            "account": {
                "role_arn": "arn:aws:iam::123456789012:role/byoc",
                "external_id": "external-1234"
            }
        }"#;

        let input: ConfigInput = serde_json::from_str(json).expect("parse");
        assert_eq!(input.environment, "prod");
        assert_eq!(input.account.region, "us-east-1");
        assert!(input.network.is_none());
        assert!(input.tags.is_empty());
    }

    #[test]
    fn endpoints_default_to_s3_only() {
        let endpoints: Endpoints = serde_json::from_str("{}").expect("parse");
        assert_eq!(endpoints, Endpoints::default());
        assert!(endpoints.s3);
        assert!(!endpoints.ssm);
    }

    #[test]
    fn nat_strategy_wire_names() {
        let strategy: NatGatewayStrategy = serde_json::from_str("\"one_per_az\"").expect("parse");
        assert_eq!(strategy, NatGatewayStrategy::OnePerAz);
        assert_eq!(NatGatewayStrategy::None.to_string(), "none");
    }

    #[test]
    fn authentication_mode_uses_provider_spelling() {
        let json = serde_json::to_string(&AuthenticationMode::ApiAndConfigMap).expect("serialise");
        assert_eq!(json, "\"API_AND_CONFIG_MAP\"");
    }

    #[test]
    fn repository_debug_redacts_password() {
        let repo = Repository {
            url: "https://git.example.com/acme/gitops".to_owned(),
            username: "git".to_owned(),
            password: Some("hunter2".to_owned()),
        };
        let rendered = format!("{repo:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn tier_role_tags() {
        assert_eq!(SubnetTier::Public.role_tag(), "kubernetes.io/role/elb");
        assert_eq!(SubnetTier::Pod.role_tag(), "kubernetes.io/role/internal-elb");
    }
}
