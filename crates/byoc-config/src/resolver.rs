//! Expansion of a sparse [`ConfigInput`] into a [`ConfigResolved`].
//!
//! Every default lives in this module. Resolution never reads a previous
//! resolution; the only ambient input is the clock.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use ipnet::Ipv4Net;
use tracing::debug;

use crate::cidr::{self, TierLayout, POD_TIER, PRIVATE_TIER, PUBLIC_TIER};
use crate::error::{ConfigError, ConfigResult};
use crate::model::{
    AccessNode, AccessResolved, AccountResolved, AddonsResolved, ArgoCd, CapacityType,
    ClusterInput, ClusterLogType, ClusterMode, ClusterResolved, ConfigInput, ConfigResolved,
    ConflictPolicy, EncryptionResolved, KeySource, LoggingResolved, ManagedAddon,
    NetworkInput, NetworkResolved, NodeGroup, Repository, Subnet, SubnetInput, SubnetTier, Tags,
};

/// Suffixes appended to the region to form availability zone names.
pub const AZ_SUFFIXES: [&str; 3] = ["a", "b", "c"];

/// Value of the `ManagedBy` global tag.
pub const MANAGED_BY: &str = "pulumi";

const DEFAULT_VPC_CIDR: &str = "10.0.0.0/16";
const DEFAULT_SERVICE_CIDR: &str = "172.20.0.0/16";
const DEFAULT_CLUSTER_VERSION: &str = "1.31";
const DEFAULT_ACCESS_NODE_INSTANCE_TYPE: &str = "t3.micro";
const DEFAULT_LOG_TYPES: [ClusterLogType; 3] = [
    ClusterLogType::Api,
    ClusterLogType::Audit,
    ClusterLogType::Authenticator,
];

/// Default-enabled policy for one managed addon.
#[derive(Debug, Clone, Copy)]
pub struct ManagedAddonDefault {
    /// Addon name.
    pub name: &'static str,
    /// Enabled when the tenant says nothing.
    pub enabled: bool,
    /// Forced off when the cluster runs in [`ClusterMode::Auto`].
    pub disabled_in_auto_mode: bool,
}

/// Every managed addon the resolver knows about.
pub const MANAGED_ADDON_DEFAULTS: &[ManagedAddonDefault] = &[
    ManagedAddonDefault {
        name: "vpc-cni",
        enabled: true,
        disabled_in_auto_mode: true,
    },
    ManagedAddonDefault {
        name: "coredns",
        enabled: true,
        disabled_in_auto_mode: true,
    },
    ManagedAddonDefault {
        name: "kube-proxy",
        enabled: true,
        disabled_in_auto_mode: true,
    },
    ManagedAddonDefault {
        name: "ebs-csi-driver",
        enabled: true,
        disabled_in_auto_mode: false,
    },
    ManagedAddonDefault {
        name: "efs-csi-driver",
        enabled: false,
        disabled_in_auto_mode: false,
    },
    ManagedAddonDefault {
        name: "pod-identity-agent",
        enabled: true,
        disabled_in_auto_mode: false,
    },
    ManagedAddonDefault {
        name: "snapshot-controller",
        enabled: false,
        disabled_in_auto_mode: false,
    },
];

/// Look up the default policy for a managed addon.
#[must_use]
pub fn managed_addon_default(name: &str) -> Option<&'static ManagedAddonDefault> {
    MANAGED_ADDON_DEFAULTS.iter().find(|d| d.name == name)
}

impl ManagedAddonDefault {
    /// Effective enabled flag given the tenant's override and cluster mode.
    #[must_use]
    pub fn effective(&self, requested: Option<bool>, mode: ClusterMode) -> bool {
        if mode == ClusterMode::Auto && self.disabled_in_auto_mode {
            return false;
        }
        requested.unwrap_or(self.enabled)
    }
}

/// Resolve `input` using the current time.
pub fn resolve(input: &ConfigInput) -> ConfigResult<ConfigResolved> {
    resolve_at(input, Utc::now())
}

/// Resolve `input` as of `now`.
///
/// Identical inputs and timestamps produce identical outputs.
pub fn resolve_at(input: &ConfigInput, now: DateTime<Utc>) -> ConfigResult<ConfigResolved> {
    let tags = global_tags(input);
    let account = resolve_account(input);
    let network = resolve_network(input, &account.availability_zones, &tags)?;
    let cluster = resolve_cluster(input, &tags)?;
    let addons = resolve_addons(input);

    debug!(
        tenant = %input.tenant_id,
        environment = %input.environment,
        public = network.public_subnets.len(),
        private = network.private_subnets.len(),
        pod = network.pod_subnets.len(),
        "configuration resolved"
    );

    Ok(ConfigResolved {
        tenant_id: input.tenant_id.clone(),
        environment: input.environment.clone(),
        account,
        network,
        cluster,
        addons,
        tags,
        created_at: now,
        updated_at: now,
    })
}

/// Re-resolve a tenant configuration from a new input.
///
/// The result is a wholesale replacement; only `created_at` carries over.
pub fn update_resolved(
    existing: &ConfigResolved,
    input: &ConfigInput,
) -> ConfigResult<ConfigResolved> {
    let mut resolved = resolve(input)?;
    resolved.created_at = existing.created_at;
    Ok(resolved)
}

/// Availability zones for a region.
#[must_use]
pub fn availability_zones(region: &str) -> Vec<String> {
    AZ_SUFFIXES.iter().map(|s| format!("{region}{s}")).collect()
}

fn global_tags(input: &ConfigInput) -> Tags {
    let mut tags = Tags::new();
    tags.insert("Environment".to_owned(), input.environment.clone());
    tags.insert("Tenant".to_owned(), input.tenant_id.clone());
    tags.insert("ManagedBy".to_owned(), MANAGED_BY.to_owned());
    tags.extend(input.tags.clone());
    tags
}

fn resolve_account(input: &ConfigInput) -> AccountResolved {
    AccountResolved {
        role_arn: input.account.role_arn.clone(),
        external_id: input.account.external_id.clone(),
        region: input.account.region.clone(),
        availability_zones: availability_zones(&input.account.region),
    }
}

fn resolve_network(
    input: &ConfigInput,
    azs: &[String],
    global: &Tags,
) -> ConfigResult<NetworkResolved> {
    let default_network = NetworkInput::default();
    let network = input.network.as_ref().unwrap_or(&default_network);

    let cidr_block = parse_cidr(
        "network.cidr_block",
        network.cidr_block.as_deref().unwrap_or(DEFAULT_VPC_CIDR),
    )?;
    let secondary_cidr_blocks = network
        .secondary_cidr_blocks
        .iter()
        .enumerate()
        .map(|(i, raw)| parse_cidr(&format!("network.secondary_cidr_blocks[{i}]"), raw))
        .collect::<ConfigResult<Vec<_>>>()?;

    let tenant = &input.tenant_id;
    let resolve_tier = |tier: SubnetTier,
                        range: Option<Ipv4Net>,
                        layout: TierLayout|
     -> ConfigResult<Vec<Subnet>> {
        if let Some(custom) = network.custom_subnets(tier) {
            return custom_subnets(tenant, tier, custom, global);
        }
        match range {
            Some(range) => Ok(cidr::allocate_tier(range, azs, layout)?
                .into_iter()
                .map(|(cidr_block, az)| allocated_subnet(tenant, tier, cidr_block, az, global))
                .collect()),
            None => Ok(Vec::new()),
        }
    };

    let public_subnets = resolve_tier(SubnetTier::Public, Some(cidr_block), PUBLIC_TIER)?;
    let private_subnets = resolve_tier(SubnetTier::Private, Some(cidr_block), PRIVATE_TIER)?;
    let pod_subnets = resolve_tier(
        SubnetTier::Pod,
        secondary_cidr_blocks.first().copied(),
        POD_TIER,
    )?;

    let access_node_enabled = input
        .cluster
        .as_ref()
        .and_then(|c| c.access.as_ref())
        .and_then(|a| a.access_node.as_ref())
        .and_then(|n| n.enabled)
        .unwrap_or(false);

    let mut endpoints = network.endpoints.unwrap_or_default();
    // The access node reaches the session manager only through these.
    endpoints.ssm |= access_node_enabled;
    endpoints.ssmmessages |= access_node_enabled;
    endpoints.ec2messages |= access_node_enabled;

    Ok(NetworkResolved {
        cidr_block,
        secondary_cidr_blocks,
        nat_gateway_strategy: network.nat_gateway_strategy.unwrap_or_default(),
        public_subnets,
        private_subnets,
        pod_subnets,
        endpoints,
        enable_dns_hostnames: network.enable_dns_hostnames.unwrap_or(true),
        enable_dns_support: network.enable_dns_support.unwrap_or(true),
        tags: network.tags.clone(),
    })
}

fn subnet_name(tenant: &str, tier: SubnetTier, az: &str) -> String {
    let suffix = az.chars().last().map(String::from).unwrap_or_default();
    format!("{tenant}-{tier}-{suffix}")
}

fn role_tags(tier: SubnetTier) -> Tags {
    let mut tags = Tags::new();
    tags.insert("SubnetType".to_owned(), tier.as_str().to_owned());
    tags.insert(tier.role_tag().to_owned(), "1".to_owned());
    tags
}

fn allocated_subnet(
    tenant: &str,
    tier: SubnetTier,
    cidr_block: Ipv4Net,
    availability_zone: String,
    global: &Tags,
) -> Subnet {
    let mut tags = role_tags(tier);
    tags.extend(global.clone());
    Subnet {
        cidr_block,
        name: subnet_name(tenant, tier, &availability_zone),
        availability_zone,
        tags,
    }
}

fn custom_subnets(
    tenant: &str,
    tier: SubnetTier,
    subnets: &[SubnetInput],
    global: &Tags,
) -> ConfigResult<Vec<Subnet>> {
    subnets
        .iter()
        .enumerate()
        .map(|(i, subnet)| {
            let cidr_block = parse_cidr(
                &format!("network.{}[{i}].cidr_block", tier.field()),
                &subnet.cidr_block,
            )?;
            let mut tags = role_tags(tier);
            tags.extend(global.clone());
            tags.extend(subnet.tags.clone());
            Ok(Subnet {
                cidr_block,
                availability_zone: subnet.availability_zone.clone(),
                name: subnet
                    .name
                    .clone()
                    .unwrap_or_else(|| subnet_name(tenant, tier, &subnet.availability_zone)),
                tags,
            })
        })
        .collect()
}

fn resolve_cluster(input: &ConfigInput, global: &Tags) -> ConfigResult<ClusterResolved> {
    let default_cluster = ClusterInput::default();
    let cluster = input.cluster.as_ref().unwrap_or(&default_cluster);
    let mode = cluster.mode.unwrap_or_default();

    let service_cidr = parse_cidr(
        "cluster.service_cidr",
        cluster
            .service_cidr
            .as_deref()
            .unwrap_or(DEFAULT_SERVICE_CIDR),
    )?;

    let access = {
        let access = cluster.access.clone().unwrap_or_default();
        let public_access_cidrs = access
            .public_access_cidrs
            .iter()
            .enumerate()
            .map(|(i, raw)| parse_cidr(&format!("cluster.access.public_access_cidrs[{i}]"), raw))
            .collect::<ConfigResult<Vec<_>>>()?;
        let node = access.access_node.unwrap_or_default();
        AccessResolved {
            endpoint_private_access: access.endpoint_private_access.unwrap_or(true),
            endpoint_public_access: access.endpoint_public_access.unwrap_or(false),
            public_access_cidrs,
            authentication_mode: access.authentication_mode.unwrap_or_default(),
            bootstrap_cluster_creator_admin: access.bootstrap_cluster_creator_admin.unwrap_or(true),
            access_entries: access.access_entries,
            access_node: AccessNode {
                enabled: node.enabled.unwrap_or(false),
                instance_type: node
                    .instance_type
                    .unwrap_or_else(|| DEFAULT_ACCESS_NODE_INSTANCE_TYPE.to_owned()),
            },
        }
    };

    let logging_enabled = cluster.logging_enabled.unwrap_or(false);
    let logging = LoggingResolved {
        enabled: logging_enabled,
        types: if logging_enabled {
            cluster
                .logging_types
                .clone()
                .unwrap_or_else(|| DEFAULT_LOG_TYPES.to_vec())
        } else {
            Vec::new()
        },
    };

    let encryption = EncryptionResolved {
        enabled: cluster.encryption_enabled.unwrap_or(true),
        key: match &cluster.encryption_key_arn {
            Some(key_arn) => KeySource::Customer {
                key_arn: key_arn.clone(),
            },
            None => KeySource::ProviderManaged,
        },
    };

    let managed_addons = MANAGED_ADDON_DEFAULTS
        .iter()
        .map(|default| {
            let overrides = cluster.managed_addons.get(default.name);
            let addon = ManagedAddon {
                enabled: default.effective(overrides.and_then(|o| o.enabled), mode),
                version: overrides
                    .and_then(|o| o.version.clone())
                    .unwrap_or_else(|| "latest".to_owned()),
                configuration: overrides
                    .map(|o| o.configuration.clone())
                    .unwrap_or_default(),
                resolve_conflicts_on_create: ConflictPolicy::Overwrite,
                resolve_conflicts_on_update: ConflictPolicy::Preserve,
            };
            (default.name.to_owned(), addon)
        })
        .collect::<BTreeMap<_, _>>();

    let node_groups = match mode {
        ClusterMode::Auto => Vec::new(),
        ClusterMode::Managed => match &cluster.node_groups {
            Some(groups) => groups.iter().map(resolve_node_group).collect(),
            None => vec![default_node_group()],
        },
    };

    let mut tags = global.clone();
    tags.extend(cluster.tags.clone());

    Ok(ClusterResolved {
        version: cluster
            .version
            .clone()
            .unwrap_or_else(|| DEFAULT_CLUSTER_VERSION.to_owned()),
        mode,
        service_cidr,
        access,
        logging,
        encryption,
        zonal_shift_enabled: cluster.zonal_shift_enabled.unwrap_or(false),
        deletion_protection: cluster.deletion_protection.unwrap_or(false),
        managed_addons,
        node_groups,
        tags,
    })
}

fn default_node_group() -> NodeGroup {
    let mut labels = Tags::new();
    labels.insert("workload".to_owned(), "general".to_owned());
    NodeGroup {
        name: "general".to_owned(),
        instance_types: vec!["t3.medium".to_owned()],
        capacity_type: CapacityType::OnDemand,
        ami_type: "AL2023_x86_64_STANDARD".to_owned(),
        disk_size_gib: 50,
        desired_size: 2,
        min_size: 1,
        max_size: 5,
        labels,
        tags: Tags::new(),
    }
}

fn resolve_node_group(group: &crate::model::NodeGroupInput) -> NodeGroup {
    let defaults = default_node_group();
    NodeGroup {
        name: group.name.clone(),
        instance_types: group
            .instance_types
            .clone()
            .unwrap_or(defaults.instance_types),
        capacity_type: group.capacity_type.unwrap_or(defaults.capacity_type),
        ami_type: group.ami_type.clone().unwrap_or(defaults.ami_type),
        disk_size_gib: group.disk_size_gib.unwrap_or(defaults.disk_size_gib),
        desired_size: group.desired_size.unwrap_or(defaults.desired_size),
        min_size: group.min_size.unwrap_or(defaults.min_size),
        max_size: group.max_size.unwrap_or(defaults.max_size),
        labels: group.labels.clone(),
        tags: group.tags.clone(),
    }
}

fn resolve_addons(input: &ConfigInput) -> AddonsResolved {
    let argocd = input
        .addons
        .as_ref()
        .and_then(|a| a.argocd.clone())
        .unwrap_or_default();

    AddonsResolved {
        argocd: ArgoCd {
            enabled: argocd.enabled.unwrap_or(false),
            server_replicas: argocd.server_replicas.unwrap_or(2),
            repo_server_replicas: argocd.repo_server_replicas.unwrap_or(2),
            ha_enabled: argocd.ha_enabled.unwrap_or(false),
            repository: argocd.repository.map(|repo| Repository {
                url: repo.url,
                username: repo.username.unwrap_or_else(|| "git".to_owned()),
                password: repo.password.filter(|p| !p.trim().is_empty()),
            }),
            root_app_path: argocd
                .root_app_path
                .unwrap_or_else(|| "gitops/apps/".to_owned()),
            chart_version: argocd
                .chart_version
                .unwrap_or_else(|| "7.7.11".to_owned()),
        },
    }
}

fn parse_cidr(field: &str, raw: &str) -> ConfigResult<Ipv4Net> {
    raw.trim()
        .parse::<Ipv4Net>()
        .map(|net| net.trunc())
        .map_err(|_| ConfigError::InvalidCidr {
            field: field.to_owned(),
            value: raw.to_owned(),
        })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::{
        AccessInput, AccessNodeInput, AddonsInput, ArgoCdInput, ManagedAddonInput, NetworkInput,
        RepositoryInput,
    };

    fn minimal() -> ConfigInput {
        ConfigInput::new(
            "acme",
            "arn:aws:iam::123456789012:role/byoc",
            "external-1234",
        )
    }

    fn fixed_time() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn minimal_input_resolves_default_layout() {
        let resolved = resolve(&minimal()).unwrap();

        assert_eq!(
            resolved.account.availability_zones,
            vec!["us-east-1a", "us-east-1b", "us-east-1c"]
        );
        assert_eq!(resolved.network.cidr_block.to_string(), "10.0.0.0/16");

        let public: Vec<_> = resolved
            .network
            .public_subnets
            .iter()
            .map(|s| s.cidr_block.to_string())
            .collect();
        assert_eq!(public, vec!["10.0.0.0/24", "10.0.1.0/24", "10.0.2.0/24"]);

        let private: Vec<_> = resolved
            .network
            .private_subnets
            .iter()
            .map(|s| s.cidr_block.to_string())
            .collect();
        assert_eq!(private, vec!["10.0.16.0/20", "10.0.32.0/20", "10.0.48.0/20"]);

        assert!(resolved.network.pod_subnets.is_empty());
    }

    #[test]
    fn subnet_names_and_tags() {
        let resolved = resolve(&minimal()).unwrap();
        let subnet = &resolved.network.private_subnets[1];

        assert_eq!(subnet.name, "acme-private-b");
        assert_eq!(subnet.availability_zone, "us-east-1b");
        assert_eq!(subnet.tags.get("SubnetType").map(String::as_str), Some("private"));
        assert_eq!(
            subnet
                .tags
                .get("kubernetes.io/role/internal-elb")
                .map(String::as_str),
            Some("1")
        );
        assert_eq!(subnet.tags.get("ManagedBy").map(String::as_str), Some("pulumi"));

        let public = &resolved.network.public_subnets[0];
        assert!(public.tags.contains_key("kubernetes.io/role/elb"));
    }

    #[test]
    fn user_tags_win_over_global_tags() {
        let mut input = minimal();
        input
            .tags
            .insert("ManagedBy".to_owned(), "platform-team".to_owned());
        input.tags.insert("CostCenter".to_owned(), "42".to_owned());

        let resolved = resolve(&input).unwrap();
        assert_eq!(
            resolved.tags.get("ManagedBy").map(String::as_str),
            Some("platform-team")
        );
        assert_eq!(resolved.tags.get("Tenant").map(String::as_str), Some("acme"));
        assert_eq!(resolved.tags.get("Environment").map(String::as_str), Some("prod"));
        assert_eq!(resolved.tags.get("CostCenter").map(String::as_str), Some("42"));
    }

    #[test]
    fn pod_tier_uses_first_secondary_range() {
        let mut input = minimal();
        input.network = Some(NetworkInput {
            secondary_cidr_blocks: vec!["100.64.0.0/16".to_owned(), "100.65.0.0/16".to_owned()],
            ..NetworkInput::default()
        });

        let resolved = resolve(&input).unwrap();
        let pod: Vec<_> = resolved
            .network
            .pod_subnets
            .iter()
            .map(|s| s.cidr_block.to_string())
            .collect();
        assert_eq!(pod, vec!["100.64.0.0/18", "100.64.64.0/18", "100.64.128.0/18"]);
        assert_eq!(resolved.network.pod_subnets[0].name, "acme-pod-a");
    }

    #[test]
    fn custom_subnets_bypass_allocation() {
        let mut input = minimal();
        let mut own_tags = Tags::new();
        own_tags.insert("SubnetType".to_owned(), "edge".to_owned());
        input.network = Some(NetworkInput {
            public_subnets: Some(vec![SubnetInput {
                cidr_block: "10.0.200.0/24".to_owned(),
                availability_zone: "us-east-1a".to_owned(),
                name: Some("edge-a".to_owned()),
                tags: own_tags,
            }]),
            ..NetworkInput::default()
        });

        let resolved = resolve(&input).unwrap();
        assert_eq!(resolved.network.public_subnets.len(), 1);
        let subnet = &resolved.network.public_subnets[0];
        assert_eq!(subnet.cidr_block.to_string(), "10.0.200.0/24");
        assert_eq!(subnet.name, "edge-a");
        assert_eq!(subnet.tags.get("SubnetType").map(String::as_str), Some("edge"));
        assert!(subnet.tags.contains_key("kubernetes.io/role/elb"));
        // Other tiers still allocate.
        assert_eq!(resolved.network.private_subnets.len(), 3);
    }

    #[test]
    fn access_node_forces_session_endpoints() {
        let mut input = minimal();
        input.cluster = Some(ClusterInput {
            access: Some(AccessInput {
                access_node: Some(AccessNodeInput {
                    enabled: Some(true),
                    instance_type: None,
                }),
                ..AccessInput::default()
            }),
            ..ClusterInput::default()
        });

        let resolved = resolve(&input).unwrap();
        let endpoints = resolved.network.endpoints;
        assert!(endpoints.ssm);
        assert!(endpoints.ssmmessages);
        assert!(endpoints.ec2messages);
        assert!(endpoints.s3);
        assert!(!endpoints.ecr_api);
        assert_eq!(resolved.cluster.access.access_node.instance_type, "t3.micro");
    }

    #[test]
    fn access_node_never_turns_endpoints_off() {
        let mut input = minimal();
        let mut endpoints = crate::model::Endpoints::default();
        endpoints.ssm = true;
        input.network = Some(NetworkInput {
            endpoints: Some(endpoints),
            ..NetworkInput::default()
        });

        let resolved = resolve(&input).unwrap();
        assert!(resolved.network.endpoints.ssm);
        assert!(!resolved.network.endpoints.ssmmessages);
    }

    #[test]
    fn cluster_defaults() {
        let resolved = resolve(&minimal()).unwrap();
        let cluster = &resolved.cluster;

        assert_eq!(cluster.version, "1.31");
        assert_eq!(cluster.mode, ClusterMode::Auto);
        assert_eq!(cluster.service_cidr.to_string(), "172.20.0.0/16");
        assert!(cluster.access.endpoint_private_access);
        assert!(!cluster.access.endpoint_public_access);
        assert!(cluster.access.bootstrap_cluster_creator_admin);
        assert!(!cluster.logging.enabled);
        assert!(cluster.logging.types.is_empty());
        assert!(cluster.encryption.enabled);
        assert_eq!(cluster.encryption.key, KeySource::ProviderManaged);
        assert!(cluster.node_groups.is_empty());
    }

    #[test]
    fn auto_mode_disables_core_networking_addons() {
        let mut input = minimal();
        let mut managed = BTreeMap::new();
        managed.insert(
            "coredns".to_owned(),
            ManagedAddonInput {
                enabled: Some(true),
                ..ManagedAddonInput::default()
            },
        );
        input.cluster = Some(ClusterInput {
            managed_addons: managed,
            ..ClusterInput::default()
        });

        let resolved = resolve(&input).unwrap();
        let addons = &resolved.cluster.managed_addons;
        assert_eq!(addons.len(), MANAGED_ADDON_DEFAULTS.len());
        assert!(!addons["vpc-cni"].enabled);
        assert!(!addons["coredns"].enabled);
        assert!(!addons["kube-proxy"].enabled);
        assert!(addons["ebs-csi-driver"].enabled);
        assert!(addons["pod-identity-agent"].enabled);
        assert!(!addons["efs-csi-driver"].enabled);
        assert!(!addons["snapshot-controller"].enabled);
        assert_eq!(addons["ebs-csi-driver"].version, "latest");
        assert_eq!(
            addons["ebs-csi-driver"].resolve_conflicts_on_create,
            ConflictPolicy::Overwrite
        );
        assert_eq!(
            addons["ebs-csi-driver"].resolve_conflicts_on_update,
            ConflictPolicy::Preserve
        );
    }

    #[test]
    fn managed_mode_gets_default_node_group_and_addons() {
        let mut input = minimal();
        input.cluster = Some(ClusterInput {
            mode: Some(ClusterMode::Managed),
            logging_enabled: Some(true),
            ..ClusterInput::default()
        });

        let resolved = resolve(&input).unwrap();
        let cluster = &resolved.cluster;
        assert!(cluster.managed_addons["vpc-cni"].enabled);
        assert!(cluster.managed_addons["coredns"].enabled);
        assert_eq!(cluster.node_groups.len(), 1);

        let group = &cluster.node_groups[0];
        assert_eq!(group.name, "general");
        assert_eq!(group.instance_types, vec!["t3.medium"]);
        assert_eq!((group.min_size, group.desired_size, group.max_size), (1, 2, 5));
        assert_eq!(group.labels.get("workload").map(String::as_str), Some("general"));
        assert_eq!(
            cluster.logging.types,
            vec![
                ClusterLogType::Api,
                ClusterLogType::Audit,
                ClusterLogType::Authenticator
            ]
        );
    }

    #[test]
    fn argocd_defaults_and_repository() {
        let mut input = minimal();
        input.addons = Some(AddonsInput {
            argocd: Some(ArgoCdInput {
                enabled: Some(true),
                repository: Some(RepositoryInput {
                    url: "https://git.example.com/acme/gitops".to_owned(),
                    username: None,
                    password: Some("  ".to_owned()),
                }),
                ..ArgoCdInput::default()
            }),
        });

        let resolved = resolve(&input).unwrap();
        let argocd = &resolved.addons.argocd;
        assert!(argocd.enabled);
        assert_eq!(argocd.server_replicas, 2);
        assert_eq!(argocd.repo_server_replicas, 2);
        assert!(!argocd.ha_enabled);
        assert_eq!(argocd.root_app_path, "gitops/apps/");
        assert_eq!(argocd.chart_version, "7.7.11");

        let repo = argocd.repository.as_ref().unwrap();
        assert_eq!(repo.username, "git");
        assert!(repo.password.is_none());
    }

    #[test]
    fn resolution_is_idempotent() {
        let mut input = minimal();
        input.network = Some(NetworkInput {
            secondary_cidr_blocks: vec!["100.64.0.0/16".to_owned()],
            ..NetworkInput::default()
        });

        let first = resolve_at(&input, fixed_time()).unwrap();
        let second = resolve_at(&input, fixed_time()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn update_keeps_created_at() {
        let existing = resolve_at(&minimal(), fixed_time()).unwrap();
        let mut input = minimal();
        input.environment = "staging".to_owned();

        let updated = update_resolved(&existing, &input).unwrap();
        assert_eq!(updated.created_at, existing.created_at);
        assert!(updated.updated_at > existing.updated_at);
        assert_eq!(updated.environment, "staging");
    }

    #[test]
    fn invalid_cidr_is_reported_with_field() {
        let mut input = minimal();
        input.network = Some(NetworkInput {
            cidr_block: Some("10.0.0.0/33".to_owned()),
            ..NetworkInput::default()
        });

        let err = resolve(&input).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidCidr { ref field, .. } if field == "network.cidr_block"
        ));
    }

    #[test]
    fn host_bits_are_truncated() {
        let mut input = minimal();
        input.network = Some(NetworkInput {
            cidr_block: Some("10.1.2.3/16".to_owned()),
            ..NetworkInput::default()
        });

        let resolved = resolve(&input).unwrap();
        assert_eq!(resolved.network.cidr_block.to_string(), "10.1.0.0/16");
    }
}
