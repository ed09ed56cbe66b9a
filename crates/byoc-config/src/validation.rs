//! Two-phase configuration validation.
//!
//! Phase one inspects the raw [`ConfigInput`]: required fields, identifier
//! shapes and CIDR syntax. If it reports anything, resolution is skipped
//! because the resolved values would be meaningless.
//!
//! Phase two inspects the [`ConfigResolved`] and runs every rule, collecting
//! all violations so a caller can fix everything in one round trip.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use ipnet::Ipv4Net;
use regex::Regex;

use crate::cidr::{contains, overlaps};
use crate::error::{Violation, Violations};
use crate::model::{
    ConfigInput, ConfigResolved, NatGatewayStrategy, NetworkResolved, SubnetTier,
};
use crate::resolver::managed_addon_default;

/// Allowed prefix lengths for the primary VPC range.
pub const VPC_PREFIX_RANGE: (u8, u8) = (16, 24);

/// Allowed prefix lengths for the cluster service range.
pub const SERVICE_PREFIX_RANGE: (u8, u8) = (12, 24);

/// Minimum and maximum identifier length.
pub const IDENTIFIER_LENGTH: (usize, usize) = (3, 50);

/// Minimum external id length.
pub const MIN_EXTERNAL_ID_LENGTH: usize = 10;

/// Allowed node group root volume sizes in GiB.
pub const DISK_SIZE_RANGE: (u32, u32) = (20, 1000);

static IDENTIFIER_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9-]+$").ok());

static ROLE_ARN_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^arn:aws:iam::\d{12}:role/.+$").ok());

static PRINCIPAL_ARN_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^arn:aws:iam::\d{12}:(role|user)/.+$").ok());

// The GitOps fields below end up in a script run on the access node.
static CHART_VERSION_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^v?\d+\.\d+\.\d+(-[0-9A-Za-z.-]+)?(\+[0-9A-Za-z.-]+)?$").ok()
});

static APP_PATH_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._/-]+$").ok());

static REPOSITORY_URL_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^(https?://|ssh://|git@)[A-Za-z0-9._~:/@%+=-]+$").ok()
});

static REPOSITORY_USERNAME_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._@+-]+$").ok());

// =============================================================================
// Phase one
// =============================================================================

/// Check the raw input. An empty result means resolution may proceed.
#[must_use]
pub fn validate_input(input: &ConfigInput) -> Violations {
    let mut v = Vec::new();

    check_identifier(&mut v, "tenant_id", "Tenant ID", &input.tenant_id, true);
    check_identifier(&mut v, "environment", "Environment", &input.environment, false);

    let account = &input.account;
    if account.role_arn.is_empty() {
        v.push(Violation::new("account.role_arn", "Role ARN is required"));
    } else if !matches_pattern(&ROLE_ARN_PATTERN, &account.role_arn) {
        v.push(Violation::with_value(
            "account.role_arn",
            "Role ARN must look like arn:aws:iam::<12-digit account>:role/<name>",
            &account.role_arn,
        ));
    }

    if account.external_id.is_empty() {
        v.push(Violation::new("account.external_id", "External ID is required"));
    } else if account.external_id.chars().count() < MIN_EXTERNAL_ID_LENGTH {
        v.push(Violation::new(
            "account.external_id",
            format!("External ID must be at least {MIN_EXTERNAL_ID_LENGTH} characters"),
        ));
    }

    if account.region.trim().is_empty() {
        v.push(Violation::new("account.region", "Region is required"));
    }

    if let Some(network) = &input.network {
        if let Some(cidr) = &network.cidr_block {
            check_cidr(&mut v, "network.cidr_block".to_owned(), "VPC", cidr);
        }
        for (i, cidr) in network.secondary_cidr_blocks.iter().enumerate() {
            check_cidr(
                &mut v,
                format!("network.secondary_cidr_blocks[{i}]"),
                "secondary",
                cidr,
            );
        }
        for tier in SubnetTier::ALL {
            for (i, subnet) in network.custom_subnets(tier).unwrap_or_default().iter().enumerate() {
                let path = format!("network.{}[{i}]", tier.field());
                check_cidr(&mut v, format!("{path}.cidr_block"), "subnet", &subnet.cidr_block);
                if subnet.availability_zone.trim().is_empty() {
                    v.push(Violation::new(
                        format!("{path}.availability_zone"),
                        "Availability zone is required",
                    ));
                }
            }
        }
    }

    if let Some(cluster) = &input.cluster {
        if let Some(cidr) = &cluster.service_cidr {
            check_cidr(&mut v, "cluster.service_cidr".to_owned(), "service", cidr);
        }
        if let Some(access) = &cluster.access {
            for (i, cidr) in access.public_access_cidrs.iter().enumerate() {
                check_cidr(
                    &mut v,
                    format!("cluster.access.public_access_cidrs[{i}]"),
                    "public access",
                    cidr,
                );
            }
            for (i, entry) in access.access_entries.iter().enumerate() {
                if !matches_pattern(&PRINCIPAL_ARN_PATTERN, &entry.principal_arn) {
                    v.push(Violation::with_value(
                        format!("cluster.access.access_entries[{i}].principal_arn"),
                        "Principal ARN must look like arn:aws:iam::<12-digit account>:role/<name> or :user/<name>",
                        &entry.principal_arn,
                    ));
                }
            }
        }
        for name in cluster.managed_addons.keys() {
            if managed_addon_default(name).is_none() {
                v.push(Violation::with_value(
                    "cluster.managed_addons",
                    format!("Unknown managed addon '{name}'"),
                    name,
                ));
            }
        }
        for (i, group) in cluster.node_groups.iter().flatten().enumerate() {
            let path = format!("cluster.node_groups[{i}]");
            if group.name.trim().is_empty() {
                v.push(Violation::new(format!("{path}.name"), "Node group name is required"));
            }
            let min = group.min_size.unwrap_or(1);
            let desired = group.desired_size.unwrap_or(2);
            let max = group.max_size.unwrap_or(5);
            if max == 0 {
                v.push(Violation::new(
                    format!("{path}.max_size"),
                    "Maximum size must be at least 1",
                ));
            }
            if !(min <= desired && desired <= max) {
                v.push(Violation::new(
                    path.clone(),
                    format!(
                        "Scaling bounds must satisfy min <= desired <= max (got {min} <= {desired} <= {max})"
                    ),
                ));
            }
            if let Some(disk) = group.disk_size_gib {
                let (lo, hi) = DISK_SIZE_RANGE;
                if !(lo..=hi).contains(&disk) {
                    v.push(Violation::with_value(
                        format!("{path}.disk_size_gib"),
                        format!("Disk size must be between {lo} and {hi} GiB"),
                        disk.to_string(),
                    ));
                }
            }
        }
    }

    if let Some(argocd) = input.addons.as_ref().and_then(|a| a.argocd.as_ref()) {
        if let Some(version) = &argocd.chart_version {
            if !matches_pattern(&CHART_VERSION_PATTERN, version) {
                v.push(Violation::with_value(
                    "addons.argocd.chart_version",
                    "Chart version must be a semantic version such as 7.7.11",
                    version,
                ));
            }
        }
        if let Some(path) = &argocd.root_app_path {
            if !matches_pattern(&APP_PATH_PATTERN, path) {
                v.push(Violation::with_value(
                    "addons.argocd.root_app_path",
                    "Root application path may only contain letters, digits, '.', '_', '-' and '/'",
                    path,
                ));
            }
        }
        if let Some(repo) = &argocd.repository {
            if repo.url.trim().is_empty() {
                v.push(Violation::new(
                    "addons.argocd.repository.url",
                    "Repository URL is required",
                ));
            } else if !matches_pattern(&REPOSITORY_URL_PATTERN, &repo.url) {
                v.push(Violation::with_value(
                    "addons.argocd.repository.url",
                    "Repository URL must be an https, http, ssh or git@ URL without spaces or shell metacharacters",
                    &repo.url,
                ));
            }
            if let Some(username) = &repo.username {
                if !matches_pattern(&REPOSITORY_USERNAME_PATTERN, username) {
                    v.push(Violation::with_value(
                        "addons.argocd.repository.username",
                        "Repository username may only contain letters, digits and '.', '_', '@', '+', '-'",
                        username,
                    ));
                }
            }
        }
    }

    Violations::from(v)
}

/// Check a tenant or environment identifier taken from a request path.
#[must_use]
pub fn validate_identifier(field: &str, label: &str, value: &str) -> Violations {
    let mut v = Vec::new();
    check_identifier(&mut v, field, label, value, true);
    Violations::from(v)
}

fn check_identifier(
    v: &mut Vec<Violation>,
    field: &str,
    label: &str,
    value: &str,
    required: bool,
) {
    if value.is_empty() {
        if required {
            v.push(Violation::new(field, format!("{label} is required")));
        } else {
            v.push(Violation::new(field, format!("{label} must not be empty")));
        }
        return;
    }

    let (min, max) = IDENTIFIER_LENGTH;
    let len = value.chars().count();
    if len < min || len > max {
        v.push(Violation::with_value(
            field,
            format!("{label} must be between {min} and {max} characters"),
            value,
        ));
    }
    if !matches_pattern(&IDENTIFIER_PATTERN, value) {
        v.push(Violation::with_value(
            field,
            format!("{label} may only contain lowercase letters, digits and hyphens"),
            value,
        ));
    }
}

fn check_cidr(v: &mut Vec<Violation>, field: String, label: &str, raw: &str) {
    if raw.trim().parse::<Ipv4Net>().is_err() {
        v.push(Violation::with_value(
            field,
            format!("Invalid {label} CIDR: expected an IPv4 address/prefix"),
            raw,
        ));
    }
}

fn matches_pattern(pattern: &LazyLock<Option<Regex>>, value: &str) -> bool {
    pattern.as_ref().is_some_and(|re| re.is_match(value))
}

// =============================================================================
// Phase two
// =============================================================================

/// Check a resolved configuration, collecting every violation.
#[must_use]
pub fn validate_resolved(config: &ConfigResolved) -> Violations {
    let mut v = Vec::new();
    check_vpc_ranges(&mut v, &config.network);
    check_subnets(&mut v, &config.network);
    check_nat(&mut v, &config.network);
    check_cluster(&mut v, config);
    check_consistency(&mut v, config);
    Violations::from(v)
}

fn check_vpc_ranges(v: &mut Vec<Violation>, network: &NetworkResolved) {
    let vpc = network.cidr_block;
    let (lo, hi) = VPC_PREFIX_RANGE;
    if !(lo..=hi).contains(&vpc.prefix_len()) {
        v.push(Violation::with_value(
            "network.cidr_block",
            format!("VPC CIDR must be between /{lo} and /{hi}"),
            vpc.to_string(),
        ));
    }

    for (i, secondary) in network.secondary_cidr_blocks.iter().enumerate() {
        if overlaps(&vpc, secondary) {
            v.push(Violation::with_value(
                format!("network.secondary_cidr_blocks[{i}]"),
                format!("Secondary CIDR {secondary} overlaps with primary VPC CIDR {vpc}"),
                secondary.to_string(),
            ));
        }
    }

    for (i, a) in network.secondary_cidr_blocks.iter().enumerate() {
        for b in network.secondary_cidr_blocks.iter().skip(i + 1) {
            if overlaps(a, b) {
                v.push(Violation::new(
                    "network.secondary_cidr_blocks",
                    format!("Secondary CIDRs overlap: {a} and {b}"),
                ));
            }
        }
    }
}

fn check_subnets(v: &mut Vec<Violation>, network: &NetworkResolved) {
    let all: Vec<_> = network.subnets().collect();

    for (tier, i, subnet) in &all {
        if !network.ranges().any(|range| contains(range, &subnet.cidr_block)) {
            v.push(Violation::with_value(
                format!("network.{}[{i}]", tier.field()),
                format!(
                    "Subnet CIDR {} is not within VPC CIDR range ({}) or secondary CIDRs",
                    subnet.cidr_block, network.cidr_block
                ),
                subnet.cidr_block.to_string(),
            ));
        }
    }

    for (n, (tier, i, a)) in all.iter().enumerate() {
        for (_, _, b) in all.iter().skip(n + 1) {
            if overlaps(&a.cidr_block, &b.cidr_block) {
                v.push(Violation::with_value(
                    format!("network.{}[{i}]", tier.field()),
                    format!(
                        "Subnet {} ({}) overlaps with {} ({})",
                        a.cidr_block, a.name, b.cidr_block, b.name
                    ),
                    a.cidr_block.to_string(),
                ));
            }
        }
    }

    if network.nat_gateway_strategy != NatGatewayStrategy::None {
        let missing = zones_without_public(network);
        if !missing.is_empty() {
            v.push(Violation::new(
                "network.private_subnets",
                format!(
                    "Private subnets exist in AZs [{}] without corresponding public subnets (required for NAT gateway routing)",
                    join(&missing)
                ),
            ));
        }
    }
}

fn check_nat(v: &mut Vec<Violation>, network: &NetworkResolved) {
    let strategy = network.nat_gateway_strategy;

    if strategy != NatGatewayStrategy::None && network.public_subnets.is_empty() {
        v.push(Violation::new(
            "network.nat_gateway_strategy",
            format!("NAT gateway strategy '{strategy}' requires public subnets, but none are configured"),
        ));
    }

    if strategy == NatGatewayStrategy::OnePerAz {
        let missing = zones_without_public(network);
        if !missing.is_empty() {
            v.push(Violation::new(
                "network.nat_gateway_strategy",
                format!(
                    "one_per_az NAT strategy requires public subnets in all AZs with private subnets. Missing public subnets in: [{}]",
                    join(&missing)
                ),
            ));
        }
    }
}

fn check_cluster(v: &mut Vec<Violation>, config: &ConfigResolved) {
    let cluster = &config.cluster;
    let network = &config.network;
    let service = cluster.service_cidr;

    let (lo, hi) = SERVICE_PREFIX_RANGE;
    if !(lo..=hi).contains(&service.prefix_len()) {
        v.push(Violation::with_value(
            "cluster.service_cidr",
            format!("Service CIDR must be between /{lo} and /{hi}"),
            service.to_string(),
        ));
    }

    if overlaps(&service, &network.cidr_block) {
        v.push(Violation::with_value(
            "cluster.service_cidr",
            format!(
                "Service CIDR {service} overlaps with VPC CIDR {}",
                network.cidr_block
            ),
            service.to_string(),
        ));
    }

    for secondary in &network.secondary_cidr_blocks {
        if overlaps(&service, secondary) {
            v.push(Violation::with_value(
                "cluster.service_cidr",
                format!("Service CIDR {service} overlaps with secondary VPC CIDR {secondary}"),
                service.to_string(),
            ));
        }
    }

    let access = &cluster.access;
    if access.endpoint_private_access && network.private_subnets.is_empty() {
        v.push(Violation::new(
            "cluster.access.endpoint_private_access",
            "Private endpoint access requires private subnets",
        ));
    }

    if access.is_public_only() && access.public_access_cidrs.is_empty() {
        v.push(Violation::new(
            "cluster.access.public_access_cidrs",
            "Public-only endpoint access without CIDR restrictions is insecure. Specify public_access_cidrs or enable private access.",
        ));
    }
}

fn check_consistency(v: &mut Vec<Violation>, config: &ConfigResolved) {
    let network = &config.network;
    let access = &config.cluster.access;

    if network.secondary_cidr_blocks.is_empty() {
        for (i, pod) in network.pod_subnets.iter().enumerate() {
            if !contains(&network.cidr_block, &pod.cidr_block) {
                v.push(Violation::with_value(
                    format!("network.pod_subnets[{i}]"),
                    format!(
                        "Pod subnet {} is outside VPC CIDR and no secondary CIDR is configured",
                        pod.cidr_block
                    ),
                    pod.cidr_block.to_string(),
                ));
            }
        }
    }

    if access.is_private_only() && network.nat_gateway_strategy == NatGatewayStrategy::None {
        let endpoints = &network.endpoints;
        let missing: Vec<&str> = [
            ("ecr_api", endpoints.ecr_api),
            ("ecr_dkr", endpoints.ecr_dkr),
            ("sts", endpoints.sts),
            ("logs", endpoints.logs),
        ]
        .into_iter()
        .filter(|(_, enabled)| !enabled)
        .map(|(name, _)| name)
        .collect();

        if !missing.is_empty() {
            v.push(Violation::new(
                "network.endpoints",
                format!(
                    "Private-only cluster without NAT gateway requires network endpoints for: {}. Enable these endpoints or add a NAT gateway.",
                    missing.join(", ")
                ),
            ));
        }
    }

    let known: BTreeSet<&str> = config
        .account
        .availability_zones
        .iter()
        .map(String::as_str)
        .collect();
    for tier in SubnetTier::ALL {
        let invalid: BTreeSet<&str> = network
            .tier(tier)
            .iter()
            .map(|s| s.availability_zone.as_str())
            .filter(|az| !known.contains(az))
            .collect();
        if !invalid.is_empty() {
            v.push(Violation::new(
                format!("network.{}", tier.field()),
                format!(
                    "{} subnets reference invalid availability zones: [{}]. Valid AZs: [{}]",
                    capitalise(tier.as_str()),
                    join(&invalid),
                    join(&known)
                ),
            ));
        }
    }
}

fn zones_without_public(network: &NetworkResolved) -> BTreeSet<&str> {
    let public: BTreeSet<&str> = network
        .public_subnets
        .iter()
        .map(|s| s.availability_zone.as_str())
        .collect();
    network
        .private_subnets
        .iter()
        .map(|s| s.availability_zone.as_str())
        .filter(|az| !public.contains(az))
        .collect()
}

fn join(zones: &BTreeSet<&str>) -> String {
    zones.iter().copied().collect::<Vec<_>>().join(", ")
}

fn capitalise(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
