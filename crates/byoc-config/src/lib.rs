//! Tenant configuration for BYOC deployments.
//!
//! A tenant submits a sparse [`ConfigInput`]. This crate turns it into a
//! fully explicit [`ConfigResolved`] and checks it:
//!
//! ```text
//! ConfigInput ──▶ validate_input ──▶ resolve ──▶ validate_resolved ──▶ ConfigResolved
//!                      │                                 │
//!                      ▼                                 ▼
//!               Violations (abort)             Violations (all rules)
//! ```
//!
//! Resolution is deterministic: the same input always yields the same subnet
//! layout, names and tags. Only the timestamps depend on the clock.
//!
//! # Example
//!
//! ```
//! use byoc_config::{resolve_validated, ConfigInput};
//!
//! let input = ConfigInput::new(
//!     "acme",
//!     "arn:aws:iam::123456789012:role/byoc",
//!     "external-1234",
//! );
//! let resolved = resolve_validated(&input).expect("valid configuration");
//! assert_eq!(resolved.network.private_subnets.len(), 3);
//! ```

#![forbid(unsafe_code)]

pub mod cidr;
pub mod error;
pub mod model;
pub mod resolver;
pub mod validation;

pub use error::{ConfigError, ConfigResult, Violation, Violations};
pub use model::{
    ConfigInput, ConfigResolved, NatGatewayStrategy, NetworkResolved, Subnet, SubnetTier,
};
pub use resolver::{resolve, resolve_at, update_resolved};
pub use validation::{validate_identifier, validate_input, validate_resolved};

/// Validate, resolve and validate again.
///
/// Input problems abort before resolution. Problems found on the resolved
/// form are all reported together.
pub fn resolve_validated(input: &ConfigInput) -> ConfigResult<ConfigResolved> {
    validate_input(input).into_result()?;
    let resolved = resolve(input)?;
    validate_resolved(&resolved).into_result()?;
    Ok(resolved)
}

/// Like [`resolve_validated`] but preserves the creation time of `existing`.
pub fn update_validated(
    existing: &ConfigResolved,
    input: &ConfigInput,
) -> ConfigResult<ConfigResolved> {
    validate_input(input).into_result()?;
    let resolved = update_resolved(existing, input)?;
    validate_resolved(&resolved).into_result()?;
    Ok(resolved)
}

/// Run both phases and return whatever was found, without keeping the result.
#[must_use]
pub fn check(input: &ConfigInput) -> Violations {
    let violations = validate_input(input);
    if !violations.is_empty() {
        return violations;
    }
    match resolve(input) {
        Ok(resolved) => validate_resolved(&resolved),
        Err(e) => e.into_violations(),
    }
}
