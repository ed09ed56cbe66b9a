//! Error types for byoc-config.

use std::fmt;

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};

/// Result type alias using [`ConfigError`].
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors produced while resolving or validating a tenant configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A CIDR-shaped field could not be parsed.
    #[error("invalid CIDR for {field}: {value}")]
    InvalidCidr {
        /// Path of the offending field.
        field: String,
        /// The raw value supplied.
        value: String,
    },

    /// Block arithmetic ran past the end of the IPv4 address space.
    #[error("address space exhausted allocating block {block} at /{prefix} from {base}")]
    AddressExhausted {
        /// Range the allocation started from.
        base: Ipv4Net,
        /// Requested subnet prefix length.
        prefix: u8,
        /// Block index that overflowed.
        block: u32,
    },

    /// The configuration failed validation.
    #[error("configuration validation failed with {count} error(s): {violations}", count = .0.len(), violations = .0)]
    Validation(Violations),
}

impl ConfigError {
    /// Collapse this error into the violation list reported to callers.
    #[must_use]
    pub fn into_violations(self) -> Violations {
        match self {
            Self::Validation(violations) => violations,
            Self::InvalidCidr { field, value } => Violations::from(vec![Violation::with_value(
                field,
                "Invalid CIDR",
                value,
            )]),
            Self::AddressExhausted { base, .. } => Violations::from(vec![Violation::with_value(
                "network.cidr_block",
                "Subnet allocation ran past the end of the IPv4 address space",
                base.to_string(),
            )]),
        }
    }
}

/// A single validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// Dotted path to the field at fault, e.g. `network.private_subnets[1]`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
    /// The offending value, when there is a single one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl Violation {
    /// Create a violation without an offending value.
    #[must_use]
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            value: None,
        }
    }

    /// Create a violation carrying the offending value.
    #[must_use]
    pub fn with_value(
        field: impl Into<String>,
        message: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            value: Some(value.into()),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// An ordered collection of violations, reported together.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Violations(Vec<Violation>);

impl Violations {
    /// Number of violations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no violations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the violations in reporting order.
    pub fn iter(&self) -> std::slice::Iter<'_, Violation> {
        self.0.iter()
    }

    /// Consume into the underlying list.
    #[must_use]
    pub fn into_inner(self) -> Vec<Violation> {
        self.0
    }

    /// Turn a non-empty list into an error.
    pub fn into_result(self) -> ConfigResult<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(self))
        }
    }
}

impl From<Vec<Violation>> for Violations {
    fn from(violations: Vec<Violation>) -> Self {
        Self(violations)
    }
}

impl<'a> IntoIterator for &'a Violations {
    type Item = &'a Violation;
    type IntoIter = std::slice::Iter<'a, Violation>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for Violations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, violation) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{violation}")?;
        }
        Ok(())
    }
}
