//! Core types for byoc-control.

use std::fmt;

use byoc_config::ConfigResolved;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    /// Create a new tenant ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for TenantId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Stable stack identifier, `{tenant}-{environment}`.
///
/// Used to correlate asynchronous engine events back to a deployment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StackName(String);

impl StackName {
    /// Build the stack name for a tenant environment.
    #[must_use]
    pub fn new(tenant: &TenantId, environment: &str) -> Self {
        Self(format!("{}-{environment}", tenant.as_str()))
    }

    /// Wrap a stack name that is already in canonical form.
    #[must_use]
    pub fn from_raw(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Parse a stack identifier as reported by the engine.
    ///
    /// Accepts the bare form (`acme-prod`) and the fully-qualified form
    /// (`org/project/acme-prod`). Returns `None` for anything else.
    #[must_use]
    pub fn parse_reported(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let parts: Vec<&str> = raw.split('/').collect();
        let name = match parts.as_slice() {
            [name] | [_, _, name] => *name,
            _ => return None,
        };
        if name.is_empty() || parts.iter().any(|p| p.is_empty()) {
            return None;
        }
        Some(Self(name.to_owned()))
    }

    /// Get the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StackName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for StackName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Lifecycle status of a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeploymentStatus {
    /// Record created or reset; provisioning not yet dispatched.
    Pending,
    /// Provisioning dispatched to the engine.
    InProgress,
    /// Provisioning completed.
    Succeeded,
    /// Provisioning or teardown failed.
    Failed,
    /// Teardown dispatched to the engine.
    Destroying,
    /// Teardown completed.
    Destroyed,
}

impl DeploymentStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [Self; 6] = [
        Self::Pending,
        Self::InProgress,
        Self::Succeeded,
        Self::Failed,
        Self::Destroying,
        Self::Destroyed,
    ];

    /// Get the status name as a static string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::InProgress => "IN_PROGRESS",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::Destroying => "DESTROYING",
            Self::Destroyed => "DESTROYED",
        }
    }

    /// Whether an engine operation is outstanding.
    #[must_use]
    pub const fn is_busy(&self) -> bool {
        matches!(self, Self::InProgress | Self::Destroying)
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DeploymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "IN_PROGRESS" => Ok(Self::InProgress),
            "SUCCEEDED" => Ok(Self::Succeeded),
            "FAILED" => Ok(Self::Failed),
            "DESTROYING" => Ok(Self::Destroying),
            "DESTROYED" => Ok(Self::Destroyed),
            _ => Err(format!("unknown deployment status: {s}")),
        }
    }
}

/// Operation the provisioning engine runs against a stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Create or update resources.
    Update,
    /// Tear down resources.
    Destroy,
    /// Dry run; never changes deployment state.
    Preview,
}

impl Operation {
    /// Get the operation name as a static string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Update => "update",
            Self::Destroy => "destroy",
            Self::Preview => "preview",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "update" => Ok(Self::Update),
            "destroy" => Ok(Self::Destroy),
            "preview" => Ok(Self::Preview),
            _ => Err(format!("unknown operation: {s}")),
        }
    }
}

/// A deployment record as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Environment name.
    pub environment: String,
    /// Stack identifier; unique per record.
    pub stack_name: StackName,
    /// Deployment region.
    pub region: String,
    /// Role assumed in the tenant account.
    pub role_arn: String,
    /// Current status.
    pub status: DeploymentStatus,
    /// Identifier of the latest engine run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    /// Stack outputs captured after a successful update.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outputs: Option<serde_json::Value>,
    /// Latest error message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// When the record last changed.
    pub updated_at: DateTime<Utc>,
}

impl DeploymentRecord {
    /// Create a pending record for a resolved configuration.
    #[must_use]
    pub fn new(config: &ConfigResolved, environment: &str) -> Self {
        let tenant_id = TenantId::new(&config.tenant_id);
        let now = Utc::now();
        Self {
            stack_name: StackName::new(&tenant_id, environment),
            tenant_id,
            environment: environment.to_owned(),
            region: config.account.region.clone(),
            role_arn: config.account.role_arn.clone(),
            status: DeploymentStatus::Pending,
            run_id: None,
            outputs: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Read a string output by key.
    #[must_use]
    pub fn output(&self, key: &str) -> Option<&str> {
        self.outputs.as_ref()?.get(key)?.as_str()
    }

    /// Whether this record was created for the given tenant environment.
    ///
    /// Stack names join tenant and environment with a hyphen, so `acme` +
    /// `a-b` and `acme-a` + `b` share one name.
    #[must_use]
    pub fn is_owned_by(&self, tenant: &TenantId, environment: &str) -> bool {
        self.tenant_id == *tenant && self.environment == environment
    }
}

/// How an optional field changes during a status update.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Patch<T> {
    /// Leave the current value.
    #[default]
    Keep,
    /// Replace with a new value.
    Set(T),
    /// Remove the current value.
    Clear,
}

impl<T> Patch<T> {
    /// Apply this patch to a slot.
    pub fn apply(self, slot: &mut Option<T>) {
        match self {
            Self::Keep => {}
            Self::Set(value) => *slot = Some(value),
            Self::Clear => *slot = None,
        }
    }

    /// Whether the slot is touched, and the value it is set to.
    #[must_use]
    pub fn as_sql(&self) -> (bool, Option<&T>) {
        match self {
            Self::Keep => (false, None),
            Self::Set(value) => (true, Some(value)),
            Self::Clear => (true, None),
        }
    }
}

/// A status transition plus any field changes that go with it.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    /// New status.
    pub status: DeploymentStatus,
    /// Engine run identifier.
    pub run_id: Patch<String>,
    /// Stack outputs.
    pub outputs: Patch<serde_json::Value>,
    /// Error message.
    pub error: Patch<String>,
}

impl StatusUpdate {
    /// Move to `status` without touching other fields.
    #[must_use]
    pub const fn to(status: DeploymentStatus) -> Self {
        Self {
            status,
            run_id: Patch::Keep,
            outputs: Patch::Keep,
            error: Patch::Keep,
        }
    }

    /// Set the engine run identifier.
    #[must_use]
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Patch::Set(run_id.into());
        self
    }

    /// Clear the engine run identifier.
    #[must_use]
    pub fn clear_run_id(mut self) -> Self {
        self.run_id = Patch::Clear;
        self
    }

    /// Set the stack outputs.
    #[must_use]
    pub fn with_outputs(mut self, outputs: serde_json::Value) -> Self {
        self.outputs = Patch::Set(outputs);
        self
    }

    /// Remove stored outputs.
    #[must_use]
    pub fn clear_outputs(mut self) -> Self {
        self.outputs = Patch::Clear;
        self
    }

    /// Set the error message.
    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Patch::Set(error.into());
        self
    }

    /// Clear the error message.
    #[must_use]
    pub fn clear_error(mut self) -> Self {
        self.error = Patch::Clear;
        self
    }

    /// Apply to a record, bumping `updated_at`.
    pub fn apply(self, record: &mut DeploymentRecord) {
        record.status = self.status;
        self.run_id.apply(&mut record.run_id);
        self.outputs.apply(&mut record.outputs);
        self.error.apply(&mut record.error);
        record.updated_at = Utc::now();
    }
}

/// Result of a conditional status write.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// The record was in an expected status and has been updated.
    Applied(DeploymentRecord),
    /// The record was in some other status and is unchanged.
    Rejected(DeploymentStatus),
}

/// Last dispatched install for one addon on one stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddonInstallRecord {
    /// Addon name.
    pub addon_name: String,
    /// Identifier of the dispatched command, if dispatch got that far.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_id: Option<String>,
    /// Host the command was sent to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_id: Option<String>,
    /// When the install was triggered.
    pub dispatched_at: DateTime<Utc>,
    /// Why the install could not be dispatched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Normalised addon install status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AddonInstallStatus {
    /// Dispatched but not yet visible on the host.
    Pending,
    /// Running on the host.
    InProgress,
    /// Completed successfully.
    Succeeded,
    /// Failed, timed out or was cancelled.
    Failed,
}

impl AddonInstallStatus {
    /// Map a native executor status.
    ///
    /// Anything outside the known pending and success vocabulary is a failure.
    #[must_use]
    pub fn from_native(status: &str) -> Self {
        match status {
            "Pending" | "InProgress" | "Delayed" => Self::InProgress,
            "Success" => Self::Succeeded,
            _ => Self::Failed,
        }
    }

    /// Get the status name as a static string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::InProgress => "IN_PROGRESS",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for AddonInstallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of an install trigger or status query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddonInstallResult {
    /// Addon name.
    pub addon_name: String,
    /// Normalised status.
    pub status: AddonInstallStatus,
    /// Dispatched command identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_id: Option<String>,
    /// Target host.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_id: Option<String>,
    /// When the install was dispatched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// Command output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// Command error output or dispatch failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stack_name_format() {
        let stack = StackName::new(&TenantId::new("acme"), "prod");
        assert_eq!(stack.as_str(), "acme-prod");
    }

    #[test]
    fn reported_stack_forms() {
        assert_eq!(
            StackName::parse_reported("acme-prod").map(|s| s.to_string()),
            Some("acme-prod".to_owned())
        );
        assert_eq!(
            StackName::parse_reported("org/byoc/acme-prod").map(|s| s.to_string()),
            Some("acme-prod".to_owned())
        );
        assert!(StackName::parse_reported("").is_none());
        assert!(StackName::parse_reported("org/acme-prod").is_none());
        assert!(StackName::parse_reported("org//acme-prod").is_none());
        assert!(StackName::parse_reported("a/b/c/d").is_none());
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in DeploymentStatus::ALL {
            assert_eq!(status.as_str().parse::<DeploymentStatus>(), Ok(status));
        }
        assert!("RUNNING".parse::<DeploymentStatus>().is_err());
        assert_eq!(
            serde_json::to_string(&DeploymentStatus::InProgress).expect("serialise"),
            "\"IN_PROGRESS\""
        );
    }

    #[test]
    fn native_addon_statuses() {
        assert_eq!(AddonInstallStatus::from_native("Pending"), AddonInstallStatus::InProgress);
        assert_eq!(AddonInstallStatus::from_native("Delayed"), AddonInstallStatus::InProgress);
        assert_eq!(AddonInstallStatus::from_native("Success"), AddonInstallStatus::Succeeded);
        assert_eq!(AddonInstallStatus::from_native("TimedOut"), AddonInstallStatus::Failed);
        assert_eq!(AddonInstallStatus::from_native("Cancelling"), AddonInstallStatus::Failed);
    }

    #[test]
    fn status_update_patches_fields() {
        let config = byoc_config::resolve(&byoc_config::ConfigInput::new(
            "acme",
            "arn:aws:iam::123456789012:role/byoc",
            "external-1234",
        ))
        .expect("resolve");
        let mut record = DeploymentRecord::new(&config, "prod");
        record.error = Some("old".to_owned());
        let before = record.updated_at;

        StatusUpdate::to(DeploymentStatus::InProgress)
            .with_run_id("run-1")
            .clear_error()
            .apply(&mut record);

        assert_eq!(record.status, DeploymentStatus::InProgress);
        assert_eq!(record.run_id.as_deref(), Some("run-1"));
        assert!(record.error.is_none());
        assert!(record.outputs.is_none());
        assert!(record.updated_at >= before);
    }
}
