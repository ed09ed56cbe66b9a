//! Completion events reported by the provisioning engine.

use serde::{Deserialize, Serialize};

use crate::engine::RunStatus;
use crate::types::{Operation, StackName};

/// Action taken when an update succeeded.
pub const ACTION_ADDONS_TRIGGERED: &str = "addons_triggered";
/// Action taken when an update failed.
pub const ACTION_FAILED_AND_DESTROY: &str = "marked_failed_and_destroy_triggered";
/// Action taken when a destroy succeeded.
pub const ACTION_DESTROYED: &str = "marked_destroyed";
/// Action taken when a destroy failed.
pub const ACTION_FAILED: &str = "marked_failed";

/// A completion event, pushed by webhook or synthesised from a poll.
///
/// Fields are kept as reported so that malformed events can be
/// acknowledged with a reason instead of rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineEvent {
    /// Stack identifier, bare or fully qualified.
    #[serde(default)]
    pub stack: String,
    /// Operation name.
    #[serde(default = "default_operation")]
    pub operation: String,
    /// Outcome, `succeeded` or `failed`.
    #[serde(default, alias = "outcome")]
    pub status: String,
    /// Error detail.
    #[serde(default)]
    pub message: Option<String>,
}

fn default_operation() -> String {
    Operation::Update.as_str().to_owned()
}

impl EngineEvent {
    /// Build an event from a polled run status.
    #[must_use]
    pub fn from_poll(stack: &StackName, operation: Operation, status: &RunStatus) -> Self {
        let message = match status {
            RunStatus::Failed(message) => Some(message.clone()),
            RunStatus::Running | RunStatus::Succeeded => None,
        };
        Self {
            stack: stack.to_string(),
            operation: operation.as_str().to_owned(),
            status: status.outcome().to_owned(),
            message,
        }
    }

    /// The error message, if one was reported and is not blank.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
    }
}

/// Result of handling an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventOutcome {
    /// Whether the event changed the deployment.
    pub processed: bool,
    /// What was done.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    /// Why nothing was done.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Stack the event was correlated to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl EventOutcome {
    /// The event was applied.
    #[must_use]
    pub fn applied(stack: &StackName, action: &str) -> Self {
        Self {
            processed: true,
            action: Some(action.to_owned()),
            reason: None,
            stack: Some(stack.to_string()),
        }
    }

    /// The event was acknowledged without effect.
    #[must_use]
    pub fn skipped(stack: Option<&StackName>, reason: impl Into<String>) -> Self {
        Self {
            processed: false,
            action: None,
            reason: Some(reason.into()),
            stack: stack.map(ToString::to_string),
        }
    }
}
