//! Error types for byoc-control.

use byoc_config::{ConfigError, Violations};

/// Result type alias using [`ControlError`].
pub type ControlResult<T> = Result<T, ControlError>;

/// Errors that can occur in the control plane.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    /// Configuration failed validation.
    #[error("validation failed: {0}")]
    Validation(Violations),

    /// Tenant, configuration or deployment not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Illegal state transition or duplicate resource.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A destructive operation was attempted without confirmation.
    #[error("confirmation required: {0}")]
    ConfirmationRequired(String),

    /// The target is not in a state that allows the operation.
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// Provisioning engine error.
    #[error("engine error: {0}")]
    Engine(String),

    /// Remote executor error.
    #[error("executor error: {0}")]
    Executor(String),

    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// HTTP client error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Serialisation error.
    #[error("serialisation error: {0}")]
    Serialisation(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ControlError {
    /// Create a not-found error.
    #[must_use]
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a conflict error.
    #[must_use]
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Create a precondition error.
    #[must_use]
    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::Precondition(msg.into())
    }

    /// Create an engine error.
    #[must_use]
    pub fn engine(msg: impl Into<String>) -> Self {
        Self::Engine(msg.into())
    }

    /// Create an executor error.
    #[must_use]
    pub fn executor(msg: impl Into<String>) -> Self {
        Self::Executor(msg.into())
    }

    /// Create an internal error.
    #[must_use]
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl From<ConfigError> for ControlError {
    fn from(error: ConfigError) -> Self {
        Self::Validation(error.into_violations())
    }
}

impl From<serde_json::Error> for ControlError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialisation(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byoc_config::Violation;

    #[test]
    fn config_errors_become_validation() {
        let err = ConfigError::Validation(Violations::from(vec![Violation::new(
            "tenant_id",
            "Tenant ID is required",
        )]));

        match ControlError::from(err) {
            ControlError::Validation(violations) => assert_eq!(violations.len(), 1),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn display_includes_context() {
        let err = ControlError::conflict("stack acme-prod is IN_PROGRESS");
        assert_eq!(err.to_string(), "conflict: stack acme-prod is IN_PROGRESS");
    }
}
