//! Provisioning engine collaborator.
//!
//! The engine turns a resolved configuration into cloud resources. It is
//! driven asynchronously: `trigger` returns a run identifier immediately and
//! completion is reported later, either pushed through the webhook endpoint
//! or pulled with `run_status`.

mod pulumi;

pub use pulumi::PulumiEngine;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use byoc_config::ConfigResolved;

use crate::config::{EngineConfig, EngineKind};
use crate::error::{ControlError, ControlResult};
use crate::types::{Operation, StackName};

/// State of an engine run as reported by polling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    /// Queued or running.
    Running,
    /// Completed successfully.
    Succeeded,
    /// Completed with an error.
    Failed(String),
}

impl RunStatus {
    /// Map an engine status string.
    ///
    /// Only `succeeded` and `failed` are terminal; everything else is still
    /// running as far as the control plane is concerned.
    #[must_use]
    pub fn parse(status: &str, message: Option<String>) -> Self {
        match status {
            "succeeded" => Self::Succeeded,
            "failed" => Self::Failed(message.unwrap_or_else(|| "Operation failed".to_owned())),
            _ => Self::Running,
        }
    }

    /// Outcome string in the form used by completion events.
    #[must_use]
    pub const fn outcome(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed(_) => "failed",
        }
    }
}

/// Trait for provisioning engine implementations.
#[async_trait]
pub trait ProvisioningEngine: Send + Sync {
    /// Create the stack if it does not exist. Must be idempotent.
    async fn ensure_stack(&self, stack: &StackName) -> ControlResult<()>;

    /// Push the resolved configuration to the stack.
    async fn configure(&self, stack: &StackName, config: &ConfigResolved) -> ControlResult<()>;

    /// Start an operation and return its run identifier.
    async fn trigger(&self, stack: &StackName, operation: Operation) -> ControlResult<String>;

    /// Poll a run started by [`trigger`](Self::trigger).
    async fn run_status(&self, stack: &StackName, run_id: &str) -> ControlResult<RunStatus>;

    /// Fetch the stack outputs as a JSON object.
    async fn outputs(&self, stack: &StackName) -> ControlResult<serde_json::Value>;
}

/// Create an engine from configuration.
pub fn create_engine(config: &EngineConfig) -> ControlResult<Arc<dyn ProvisioningEngine>> {
    match config.kind {
        EngineKind::Pulumi => Ok(Arc::new(PulumiEngine::new(config)?)),
        EngineKind::Mock => Ok(Arc::new(MockEngine::new())),
    }
}

/// A call recorded by [`MockEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    /// `ensure_stack`.
    EnsureStack(StackName),
    /// `configure`.
    Configure(StackName),
    /// `trigger`.
    Trigger(StackName, Operation),
    /// `run_status`.
    RunStatus(StackName, String),
    /// `outputs`.
    Outputs(StackName),
}

#[derive(Debug, Default)]
struct MockEngineState {
    calls: Vec<EngineCall>,
    runs: u64,
    trigger_error: Option<String>,
    outputs_error: Option<String>,
    outputs: Option<serde_json::Value>,
    run_statuses: HashMap<String, RunStatus>,
}

/// Scriptable engine for testing.
///
/// Run identifiers are `run-1`, `run-2`, ... in trigger order. Runs report
/// [`RunStatus::Running`] until scripted otherwise.
#[derive(Debug, Default)]
pub struct MockEngine {
    state: Mutex<MockEngineState>,
}

impl MockEngine {
    /// Create a new mock engine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut MockEngineState) -> T) -> ControlResult<T> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| ControlError::internal("lock poisoned"))?;
        Ok(f(&mut state))
    }

    /// Every call made so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<EngineCall> {
        self.with_state(|s| s.calls.clone()).unwrap_or_default()
    }

    /// Number of triggers for an operation.
    #[must_use]
    pub fn triggered(&self, operation: Operation) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, EngineCall::Trigger(_, op) if *op == operation))
            .count()
    }

    /// Make every subsequent trigger fail with `message`, or succeed with `None`.
    pub fn fail_triggers(&self, message: Option<&str>) {
        let message = message.map(str::to_owned);
        let _ = self.with_state(|s| s.trigger_error = message);
    }

    /// Make output fetches fail with `message`, or succeed with `None`.
    pub fn fail_outputs(&self, message: Option<&str>) {
        let message = message.map(str::to_owned);
        let _ = self.with_state(|s| s.outputs_error = message);
    }

    /// Set the outputs returned for every stack.
    pub fn set_outputs(&self, outputs: serde_json::Value) {
        let _ = self.with_state(|s| s.outputs = Some(outputs));
    }

    /// Script the polled status of a run.
    pub fn set_run_status(&self, run_id: &str, status: RunStatus) {
        let _ = self.with_state(|s| s.run_statuses.insert(run_id.to_owned(), status));
    }
}

#[async_trait]
impl ProvisioningEngine for MockEngine {
    async fn ensure_stack(&self, stack: &StackName) -> ControlResult<()> {
        self.with_state(|s| s.calls.push(EngineCall::EnsureStack(stack.clone())))
    }

    async fn configure(&self, stack: &StackName, _config: &ConfigResolved) -> ControlResult<()> {
        self.with_state(|s| s.calls.push(EngineCall::Configure(stack.clone())))
    }

    async fn trigger(&self, stack: &StackName, operation: Operation) -> ControlResult<String> {
        self.with_state(|s| {
            s.calls.push(EngineCall::Trigger(stack.clone(), operation));
            if let Some(ref message) = s.trigger_error {
                return Err(ControlError::engine(message.clone()));
            }
            s.runs += 1;
            Ok(format!("run-{}", s.runs))
        })?
    }

    async fn run_status(&self, stack: &StackName, run_id: &str) -> ControlResult<RunStatus> {
        self.with_state(|s| {
            s.calls
                .push(EngineCall::RunStatus(stack.clone(), run_id.to_owned()));
            s.run_statuses
                .get(run_id)
                .cloned()
                .unwrap_or(RunStatus::Running)
        })
    }

    async fn outputs(&self, stack: &StackName) -> ControlResult<serde_json::Value> {
        self.with_state(|s| {
            s.calls.push(EngineCall::Outputs(stack.clone()));
            if let Some(ref message) = s.outputs_error {
                return Err(ControlError::engine(message.clone()));
            }
            Ok(s
                .outputs
                .clone()
                .unwrap_or_else(|| serde_json::json!({})))
        })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_status_mapping() {
        assert_eq!(RunStatus::parse("succeeded", None), RunStatus::Succeeded);
        assert_eq!(
            RunStatus::parse("failed", Some("quota exceeded".to_owned())),
            RunStatus::Failed("quota exceeded".to_owned())
        );
        assert_eq!(
            RunStatus::parse("failed", None),
            RunStatus::Failed("Operation failed".to_owned())
        );
        assert_eq!(RunStatus::parse("running", None), RunStatus::Running);
        assert_eq!(RunStatus::parse("not-started", None), RunStatus::Running);
    }

    #[tokio::test]
    async fn mock_engine_numbers_runs() {
        let engine = MockEngine::new();
        let stack = StackName::from_raw("acme-prod");

        let first = engine
            .trigger(&stack, Operation::Update)
            .await
            .expect("trigger failed");
        let second = engine
            .trigger(&stack, Operation::Destroy)
            .await
            .expect("trigger failed");

        assert_eq!(first, "run-1");
        assert_eq!(second, "run-2");
        assert_eq!(engine.triggered(Operation::Update), 1);
        assert_eq!(engine.triggered(Operation::Destroy), 1);
    }

    #[tokio::test]
    async fn mock_engine_scripted_failures() {
        let engine = MockEngine::new();
        let stack = StackName::from_raw("acme-prod");

        engine.fail_triggers(Some("quota exceeded"));
        let err = engine
            .trigger(&stack, Operation::Update)
            .await
            .expect_err("trigger should fail");
        assert!(err.to_string().contains("quota exceeded"));

        engine.fail_triggers(None);
        assert!(engine.trigger(&stack, Operation::Update).await.is_ok());

        engine.set_run_status("run-1", RunStatus::Succeeded);
        assert_eq!(
            engine
                .run_status(&stack, "run-1")
                .await
                .expect("status failed"),
            RunStatus::Succeeded
        );
        assert_eq!(
            engine
                .run_status(&stack, "run-9")
                .await
                .expect("status failed"),
            RunStatus::Running
        );
    }

    #[test]
    fn create_mock_engine() {
        let config = EngineConfig {
            kind: EngineKind::Mock,
            ..EngineConfig::default()
        };
        assert!(create_engine(&config).is_ok());
    }
}
