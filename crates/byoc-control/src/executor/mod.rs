//! Remote command execution collaborator.
//!
//! Commands run on a provisioned host. Dispatch is fire-and-forget: `submit`
//! returns a command identifier immediately and `query` reports progress in
//! the executor's native status vocabulary.

mod relay;

pub use relay::RelayExecutor;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{ExecutorConfig, ExecutorKind};
use crate::error::{ControlError, ControlResult};

/// A self-contained shell script to run on a host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandPayload {
    /// Script body.
    pub script: String,
    /// Execution timeout in seconds.
    pub timeout_secs: u64,
    /// Free-form description shown by the executor.
    pub comment: String,
}

/// Progress of a dispatched command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandInvocation {
    /// Native status, e.g. `InProgress` or `Success`.
    pub status: String,
    /// Standard output.
    #[serde(default)]
    pub output: Option<String>,
    /// Standard error.
    #[serde(default)]
    pub error: Option<String>,
}

/// Trait for remote executor implementations.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Dispatch a payload to a host and return the command identifier.
    async fn submit(&self, host_id: &str, payload: &CommandPayload) -> ControlResult<String>;

    /// Look up a command on a host.
    ///
    /// Returns `None` when the executor does not (yet) know the invocation.
    async fn query(&self, command_id: &str, host_id: &str)
        -> ControlResult<Option<CommandInvocation>>;

    /// Store a parameter the host can read at run time.
    async fn put_parameter(&self, name: &str, value: &str, secure: bool) -> ControlResult<()>;
}

/// Create an executor from configuration.
pub fn create_executor(config: &ExecutorConfig) -> ControlResult<Arc<dyn RemoteExecutor>> {
    match config.kind {
        ExecutorKind::Relay => Ok(Arc::new(RelayExecutor::new(config)?)),
        ExecutorKind::Mock => Ok(Arc::new(MockExecutor::new())),
    }
}

/// A command captured by [`MockExecutor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    /// Assigned command identifier.
    pub command_id: String,
    /// Target host.
    pub host_id: String,
    /// Dispatched payload.
    pub payload: CommandPayload,
}

#[derive(Debug, Default)]
struct MockExecutorState {
    submissions: Vec<Submission>,
    invocations: HashMap<String, CommandInvocation>,
    parameters: HashMap<String, (String, bool)>,
    submit_error: Option<String>,
}

/// In-memory executor for testing.
///
/// Command identifiers are `cmd-1`, `cmd-2`, ... Submitted commands stay
/// invisible to `query` until an invocation is scripted for them.
#[derive(Debug, Default)]
pub struct MockExecutor {
    state: Mutex<MockExecutorState>,
}

impl MockExecutor {
    /// Create a new mock executor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut MockExecutorState) -> T) -> ControlResult<T> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| ControlError::internal("lock poisoned"))?;
        Ok(f(&mut state))
    }

    /// Every submission so far, in order.
    #[must_use]
    pub fn submissions(&self) -> Vec<Submission> {
        self.with_state(|s| s.submissions.clone())
            .unwrap_or_default()
    }

    /// A stored parameter and whether it was marked secure.
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<(String, bool)> {
        self.with_state(|s| s.parameters.get(name).cloned())
            .ok()
            .flatten()
    }

    /// Script the invocation returned for a command.
    pub fn set_invocation(&self, command_id: &str, invocation: CommandInvocation) {
        let _ = self.with_state(|s| s.invocations.insert(command_id.to_owned(), invocation));
    }

    /// Make every subsequent submit fail with `message`, or succeed with `None`.
    pub fn fail_submits(&self, message: Option<&str>) {
        let message = message.map(str::to_owned);
        let _ = self.with_state(|s| s.submit_error = message);
    }
}

#[async_trait]
impl RemoteExecutor for MockExecutor {
    async fn submit(&self, host_id: &str, payload: &CommandPayload) -> ControlResult<String> {
        self.with_state(|s| {
            if let Some(ref message) = s.submit_error {
                return Err(ControlError::executor(message.clone()));
            }
            let command_id = format!("cmd-{}", s.submissions.len() + 1);
            s.submissions.push(Submission {
                command_id: command_id.clone(),
                host_id: host_id.to_owned(),
                payload: payload.clone(),
            });
            Ok(command_id)
        })?
    }

    async fn query(
        &self,
        command_id: &str,
        _host_id: &str,
    ) -> ControlResult<Option<CommandInvocation>> {
        self.with_state(|s| s.invocations.get(command_id).cloned())
    }

    async fn put_parameter(&self, name: &str, value: &str, secure: bool) -> ControlResult<()> {
        self.with_state(|s| {
            s.parameters
                .insert(name.to_owned(), (value.to_owned(), secure));
        })
    }
}
