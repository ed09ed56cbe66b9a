//! Host control collaborator.
//!
//! Inspects and powers the access node of a provisioned cluster, and lists
//! the private service endpoints of its network.

mod relay;

pub use relay::RelayHosts;

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{ExecutorConfig, ExecutorKind};
use crate::error::{ControlError, ControlResult};

/// State of a host as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostDetails {
    /// Native state, e.g. `running` or `stopped`.
    pub state: String,
    /// Zone the host runs in.
    #[serde(default)]
    pub availability_zone: Option<String>,
    /// Private address.
    #[serde(default)]
    pub private_ip: Option<String>,
}

/// Trait for host control implementations.
#[async_trait]
pub trait HostController: Send + Sync {
    /// Describe a host. Returns `None` when the provider does not know it.
    async fn describe(&self, host_id: &str) -> ControlResult<Option<HostDetails>>;

    /// Service names of the private endpoints attached to a network.
    async fn endpoint_services(&self, network_id: &str) -> ControlResult<Vec<String>>;

    /// Start a stopped host.
    async fn start(&self, host_id: &str) -> ControlResult<()>;

    /// Stop a running host.
    async fn stop(&self, host_id: &str) -> ControlResult<()>;
}

/// Create a host controller from configuration.
///
/// Host control goes through the same relay as remote commands.
pub fn create_hosts(config: &ExecutorConfig) -> ControlResult<Arc<dyn HostController>> {
    match config.kind {
        ExecutorKind::Relay => Ok(Arc::new(RelayHosts::new(config)?)),
        ExecutorKind::Mock => Ok(Arc::new(MockHosts::new())),
    }
}

/// A power request captured by [`MockHosts`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PowerCall {
    /// `start(host_id)`.
    Start(String),
    /// `stop(host_id)`.
    Stop(String),
}

#[derive(Debug, Default)]
struct MockHostsState {
    hosts: HashMap<String, HostDetails>,
    endpoints: HashMap<String, HashSet<String>>,
    power: Vec<PowerCall>,
    error: Option<String>,
}

/// In-memory host controller for testing.
///
/// Unknown hosts describe as `None`. Power calls flip a known host to
/// `pending` or `stopping`.
#[derive(Debug, Default)]
pub struct MockHosts {
    state: Mutex<MockHostsState>,
}

impl MockHosts {
    /// Create a new mock controller.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut MockHostsState) -> T) -> ControlResult<T> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| ControlError::internal("lock poisoned"))?;
        Ok(f(&mut state))
    }

    /// Register a host in the given state.
    pub fn set_host(&self, host_id: &str, state: &str) {
        let details = HostDetails {
            state: state.to_owned(),
            availability_zone: Some("us-east-1a".to_owned()),
            private_ip: Some("10.0.0.10".to_owned()),
        };
        let _ = self.with_state(|s| s.hosts.insert(host_id.to_owned(), details));
    }

    /// Attach endpoint services to a network.
    pub fn set_endpoints(&self, network_id: &str, services: &[&str]) {
        let services = services.iter().map(|s| (*s).to_owned()).collect();
        let _ = self.with_state(|s| s.endpoints.insert(network_id.to_owned(), services));
    }

    /// Make every subsequent call fail with `message`, or succeed with `None`.
    pub fn fail_calls(&self, message: Option<&str>) {
        let message = message.map(str::to_owned);
        let _ = self.with_state(|s| s.error = message);
    }

    /// Every power call so far, in order.
    #[must_use]
    pub fn power_calls(&self) -> Vec<PowerCall> {
        self.with_state(|s| s.power.clone()).unwrap_or_default()
    }

    fn power(&self, call: PowerCall, next_state: &str) -> ControlResult<()> {
        self.with_state(|s| {
            if let Some(ref message) = s.error {
                return Err(ControlError::executor(message.clone()));
            }
            let (PowerCall::Start(host_id) | PowerCall::Stop(host_id)) = &call;
            if let Some(host) = s.hosts.get_mut(host_id) {
                next_state.clone_into(&mut host.state);
            }
            s.power.push(call);
            Ok(())
        })?
    }
}

#[async_trait]
impl HostController for MockHosts {
    async fn describe(&self, host_id: &str) -> ControlResult<Option<HostDetails>> {
        self.with_state(|s| match s.error {
            Some(ref message) => Err(ControlError::executor(message.clone())),
            None => Ok(s.hosts.get(host_id).cloned()),
        })?
    }

    async fn endpoint_services(&self, network_id: &str) -> ControlResult<Vec<String>> {
        self.with_state(|s| match s.error {
            Some(ref message) => Err(ControlError::executor(message.clone())),
            None => {
                let mut services: Vec<String> = s
                    .endpoints
                    .get(network_id)
                    .map(|set| set.iter().cloned().collect())
                    .unwrap_or_default();
                services.sort();
                Ok(services)
            }
        })?
    }

    async fn start(&self, host_id: &str) -> ControlResult<()> {
        self.power(PowerCall::Start(host_id.to_owned()), "pending")
    }

    async fn stop(&self, host_id: &str) -> ControlResult<()> {
        self.power(PowerCall::Stop(host_id.to_owned()), "stopping")
    }
}
