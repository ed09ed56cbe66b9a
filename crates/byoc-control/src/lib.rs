//! BYOC control plane.
//!
//! This crate drives tenant deployments from a resolved configuration to a
//! running cluster with its addons installed. It sits between the HTTP API,
//! a provisioning engine and a remote command executor.
//!
//! # Architecture
//!
//! The control plane is responsible for:
//!
//! - **Configuration storage**: Resolving and validating tenant input with
//!   [`byoc_config`] and persisting the resolved form
//! - **Deployment orchestration**: Dispatching engine runs and ingesting
//!   completion events, pushed or polled, exactly once
//! - **Addon installation**: Dispatching idempotent install scripts to the
//!   cluster's access node after a settling delay
//! - **Operator access**: Reporting access node readiness, session commands
//!   and powering the node on and off
//! - **API surface**: HTTP endpoints for all of the above
//!
//! # State Machine
//!
//! Deployment status is persisted and every change is a conditional write
//! against the statuses it may start from (see [`state`]):
//!
//! ```text
//! PENDING ──▶ IN_PROGRESS ──▶ SUCCEEDED ──▶ DESTROYING ──▶ DESTROYED
//!                 │                             ▲   │
//!                 ▼                             │   ▼
//!               FAILED ─────(auto-destroy)──────┘ FAILED
//! ```
//!
//! Duplicate or late engine events find the record outside the statuses
//! they may start from and are acknowledged without effect.

#![forbid(unsafe_code)]

pub mod access;
pub mod addons;
pub mod api;
pub mod config;
pub mod deployment;
pub mod engine;
pub mod error;
pub mod executor;
pub mod hosts;
pub mod service;
pub mod state;
pub mod store;
pub mod tasks;
pub mod types;

// Re-export commonly used types at the crate root
pub use access::AccessNodes;
pub use addons::AddonInstaller;
pub use config::ControlConfig;
pub use deployment::{DeploymentOrchestrator, EngineEvent, EventOutcome};
pub use engine::{MockEngine, ProvisioningEngine, RunStatus};
pub use error::{ControlError, ControlResult};
pub use executor::{MockExecutor, RemoteExecutor};
pub use hosts::{HostController, MockHosts};
pub use service::{Components, ControlService, Stores};
pub use store::{
    AddonStore, ConfigStore, DeploymentFilter, DeploymentStore, MemoryStore, PostgresStore,
};
pub use tasks::TaskSupervisor;
pub use types::{
    AddonInstallRecord, AddonInstallResult, AddonInstallStatus, DeploymentRecord,
    DeploymentStatus, Operation, StackName, TenantId,
};
