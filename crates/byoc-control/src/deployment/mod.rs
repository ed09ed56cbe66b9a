//! Deployment orchestration and lifecycle management.
//!
//! This module owns the deployment state machine: it accepts deploy and
//! destroy requests, dispatches engine runs, and ingests completion events
//! that may arrive late, twice or out of order.

mod events;
mod manager;

pub use events::{
    EngineEvent, EventOutcome, ACTION_ADDONS_TRIGGERED, ACTION_DESTROYED, ACTION_FAILED,
    ACTION_FAILED_AND_DESTROY,
};
pub use manager::DeploymentOrchestrator;
