//! Deployment state machine.
//!
//! Status is persisted, so transitions are checked at runtime against the
//! stored value. Every write goes through a conditional store update that
//! names the statuses it may start from:
//!
//! ```text
//!            deploy                 update succeeded
//! (none) ──────────▶ PENDING ──▶ IN_PROGRESS ──────────▶ SUCCEEDED
//!                       ▲            │                      │
//!                       │            │ update failed        │ destroy
//!             redeploy  │            ▼                      ▼
//!   SUCCEEDED/FAILED/ ──┘         FAILED ──(auto)──▶ DESTROYING ──▶ DESTROYED
//!   DESTROYED                        ▲                      │
//!                                    └──── destroy failed ──┘
//! ```

use crate::types::DeploymentStatus::{
    self, Destroyed, Destroying, Failed, InProgress, Pending, Succeeded,
};

/// Statuses from which a deploy may reset the record to `PENDING`.
pub const REDEPLOYABLE: &[DeploymentStatus] = &[Pending, Succeeded, Failed, Destroyed];

/// Statuses from which a background deploy may claim the record.
pub const CLAIMABLE: &[DeploymentStatus] = &[Pending];

/// Statuses in which an update dispatch is outstanding.
pub const DISPATCHING: &[DeploymentStatus] = &[InProgress];

/// Statuses from which a destroy may start.
pub const DESTROYABLE: &[DeploymentStatus] = &[Pending, Succeeded, Failed];

/// Statuses in which update completion events are accepted.
pub const AWAITING_UPDATE: &[DeploymentStatus] = &[Pending, InProgress];

/// Statuses in which destroy completion events are accepted.
pub const AWAITING_DESTROY: &[DeploymentStatus] = &[Destroying];

/// Statuses from which the automatic post-failure destroy may start.
pub const AUTO_DESTROYABLE: &[DeploymentStatus] = &[Failed];

/// Why a deploy is refused, if it is.
#[must_use]
pub fn deploy_blocked_by(current: DeploymentStatus) -> Option<&'static str> {
    match current {
        InProgress => Some("a deployment is already in progress"),
        Destroying => Some("the stack is being destroyed"),
        _ => None,
    }
}

/// Why a destroy is refused, if it is.
#[must_use]
pub fn destroy_blocked_by(current: DeploymentStatus) -> Option<&'static str> {
    match current {
        InProgress => Some("cannot destroy while a deployment is in progress"),
        Destroying => Some("the stack is already being destroyed"),
        Destroyed => Some("the stack is already destroyed"),
        _ => None,
    }
}
