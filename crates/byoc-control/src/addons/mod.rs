//! Post-deployment cluster addons.
//!
//! Installs are dispatched to the cluster's access node through a
//! [`RemoteExecutor`](crate::executor::RemoteExecutor) and tracked by
//! command identifier.

mod installer;
pub mod payload;

pub use installer::{AddonInstaller, CLUSTER_OUTPUT, HOST_OUTPUT};
pub use payload::{ARGOCD, KNOWN_ADDONS};
