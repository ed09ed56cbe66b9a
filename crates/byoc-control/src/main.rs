//! BYOC control service binary.
//!
//! Runs the control plane for tenant deployments.

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use byoc_control::{ControlConfig, ControlService};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("byoc_control=info".parse()?))
        .init();

    info!("BYOC control service starting");

    let config = ControlConfig::load().unwrap_or_else(|e| {
        warn!(error = %e, "failed to load config, using defaults");
        ControlConfig::default()
    });

    info!(
        listen_addr = %config.server.listen_addr,
        store = ?config.store.backend,
        engine = ?config.engine.kind,
        executor = ?config.executor.kind,
        "configuration loaded"
    );

    ControlService::new(config).run().await?;

    Ok(())
}
