//! Service lifecycle management.
//!
//! Provides the main service runner with signal handling and graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::access::AccessNodes;
use crate::addons::AddonInstaller;
use crate::api::{self, WebhookVerifier};
use crate::config::{ControlConfig, StoreBackend, UnsignedPolicy};
use crate::deployment::DeploymentOrchestrator;
use crate::engine::{create_engine, ProvisioningEngine};
use crate::error::{ControlError, ControlResult};
use crate::executor::{create_executor, RemoteExecutor};
use crate::hosts::{create_hosts, HostController};
use crate::store::{AddonStore, ConfigStore, DeploymentStore, MemoryStore, PostgresStore};
use crate::tasks::TaskSupervisor;

/// The three store interfaces, usually backed by one object.
#[derive(Clone)]
pub struct Stores {
    /// Resolved tenant configurations.
    pub configs: Arc<dyn ConfigStore>,
    /// Deployment records.
    pub deployments: Arc<dyn DeploymentStore>,
    /// Addon install records.
    pub addons: Arc<dyn AddonStore>,
}

impl Stores {
    /// Use one backend for every interface.
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: ConfigStore + DeploymentStore + AddonStore + 'static,
    {
        Self {
            configs: store.clone(),
            deployments: store.clone(),
            addons: store,
        }
    }
}

/// Fully wired control plane components.
#[derive(Clone)]
pub struct Components {
    /// Deployment lifecycle.
    pub orchestrator: DeploymentOrchestrator,
    /// Addon installs.
    pub installer: Arc<AddonInstaller>,
    /// Access node operations.
    pub access: Arc<AccessNodes>,
    /// Router state.
    pub state: api::AppState,
}

impl Components {
    /// Wire components from their collaborators.
    pub fn build(
        config: &ControlConfig,
        stores: Stores,
        engine: Arc<dyn ProvisioningEngine>,
        executor: Arc<dyn RemoteExecutor>,
        hosts: Arc<dyn HostController>,
    ) -> Self {
        let installer = Arc::new(AddonInstaller::new(
            Arc::clone(&stores.configs),
            Arc::clone(&stores.deployments),
            Arc::clone(&stores.addons),
            executor,
            config.addons.clone(),
        ));
        let orchestrator = DeploymentOrchestrator::new(
            Arc::clone(&stores.configs),
            Arc::clone(&stores.deployments),
            engine,
            Arc::clone(&installer),
            TaskSupervisor::new(),
        );
        let access = Arc::new(AccessNodes::new(Arc::clone(&stores.deployments), hosts));
        let state = api::AppState {
            orchestrator: orchestrator.clone(),
            installer: Arc::clone(&installer),
            access: Arc::clone(&access),
            configs: stores.configs,
            deployments: stores.deployments,
            webhook: Arc::new(WebhookVerifier::new(&config.webhook)),
        };

        Self {
            orchestrator,
            installer,
            access,
            state,
        }
    }
}

/// The control service.
///
/// Manages the lifecycle of the control plane, including:
/// - Database connections
/// - Provisioning engine and remote executor clients
/// - HTTP API server
/// - Signal handling and graceful shutdown
pub struct ControlService {
    config: ControlConfig,
    cancel: CancellationToken,
}

impl ControlService {
    /// Create a new control service with the given configuration.
    #[must_use]
    pub fn new(config: ControlConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Run the control service.
    ///
    /// This will:
    /// 1. Connect to the database (or use in-memory store as fallback)
    /// 2. Create the engine, executor and host clients
    /// 3. Wire the orchestrator and addon installer
    /// 4. Start the HTTP API server
    /// 5. Wait for shutdown signal, then for background tasks
    pub async fn run(&self) -> ControlResult<()> {
        let stores = self.create_stores().await;

        let engine = create_engine(&self.config.engine)?;
        info!(kind = ?self.config.engine.kind, "provisioning engine configured");

        let executor = create_executor(&self.config.executor)?;
        info!(kind = ?self.config.executor.kind, "remote executor configured");

        let hosts = create_hosts(&self.config.executor)?;

        if self.config.webhook.secret.is_none() {
            match self.config.webhook.unsigned {
                UnsignedPolicy::Reject => {
                    warn!("no webhook secret configured, all webhooks will be rejected");
                }
                UnsignedPolicy::Accept => {
                    warn!("no webhook secret configured, accepting unsigned webhooks");
                }
            }
        }

        let components = Components::build(&self.config, stores, engine, executor, hosts);
        let tasks = components.orchestrator.tasks().clone();
        let app = api::router(
            components.state,
            Duration::from_secs(self.config.server.request_timeout_secs),
        );

        let addr = self.config.server.listen_addr;
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| ControlError::Config(format!("failed to bind {addr}: {e}")))?;
        info!(addr = %addr, "control service listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal(self.cancel.clone()))
            .await
            .map_err(|e| ControlError::Config(format!("server error: {e}")))?;

        if !tasks.is_empty() {
            info!(tasks = tasks.len(), "waiting for background tasks");
        }
        tasks.drain().await;

        info!("control service shutdown complete");
        Ok(())
    }

    /// Request graceful shutdown.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    async fn create_stores(&self) -> Stores {
        if self.config.store.backend == StoreBackend::Memory {
            info!("using in-memory store");
            return Stores::shared(Arc::new(MemoryStore::new()));
        }

        match PostgresStore::connect(&self.config.database).await {
            Ok(store) => {
                info!("connected to PostgreSQL");
                Stores::shared(Arc::new(store))
            }
            Err(e) => {
                error!(
                    error = %e,
                    "failed to connect to PostgreSQL, using in-memory store"
                );
                Stores::shared(Arc::new(MemoryStore::new()))
            }
        }
    }
}

async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            info!("received SIGTERM, initiating shutdown");
        }
        () = cancel.cancelled() => {
            info!("shutdown requested");
        }
    }
}
