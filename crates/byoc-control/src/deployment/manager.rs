//! Core deployment orchestration logic.

use std::sync::Arc;

use byoc_config::ConfigResolved;
use tracing::{debug, error, info, warn};

use crate::addons::AddonInstaller;
use crate::engine::{ProvisioningEngine, RunStatus};
use crate::error::{ControlError, ControlResult};
use crate::state;
use crate::store::{ConfigStore, DeploymentFilter, DeploymentStore};
use crate::tasks::TaskSupervisor;
use crate::types::{
    DeploymentRecord, DeploymentStatus, Operation, StackName, StatusUpdate, TenantId, Transition,
};

use super::events::{
    EngineEvent, EventOutcome, ACTION_ADDONS_TRIGGERED, ACTION_DESTROYED, ACTION_FAILED,
    ACTION_FAILED_AND_DESTROY,
};

const DEFAULT_UPDATE_ERROR: &str = "Deployment failed";
const DEFAULT_DESTROY_ERROR: &str = "Destroy failed";

/// Drives deployments through their lifecycle.
///
/// Requests return once the record is in its new state; engine calls run
/// as supervised background tasks that write their own failures back into
/// the record.
#[derive(Clone)]
pub struct DeploymentOrchestrator {
    configs: Arc<dyn ConfigStore>,
    deployments: Arc<dyn DeploymentStore>,
    engine: Arc<dyn ProvisioningEngine>,
    installer: Arc<AddonInstaller>,
    tasks: TaskSupervisor,
}

impl DeploymentOrchestrator {
    /// Create a new orchestrator.
    pub fn new(
        configs: Arc<dyn ConfigStore>,
        deployments: Arc<dyn DeploymentStore>,
        engine: Arc<dyn ProvisioningEngine>,
        installer: Arc<AddonInstaller>,
        tasks: TaskSupervisor,
    ) -> Self {
        Self {
            configs,
            deployments,
            engine,
            installer,
            tasks,
        }
    }

    /// Background task supervisor.
    #[must_use]
    pub const fn tasks(&self) -> &TaskSupervisor {
        &self.tasks
    }

    /// Create or redeploy a tenant environment.
    ///
    /// Returns the record in `PENDING`. Provisioning is dispatched in the
    /// background; several requests accepted while the record is still
    /// pending result in a single engine run.
    pub async fn deploy(
        &self,
        tenant: &TenantId,
        environment: &str,
    ) -> ControlResult<DeploymentRecord> {
        let config = self
            .configs
            .get(tenant)
            .await?
            .ok_or_else(|| ControlError::not_found(format!("configuration for tenant {tenant}")))?;
        let stack = StackName::new(tenant, environment);

        let record = match self.deployments.get_owned(tenant, environment).await? {
            None => {
                let record = DeploymentRecord::new(&config, environment);
                match self.deployments.insert(&record).await {
                    Ok(()) => record,
                    Err(ControlError::Conflict(_)) => {
                        // Lost an insert race; the winner may be another tenant.
                        self.deployments.get_owned(tenant, environment).await?;
                        self.reset(&stack).await?
                    }
                    Err(e) => return Err(e),
                }
            }
            Some(_) => self.reset(&stack).await?,
        };

        info!(stack = %stack, tenant = %tenant, "deployment accepted");

        let this = self.clone();
        let task_stack = stack.clone();
        self.tasks.spawn("dispatch_update", &stack, async move {
            this.dispatch_update(&task_stack, &config).await
        });

        Ok(record)
    }

    async fn reset(&self, stack: &StackName) -> ControlResult<DeploymentRecord> {
        let update = StatusUpdate::to(DeploymentStatus::Pending)
            .clear_run_id()
            .clear_error();
        match self
            .deployments
            .transition(stack, state::REDEPLOYABLE, update)
            .await?
        {
            Transition::Applied(record) => Ok(record),
            Transition::Rejected(current) => Err(ControlError::conflict(format!(
                "deployment {stack} is {current}: {}",
                state::deploy_blocked_by(current).unwrap_or("redeploy not allowed")
            ))),
        }
    }

    async fn dispatch_update(&self, stack: &StackName, config: &ConfigResolved) -> ControlResult<()> {
        let claim = self
            .deployments
            .transition(
                stack,
                state::CLAIMABLE,
                StatusUpdate::to(DeploymentStatus::InProgress),
            )
            .await?;
        if let Transition::Rejected(current) = claim {
            debug!(stack = %stack, status = %current, "update already claimed");
            return Ok(());
        }

        match self.start_update(stack, config).await {
            Ok(run_id) => {
                info!(stack = %stack, run_id = %run_id, "update dispatched");
                let update = StatusUpdate::to(DeploymentStatus::InProgress).with_run_id(run_id);
                if let Transition::Rejected(current) = self
                    .deployments
                    .transition(stack, state::DISPATCHING, update)
                    .await?
                {
                    debug!(stack = %stack, status = %current, "run finished before it was recorded");
                }
            }
            Err(e) => {
                error!(stack = %stack, error = %e, "failed to dispatch update");
                self.deployments
                    .transition(
                        stack,
                        state::DISPATCHING,
                        StatusUpdate::to(DeploymentStatus::Failed).with_error(e.to_string()),
                    )
                    .await?;
            }
        }
        Ok(())
    }

    async fn start_update(&self, stack: &StackName, config: &ConfigResolved) -> ControlResult<String> {
        self.engine.ensure_stack(stack).await?;
        self.engine.configure(stack, config).await?;
        self.engine.trigger(stack, Operation::Update).await
    }

    /// Tear down a tenant environment.
    ///
    /// Requires `confirm`. Returns the record in `DESTROYING`.
    pub async fn destroy(
        &self,
        tenant: &TenantId,
        environment: &str,
        confirm: bool,
    ) -> ControlResult<DeploymentRecord> {
        let stack = StackName::new(tenant, environment);
        if !confirm {
            return Err(ControlError::ConfirmationRequired(format!(
                "set confirm to true to destroy {stack}"
            )));
        }

        self.deployments
            .get_owned(tenant, environment)
            .await?
            .ok_or_else(|| ControlError::not_found(format!("deployment {stack}")))?;

        let update = StatusUpdate::to(DeploymentStatus::Destroying).clear_run_id();
        let record = match self
            .deployments
            .transition(&stack, state::DESTROYABLE, update)
            .await?
        {
            Transition::Applied(record) => record,
            Transition::Rejected(current) => {
                return Err(ControlError::conflict(format!(
                    "deployment {stack} is {current}: {}",
                    state::destroy_blocked_by(current).unwrap_or("destroy not allowed")
                )));
            }
        };

        info!(stack = %stack, tenant = %tenant, "destroy accepted");

        let this = self.clone();
        let task_stack = stack.clone();
        self.tasks.spawn("dispatch_destroy", &stack, async move {
            this.dispatch_destroy(&task_stack, "Destroy failed").await
        });

        Ok(record)
    }

    async fn dispatch_destroy(&self, stack: &StackName, failure_prefix: &str) -> ControlResult<()> {
        match self.engine.trigger(stack, Operation::Destroy).await {
            Ok(run_id) => {
                info!(stack = %stack, run_id = %run_id, "destroy dispatched");
                let update = StatusUpdate::to(DeploymentStatus::Destroying).with_run_id(run_id);
                if let Transition::Rejected(current) = self
                    .deployments
                    .transition(stack, state::AWAITING_DESTROY, update)
                    .await?
                {
                    debug!(stack = %stack, status = %current, "run finished before it was recorded");
                }
            }
            Err(e) => {
                error!(stack = %stack, error = %e, "failed to dispatch destroy");
                self.deployments
                    .transition(
                        stack,
                        state::AWAITING_DESTROY,
                        StatusUpdate::to(DeploymentStatus::Failed)
                            .with_error(format!("{failure_prefix}: {e}")),
                    )
                    .await?;
            }
        }
        Ok(())
    }

    async fn auto_destroy(&self, stack: &StackName) -> ControlResult<()> {
        let claim = self
            .deployments
            .transition(
                stack,
                state::AUTO_DESTROYABLE,
                StatusUpdate::to(DeploymentStatus::Destroying).clear_run_id(),
            )
            .await?;
        if let Transition::Rejected(current) = claim {
            debug!(stack = %stack, status = %current, "auto-destroy no longer applicable");
            return Ok(());
        }

        info!(stack = %stack, "starting auto-destroy");
        self.dispatch_destroy(stack, "Auto-destroy failed").await
    }

    /// Apply a completion event.
    ///
    /// Never fails: anything that cannot be applied is acknowledged with a
    /// reason. Duplicate and late deliveries are no-ops.
    pub async fn handle_event(&self, event: &EngineEvent) -> EventOutcome {
        info!(
            stack = %event.stack,
            operation = %event.operation,
            status = %event.status,
            "engine event received"
        );

        if event.stack.trim().is_empty() {
            return EventOutcome::skipped(None, "missing stack");
        }
        let Some(stack) = StackName::parse_reported(&event.stack) else {
            return EventOutcome::skipped(None, "invalid stack format");
        };

        let operation = match event.operation.parse::<Operation>() {
            Ok(Operation::Preview) => {
                return EventOutcome::skipped(Some(&stack), "preview operations are ignored");
            }
            Ok(operation) => operation,
            Err(_) => {
                return EventOutcome::skipped(
                    Some(&stack),
                    format!("unhandled operation: {}", event.operation),
                );
            }
        };

        let outcome = match self.apply_event(&stack, operation, event).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(stack = %stack, error = %e, "failed to apply engine event");
                EventOutcome::skipped(Some(&stack), e.to_string())
            }
        };

        if outcome.processed {
            info!(stack = %stack, action = outcome.action.as_deref().unwrap_or_default(), "engine event applied");
        } else {
            debug!(stack = %stack, reason = outcome.reason.as_deref().unwrap_or_default(), "engine event skipped");
        }
        outcome
    }

    async fn apply_event(
        &self,
        stack: &StackName,
        operation: Operation,
        event: &EngineEvent,
    ) -> ControlResult<EventOutcome> {
        let Some(record) = self.deployments.get(stack).await? else {
            warn!(stack = %stack, "no deployment for engine event");
            return Ok(EventOutcome::skipped(Some(stack), "deployment not found"));
        };

        match operation {
            Operation::Update => self.apply_update(&record, event).await,
            Operation::Destroy => self.apply_destroy(&record, event).await,
            Operation::Preview => Ok(EventOutcome::skipped(
                Some(stack),
                "preview operations are ignored",
            )),
        }
    }

    async fn apply_update(
        &self,
        record: &DeploymentRecord,
        event: &EngineEvent,
    ) -> ControlResult<EventOutcome> {
        let stack = &record.stack_name;
        let already_processed = |current: DeploymentStatus| {
            EventOutcome::skipped(
                Some(stack),
                format!("already processed (current status: {current})"),
            )
        };

        match event.status.as_str() {
            "succeeded" | "failed" if !state::AWAITING_UPDATE.contains(&record.status) => {
                Ok(already_processed(record.status))
            }
            "succeeded" => {
                let outputs = self.engine.outputs(stack).await?;
                let update = StatusUpdate::to(DeploymentStatus::Succeeded)
                    .with_outputs(outputs)
                    .clear_error();
                match self
                    .deployments
                    .transition(stack, state::AWAITING_UPDATE, update)
                    .await?
                {
                    Transition::Rejected(current) => Ok(already_processed(current)),
                    Transition::Applied(record) => {
                        let installer = Arc::clone(&self.installer);
                        let tenant = record.tenant_id.clone();
                        let environment = record.environment.clone();
                        self.tasks.spawn("addon_install", stack, async move {
                            installer.install_after_settle(tenant, environment).await
                        });
                        Ok(EventOutcome::applied(stack, ACTION_ADDONS_TRIGGERED))
                    }
                }
            }
            "failed" => {
                let message = event.message().unwrap_or(DEFAULT_UPDATE_ERROR);
                let update = StatusUpdate::to(DeploymentStatus::Failed).with_error(message);
                match self
                    .deployments
                    .transition(stack, state::AWAITING_UPDATE, update)
                    .await?
                {
                    Transition::Rejected(current) => Ok(already_processed(current)),
                    Transition::Applied(_) => {
                        let this = self.clone();
                        let task_stack = stack.clone();
                        self.tasks.spawn("auto_destroy", stack, async move {
                            this.auto_destroy(&task_stack).await
                        });
                        Ok(EventOutcome::applied(stack, ACTION_FAILED_AND_DESTROY))
                    }
                }
            }
            other => Ok(EventOutcome::skipped(
                Some(stack),
                format!("unhandled status: {other}"),
            )),
        }
    }

    async fn apply_destroy(
        &self,
        record: &DeploymentRecord,
        event: &EngineEvent,
    ) -> ControlResult<EventOutcome> {
        let stack = &record.stack_name;
        let ignored = |current: DeploymentStatus| {
            EventOutcome::skipped(
                Some(stack),
                format!("ignored (current status: {current}, expected destroying)"),
            )
        };

        let (update, action) = match event.status.as_str() {
            "succeeded" | "failed" if !state::AWAITING_DESTROY.contains(&record.status) => {
                return Ok(ignored(record.status));
            }
            "succeeded" => (
                StatusUpdate::to(DeploymentStatus::Destroyed)
                    .clear_outputs()
                    .clear_error(),
                ACTION_DESTROYED,
            ),
            "failed" => {
                let message = event.message().map_or_else(
                    || DEFAULT_DESTROY_ERROR.to_owned(),
                    |m| format!("{DEFAULT_DESTROY_ERROR}: {m}"),
                );
                (
                    StatusUpdate::to(DeploymentStatus::Failed).with_error(message),
                    ACTION_FAILED,
                )
            }
            other => {
                return Ok(EventOutcome::skipped(
                    Some(stack),
                    format!("unhandled status: {other}"),
                ));
            }
        };

        match self
            .deployments
            .transition(stack, state::AWAITING_DESTROY, update)
            .await?
        {
            Transition::Applied(_) => Ok(EventOutcome::applied(stack, action)),
            Transition::Rejected(current) => Ok(ignored(current)),
        }
    }

    /// Get a deployment, refreshing it from the engine while a run is
    /// outstanding.
    pub async fn status(
        &self,
        tenant: &TenantId,
        environment: &str,
    ) -> ControlResult<DeploymentRecord> {
        let stack = StackName::new(tenant, environment);
        let record = self
            .deployments
            .get_owned(tenant, environment)
            .await?
            .ok_or_else(|| ControlError::not_found(format!("deployment {stack}")))?;

        let operation = match record.status {
            DeploymentStatus::InProgress => Operation::Update,
            DeploymentStatus::Destroying => Operation::Destroy,
            _ => return Ok(record),
        };
        let Some(ref run_id) = record.run_id else {
            return Ok(record);
        };

        match self.engine.run_status(&stack, run_id).await {
            Ok(RunStatus::Running) => Ok(record),
            Ok(status) => {
                let event = EngineEvent::from_poll(&stack, operation, &status);
                let outcome = self.handle_event(&event).await;
                debug!(stack = %stack, processed = outcome.processed, "pull refresh applied");
                Ok(self.deployments.get(&stack).await?.unwrap_or(record))
            }
            Err(e) => {
                warn!(stack = %stack, run_id = %run_id, error = %e, "failed to poll engine run");
                Ok(record)
            }
        }
    }

    /// List a tenant's deployments, newest first.
    pub async fn list(
        &self,
        tenant: &TenantId,
        filter: DeploymentFilter,
    ) -> ControlResult<Vec<DeploymentRecord>> {
        self.deployments
            .list(&filter.with_tenant(tenant.clone()))
            .await
    }
}

impl std::fmt::Debug for DeploymentOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeploymentOrchestrator")
            .field("tasks", &self.tasks)
            .finish_non_exhaustive()
    }
}
