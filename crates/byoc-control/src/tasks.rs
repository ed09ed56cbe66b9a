//! Background task supervision.
//!
//! Follow-up work (dispatching to the engine, auto-destroy, delayed addon
//! installs) runs after the triggering request has returned. Each task is
//! responsible for writing its own failure into the record it owns; the
//! supervisor tracks the tasks so shutdown and tests can wait for them.

use std::future::Future;

use tokio_util::task::TaskTracker;
use tracing::{debug, error};

use crate::error::ControlResult;
use crate::types::StackName;

/// Tracks fire-and-forget tasks and logs their outcome.
#[derive(Debug, Clone, Default)]
pub struct TaskSupervisor {
    tracker: TaskTracker,
}

impl TaskSupervisor {
    /// Create a new supervisor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a task for a stack.
    ///
    /// The task cannot be cancelled once spawned.
    pub fn spawn<F>(&self, name: &'static str, stack: &StackName, task: F)
    where
        F: Future<Output = ControlResult<()>> + Send + 'static,
    {
        let stack = stack.clone();
        debug!(task = name, stack = %stack, "spawning background task");
        self.tracker.spawn(async move {
            match task.await {
                Ok(()) => debug!(task = name, stack = %stack, "background task completed"),
                Err(e) => error!(task = name, stack = %stack, error = %e, "background task failed"),
            }
        });
    }

    /// Number of tasks still running.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tracker.len()
    }

    /// Whether no tasks are running.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tracker.is_empty()
    }

    /// Wait until every task, including tasks spawned while waiting, has
    /// finished. New tasks may be spawned afterwards.
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}
