//! Task lifecycle control
//!
//! Drives one collection task from submission through its terminal state to
//! the retrieved result text. Polling never times out: a task that stays
//! non-terminal keeps its preset's cycle waiting. The controller holds no
//! per-task state and never touches the exclusion set it serializes.

use crate::config::Config;
use crate::engine::{Engine, TaskRequest};
use crate::error::{Error, Result};
use crate::exclusions::ExclusionSet;
use crate::sanitize::Sanitizer;
use crate::types::{Preset, TaskId, TaskStatus, TaskTransition};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Submits, awaits, and retrieves one task at a time
#[derive(Clone)]
pub struct TaskLifecycle {
    engine: Arc<dyn Engine>,
    config: Arc<Config>,
    sanitizer: Sanitizer,
}

impl TaskLifecycle {
    /// Create a controller over an engine transport
    pub fn new(engine: Arc<dyn Engine>, config: Arc<Config>, sanitizer: Sanitizer) -> Self {
        Self {
            engine,
            config,
            sanitizer,
        }
    }

    fn poll_interval(&self) -> Duration {
        self.config.timing.poll_interval
    }

    /// Submit a collection task for a preset
    ///
    /// The current exclusion set is serialized into the duplicate-suppression
    /// override at this moment, so every submission reflects all extractions
    /// that completed before it.
    ///
    /// # Errors
    /// Returns [`Error::Submission`] with the raw reply if the engine rejects
    /// the task.
    pub async fn submit(
        &self,
        preset: &Preset,
        queries: Vec<String>,
        exclusions: &ExclusionSet,
    ) -> Result<TaskId> {
        let duplicate_override = exclusions.to_duplicate_override()?;
        let request = TaskRequest::new(
            preset,
            &self.config.parser_preset,
            &self.config.output_namespace,
            duplicate_override,
            queries,
            self.config.task_logging,
        );

        self.engine.add_task(&request).await
    }

    /// Poll the task until it reaches a terminal status
    ///
    /// The first check happens immediately; subsequent checks wait the full
    /// poll interval. `completed` resolves normally. `error` issues a
    /// best-effort delete on the engine and fails; `stopped` and `paused`
    /// fail without touching the task.
    ///
    /// # Errors
    /// Returns [`Error::TaskFailed`] or [`Error::TaskStopped`] for the
    /// non-completed terminal states.
    pub async fn await_completion(&self, task: TaskId) -> Result<()> {
        let mut first_check = true;
        loop {
            if !first_check {
                sleep(self.poll_interval()).await;
            }
            first_check = false;

            let status = self.engine.task_status(task).await?;
            debug!(task = %task, status = %status, "task state");

            match status {
                TaskStatus::Completed => return Ok(()),
                TaskStatus::Error => {
                    if let Err(e) = self
                        .engine
                        .change_task_status(task, TaskTransition::Deleting)
                        .await
                    {
                        warn!(task = %task, error = %e, "could not delete failed task");
                    }
                    return Err(Error::TaskFailed { task });
                }
                TaskStatus::Stopped | TaskStatus::Paused => {
                    return Err(Error::TaskStopped { task, status });
                }
                TaskStatus::Running | TaskStatus::Other(_) => {}
            }
        }
    }

    /// Download and repair the task's result text
    ///
    /// An empty body after repair (blank or a bare `[]`) means the engine
    /// collected nothing new for this cycle.
    ///
    /// # Errors
    /// Returns [`Error::NoResults`] for an empty result set, distinguished
    /// from other failures so callers can skip diagnostic reporting.
    pub async fn fetch_result(&self, task: TaskId, strip_null_tokens: bool) -> Result<String> {
        let reference = self.engine.task_results_file(task).await?;
        let raw = self.engine.download_results(&reference).await?;
        let cleaned = self.sanitizer.clean(&raw, strip_null_tokens);

        if is_empty_result(&cleaned) {
            return Err(Error::NoResults { task });
        }
        Ok(cleaned)
    }
}

fn is_empty_result(payload: &str) -> bool {
    let trimmed = payload.trim();
    trimmed.is_empty() || trimmed == "[]"
}
