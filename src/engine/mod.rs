//! Remote engine transport
//!
//! The collection engine is driven over a small JSON-RPC-like surface: submit
//! a task, poll its state, resolve its result file, request a status
//! transition, download the file. The [`Engine`] trait captures that surface
//! so the lifecycle controller and workers can run against a test double;
//! [`HttpEngine`] is the production implementation.

mod http;
mod request;

pub use http::HttpEngine;
pub use request::{IteratorOptions, ParserOverride, ResultsOptions, TaskRequest, PROXY_RETRIES};

use crate::error::Result;
use crate::types::{TaskId, TaskStatus, TaskTransition};
use async_trait::async_trait;

/// Transport to the collection engine
#[async_trait]
pub trait Engine: Send + Sync {
    /// Check that the engine is reachable
    ///
    /// Returns the acknowledgment value, expected to be `"pong"` on a live
    /// connection.
    async fn ping(&self) -> Result<String>;

    /// Submit a collection task
    ///
    /// # Errors
    /// Returns [`crate::Error::Submission`] carrying the raw reply when the
    /// engine reports non-success.
    async fn add_task(&self, request: &TaskRequest) -> Result<TaskId>;

    /// Current status of a task
    async fn task_status(&self, task: TaskId) -> Result<TaskStatus>;

    /// Resolve the result file reference for a task
    async fn task_results_file(&self, task: TaskId) -> Result<String>;

    /// Request a status transition for a task
    async fn change_task_status(&self, task: TaskId, transition: TaskTransition) -> Result<()>;

    /// Download a result file by the reference `task_results_file` returned
    async fn download_results(&self, reference: &str) -> Result<String>;
}
