//! The Taskcluster queue as a capability.
//!
//! The real client (credentials, HTTP, exchanges) lives outside this crate;
//! handlers consume it through the [`TaskQueue`] trait. `create_task` is
//! idempotent on the queue side: re-submitting the same task id with the same
//! definition is a no-op success, which is what makes duplicate webhook
//! deliveries harmless once the build row exists.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::retry::{RetryConfig, retry_with_backoff};
use crate::types::{TaskGroupId, TaskId};

pub type Result<T> = std::result::Result<T, QueueError>;

/// A task-queue API failure.
#[derive(Debug, Clone, Error)]
pub struct QueueError {
    /// The HTTP status code, if the failure came from an HTTP response.
    pub status: Option<u16>,

    /// The structured error code reported by the queue, e.g.
    /// `InsufficientScopes` or `ResourceNotFound`.
    pub code: Option<String>,

    pub message: String,
}

impl std::fmt::Display for QueueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.code, self.status) {
            (Some(code), _) => write!(f, "queue error {}: {}", code, self.message),
            (None, Some(status)) => write!(f, "queue error (HTTP {}): {}", status, self.message),
            (None, None) => write!(f, "queue error: {}", self.message),
        }
    }
}

impl QueueError {
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        QueueError {
            status: Some(status),
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        QueueError {
            status: Some(status),
            code: Some(code.into()),
            message: message.into(),
        }
    }

    /// A connection-level failure with no HTTP response.
    pub fn connection(message: impl Into<String>) -> Self {
        QueueError {
            status: None,
            code: None,
            message: message.into(),
        }
    }

    pub fn insufficient_scopes(message: impl Into<String>) -> Self {
        Self::with_code(403, "InsufficientScopes", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::with_code(404, "ResourceNotFound", message)
    }

    pub fn is_transient(&self) -> bool {
        match self.status {
            Some(status) => (500..600).contains(&status) || status == 429,
            // No status at all means the request never got a response.
            None => true,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status == Some(404) || self.code.as_deref() == Some("ResourceNotFound")
    }

    /// True when the queue rejected a call for missing scopes. The job
    /// handler rewrites these into an actionable user comment.
    pub fn is_insufficient_scopes(&self) -> bool {
        self.code.as_deref() == Some("InsufficientScopes")
    }
}

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Unscheduled,
    Pending,
    Running,
    Completed,
    Failed,
    Exception,
}

impl TaskState {
    /// True once the queue will emit no further lifecycle messages for the
    /// task (short of a rerun).
    pub fn is_resolved(self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::Exception
        )
    }
}

/// One run of a task. Reruns append runs; `run_id` is the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRun {
    pub run_id: u32,
    pub state: String,
    /// Resolution reason reported by the queue, e.g. `completed`,
    /// `deadline-exceeded`, `worker-shutdown`. Open set; unknown values must
    /// be tolerated.
    pub reason_resolved: Option<String>,
}

/// Status block carried on every task lifecycle message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub task_id: TaskId,
    pub task_group_id: TaskGroupId,
    pub state: TaskState,
    pub runs: Vec<TaskRun>,
    pub retries_left: u32,
}

impl TaskStatus {
    /// The run the message refers to, when the index is valid.
    pub fn run(&self, run_id: u32) -> Option<&TaskRun> {
        self.runs.iter().find(|r| r.run_id == run_id)
    }
}

/// One page of a task group listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskGroupPage {
    pub tasks: Vec<TaskStatus>,
    pub continuation: Option<String>,
}

/// Queue operations the handlers need.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Creates a task. Idempotent: the same id with the same definition is a
    /// no-op success.
    async fn create_task(&self, task_id: &TaskId, definition: &serde_json::Value) -> Result<()>;

    /// Fetches a task's definition.
    async fn task(&self, task_id: &TaskId) -> Result<serde_json::Value>;

    /// Lists artifact names for a task run.
    async fn list_artifacts(&self, task_id: &TaskId, run_id: u32) -> Result<Vec<String>>;

    /// Fetches one artifact's content. Callers wanting 5xx retries go
    /// through [`fetch_artifact`].
    async fn get_artifact(&self, task_id: &TaskId, run_id: u32, name: &str) -> Result<Vec<u8>>;

    async fn rerun_task(&self, task_id: &TaskId) -> Result<()>;

    /// Seals a task group so no further tasks can be added to it.
    async fn seal_task_group(&self, task_group_id: &TaskGroupId) -> Result<()>;

    /// Cancels all unresolved tasks in a group.
    async fn cancel_task_group(&self, task_group_id: &TaskGroupId) -> Result<()>;

    /// Lists the tasks of a group, one page at a time.
    async fn list_task_group(
        &self,
        task_group_id: &TaskGroupId,
        continuation: Option<&str>,
    ) -> Result<TaskGroupPage>;

    /// Returns a client restricted to exactly `scopes`.
    ///
    /// Task creation always goes through a client scoped to the compiled
    /// scope set, and reruns through one scoped to rerun alone, so a bug in
    /// one handler cannot exercise the service's full grant.
    fn scoped(&self, scopes: &[String]) -> Arc<dyn TaskQueue>;
}

/// Backoff used for artifact downloads: quick retries, tens of seconds total.
const ARTIFACT_RETRY: RetryConfig = RetryConfig {
    max_retries: 3,
    initial_delay: std::time::Duration::from_millis(500),
    max_delay: std::time::Duration::from_secs(5),
    backoff_multiplier: 2.0,
};

/// Fetches an artifact, retrying 5xx and connection failures with backoff.
/// 4xx responses are returned immediately.
pub async fn fetch_artifact(
    queue: &dyn TaskQueue,
    task_id: &TaskId,
    run_id: u32,
    name: &str,
) -> Result<Vec<u8>> {
    retry_with_backoff(ARTIFACT_RETRY, || queue.get_artifact(task_id, run_id, name)).await
}

/// Lists every task in a group, following continuation tokens.
pub async fn list_entire_task_group(
    queue: &dyn TaskQueue,
    task_group_id: &TaskGroupId,
) -> Result<Vec<TaskStatus>> {
    let mut tasks = Vec::new();
    let mut continuation: Option<String> = None;
    loop {
        let page = queue
            .list_task_group(task_group_id, continuation.as_deref())
            .await?;
        tasks.extend(page.tasks);
        match page.continuation {
            Some(token) => continuation = Some(token),
            None => return Ok(tasks),
        }
    }
}
