//! Persisted records: builds and check-run mappings.
//!
//! A [`Build`] row is created for every GitHub event that compiled into a
//! task group; it tracks the coarse state of that group for the legacy
//! commit-status API. A [`CheckMapping`] row records which GitHub check run
//! represents a given task, so later lifecycle messages update the same
//! external check identity instead of creating a new one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{
    CheckRunId, CheckSuiteId, EventId, InstallationId, PullNumber, Sha, TaskGroupId, TaskId,
};

/// Coarse state of a task group, mirrored to the legacy commit-status API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildState {
    Pending,
    Running,
    Success,
    Failure,
    Cancelled,
}

impl BuildState {
    /// Returns true if no further lifecycle message may change this state.
    ///
    /// `Cancelled` is terminal from this system's point of view: a group we
    /// superseded stays cancelled even if stray lifecycle messages for its
    /// tasks are still in flight. `Success` and `Failure` are resolvable back
    /// to `Pending` by an explicit rerun, so they are not terminal here.
    pub fn is_terminal(self) -> bool {
        matches!(self, BuildState::Cancelled)
    }

    /// The string GitHub's commit-status API expects for this state.
    ///
    /// The status API only knows pending/success/failure/error; `Running`
    /// reports as pending and `Cancelled` as error.
    pub fn as_commit_status(self) -> &'static str {
        match self {
            BuildState::Pending | BuildState::Running => "pending",
            BuildState::Success => "success",
            BuildState::Failure => "failure",
            BuildState::Cancelled => "error",
        }
    }
}

impl std::fmt::Display for BuildState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BuildState::Pending => "pending",
            BuildState::Running => "running",
            BuildState::Success => "success",
            BuildState::Failure => "failure",
            BuildState::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// One row per task group created in response to a GitHub event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Build {
    pub organization: String,
    pub repository: String,
    pub sha: Sha,
    /// Primary key: at most one build per task group.
    pub task_group_id: TaskGroupId,
    pub state: BuildState,
    /// The event type that triggered this build, e.g. `push`,
    /// `pull_request.opened`, `release`, `issue_comment.created`.
    pub event_type: String,
    pub event_id: EventId,
    pub installation_id: InstallationId,
    pub pull_number: Option<PullNumber>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Build {
    /// Returns true if the other row describes the same triggering event.
    ///
    /// Used on duplicate-key conflicts: a second insert with the same task
    /// group id must carry identical key fields, otherwise two distinct
    /// events collided on one group id and the event is rejected.
    pub fn same_origin(&self, other: &Build) -> bool {
        self.organization == other.organization
            && self.repository == other.repository
            && self.sha == other.sha
            && self.event_type == other.event_type
            && self.event_id == other.event_id
    }
}

/// One row per (task group, task), recording which GitHub check run
/// represents that task.
///
/// Replaced wholesale on rerun: an already-completed check run cannot be
/// reopened, so a rerun gets a fresh check identity and the mapping is
/// upserted to point at it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckMapping {
    pub task_group_id: TaskGroupId,
    pub task_id: TaskId,
    pub check_suite_id: CheckSuiteId,
    pub check_run_id: CheckRunId,
}
