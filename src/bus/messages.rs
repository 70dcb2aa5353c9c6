//! Messages consumed from and published to the bus.
//!
//! The bus preserves publisher order per routing key and delivers
//! at-least-once. Organization and repository names travel in sanitized form
//! (`.` encoded as `%`, a routing-key restriction); handlers desanitize on
//! receipt and re-sanitize when publishing.

use serde::{Deserialize, Serialize};

use crate::queue::TaskStatus;
use crate::types::{
    CheckRunId, CheckSuiteId, EventId, InstallationId, PullNumber, RepoId, Sha, TaskGroupId,
};

/// Decodes a routing-key-sanitized name (`%` back to `.`).
pub fn desanitize(name: &str) -> String {
    name.replace('%', ".")
}

/// Encodes a name for use in a routing key (`.` to `%`).
pub fn sanitize(name: &str) -> String {
    name.replace('.', "%")
}

/// Pull-request fields of a GitHub event, as far as admission needs them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventPullRequest {
    pub number: PullNumber,
    /// `pull_request.user.login` - who opened the PR.
    pub opener: String,
    /// `pull_request.head.user.login` - owner of the repo changes come from.
    pub head_owner: String,
    /// `pull_request.base.user.login` - owner of the repo changes merge into.
    pub base_owner: String,
}

/// Comment fields of a comment-triggered event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventComment {
    pub id: u64,
    /// The pull request the comment is attached to.
    pub pull_number: PullNumber,
    /// The comment's author, checked against the `allow_comments` policy.
    pub author: String,
}

/// A GitHub event as delivered by the (out-of-scope) webhook ingress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubEventMessage {
    /// Sanitized organization name.
    pub organization: String,
    /// Sanitized repository name.
    pub repository: String,
    /// E.g. `push`, `tag`, `release`, `pull_request.opened`,
    /// `pull_request.synchronize`, `issue_comment.created`.
    pub event_type: String,
    pub event_id: EventId,
    pub installation_id: InstallationId,
    /// Head commit, when the event carries one directly. Releases don't;
    /// their SHA is resolved from the release target. Comment events resolve
    /// through the pull request.
    pub head_sha: Option<Sha>,
    pub pull_request: Option<EventPullRequest>,
    /// For release events: the release's target commitish.
    pub release_target: Option<String>,
    pub comment: Option<EventComment>,
    /// The raw webhook payload, handed to the graph compiler.
    pub body: serde_json::Value,
}

impl GithubEventMessage {
    /// The repository this event belongs to, with names desanitized.
    pub fn repo(&self) -> RepoId {
        RepoId::new(desanitize(&self.organization), desanitize(&self.repository))
    }

    pub fn pull_number(&self) -> Option<PullNumber> {
        self.pull_request
            .as_ref()
            .map(|pr| pr.number)
            .or_else(|| self.comment.as_ref().map(|c| c.pull_number))
    }

    pub fn is_pull_request(&self) -> bool {
        self.event_type.starts_with("pull_request.")
    }

    pub fn is_comment(&self) -> bool {
        self.event_type.starts_with("issue_comment.")
    }

    pub fn is_release(&self) -> bool {
        self.event_type == "release"
    }
}

/// Which lifecycle exchange a task status message arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskEventKind {
    Defined,
    Running,
    Completed,
    Failed,
    Exception,
}

/// A task lifecycle message from the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatusMessage {
    pub kind: TaskEventKind,
    pub status: TaskStatus,
    /// Which run of the task this message refers to. Greater than zero only
    /// after a rerun.
    pub run_id: u32,
}

/// Emitted by the queue when every task in a group has resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskGroupResolvedMessage {
    pub task_group_id: TaskGroupId,
    pub scheduler_id: String,
}

/// Published by the job handler after creating a group's tasks, consumed to
/// post the initial pending status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskGroupCreationRequestedMessage {
    pub task_group_id: TaskGroupId,
    /// Sanitized organization name.
    pub organization: String,
    /// Sanitized repository name.
    pub repository: String,
}

/// A user asked GitHub to re-run a check run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RerunRequestMessage {
    /// Sanitized organization name.
    pub organization: String,
    /// Sanitized repository name.
    pub repository: String,
    pub installation_id: InstallationId,
    pub check_run_id: CheckRunId,
    pub check_suite_id: CheckSuiteId,
}

impl RerunRequestMessage {
    pub fn repo(&self) -> RepoId {
        RepoId::new(desanitize(&self.organization), desanitize(&self.repository))
    }
}

/// Messages on the legacy status queue: individual failures plus group
/// resolution. Successes are not bound; the group-resolved scan decides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeprecatedStatusMessage {
    Task(TaskStatusMessage),
    GroupResolved(TaskGroupResolvedMessage),
}
