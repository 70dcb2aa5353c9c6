//! GitHub as a capability.
//!
//! The REST client itself (authentication, installation tokens, HTTP) lives
//! outside this crate; handlers consume it through the [`HostingApi`] trait.
//! Implementations are expected to retry transient (5xx) failures internally;
//! 4xx responses come back as permanent [`HostingError`]s, which callers
//! frequently absorb as expected absences (no config file, unknown user).

pub mod error;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::{CheckRunId, CheckSuiteId, PullNumber, RepoId, Sha};

pub use error::{HostingError, HostingErrorKind};

pub type Result<T> = std::result::Result<T, HostingError>;

/// A repository's `.taskcluster.yml`, as fetched from a ref.
///
/// YAML decoding happens in the client implementation; a file that exists
/// but fails to parse is reported as `Malformed` so handlers can surface it
/// to the user instead of treating it as an API failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RepoConfig {
    /// Parsed configuration, as JSON.
    Parsed(serde_json::Value),
    /// The file exists but could not be decoded; the payload is the parse
    /// error, suitable for a user comment.
    Malformed(String),
}

/// The usernames relevant to a pull request's admission decision.
///
/// Four accounts are associated with a PR action: the user who opened it,
/// the owner of the repository the changes are pulled from, the owner of the
/// repository they merge into, and the sender of the triggering action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestInfo {
    pub head_sha: Sha,
    /// `pull_request.user.login` - who opened the PR.
    pub opener: String,
    /// `pull_request.head.user.login` - owner of the repo changes come from.
    pub head_owner: String,
    /// `pull_request.base.user.login` - owner of the repo changes merge into.
    pub base_owner: String,
}

/// Status of a check run as GitHub models it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckRunStatus {
    Queued,
    InProgress,
    Completed,
}

impl CheckRunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CheckRunStatus::Queued => "queued",
            CheckRunStatus::InProgress => "in_progress",
            CheckRunStatus::Completed => "completed",
        }
    }
}

/// Conclusion of a completed check run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckConclusion {
    Success,
    Failure,
    Neutral,
    Cancelled,
    TimedOut,
    ActionRequired,
}

impl CheckConclusion {
    pub fn as_str(self) -> &'static str {
        match self {
            CheckConclusion::Success => "success",
            CheckConclusion::Failure => "failure",
            CheckConclusion::Neutral => "neutral",
            CheckConclusion::Cancelled => "cancelled",
            CheckConclusion::TimedOut => "timed_out",
            CheckConclusion::ActionRequired => "action_required",
        }
    }
}

/// The output block of a check run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckRunOutput {
    pub title: String,
    pub summary: String,
    /// Markdown body, capped by the caller against GitHub's payload limit.
    pub text: String,
    /// Raw annotation objects, passed through from the task's custom
    /// annotations artifact.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<serde_json::Value>,
}

/// Payload for creating a check run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckRunCreate {
    /// Display name, usually the task's metadata name.
    pub name: String,
    pub head_sha: Sha,
    /// Link target for "Details", pointing at the task in Taskcluster.
    pub details_url: String,
    /// Opaque id correlating the check run back to its task.
    pub external_id: String,
    pub status: CheckRunStatus,
    pub conclusion: Option<CheckConclusion>,
    pub output: Option<CheckRunOutput>,
}

/// Payload for updating an existing check run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckRunUpdate {
    pub status: CheckRunStatus,
    pub conclusion: Option<CheckConclusion>,
    pub output: Option<CheckRunOutput>,
}

/// The identity GitHub assigned to a created check run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedCheckRun {
    pub check_suite_id: CheckSuiteId,
    pub check_run_id: CheckRunId,
}

/// Payload for the legacy commit-status API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitStatus {
    /// One of pending/success/failure/error.
    pub state: String,
    pub target_url: String,
    pub description: String,
    pub context: String,
}

/// GitHub operations the handlers need, authenticated per installation by
/// the implementation.
#[async_trait]
pub trait HostingApi: Send + Sync {
    /// Fetches and decodes the repository's `.taskcluster.yml` at `reference`
    /// (a SHA, branch or tag). Returns `Ok(None)` when the file does not
    /// exist at that ref; most commits have none.
    async fn repo_config(&self, repo: &RepoId, reference: &str) -> Result<Option<RepoConfig>>;

    /// The repository's default branch name.
    async fn default_branch(&self, repo: &RepoId) -> Result<String>;

    /// Resolves a ref (tag, branch, commitish) to a commit SHA.
    async fn commit_for_ref(&self, repo: &RepoId, reference: &str) -> Result<Sha>;

    /// Whether `login` has write access to the repository.
    ///
    /// Implementations map a 404 response to `Ok(false)`; any other failure
    /// propagates.
    async fn is_collaborator(&self, repo: &RepoId, login: &str) -> Result<bool>;

    /// Details of a pull request, for comment-triggered events and admission.
    async fn pull_request(&self, repo: &RepoId, number: PullNumber) -> Result<PullRequestInfo>;

    async fn create_commit_status(
        &self,
        repo: &RepoId,
        sha: &Sha,
        status: CommitStatus,
    ) -> Result<()>;

    async fn create_check_run(
        &self,
        repo: &RepoId,
        check: CheckRunCreate,
    ) -> Result<CreatedCheckRun>;

    async fn update_check_run(
        &self,
        repo: &RepoId,
        check_run_id: CheckRunId,
        update: CheckRunUpdate,
    ) -> Result<()>;

    async fn create_issue_comment(
        &self,
        repo: &RepoId,
        number: PullNumber,
        body: &str,
    ) -> Result<()>;

    async fn create_commit_comment(&self, repo: &RepoId, sha: &Sha, body: &str) -> Result<()>;

    /// Adds a reaction (e.g. "+1") to an issue comment. Best-effort
    /// acknowledgement of comment-triggered commands.
    async fn add_comment_reaction(
        &self,
        repo: &RepoId,
        comment_id: u64,
        reaction: &str,
    ) -> Result<()>;
}
