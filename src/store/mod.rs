//! Persistence for builds and check mappings.
//!
//! The relational store itself is out of scope; handlers consume it through
//! [`BuildStore`]. The trait surface is deliberately small and keyed: every
//! operation addresses rows by task group, task, or check-run identity, and
//! `create_build_if_absent` leans on the backend's unique constraint so that
//! duplicate webhook deliveries cannot produce two builds.

pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{
    Build, BuildState, CheckMapping, CheckRunId, CheckSuiteId, PullNumber, TaskGroupId, TaskId,
};

pub use memory::InMemoryBuildStore;

pub type Result<T> = std::result::Result<T, StoreError>;

/// Storage failure.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// No build row exists for the task group.
    #[error("no build recorded for task group {0}")]
    BuildNotFound(TaskGroupId),

    /// A build row for this task group already exists but records a
    /// different triggering event. Two distinct events collided on one task
    /// group id; the incoming event is rejected rather than silently merged.
    #[error(
        "task group {task_group_id} already recorded for {existing_org}/{existing_repo}@{existing_sha} \
         (event {existing_event_id}); refusing conflicting build"
    )]
    BuildConflict {
        task_group_id: TaskGroupId,
        existing_org: String,
        existing_repo: String,
        existing_sha: String,
        existing_event_id: String,
    },

    /// The backend failed (connection, SQL, ...).
    #[error("storage backend: {0}")]
    Backend(String),
}

impl StoreError {
    /// Builds the conflict fault for an existing row that does not match the
    /// build we tried to insert.
    pub fn conflict(existing: &Build) -> Self {
        StoreError::BuildConflict {
            task_group_id: existing.task_group_id.clone(),
            existing_org: existing.organization.clone(),
            existing_repo: existing.repository.clone(),
            existing_sha: existing.sha.to_string(),
            existing_event_id: existing.event_id.to_string(),
        }
    }
}

/// Build and check-mapping persistence.
#[async_trait]
pub trait BuildStore: Send + Sync {
    /// Inserts the build unless a row with its task group id already exists.
    ///
    /// Returns the stored row and whether it was created by this call. On
    /// conflict the existing row is returned unmodified; the caller must
    /// verify its key fields match what it expected and raise
    /// [`StoreError::BuildConflict`] otherwise.
    async fn create_build_if_absent(&self, build: &Build) -> Result<(Build, bool)>;

    async fn get_build(&self, task_group_id: &TaskGroupId) -> Result<Option<Build>>;

    /// Sets the build's state and bumps `updated_at`, returning the row as
    /// stored afterwards.
    ///
    /// Cancellation is terminal: once a build is `Cancelled`, later state
    /// changes are ignored and the row comes back unchanged. Callers that
    /// care can compare the returned state with what they asked for.
    async fn set_build_state(&self, task_group_id: &TaskGroupId, state: BuildState)
    -> Result<Build>;

    async fn delete_build(&self, task_group_id: &TaskGroupId) -> Result<()>;

    /// All builds recorded for a pull request in a repository, used to find
    /// superseded task groups.
    async fn builds_for_pull_request(
        &self,
        organization: &str,
        repository: &str,
        pull_number: PullNumber,
    ) -> Result<Vec<Build>>;

    /// Creates or replaces the mapping for (task group, task).
    async fn upsert_check_mapping(&self, mapping: &CheckMapping) -> Result<()>;

    async fn check_mapping_by_task_id(&self, task_id: &TaskId) -> Result<Option<CheckMapping>>;

    async fn check_mapping_by_run_ids(
        &self,
        check_suite_id: CheckSuiteId,
        check_run_id: CheckRunId,
    ) -> Result<Option<CheckMapping>>;

    async fn check_mapping_by_task_group_and_task(
        &self,
        task_group_id: &TaskGroupId,
        task_id: &TaskId,
    ) -> Result<Option<CheckMapping>>;
}
