//! Core domain types: identifiers and persisted records.

pub mod build;
pub mod ids;

pub use build::{Build, BuildState, CheckMapping};
pub use ids::{
    CheckRunId, CheckSuiteId, EventId, InstallationId, PullNumber, RepoId, Sha, TaskGroupId,
    TaskId,
};
