//! The task-graph compiler as a capability.
//!
//! Turning a repository's `.taskcluster.yml` plus an event payload into a
//! concrete task graph (template rendering, schema validation, scope
//! derivation) happens outside this crate. Handlers consume the result
//! through [`GraphCompiler`].

use thiserror::Error;

use crate::bus::GithubEventMessage;
use crate::types::{TaskGroupId, TaskId};

/// How much trust the compiled tasks should run with.
///
/// `Untrusted` is selected by the `public_restricted` admission policy for
/// actors without write access: the compiler derives the restricted
/// task-creation scope set instead of the repository's full grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeMode {
    Trusted,
    Untrusted,
}

/// One task of a compiled graph.
#[derive(Debug, Clone)]
pub struct CompiledTask {
    pub task_id: TaskId,
    pub task_group_id: TaskGroupId,
    /// Routes attached to the task; lifecycle messages fan out along these.
    pub routes: Vec<String>,
    /// The full task definition submitted to the queue.
    pub definition: serde_json::Value,
}

/// The compiled graph for one event.
#[derive(Debug, Clone)]
pub struct GraphConfig {
    pub tasks: Vec<CompiledTask>,
    /// Scope set task creation is restricted to (least privilege per group).
    pub scopes: Vec<String>,
    /// Whether earlier in-flight task groups for the same pull request
    /// should be cancelled once this group's tasks exist.
    pub auto_cancel_previous_checks: bool,
}

impl GraphConfig {
    /// The task group id of the compiled graph, taken from its first task.
    pub fn task_group_id(&self) -> Option<&TaskGroupId> {
        self.tasks.first().map(|t| &t.task_group_id)
    }
}

/// Compilation failure. Always user-addressable: the handlers surface these
/// as comments, never as crashes.
#[derive(Debug, Clone, Error)]
pub enum CompileError {
    /// The configuration does not match the declared schema version.
    #[error("`.taskcluster.yml` does not match the schema: {0}")]
    Schema(String),

    /// The configuration is structurally valid but unusable, e.g. a `tasks`
    /// field that is not a list.
    #[error("invalid `.taskcluster.yml`: {0}")]
    Invalid(String),
}

/// Compiles a repository configuration and event payload into a task graph.
pub trait GraphCompiler: Send + Sync {
    fn compile(
        &self,
        config: &serde_json::Value,
        event: &GithubEventMessage,
        scope_mode: ScopeMode,
    ) -> Result<GraphConfig, CompileError>;
}
