//! Service configuration.
//!
//! Values are provided by the embedder; loading them from files or the
//! environment is the bootstrap's concern, not this crate's.

use std::time::Duration;

/// Configuration shared by all handlers.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root URL of the Taskcluster deployment, used to build task and
    /// task-group links in statuses and check runs.
    pub root_url: String,

    /// Scheduler id the service creates task groups under.
    pub scheduler_id: String,

    /// Context string for legacy commit statuses, e.g. "Taskcluster".
    pub status_context: String,

    /// Route attached to tasks whose lifecycle should drive check runs.
    pub check_task_route: String,

    /// Route attached to tasks whose lifecycle should drive legacy commit
    /// statuses.
    pub status_task_route: String,

    /// Lease for the per-task lock held while reconciling a check run.
    /// Bounds how long a stuck handler can block later updates for the
    /// same task.
    pub max_lock_time: Duration,

    /// Capacity of the duplicate-comment suppression cache.
    pub comment_cache_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            root_url: "https://tc.example.com".to_string(),
            scheduler_id: "tc-github".to_string(),
            status_context: "Taskcluster".to_string(),
            check_task_route: "checks".to_string(),
            status_task_route: "statuses".to_string(),
            max_lock_time: Duration::from_secs(30),
            comment_cache_size: 1000,
        }
    }
}

impl Config {
    /// URL of a single task in the Taskcluster UI.
    pub fn task_url(&self, task_id: &crate::types::TaskId) -> String {
        format!("{}/tasks/{}", self.root_url, task_id)
    }

    /// URL of a task group in the Taskcluster UI.
    pub fn task_group_url(&self, task_group_id: &crate::types::TaskGroupId) -> String {
        format!("{}/tasks/groups/{}", self.root_url, task_group_id)
    }

    /// URL of a task run's live log in the Taskcluster UI.
    pub fn task_log_url(&self, task_id: &crate::types::TaskId, run_id: u32) -> String {
        format!("{}/tasks/{}/runs/{}/logs/live", self.root_url, task_id, run_id)
    }
}
