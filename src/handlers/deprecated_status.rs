//! Legacy commit-status reconciliation.
//!
//! Older consumers read the coarse per-commit status rather than check runs.
//! Individual task failures mark the build failed immediately; success waits
//! for the whole group to resolve, at which point the group is scanned and
//! any failed or exception task makes the group a failure.

use tracing::{debug, instrument};

use crate::bus::{DeprecatedStatusMessage, TaskGroupResolvedMessage, TaskStatusMessage};
use crate::github::CommitStatus;
use crate::queue::{TaskState, list_entire_task_group};
use crate::types::{Build, BuildState, RepoId};

use super::{Handlers, Result};

impl Handlers {
    /// Handles one message on the legacy status queue.
    #[instrument(skip(self, message))]
    pub async fn handle_deprecated_status(&self, message: DeprecatedStatusMessage) -> Result<()> {
        match message {
            DeprecatedStatusMessage::Task(m) => self.record_task_failure(m).await,
            DeprecatedStatusMessage::GroupResolved(m) => self.record_group_resolution(m).await,
        }
    }

    /// A task failed or excepted: the group is a failure, no need to wait
    /// for resolution.
    async fn record_task_failure(&self, message: TaskStatusMessage) -> Result<()> {
        let Some(build) = self.store.get_build(&message.status.task_group_id).await? else {
            debug!("no build for task group; ignoring");
            return Ok(());
        };
        self.apply_build_state(&build, BuildState::Failure).await
    }

    /// The whole group resolved: scan it and post the final status.
    async fn record_group_resolution(&self, message: TaskGroupResolvedMessage) -> Result<()> {
        let Some(build) = self.store.get_build(&message.task_group_id).await? else {
            debug!("no build for task group; ignoring");
            return Ok(());
        };

        let tasks = list_entire_task_group(self.queue.as_ref(), &message.task_group_id).await?;
        let any_failed = tasks
            .iter()
            .any(|t| matches!(t.state, TaskState::Failed | TaskState::Exception));
        let state = if any_failed {
            BuildState::Failure
        } else {
            BuildState::Success
        };
        self.apply_build_state(&build, state).await
    }

    /// Persists the new state and mirrors it to GitHub, honoring stickiness:
    /// a build already marked failed stays failed, and a cancelled build is
    /// never overwritten.
    async fn apply_build_state(&self, build: &Build, state: BuildState) -> Result<()> {
        if build.state == BuildState::Failure && state == BuildState::Success {
            debug!("task group already marked as failure; continuing");
            return Ok(());
        }

        let stored = self
            .store
            .set_build_state(&build.task_group_id, state)
            .await?;
        if stored.state != state {
            // The store refused (terminal state); nothing to mirror.
            debug!(stored = %stored.state, wanted = %state, "state not applied; skipping status");
            return Ok(());
        }

        let repo = RepoId::new(&build.organization, &build.repository);
        let event_kind = build.event_type.split('.').next().unwrap_or("push");
        self.github
            .create_commit_status(
                &repo,
                &build.sha,
                CommitStatus {
                    state: state.as_commit_status().to_string(),
                    target_url: self.config.task_group_url(&build.task_group_id),
                    description: format!("TaskGroup: {}", state),
                    context: format!("{} ({})", self.config.status_context, event_kind),
                },
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::bus::{DeprecatedStatusMessage, TaskEventKind, TaskGroupResolvedMessage};
    use crate::store::BuildStore;
    use crate::test_utils::*;
    use crate::types::{BuildState, TaskGroupId};

    fn group_resolved(task_group_id: &str) -> DeprecatedStatusMessage {
        DeprecatedStatusMessage::GroupResolved(TaskGroupResolvedMessage {
            task_group_id: TaskGroupId::new(task_group_id),
            scheduler_id: "tc-github".to_string(),
        })
    }

    #[tokio::test]
    async fn task_failure_marks_build_failed_and_posts_status() {
        let h = Harness::new();
        seed_build(&h, "tg-1", None).await;

        h.handlers
            .handle_deprecated_status(DeprecatedStatusMessage::Task(task_status(
                TaskEventKind::Failed,
                "task-1",
                "tg-1",
                0,
                Some("failed"),
                0,
            )))
            .await
            .unwrap();

        let build = h
            .store
            .get_build(&TaskGroupId::new("tg-1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(build.state, BuildState::Failure);

        let statuses = h.hosting.commit_statuses();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].1.state, "failure");
        assert_eq!(statuses[0].1.context, "Taskcluster (push)");
    }

    #[tokio::test]
    async fn group_resolution_scans_all_pages() {
        let h = Harness::new();
        seed_build(&h, "tg-1", None).await;
        // Two pages; the failed task is on the second.
        h.queue.put_group_tasks(
            "tg-1",
            vec![
                group_member("task-1", "tg-1", crate::queue::TaskState::Completed),
                group_member("task-2", "tg-1", crate::queue::TaskState::Completed),
                group_member("task-3", "tg-1", crate::queue::TaskState::Exception),
            ],
        );
        h.queue.set_group_page_size(2);

        h.handlers
            .handle_deprecated_status(group_resolved("tg-1"))
            .await
            .unwrap();

        let build = h
            .store
            .get_build(&TaskGroupId::new("tg-1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(build.state, BuildState::Failure);
    }

    #[tokio::test]
    async fn all_green_group_resolves_to_success() {
        let h = Harness::new();
        seed_build(&h, "tg-1", None).await;
        h.queue.put_group_tasks(
            "tg-1",
            vec![
                group_member("task-1", "tg-1", crate::queue::TaskState::Completed),
                group_member("task-2", "tg-1", crate::queue::TaskState::Completed),
            ],
        );

        h.handlers
            .handle_deprecated_status(group_resolved("tg-1"))
            .await
            .unwrap();

        let build = h
            .store
            .get_build(&TaskGroupId::new("tg-1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(build.state, BuildState::Success);
        assert_eq!(h.hosting.commit_statuses()[0].1.state, "success");
    }

    #[tokio::test]
    async fn failure_is_sticky_across_group_resolution() {
        let h = Harness::new();
        seed_build(&h, "tg-1", None).await;

        // A task failure lands first.
        h.handlers
            .handle_deprecated_status(DeprecatedStatusMessage::Task(task_status(
                TaskEventKind::Failed,
                "task-1",
                "tg-1",
                0,
                Some("failed"),
                0,
            )))
            .await
            .unwrap();

        // Then the group resolves and, say, the listing only shows completed
        // tasks (the failed one was rerun elsewhere). Failure must stick.
        h.queue.put_group_tasks(
            "tg-1",
            vec![group_member("task-1", "tg-1", crate::queue::TaskState::Completed)],
        );
        h.handlers
            .handle_deprecated_status(group_resolved("tg-1"))
            .await
            .unwrap();

        let build = h
            .store
            .get_build(&TaskGroupId::new("tg-1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(build.state, BuildState::Failure);
        // Only the failure status was posted.
        assert_eq!(h.hosting.commit_statuses().len(), 1);
    }

    #[tokio::test]
    async fn cancelled_build_is_never_overwritten() {
        let h = Harness::new();
        seed_build(&h, "tg-1", None).await;
        h.store
            .set_build_state(&TaskGroupId::new("tg-1"), BuildState::Cancelled)
            .await
            .unwrap();

        h.queue.put_group_tasks(
            "tg-1",
            vec![group_member("task-1", "tg-1", crate::queue::TaskState::Completed)],
        );
        h.handlers
            .handle_deprecated_status(group_resolved("tg-1"))
            .await
            .unwrap();

        let build = h
            .store
            .get_build(&TaskGroupId::new("tg-1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(build.state, BuildState::Cancelled);
        // No status posted for a dead group.
        assert!(h.hosting.commit_statuses().is_empty());
    }

    #[tokio::test]
    async fn unknown_group_is_ignored() {
        let h = Harness::new();
        h.handlers
            .handle_deprecated_status(group_resolved("tg-unknown"))
            .await
            .unwrap();
        assert!(h.hosting.commit_statuses().is_empty());
    }
}
