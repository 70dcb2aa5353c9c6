//! Initial pending status for a freshly created task group.
//!
//! The job handler publishes a notification once a group's tasks all exist;
//! this handler turns it into the first user-visible signal on the commit.

use tracing::instrument;

use crate::bus::TaskGroupCreationRequestedMessage;
use crate::github::CommitStatus;
use crate::store::StoreError;
use crate::types::RepoId;

use super::{Handlers, Result};

impl Handlers {
    /// Posts the pending commit status for a new task group.
    ///
    /// The build row must exist - the same pipeline that created it published
    /// this message. Its absence is an infrastructure fault and propagates.
    #[instrument(skip(self, message), fields(task_group_id = %message.task_group_id))]
    pub async fn handle_task_group_creation(
        &self,
        message: TaskGroupCreationRequestedMessage,
    ) -> Result<()> {
        let build = self
            .store
            .get_build(&message.task_group_id)
            .await?
            .ok_or_else(|| StoreError::BuildNotFound(message.task_group_id.clone()))?;

        let repo = RepoId::new(&build.organization, &build.repository);
        let event_kind = build.event_type.split('.').next().unwrap_or("push");
        self.github
            .create_commit_status(
                &repo,
                &build.sha,
                CommitStatus {
                    state: "pending".to_string(),
                    target_url: self.config.task_group_url(&build.task_group_id),
                    description: format!("TaskGroup: Pending (for {})", build.event_type),
                    context: format!("{} ({})", self.config.status_context, event_kind),
                },
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::bus::TaskGroupCreationRequestedMessage;
    use crate::handlers::HandlerError;
    use crate::test_utils::*;
    use crate::types::TaskGroupId;

    #[tokio::test]
    async fn posts_pending_status_for_known_group() {
        let h = Harness::new();
        seed_build(&h, "tg-1", None).await;

        h.handlers
            .handle_task_group_creation(TaskGroupCreationRequestedMessage {
                task_group_id: TaskGroupId::new("tg-1"),
                organization: "octo-org".to_string(),
                repository: "widgets".to_string(),
            })
            .await
            .unwrap();

        let statuses = h.hosting.commit_statuses();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].1.state, "pending");
        assert!(statuses[0].1.description.contains("Pending"));
    }

    #[tokio::test]
    async fn unknown_group_is_an_error() {
        let h = Harness::new();
        let err = h
            .handlers
            .handle_task_group_creation(TaskGroupCreationRequestedMessage {
                task_group_id: TaskGroupId::new("tg-ghost"),
                organization: "octo-org".to_string(),
                repository: "widgets".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::Store(_)));
    }
}
