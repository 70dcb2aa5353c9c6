//! Rerun requests from the GitHub UI.
//!
//! A "re-run" click arrives with the check run's identity. The mapping back
//! to the originating task must exist - there is no sensible default when it
//! does not, so its absence is a hard failure rather than a silent skip.

use tracing::{info, instrument};

use crate::bus::RerunRequestMessage;
use crate::types::BuildState;

use super::{HandlerError, Handlers, Result};

impl Handlers {
    /// Restarts the task behind a check run.
    #[instrument(skip(self, message), fields(
        check_suite_id = %message.check_suite_id,
        check_run_id = %message.check_run_id,
    ))]
    pub async fn handle_rerun(&self, message: RerunRequestMessage) -> Result<()> {
        let repo = message.repo();

        let mapping = self
            .store
            .check_mapping_by_run_ids(message.check_suite_id, message.check_run_id)
            .await?
            .ok_or(HandlerError::MissingRerunMapping {
                check_suite_id: message.check_suite_id,
                check_run_id: message.check_run_id,
            })?;

        info!(task_id = %mapping.task_id, "rerunning task for check run");

        // Rerun with exactly the rerun grant for this repository, never the
        // service's full scope set.
        let scoped = self.queue.scoped(&[format!(
            "assume:repo:github.com/{}/{}:rerun",
            repo.owner, repo.repo
        )]);
        scoped.rerun_task(&mapping.task_id).await?;

        self.store
            .set_build_state(&mapping.task_group_id, BuildState::Pending)
            .await?;
        Ok(())
    }
}
