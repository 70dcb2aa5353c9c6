//! The job pipeline: GitHub event in, task group out.
//!
//! Per event: resolve the subject commit, fetch `.taskcluster.yml`, run
//! admission, compile the graph, record the build row (idempotently), create
//! the tasks under the compiled scope set, supersede stale groups for the
//! same pull request, and announce the new group.
//!
//! Almost everything that can go wrong here is the user's to fix, so almost
//! everything renders as a comment and completes the handler normally. The
//! exceptions are infrastructure failures and the duplicate-group-id
//! consistency fault, which propagate to the dispatcher's error path.

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use crate::bus::{GithubEventMessage, TaskGroupCreationRequestedMessage, sanitize};
use crate::compiler::ScopeMode;
use crate::github::RepoConfig;
use crate::policy::{self, Admission};
use crate::store::StoreError;
use crate::types::{Build, BuildState, PullNumber, RepoId, Sha, TaskGroupId};

use super::comments::{denial_comment_body, insufficient_scopes_body, no_jobs_for_command_body};
use super::{Handlers, Result};

/// Outcome of fetching the default branch's configuration.
enum DefaultBranchConfig {
    Config(Option<serde_json::Value>),
    /// The file was malformed; a comment is already on its way.
    MalformedReported,
}

impl Handlers {
    /// Handles one GitHub event message.
    #[instrument(skip(self, message), fields(
        event_id = %message.event_id,
        event_type = %message.event_type,
        repo = %message.repo(),
    ))]
    pub async fn handle_job(&self, message: GithubEventMessage) -> Result<()> {
        let repo = message.repo();

        let Some(sha) = self.resolve_sha(&repo, &message).await? else {
            return Ok(());
        };
        debug!(sha = %sha.short(), "handling webhook");

        // Most commits have no .taskcluster.yml; that is a no-op, not an error.
        let repoconf = match self.github.repo_config(&repo, sha.as_str()).await? {
            None => {
                debug!("no .taskcluster.yml at this commit; skipping");
                return Ok(());
            }
            Some(RepoConfig::Malformed(parse_error)) => {
                self.create_exception_comment(&repo, &sha, &parse_error, message.pull_number())
                    .await?;
                return Ok(());
            }
            Some(RepoConfig::Parsed(value)) => value,
        };

        let Some(scope_mode) = self.admit(&repo, &sha, &message).await? else {
            return Ok(());
        };

        let graph = match self.compiler.compile(&repoconf, &message, scope_mode) {
            Ok(graph) => graph,
            Err(e) => {
                debug!(error = %e, ".taskcluster.yml did not compile; leaving comment");
                self.create_exception_comment(&repo, &sha, &e.to_string(), message.pull_number())
                    .await?;
                return Ok(());
            }
        };

        let Some(task_group_id) = graph.task_group_id().cloned() else {
            debug!("config compiled with zero tasks; skipping");
            if message.is_comment() {
                self.post_deduplicated_comment(
                    &repo,
                    &sha,
                    &no_jobs_for_command_body(),
                    "zero-tasks",
                    message.pull_number(),
                )
                .await?;
            }
            return Ok(());
        };

        // Record the build before any task exists, so a concurrent duplicate
        // delivery finds the row instead of creating a second group.
        let now = Utc::now();
        let build = Build {
            organization: repo.owner.clone(),
            repository: repo.repo.clone(),
            sha: sha.clone(),
            task_group_id: task_group_id.clone(),
            state: BuildState::Pending,
            event_type: message.event_type.clone(),
            event_id: message.event_id.clone(),
            installation_id: message.installation_id,
            pull_number: message.pull_number(),
            created_at: now,
            updated_at: now,
        };
        let (existing, created) = self.store.create_build_if_absent(&build).await?;
        if !created && !existing.same_origin(&build) {
            // Two distinct events collided on one task group id. Reject the
            // event rather than guessing which row is right.
            return Err(StoreError::conflict(&existing).into());
        }

        info!(task_group_id = %task_group_id, tasks = graph.tasks.len(), "creating tasks");
        if let Err(e) = self.create_tasks(&graph).await {
            debug!(error = %e, "task creation failed; leaving comment");
            let body = if e.is_insufficient_scopes() {
                insufficient_scopes_body(&graph.scopes, &e.message)
            } else {
                e.to_string()
            };
            self.create_exception_comment(&repo, &sha, &body, message.pull_number())
                .await?;
            return Ok(());
        }

        // Only once the new group's tasks all exist do we retire its
        // predecessors, so a crash mid-pipeline never leaves the PR with no
        // live group at all.
        if graph.auto_cancel_previous_checks {
            if let Some(pull_number) = message.pull_number() {
                self.cancel_previous_task_groups(&repo, pull_number, &task_group_id)
                    .await?;
            }
        }

        let notification = TaskGroupCreationRequestedMessage {
            task_group_id: task_group_id.clone(),
            organization: sanitize(&repo.owner),
            repository: sanitize(&repo.repo),
        };
        if let Err(e) = self.publisher.task_group_creation_requested(notification).await {
            warn!(error = %e, task_group_id = %task_group_id,
                "failed to publish task-group-creation-requested");
        }

        debug!(task_group_id = %task_group_id, "job handling completed");
        Ok(())
    }

    /// Resolves the commit the event is about.
    ///
    /// Push and pull-request events carry it; releases resolve through the
    /// release's target commitish (the tag may not exist yet); comments
    /// resolve through the pull request they are attached to.
    async fn resolve_sha(
        &self,
        repo: &RepoId,
        message: &GithubEventMessage,
    ) -> Result<Option<Sha>> {
        if let Some(sha) = &message.head_sha {
            return Ok(Some(sha.clone()));
        }
        if message.is_release() {
            let Some(target) = &message.release_target else {
                debug!("release event without target commitish; ignoring");
                return Ok(None);
            };
            let sha = self.github.commit_for_ref(repo, target).await?;
            return Ok(Some(sha));
        }
        if message.is_comment() {
            let Some(number) = message.pull_number() else {
                debug!("comment is not attached to a pull request; ignoring");
                return Ok(None);
            };
            let info = self.github.pull_request(repo, number).await?;
            return Ok(Some(info.head_sha));
        }
        debug!("event carries no sha; ignoring");
        Ok(None)
    }

    /// Runs admission control. `None` means the pipeline stops here (denied,
    /// disabled, or feedback already posted).
    async fn admit(
        &self,
        repo: &RepoId,
        sha: &Sha,
        message: &GithubEventMessage,
    ) -> Result<Option<ScopeMode>> {
        if message.is_pull_request() {
            let Some(pr) = &message.pull_request else {
                debug!("pull_request event without pull request fields; ignoring");
                return Ok(None);
            };
            let config = match self
                .default_branch_config(repo, sha, message.pull_number())
                .await?
            {
                DefaultBranchConfig::Config(config) => config,
                DefaultBranchConfig::MalformedReported => return Ok(None),
            };
            match policy::evaluate_pull_request(self.github.as_ref(), repo, config.as_ref(), pr)
                .await?
            {
                Admission::Admitted(mode) => Ok(Some(mode)),
                Admission::Denied { quiet } => {
                    // Feedback only when the PR was just opened, and only for
                    // the non-quiet policy; synchronize spam helps nobody.
                    if message.event_type.starts_with("pull_request.opened") && !quiet {
                        self.post_deduplicated_comment(
                            repo,
                            sha,
                            &denial_comment_body(),
                            "policy-denied",
                            message.pull_number(),
                        )
                        .await?;
                    }
                    debug!("pull request not admitted; exiting");
                    Ok(None)
                }
            }
        } else if message.is_comment() {
            let Some(comment) = &message.comment else {
                debug!("comment event without comment fields; ignoring");
                return Ok(None);
            };
            let config = match self
                .default_branch_config(repo, sha, message.pull_number())
                .await?
            {
                DefaultBranchConfig::Config(config) => config,
                DefaultBranchConfig::MalformedReported => return Ok(None),
            };
            let admitted = policy::evaluate_comment(
                self.github.as_ref(),
                repo,
                config.as_ref(),
                &comment.author,
            )
            .await?;
            if !admitted {
                debug!(author = %comment.author, "comment command not admitted; exiting");
                return Ok(None);
            }
            // Acknowledge the command; purely cosmetic, so failures only log.
            if let Err(e) = self
                .github
                .add_comment_reaction(repo, comment.id, "+1")
                .await
            {
                debug!(error = %e, "failed to add reaction to command comment");
            }
            Ok(Some(ScopeMode::Trusted))
        } else {
            // Pushes, tags and releases only run for people who can already
            // write to the repository; no further gate.
            Ok(Some(ScopeMode::Trusted))
        }
    }

    /// Fetches `.taskcluster.yml` at the default branch, reporting a
    /// malformed file to the user.
    async fn default_branch_config(
        &self,
        repo: &RepoId,
        sha: &Sha,
        pull_number: Option<PullNumber>,
    ) -> Result<DefaultBranchConfig> {
        let branch = self.github.default_branch(repo).await?;
        match self.github.repo_config(repo, &branch).await? {
            Some(RepoConfig::Parsed(value)) => Ok(DefaultBranchConfig::Config(Some(value))),
            Some(RepoConfig::Malformed(parse_error)) => {
                self.create_exception_comment(repo, sha, &parse_error, pull_number)
                    .await?;
                Ok(DefaultBranchConfig::MalformedReported)
            }
            None => Ok(DefaultBranchConfig::Config(None)),
        }
    }

    /// Seals and cancels earlier non-terminal task groups for the same pull
    /// request, and marks their builds cancelled.
    ///
    /// Remote "not found" means the group is already gone and is ignored;
    /// other remote failures go to monitoring but never fail the job. The
    /// store row is marked cancelled regardless, so the rest of the system
    /// stops reporting on the superseded group either way.
    async fn cancel_previous_task_groups(
        &self,
        repo: &RepoId,
        pull_number: PullNumber,
        current: &TaskGroupId,
    ) -> Result<()> {
        let builds = self
            .store
            .builds_for_pull_request(&repo.owner, &repo.repo, pull_number)
            .await?;
        for build in builds {
            if &build.task_group_id == current
                || !matches!(build.state, BuildState::Pending | BuildState::Running)
            {
                continue;
            }
            info!(superseded = %build.task_group_id, pull = %pull_number,
                "cancelling superseded task group");
            if let Err(e) = self.queue.seal_task_group(&build.task_group_id).await {
                if !e.is_not_found() {
                    self.monitor.report_error(&e);
                }
            }
            if let Err(e) = self.queue.cancel_task_group(&build.task_group_id).await {
                if !e.is_not_found() {
                    self.monitor.report_error(&e);
                }
            }
            self.store
                .set_build_state(&build.task_group_id, BuildState::Cancelled)
                .await?;
        }
        Ok(())
    }
}
