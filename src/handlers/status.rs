//! The status reconciler: task lifecycle messages in, check runs out.
//!
//! Handlers for different tasks run fully concurrently; all messages for one
//! task serialize through the per-task lock, acquired with a short lease so a
//! stuck handler cannot block that task's updates forever. Within the lock,
//! the handler reads the check mapping, talks to GitHub, and writes the
//! mapping back, so lock-grant order (which equals message-arrival order)
//! decides which update wins.

use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::bus::{TaskEventKind, TaskStatusMessage};
use crate::github::{
    CheckConclusion, CheckRunCreate, CheckRunOutput, CheckRunStatus, CheckRunUpdate,
};
use crate::queue;
use crate::types::{CheckMapping, RepoId, TaskId};

use super::{Handlers, Result};

/// Artifact holding the live log of a run.
const LIVE_LOG_ARTIFACT: &str = "public/logs/live_backing.log";

/// Markdown a task can publish to enrich its check run's text.
const CUSTOM_TEXT_ARTIFACT: &str = "public/github/customCheckRunText.md";

/// JSON annotations a task can publish for its check run.
const CUSTOM_ANNOTATIONS_ARTIFACT: &str = "public/github/customCheckRunAnnotations.json";

/// Budget for the check run's markdown body. GitHub rejects output text over
/// 64 kB; staying under leaves room for the rest of the payload.
const MAX_CHECK_OUTPUT_BYTES: usize = 60_000;

/// How much of the live log's tail to quote.
const LOG_TAIL_BYTES: usize = 30_000;

/// Maps a queue resolution reason to a check-run conclusion.
///
/// `None` means the reason is unknown to this table; the caller reports it
/// and falls back to `Neutral`. This function never fails.
pub(crate) fn conclusion_for(reason: &str, retries_left: u32) -> Option<CheckConclusion> {
    match reason {
        "completed" => Some(CheckConclusion::Success),
        "failed" => Some(CheckConclusion::Failure),
        "exception" => Some(CheckConclusion::Failure),
        "deadline-exceeded" => Some(CheckConclusion::TimedOut),
        "canceled" => Some(CheckConclusion::Cancelled),
        // No longer relevant; the superseding group reports instead.
        "superseded" => Some(CheckConclusion::Neutral),
        "claim-expired" => Some(CheckConclusion::Failure),
        // The queue will retry these runs; only a run that cannot be retried
        // is a real failure.
        "worker-shutdown" | "intermittent-task" => Some(if retries_left == 0 {
            CheckConclusion::Failure
        } else {
            CheckConclusion::Neutral
        }),
        "malformed-payload" => Some(CheckConclusion::ActionRequired),
        "resource-unavailable" => Some(CheckConclusion::Failure),
        "internal-error" => Some(CheckConclusion::Failure),
        _ => None,
    }
}

fn default_reason(kind: TaskEventKind) -> &'static str {
    match kind {
        TaskEventKind::Completed => "completed",
        TaskEventKind::Failed => "failed",
        _ => "exception",
    }
}

/// Assembles the check run's markdown body against a byte budget.
///
/// Sections are kept in the order they were appended; when the budget runs
/// out, the latest-appended content is truncated first and anything after it
/// is dropped, so the task link at the top always survives.
pub(crate) struct CheckOutputBuilder {
    budget: usize,
    sections: Vec<String>,
}

impl CheckOutputBuilder {
    pub(crate) fn new(budget: usize) -> Self {
        CheckOutputBuilder {
            budget,
            sections: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, section: impl Into<String>) {
        self.sections.push(section.into());
    }

    pub(crate) fn build(self) -> String {
        const SEPARATOR: &str = "\n\n";
        const MARKER: &str = "\n...(truncated)";

        let mut out = String::new();
        for section in self.sections {
            let prefix = if out.is_empty() { "" } else { SEPARATOR };
            let needed = prefix.len() + section.len();
            let remaining = self.budget.saturating_sub(out.len());
            if needed <= remaining {
                out.push_str(prefix);
                out.push_str(&section);
                continue;
            }
            // Not enough room for the whole section: cut it down, keep what
            // fits, and stop. Earlier sections always win.
            let room = remaining.saturating_sub(prefix.len() + MARKER.len());
            if room > 0 {
                let mut cut = room.min(section.len());
                while cut > 0 && !section.is_char_boundary(cut) {
                    cut -= 1;
                }
                out.push_str(prefix);
                out.push_str(&section[..cut]);
                out.push_str(MARKER);
            }
            break;
        }
        out
    }
}

/// Returns the last `max_bytes` of a log, decoded lossily.
fn log_tail(bytes: &[u8], max_bytes: usize) -> String {
    let start = bytes.len().saturating_sub(max_bytes);
    String::from_utf8_lossy(&bytes[start..]).into_owned()
}

impl Handlers {
    /// Handles one task lifecycle message, updating the task's check run.
    #[instrument(skip(self, message), fields(
        task_id = %message.status.task_id,
        task_group_id = %message.status.task_group_id,
        kind = ?message.kind,
        run_id = message.run_id,
    ))]
    pub async fn handle_task_status(&self, message: TaskStatusMessage) -> Result<()> {
        let task_id = message.status.task_id.clone();
        // Serialize all updates for this task. The lease bounds the damage a
        // stuck handler can do; release on drop is idempotent with it.
        let _guard = self.locks.acquire(task_id.as_str()).await;
        self.reconcile_check_run(&message).await
    }

    async fn reconcile_check_run(&self, message: &TaskStatusMessage) -> Result<()> {
        let task_id = &message.status.task_id;
        let task_group_id = &message.status.task_group_id;

        // A task without a build row was not created by this service
        // (externally triggered onto our routes); nothing to reconcile.
        let Some(build) = self.store.get_build(task_group_id).await? else {
            debug!("no build for task group; ignoring unrelated task");
            return Ok(());
        };
        let repo = RepoId::new(&build.organization, &build.repository);

        let (status, conclusion) = match message.kind {
            TaskEventKind::Defined => (CheckRunStatus::Queued, None),
            TaskEventKind::Running => (CheckRunStatus::InProgress, None),
            TaskEventKind::Completed | TaskEventKind::Failed | TaskEventKind::Exception => {
                let reason = message
                    .status
                    .run(message.run_id)
                    .and_then(|r| r.reason_resolved.clone())
                    .unwrap_or_else(|| default_reason(message.kind).to_string());
                let conclusion = match conclusion_for(&reason, message.status.retries_left) {
                    Some(conclusion) => conclusion,
                    None => {
                        self.monitor.report_error(&format!(
                            "unknown task resolution reason '{reason}' for task {task_id}; \
                             reporting neutral"
                        ));
                        CheckConclusion::Neutral
                    }
                };
                (CheckRunStatus::Completed, Some(conclusion))
            }
        };

        // Everything below the status itself is garnish: fetched
        // best-effort, never fatal.
        let task_name = self.task_name(task_id).await;
        let mut text = CheckOutputBuilder::new(MAX_CHECK_OUTPUT_BYTES);
        text.push(format!(
            "[View task in Taskcluster]({})",
            self.config.task_url(task_id)
        ));
        let mut annotations = Vec::new();
        if status == CheckRunStatus::Completed {
            text.push(format!(
                "[View logs in Taskcluster]({})",
                self.config.task_log_url(task_id, message.run_id)
            ));
            if let Some(tail) = self.fetch_log_tail(task_id, message.run_id).await {
                text.push(format!("```\n{}\n```", tail));
            }
            if let Some(custom) = self.fetch_custom_text(task_id, message.run_id, &build).await? {
                text.push(custom);
            }
            annotations = self
                .fetch_custom_annotations(task_id, message.run_id, &build)
                .await?;
        }

        let output = CheckRunOutput {
            title: task_name.clone(),
            summary: match conclusion {
                Some(conclusion) => format!("Task resolved: {}", conclusion.as_str()),
                None => format!("Task is {}", status.as_str()),
            },
            text: text.build(),
            annotations,
        };

        let mapping = self
            .store
            .check_mapping_by_task_group_and_task(task_group_id, task_id)
            .await?;

        // A rerun shows up as in_progress with a run index above zero while
        // we already track a check run. That check run has completed and
        // cannot be reopened, so the task gets a fresh check identity and
        // the mapping is replaced.
        let rerun_transition = message.kind == TaskEventKind::Running
            && message.run_id > 0
            && mapping.is_some();

        match mapping {
            Some(mapping) if !rerun_transition => {
                self.github
                    .update_check_run(
                        &repo,
                        mapping.check_run_id,
                        CheckRunUpdate {
                            status,
                            conclusion,
                            output: Some(output),
                        },
                    )
                    .await?;
            }
            prior => {
                if prior.is_some() {
                    info!("rerun detected; creating fresh check run");
                }
                let created = self
                    .github
                    .create_check_run(
                        &repo,
                        CheckRunCreate {
                            name: task_name,
                            head_sha: build.sha.clone(),
                            details_url: self.config.task_url(task_id),
                            external_id: task_id.to_string(),
                            status,
                            conclusion,
                            output: Some(output),
                        },
                    )
                    .await?;
                self.store
                    .upsert_check_mapping(&CheckMapping {
                        task_group_id: task_group_id.clone(),
                        task_id: task_id.clone(),
                        check_suite_id: created.check_suite_id,
                        check_run_id: created.check_run_id,
                    })
                    .await?;
            }
        }

        Ok(())
    }

    /// The task's display name, falling back to its id when the definition
    /// cannot be fetched.
    async fn task_name(&self, task_id: &TaskId) -> String {
        match self.queue.task(task_id).await {
            Ok(definition) => definition
                .pointer("/metadata/name")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| task_id.to_string()),
            Err(e) => {
                debug!(error = %e, "could not fetch task definition");
                task_id.to_string()
            }
        }
    }

    /// The tail of the run's live log, or nothing. 4xx (no log) contributes
    /// nothing; 5xx after retries goes to monitoring.
    async fn fetch_log_tail(&self, task_id: &TaskId, run_id: u32) -> Option<String> {
        match queue::fetch_artifact(self.queue.as_ref(), task_id, run_id, LIVE_LOG_ARTIFACT).await {
            Ok(bytes) => Some(log_tail(&bytes, LOG_TAIL_BYTES)),
            Err(e) if e.is_transient() => {
                self.monitor.report_error(&e);
                None
            }
            Err(e) => {
                debug!(error = %e, "no live log for run");
                None
            }
        }
    }

    /// The task's custom check-run text, if it published one. A 4xx other
    /// than plain absence is the task author's problem and is reported as a
    /// comment.
    async fn fetch_custom_text(
        &self,
        task_id: &TaskId,
        run_id: u32,
        build: &crate::types::Build,
    ) -> Result<Option<String>> {
        match queue::fetch_artifact(self.queue.as_ref(), task_id, run_id, CUSTOM_TEXT_ARTIFACT)
            .await
        {
            Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) if e.is_transient() => {
                self.monitor.report_error(&e);
                Ok(None)
            }
            Err(e) => {
                let repo = RepoId::new(&build.organization, &build.repository);
                self.create_exception_comment(
                    &repo,
                    &build.sha,
                    &format!("failed to fetch {CUSTOM_TEXT_ARTIFACT}: {e}"),
                    build.pull_number,
                )
                .await?;
                Ok(None)
            }
        }
    }

    /// The task's custom annotations, if it published valid ones.
    async fn fetch_custom_annotations(
        &self,
        task_id: &TaskId,
        run_id: u32,
        build: &crate::types::Build,
    ) -> Result<Vec<Value>> {
        let bytes = match queue::fetch_artifact(
            self.queue.as_ref(),
            task_id,
            run_id,
            CUSTOM_ANNOTATIONS_ARTIFACT,
        )
        .await
        {
            Ok(bytes) => bytes,
            Err(e) if e.is_not_found() => return Ok(Vec::new()),
            Err(e) if e.is_transient() => {
                self.monitor.report_error(&e);
                return Ok(Vec::new());
            }
            Err(e) => {
                let repo = RepoId::new(&build.organization, &build.repository);
                self.create_exception_comment(
                    &repo,
                    &build.sha,
                    &format!("failed to fetch {CUSTOM_ANNOTATIONS_ARTIFACT}: {e}"),
                    build.pull_number,
                )
                .await?;
                return Ok(Vec::new());
            }
        };
        match serde_json::from_slice::<Vec<Value>>(&bytes) {
            Ok(annotations) => Ok(annotations),
            Err(e) => {
                let repo = RepoId::new(&build.organization, &build.repository);
                self.create_exception_comment(
                    &repo,
                    &build.sha,
                    &format!("{CUSTOM_ANNOTATIONS_ARTIFACT} is not a JSON array of annotations: {e}"),
                    build.pull_number,
                )
                .await?;
                Ok(Vec::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::TaskEventKind;
    use crate::github::CheckRunStatus;
    use crate::queue::QueueError;
    use crate::store::BuildStore;
    use crate::test_utils::*;
    use crate::types::{CheckRunId, CheckSuiteId, TaskGroupId, TaskId};
    use proptest::prelude::*;
    use std::sync::Arc;
    use std::time::Duration;

    // ─── Conclusion table ───

    #[test]
    fn known_reasons_map_per_table() {
        assert_eq!(
            conclusion_for("completed", 5),
            Some(CheckConclusion::Success)
        );
        assert_eq!(conclusion_for("failed", 5), Some(CheckConclusion::Failure));
        assert_eq!(
            conclusion_for("exception", 5),
            Some(CheckConclusion::Failure)
        );
        assert_eq!(
            conclusion_for("deadline-exceeded", 5),
            Some(CheckConclusion::TimedOut)
        );
        assert_eq!(
            conclusion_for("canceled", 5),
            Some(CheckConclusion::Cancelled)
        );
        assert_eq!(
            conclusion_for("superseded", 5),
            Some(CheckConclusion::Neutral)
        );
        assert_eq!(
            conclusion_for("claim-expired", 5),
            Some(CheckConclusion::Failure)
        );
        assert_eq!(
            conclusion_for("malformed-payload", 5),
            Some(CheckConclusion::ActionRequired)
        );
        assert_eq!(
            conclusion_for("resource-unavailable", 5),
            Some(CheckConclusion::Failure)
        );
        assert_eq!(
            conclusion_for("internal-error", 5),
            Some(CheckConclusion::Failure)
        );
    }

    #[test]
    fn retryable_reasons_depend_on_retries_left() {
        for reason in ["worker-shutdown", "intermittent-task"] {
            assert_eq!(conclusion_for(reason, 3), Some(CheckConclusion::Neutral));
            assert_eq!(conclusion_for(reason, 0), Some(CheckConclusion::Failure));
        }
    }

    proptest! {
        /// Any input at all yields Some mapped conclusion or None; never a panic.
        #[test]
        fn conclusion_total_over_arbitrary_reasons(reason in ".{0,40}", retries in 0u32..10) {
            let _ = conclusion_for(&reason, retries);
        }
    }

    // ─── Output budget ───

    #[test]
    fn output_keeps_sections_within_budget() {
        let mut builder = CheckOutputBuilder::new(50);
        builder.push("first");
        builder.push("second");
        let out = builder.build();
        assert_eq!(out, "first\n\nsecond");
    }

    #[test]
    fn output_truncates_latest_appended_first() {
        let mut builder = CheckOutputBuilder::new(40);
        builder.push("header line");
        builder.push("x".repeat(100));
        builder.push("never fits");
        let out = builder.build();

        assert!(out.starts_with("header line"));
        assert!(out.len() <= 40);
        assert!(out.contains("...(truncated)"));
        assert!(!out.contains("never fits"));
    }

    #[test]
    fn output_drops_section_when_not_even_marker_fits() {
        let mut builder = CheckOutputBuilder::new(6);
        builder.push("header");
        builder.push("tail");
        let out = builder.build();
        assert_eq!(out, "header");
    }

    #[test]
    fn log_tail_takes_last_bytes() {
        let log = b"line one\nline two\nline three\n";
        let tail = log_tail(log, 11);
        assert_eq!(tail, "line three\n");
        let full = log_tail(log, 1000);
        assert_eq!(full, "line one\nline two\nline three\n");
    }

    // ─── Check run lifecycle ───

    #[tokio::test]
    async fn defined_creates_queued_check_run_and_mapping() {
        let h = Harness::new();
        seed_build(&h, "tg-1", None).await;

        h.handlers
            .handle_task_status(task_status(TaskEventKind::Defined, "task-1", "tg-1", 0, None, 5))
            .await
            .unwrap();

        let created = h.hosting.created_check_runs();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].create.status, CheckRunStatus::Queued);
        assert_eq!(created[0].create.external_id, "task-1");

        let mapping = h
            .store
            .check_mapping_by_task_group_and_task(
                &TaskGroupId::new("tg-1"),
                &TaskId::new("task-1"),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(mapping.check_run_id, created[0].id.check_run_id);
    }

    #[tokio::test]
    async fn running_updates_existing_check_run() {
        let h = Harness::new();
        seed_build(&h, "tg-1", None).await;
        seed_mapping(&h, "tg-1", "task-1", 1, 100).await;

        h.handlers
            .handle_task_status(task_status(TaskEventKind::Running, "task-1", "tg-1", 0, None, 5))
            .await
            .unwrap();

        assert!(h.hosting.created_check_runs().is_empty());
        let updates = h.hosting.check_run_updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].0, CheckRunId(100));
        assert_eq!(updates[0].1.status, CheckRunStatus::InProgress);
    }

    #[tokio::test]
    async fn completion_updates_with_conclusion() {
        let h = Harness::new();
        seed_build(&h, "tg-1", None).await;
        seed_mapping(&h, "tg-1", "task-1", 1, 100).await;

        h.handlers
            .handle_task_status(task_status(
                TaskEventKind::Failed,
                "task-1",
                "tg-1",
                0,
                Some("deadline-exceeded"),
                5,
            ))
            .await
            .unwrap();

        let updates = h.hosting.check_run_updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].1.status, CheckRunStatus::Completed);
        assert_eq!(updates[0].1.conclusion, Some(CheckConclusion::TimedOut));
    }

    #[tokio::test]
    async fn unknown_reason_reports_neutral_and_monitors() {
        let h = Harness::new();
        seed_build(&h, "tg-1", None).await;
        seed_mapping(&h, "tg-1", "task-1", 1, 100).await;

        h.handlers
            .handle_task_status(task_status(
                TaskEventKind::Exception,
                "task-1",
                "tg-1",
                0,
                Some("cosmic-rays"),
                5,
            ))
            .await
            .unwrap();

        let updates = h.hosting.check_run_updates();
        assert_eq!(updates[0].1.conclusion, Some(CheckConclusion::Neutral));
        let errors = h.monitor.errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("cosmic-rays"));
    }

    #[tokio::test]
    async fn unrelated_task_is_a_noop() {
        let h = Harness::new();
        // No build seeded.
        h.handlers
            .handle_task_status(task_status(TaskEventKind::Running, "task-1", "tg-404", 0, None, 5))
            .await
            .unwrap();

        assert!(h.hosting.created_check_runs().is_empty());
        assert!(h.hosting.check_run_updates().is_empty());
    }

    // ─── Rerun transition ───

    #[tokio::test]
    async fn rerun_creates_fresh_check_identity() {
        let h = Harness::new();
        seed_build(&h, "tg-1", None).await;
        seed_mapping(&h, "tg-1", "task-1", 1, 100).await;

        // in_progress with run index 1 while a mapping exists: a completed
        // check run cannot be reopened.
        h.handlers
            .handle_task_status(task_status(TaskEventKind::Running, "task-1", "tg-1", 1, None, 5))
            .await
            .unwrap();

        assert!(h.hosting.check_run_updates().is_empty());
        let created = h.hosting.created_check_runs();
        assert_eq!(created.len(), 1);

        let mapping = h
            .store
            .check_mapping_by_task_group_and_task(
                &TaskGroupId::new("tg-1"),
                &TaskId::new("task-1"),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(mapping.check_run_id, created[0].id.check_run_id);
        assert_ne!(mapping.check_run_id, CheckRunId(100));

        // The old identity is superseded, not merged.
        assert!(
            h.store
                .check_mapping_by_run_ids(CheckSuiteId(1), CheckRunId(100))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn first_run_in_progress_is_not_a_rerun() {
        let h = Harness::new();
        seed_build(&h, "tg-1", None).await;
        seed_mapping(&h, "tg-1", "task-1", 1, 100).await;

        h.handlers
            .handle_task_status(task_status(TaskEventKind::Running, "task-1", "tg-1", 0, None, 5))
            .await
            .unwrap();

        // run 0: same identity is updated.
        assert!(h.hosting.created_check_runs().is_empty());
        assert_eq!(h.hosting.check_run_updates().len(), 1);
    }

    // ─── Scenario A: out-of-order completion ───

    #[tokio::test]
    async fn later_message_wins_even_when_earlier_handler_is_slow() {
        let h = Harness::new();
        seed_build(&h, "tg-1", None).await;
        seed_mapping(&h, "tg-1", "task-1", 1, 100).await;

        // The first handler's GitHub call is slow; the second message's
        // handler finishes its I/O first but must wait for the lock.
        h.hosting
            .delay_check_run_update(CheckRunId(100), Duration::from_millis(100));

        let handlers = Arc::clone(&h.handlers);
        let first = tokio::spawn(async move {
            handlers
                .handle_task_status(task_status(
                    TaskEventKind::Completed,
                    "task-1",
                    "tg-1",
                    0,
                    Some("completed"),
                    5,
                ))
                .await
        });
        // Let the first handler take the lock before issuing the second.
        tokio::time::sleep(Duration::from_millis(10)).await;

        let handlers = Arc::clone(&h.handlers);
        let second = tokio::spawn(async move {
            handlers
                .handle_task_status(task_status(TaskEventKind::Running, "task-1", "tg-1", 0, None, 5))
                .await
        });

        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();

        let updates = h.hosting.check_run_updates();
        assert_eq!(updates.len(), 2);
        // Arrival order decided the final state: the run that was issued
        // second lands last, so the check run is not left completed.
        assert_eq!(updates[0].1.status, CheckRunStatus::Completed);
        assert_eq!(updates[1].1.status, CheckRunStatus::InProgress);
    }

    // ─── Best-effort output ───

    #[tokio::test]
    async fn completion_includes_log_tail_and_custom_text() {
        let h = Harness::new();
        seed_build(&h, "tg-1", None).await;
        seed_mapping(&h, "tg-1", "task-1", 1, 100).await;
        h.queue.put_artifact(
            "task-1",
            0,
            LIVE_LOG_ARTIFACT,
            b"[taskcluster] task completed".to_vec(),
        );
        h.queue.put_artifact(
            "task-1",
            0,
            CUSTOM_TEXT_ARTIFACT,
            b"### All 42 tests passed".to_vec(),
        );

        h.handlers
            .handle_task_status(task_status(
                TaskEventKind::Completed,
                "task-1",
                "tg-1",
                0,
                Some("completed"),
                5,
            ))
            .await
            .unwrap();

        let updates = h.hosting.check_run_updates();
        let output = updates[0].1.output.as_ref().unwrap();
        assert!(output.text.contains("View task in Taskcluster"));
        assert!(output.text.contains("task completed"));
        assert!(output.text.contains("All 42 tests passed"));
    }

    #[tokio::test]
    async fn missing_artifacts_contribute_nothing() {
        let h = Harness::new();
        seed_build(&h, "tg-1", None).await;
        seed_mapping(&h, "tg-1", "task-1", 1, 100).await;

        h.handlers
            .handle_task_status(task_status(
                TaskEventKind::Completed,
                "task-1",
                "tg-1",
                0,
                Some("completed"),
                5,
            ))
            .await
            .unwrap();

        assert!(h.monitor.errors().is_empty());
        assert!(h.hosting.commit_comments().is_empty());
        let updates = h.hosting.check_run_updates();
        assert_eq!(updates[0].1.conclusion, Some(CheckConclusion::Success));
    }

    #[tokio::test]
    async fn custom_artifact_client_error_is_reported_as_comment() {
        let h = Harness::new();
        seed_build(&h, "tg-1", None).await;
        seed_mapping(&h, "tg-1", "task-1", 1, 100).await;
        h.queue.fail_artifact(
            "task-1",
            0,
            CUSTOM_TEXT_ARTIFACT,
            QueueError::from_status(403, "artifact is private"),
        );

        h.handlers
            .handle_task_status(task_status(
                TaskEventKind::Completed,
                "task-1",
                "tg-1",
                0,
                Some("completed"),
                5,
            ))
            .await
            .unwrap();

        let comments = h.hosting.commit_comments();
        assert_eq!(comments.len(), 1);
        assert!(comments[0].1.contains("customCheckRunText.md"));
        // The check run still updated.
        assert_eq!(h.hosting.check_run_updates().len(), 1);
    }

    #[tokio::test]
    async fn invalid_annotations_are_reported_and_skipped() {
        let h = Harness::new();
        seed_build(&h, "tg-1", None).await;
        seed_mapping(&h, "tg-1", "task-1", 1, 100).await;
        h.queue.put_artifact(
            "task-1",
            0,
            CUSTOM_ANNOTATIONS_ARTIFACT,
            b"{ not json ]".to_vec(),
        );

        h.handlers
            .handle_task_status(task_status(
                TaskEventKind::Completed,
                "task-1",
                "tg-1",
                0,
                Some("completed"),
                5,
            ))
            .await
            .unwrap();

        assert_eq!(h.hosting.commit_comments().len(), 1);
        let updates = h.hosting.check_run_updates();
        assert!(updates[0].1.output.as_ref().unwrap().annotations.is_empty());
    }

    #[tokio::test]
    async fn check_run_name_comes_from_task_metadata() {
        let h = Harness::new();
        seed_build(&h, "tg-1", None).await;
        h.queue.put_task_definition(
            "task-1",
            serde_json::json!({ "metadata": { "name": "lint(rust)" } }),
        );

        h.handlers
            .handle_task_status(task_status(TaskEventKind::Defined, "task-1", "tg-1", 0, None, 5))
            .await
            .unwrap();

        let created = h.hosting.created_check_runs();
        assert_eq!(created[0].create.name, "lint(rust)");
    }
}
