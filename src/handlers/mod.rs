//! Message handlers.
//!
//! One [`Handlers`] instance owns the capabilities every handler needs and is
//! shared by the dispatcher across all subscriptions. Handlers are invoked
//! concurrently and never serialized against each other by the dispatcher;
//! the per-task [`KeyedLock`] is the only serialization point, used by the
//! status reconciler.

pub mod comments;
pub mod deprecated_status;
pub mod error;
pub mod job;
pub mod rerun;
pub mod status;
pub mod task_group_creation;

use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::bus::Publisher;
use crate::compiler::{GraphCompiler, GraphConfig};
use crate::config::Config;
use crate::github::HostingApi;
use crate::monitor::Monitor;
use crate::queue::{self, TaskQueue};
use crate::store::BuildStore;
use crate::sync::KeyedLock;
use crate::types::{PullNumber, RepoId, Sha};

use comments::CommentDedupeCache;

pub use error::{HandlerError, Result};

/// Shared state and capabilities for all message handlers.
pub struct Handlers {
    pub(crate) config: Config,
    pub(crate) store: Arc<dyn BuildStore>,
    pub(crate) github: Arc<dyn HostingApi>,
    pub(crate) queue: Arc<dyn TaskQueue>,
    pub(crate) compiler: Arc<dyn GraphCompiler>,
    pub(crate) publisher: Arc<dyn Publisher>,
    pub(crate) monitor: Arc<dyn Monitor>,
    /// Serializes check-run updates per task id.
    pub(crate) locks: KeyedLock,
    comment_cache: Mutex<CommentDedupeCache>,
}

impl Handlers {
    pub fn new(
        config: Config,
        store: Arc<dyn BuildStore>,
        github: Arc<dyn HostingApi>,
        queue: Arc<dyn TaskQueue>,
        compiler: Arc<dyn GraphCompiler>,
        publisher: Arc<dyn Publisher>,
        monitor: Arc<dyn Monitor>,
    ) -> Self {
        let locks = KeyedLock::with_max_lock_time(config.max_lock_time);
        let comment_cache = Mutex::new(CommentDedupeCache::new(config.comment_cache_size));
        Handlers {
            config,
            store,
            github,
            queue,
            compiler,
            publisher,
            monitor,
            locks,
            comment_cache,
        }
    }

    /// Posts an error to the user as a comment, on the pull request when one
    /// is known, otherwise on the commit.
    ///
    /// Deduplicated: repeated failures with the same identifying tuple are
    /// posted once. Once posted, the error counts as handled and is not
    /// reported to monitoring.
    pub(crate) async fn create_exception_comment(
        &self,
        repo: &RepoId,
        sha: &Sha,
        error_body: &str,
        pull_number: Option<PullNumber>,
    ) -> Result<()> {
        self.post_deduplicated_comment(
            repo,
            sha,
            &comments::exception_comment_body(error_body),
            error_body,
            pull_number,
        )
        .await
    }

    /// Posts `body`, suppressing duplicates keyed on
    /// (org, repo, sha, cause, pull number).
    pub(crate) async fn post_deduplicated_comment(
        &self,
        repo: &RepoId,
        sha: &Sha,
        body: &str,
        cause: &str,
        pull_number: Option<PullNumber>,
    ) -> Result<()> {
        let pull_ident = pull_number.map(|p| p.0.to_string()).unwrap_or_default();
        let key = CommentDedupeCache::key(&[
            &repo.owner,
            &repo.repo,
            sha.as_str(),
            cause,
            &pull_ident,
        ]);
        {
            let cache = self.comment_cache.lock().unwrap_or_else(|e| e.into_inner());
            if cache.is_duplicate(&key) {
                debug!(repo = %repo, sha = %sha.short(), "duplicate comment suppressed");
                return Ok(());
            }
        }

        match pull_number {
            Some(number) => {
                self.github
                    .create_issue_comment(repo, number, body)
                    .await?;
            }
            None => {
                self.github.create_commit_comment(repo, sha, body).await?;
            }
        }

        self.comment_cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .mark_sent(key);
        Ok(())
    }

    /// Creates every task of a compiled graph through a queue client
    /// restricted to exactly the graph's scope set.
    pub(crate) async fn create_tasks(&self, graph: &GraphConfig) -> queue::Result<()> {
        let limited = self.queue.scoped(&graph.scopes);
        for task in &graph.tasks {
            limited.create_task(&task.task_id, &task.definition).await?;
        }
        Ok(())
    }
}
