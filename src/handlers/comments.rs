//! User-facing comment bodies and duplicate suppression.
//!
//! Expected failures (bad config, insufficient scopes, policy denials) are
//! reported to users as comments. Repeated failures with the same root cause
//! must not spam the thread, so posted comments are remembered in a bounded
//! FIFO cache keyed by a hash of the identifying tuple.

use std::collections::VecDeque;

use sha2::{Digest, Sha256};

/// Bounded FIFO of comment keys that were already posted.
#[derive(Debug)]
pub struct CommentDedupeCache {
    capacity: usize,
    keys: VecDeque<String>,
}

impl CommentDedupeCache {
    pub fn new(capacity: usize) -> Self {
        CommentDedupeCache {
            capacity,
            keys: VecDeque::new(),
        }
    }

    /// Hashes the identifying parts of a comment into a cache key.
    pub fn key(idents: &[&str]) -> String {
        let mut hasher = Sha256::new();
        for ident in idents {
            hasher.update(ident.as_bytes());
            hasher.update([0u8]);
        }
        hex::encode(hasher.finalize())
    }

    pub fn is_duplicate(&self, key: &str) -> bool {
        self.keys.iter().any(|k| k == key)
    }

    /// Records a posted comment, evicting the oldest entry when full.
    pub fn mark_sent(&mut self, key: String) {
        self.keys.push_front(key);
        while self.keys.len() > self.capacity {
            self.keys.pop_back();
        }
    }
}

/// Body of the comment posted when handling an event failed in a way the
/// user can act on.
pub fn exception_comment_body(error_body: &str) -> String {
    [
        "<details>\n",
        "<summary>Uh oh! Looks like an error! Details</summary>",
        "",
        error_body, // already in Markdown
        "",
        "</details>",
    ]
    .join("\n")
}

/// Body of the comment posted when a pull request is denied by the
/// collaborator policy.
pub fn denial_comment_body() -> String {
    [
        "<details>\n",
        "<summary>No Taskcluster jobs started for this pull request</summary>\n\n",
        "```js\n",
        "The `allowPullRequests` configuration for this repository (in `.taskcluster.yml` on the",
        "default branch) does not allow starting tasks for this pull request.",
        "```\n",
        "</details>",
    ]
    .join("\n")
}

/// Body of the comment posted when a comment-triggered command compiled to
/// zero tasks.
pub fn no_jobs_for_command_body() -> String {
    [
        "<details>\n",
        "<summary>No Taskcluster jobs started for this command</summary>\n\n",
        "```js\n",
        "The `.taskcluster.yml` for this repository compiled with no tasks for this event.",
        "```\n",
        "</details>",
    ]
    .join("\n")
}

/// Rewrites an InsufficientScopes rejection into an actionable message that
/// echoes the scope set the service tried to use.
pub fn insufficient_scopes_body(scopes: &[String], queue_message: &str) -> String {
    let rendered = serde_json::to_string_pretty(scopes).unwrap_or_else(|_| format!("{scopes:?}"));
    [
        "Taskcluster-GitHub attempted to create a task for this event with the following scopes:",
        "",
        "```",
        rendered.as_str(),
        "```",
        "",
        "The expansion of these scopes is not sufficient to create the task, leading to the following:",
        "",
        queue_message,
    ]
    .join("\n")
}
