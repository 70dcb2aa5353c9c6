//! Admission control for pull-request and comment-triggered events.
//!
//! The policy is always read from the configuration at the repository's
//! **default branch**, never from the event's own ref: consulting the event's
//! ref would let an untrusted branch grant itself trust by editing the file.

use serde_json::Value;
use tracing::debug;

use crate::bus::EventPullRequest;
use crate::compiler::ScopeMode;
use crate::github::{self, HostingApi};
use crate::types::RepoId;

/// Pull-request admission policy, from `.taskcluster.yml` on the default
/// branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullRequestPolicy {
    /// Opener and head-repo owner must be collaborators (default). A denial
    /// posts a comment on newly opened pull requests.
    Collaborators,
    /// Same check as `Collaborators`, but denials never post a comment.
    CollaboratorsQuiet,
    /// Every pull request is admitted.
    Public,
    /// Every pull request is admitted, but non-collaborators get the
    /// untrusted task-creation scope set.
    PublicRestricted,
}

impl PullRequestPolicy {
    /// Extracts the policy from a parsed configuration.
    ///
    /// Version 0 configs carry it in `allowPullRequests`, version 1 in
    /// `policy.pullRequests`. Absent or unrecognized values fall back to the
    /// default.
    pub fn from_config(config: &Value) -> Self {
        let raw = match config.get("version").and_then(Value::as_u64) {
            Some(0) => config.get("allowPullRequests").and_then(Value::as_str),
            Some(1) => config
                .get("policy")
                .and_then(|p| p.get("pullRequests"))
                .and_then(Value::as_str),
            _ => None,
        };
        match raw {
            Some("collaborators") => PullRequestPolicy::Collaborators,
            Some("collaborators_quiet") => PullRequestPolicy::CollaboratorsQuiet,
            Some("public") => PullRequestPolicy::Public,
            Some("public_restricted") => PullRequestPolicy::PublicRestricted,
            _ => PullRequestPolicy::Collaborators,
        }
    }
}

/// Whether comment-triggered task creation is enabled at all.
///
/// Only `collaborators` is a meaningful value; anything else (including an
/// absent config) disables the feature rather than erroring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentPolicy {
    Collaborators,
    Disabled,
}

impl CommentPolicy {
    pub fn from_config(config: &Value) -> Self {
        let raw = config
            .get("policy")
            .and_then(|p| p.get("allowComments"))
            .and_then(Value::as_str);
        match raw {
            Some("collaborators") => CommentPolicy::Collaborators,
            _ => CommentPolicy::Disabled,
        }
    }
}

/// Outcome of an admission decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Proceed, creating tasks with the given trust level.
    Admitted(ScopeMode),
    /// Do not create tasks. `quiet` suppresses the rejection comment.
    Denied { quiet: bool },
}

/// `is_collaborator` with the original's 404 tolerance: an unknown user is
/// simply not a collaborator.
async fn is_collaborator(
    github: &dyn HostingApi,
    repo: &RepoId,
    login: &str,
) -> github::Result<bool> {
    match github.is_collaborator(repo, login).await {
        Ok(answer) => Ok(answer),
        Err(e) if e.is_not_found() => Ok(false),
        Err(e) => Err(e),
    }
}

/// Decides admission for a pull-request event.
///
/// `default_branch_config` is the configuration at the default branch, or
/// `None` when the repository has none there - in which case collaborators
/// may still test before initializing, quietly.
pub async fn evaluate_pull_request(
    github: &dyn HostingApi,
    repo: &RepoId,
    default_branch_config: Option<&Value>,
    pr: &EventPullRequest,
) -> github::Result<Admission> {
    let policy = match default_branch_config {
        Some(config) => PullRequestPolicy::from_config(config),
        None => PullRequestPolicy::CollaboratorsQuiet,
    };

    match policy {
        PullRequestPolicy::Public => Ok(Admission::Admitted(ScopeMode::Trusted)),
        PullRequestPolicy::PublicRestricted => {
            let trusted = is_collaborator(github, repo, &pr.opener).await?;
            let mode = if trusted {
                ScopeMode::Trusted
            } else {
                ScopeMode::Untrusted
            };
            Ok(Admission::Admitted(mode))
        }
        PullRequestPolicy::Collaborators | PullRequestPolicy::CollaboratorsQuiet => {
            let quiet = policy == PullRequestPolicy::CollaboratorsQuiet;

            // The PR must have been opened by a collaborator AND be merging
            // code from a collaborator or from the repo it is filed against.
            let opener_is_collaborator = is_collaborator(github, repo, &pr.opener).await?;
            let head_is_collaborator = if pr.head_owner == pr.opener {
                opener_is_collaborator
            } else {
                is_collaborator(github, repo, &pr.head_owner).await?
            };
            let head_is_base = pr.head_owner == pr.base_owner;

            if opener_is_collaborator && (head_is_collaborator || head_is_base) {
                Ok(Admission::Admitted(ScopeMode::Trusted))
            } else {
                debug!(repo = %repo, opener = %pr.opener, head = %pr.head_owner,
                    "pull request denied by collaborator policy");
                Ok(Admission::Denied { quiet })
            }
        }
    }
}

/// Decides whether a comment-triggered command may create tasks.
///
/// Returns false (silently) when the feature is disabled or the author lacks
/// write access; comments never produce denial feedback.
pub async fn evaluate_comment(
    github: &dyn HostingApi,
    repo: &RepoId,
    default_branch_config: Option<&Value>,
    author: &str,
) -> github::Result<bool> {
    let policy = match default_branch_config {
        Some(config) => CommentPolicy::from_config(config),
        None => CommentPolicy::Disabled,
    };
    match policy {
        CommentPolicy::Disabled => Ok(false),
        CommentPolicy::Collaborators => is_collaborator(github, repo, author).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::FakeHosting;
    use crate::types::PullNumber;
    use serde_json::json;
    use std::sync::Arc;

    fn pr(opener: &str, head_owner: &str, base_owner: &str) -> EventPullRequest {
        EventPullRequest {
            number: PullNumber(42),
            opener: opener.to_string(),
            head_owner: head_owner.to_string(),
            base_owner: base_owner.to_string(),
        }
    }

    fn repo() -> RepoId {
        RepoId::new("octo-org", "widgets")
    }

    fn v1(policy: &str) -> Value {
        json!({ "version": 1, "policy": { "pullRequests": policy } })
    }

    fn hosting_with_collaborators(logins: &[&str]) -> Arc<FakeHosting> {
        let hosting = Arc::new(FakeHosting::new());
        for login in logins {
            hosting.add_collaborator(login);
        }
        hosting
    }

    // ─── Policy parsing ───

    #[test]
    fn version_1_policy_parsing() {
        assert_eq!(
            PullRequestPolicy::from_config(&v1("collaborators")),
            PullRequestPolicy::Collaborators
        );
        assert_eq!(
            PullRequestPolicy::from_config(&v1("collaborators_quiet")),
            PullRequestPolicy::CollaboratorsQuiet
        );
        assert_eq!(
            PullRequestPolicy::from_config(&v1("public")),
            PullRequestPolicy::Public
        );
        assert_eq!(
            PullRequestPolicy::from_config(&v1("public_restricted")),
            PullRequestPolicy::PublicRestricted
        );
    }

    #[test]
    fn version_0_uses_allow_pull_requests() {
        let config = json!({ "version": 0, "allowPullRequests": "public" });
        assert_eq!(
            PullRequestPolicy::from_config(&config),
            PullRequestPolicy::Public
        );
    }

    #[test]
    fn absent_or_unknown_policy_defaults_to_collaborators() {
        assert_eq!(
            PullRequestPolicy::from_config(&json!({ "version": 1 })),
            PullRequestPolicy::Collaborators
        );
        assert_eq!(
            PullRequestPolicy::from_config(&v1("everyone-welcome")),
            PullRequestPolicy::Collaborators
        );
    }

    #[test]
    fn comment_policy_only_collaborators_enables() {
        let enabled = json!({ "version": 1, "policy": { "allowComments": "collaborators" } });
        assert_eq!(
            CommentPolicy::from_config(&enabled),
            CommentPolicy::Collaborators
        );

        let unknown = json!({ "version": 1, "policy": { "allowComments": "anyone" } });
        assert_eq!(CommentPolicy::from_config(&unknown), CommentPolicy::Disabled);
        assert_eq!(
            CommentPolicy::from_config(&json!({ "version": 1 })),
            CommentPolicy::Disabled
        );
    }

    // ─── Pull-request admission ───

    #[tokio::test]
    async fn collaborator_same_repo_pr_is_admitted() {
        let hosting = hosting_with_collaborators(&["alice"]);
        let admission = evaluate_pull_request(
            hosting.as_ref(),
            &repo(),
            Some(&v1("collaborators")),
            &pr("alice", "alice", "octo-org"),
        )
        .await
        .unwrap();
        assert_eq!(admission, Admission::Admitted(ScopeMode::Trusted));
    }

    #[tokio::test]
    async fn non_collaborator_is_denied_loudly_by_default_policy() {
        let hosting = hosting_with_collaborators(&[]);
        let admission = evaluate_pull_request(
            hosting.as_ref(),
            &repo(),
            Some(&v1("collaborators")),
            &pr("mallory", "mallory", "octo-org"),
        )
        .await
        .unwrap();
        assert_eq!(admission, Admission::Denied { quiet: false });
    }

    #[tokio::test]
    async fn quiet_policy_denies_quietly() {
        let hosting = hosting_with_collaborators(&[]);
        let admission = evaluate_pull_request(
            hosting.as_ref(),
            &repo(),
            Some(&v1("collaborators_quiet")),
            &pr("mallory", "mallory", "octo-org"),
        )
        .await
        .unwrap();
        assert_eq!(admission, Admission::Denied { quiet: true });
    }

    #[tokio::test]
    async fn collaborator_opener_with_base_owned_head_is_admitted() {
        // Changes come from the repo the PR is filed against; the head owner
        // need not be a collaborator themselves.
        let hosting = hosting_with_collaborators(&["alice"]);
        let admission = evaluate_pull_request(
            hosting.as_ref(),
            &repo(),
            Some(&v1("collaborators")),
            &pr("alice", "octo-org", "octo-org"),
        )
        .await
        .unwrap();
        assert_eq!(admission, Admission::Admitted(ScopeMode::Trusted));
    }

    #[tokio::test]
    async fn collaborator_opener_with_foreign_fork_is_denied() {
        let hosting = hosting_with_collaborators(&["alice"]);
        let admission = evaluate_pull_request(
            hosting.as_ref(),
            &repo(),
            Some(&v1("collaborators")),
            &pr("alice", "stranger", "octo-org"),
        )
        .await
        .unwrap();
        assert_eq!(admission, Admission::Denied { quiet: false });
    }

    #[tokio::test]
    async fn public_policy_admits_anyone() {
        let hosting = hosting_with_collaborators(&[]);
        let admission = evaluate_pull_request(
            hosting.as_ref(),
            &repo(),
            Some(&v1("public")),
            &pr("mallory", "mallory", "octo-org"),
        )
        .await
        .unwrap();
        assert_eq!(admission, Admission::Admitted(ScopeMode::Trusted));
    }

    #[tokio::test]
    async fn public_restricted_downgrades_non_collaborators() {
        let hosting = hosting_with_collaborators(&["alice"]);

        let admission = evaluate_pull_request(
            hosting.as_ref(),
            &repo(),
            Some(&v1("public_restricted")),
            &pr("alice", "alice", "octo-org"),
        )
        .await
        .unwrap();
        assert_eq!(admission, Admission::Admitted(ScopeMode::Trusted));

        let admission = evaluate_pull_request(
            hosting.as_ref(),
            &repo(),
            Some(&v1("public_restricted")),
            &pr("mallory", "mallory", "octo-org"),
        )
        .await
        .unwrap();
        assert_eq!(admission, Admission::Admitted(ScopeMode::Untrusted));
    }

    #[tokio::test]
    async fn missing_default_branch_config_behaves_as_quiet_collaborators() {
        let hosting = hosting_with_collaborators(&["alice"]);

        let admitted = evaluate_pull_request(
            hosting.as_ref(),
            &repo(),
            None,
            &pr("alice", "alice", "octo-org"),
        )
        .await
        .unwrap();
        assert_eq!(admitted, Admission::Admitted(ScopeMode::Trusted));

        let denied = evaluate_pull_request(
            hosting.as_ref(),
            &repo(),
            None,
            &pr("mallory", "mallory", "octo-org"),
        )
        .await
        .unwrap();
        assert_eq!(denied, Admission::Denied { quiet: true });
    }

    // ─── Comment admission ───

    #[tokio::test]
    async fn comments_disabled_without_policy() {
        let hosting = hosting_with_collaborators(&["alice"]);
        let admitted = evaluate_comment(hosting.as_ref(), &repo(), None, "alice")
            .await
            .unwrap();
        assert!(!admitted);
    }

    #[tokio::test]
    async fn comments_gated_on_collaborator_author() {
        let hosting = hosting_with_collaborators(&["alice"]);
        let config = json!({ "version": 1, "policy": { "allowComments": "collaborators" } });

        assert!(
            evaluate_comment(hosting.as_ref(), &repo(), Some(&config), "alice")
                .await
                .unwrap()
        );
        assert!(
            !evaluate_comment(hosting.as_ref(), &repo(), Some(&config), "mallory")
                .await
                .unwrap()
        );
    }
}
