//! Shared test doubles: in-memory fakes for every capability, plus message
//! and fixture builders used across the handler tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};

use crate::bus::{
    EventComment, EventPullRequest, GithubEventMessage, Publisher, PublishError,
    TaskEventKind, TaskGroupCreationRequestedMessage, TaskStatusMessage,
};
use crate::compiler::{CompileError, CompiledTask, GraphCompiler, GraphConfig, ScopeMode};
use crate::config::Config;
use crate::github::{
    CheckRunCreate, CheckRunUpdate, CommitStatus, CreatedCheckRun, HostingApi, HostingError,
    PullRequestInfo, RepoConfig,
};
use crate::handlers::Handlers;
use crate::monitor::RecordingMonitor;
use crate::queue::{
    QueueError, TaskGroupPage, TaskQueue, TaskRun, TaskState, TaskStatus,
};
use crate::store::{BuildStore, InMemoryBuildStore};
use crate::types::{
    Build, BuildState, CheckMapping, CheckRunId, CheckSuiteId, EventId, InstallationId,
    PullNumber, RepoId, Sha, TaskGroupId, TaskId,
};

// ─── Fixture constants ───

pub fn sha_a() -> Sha {
    Sha::new("a".repeat(40))
}

pub fn sha_b() -> Sha {
    Sha::new("b".repeat(40))
}

/// A minimal valid version-1 configuration.
pub fn parsed_config() -> Value {
    json!({ "version": 1 })
}

// ─── FakeHosting ───

/// A recorded check-run creation.
#[derive(Debug, Clone)]
pub struct RecordedCheckRun {
    pub id: CreatedCheckRun,
    pub create: CheckRunCreate,
}

#[derive(Debug, Default)]
struct HostingState {
    collaborators: Vec<String>,
    configs: HashMap<String, RepoConfig>,
    commits: HashMap<String, Sha>,
    pull_requests: HashMap<PullNumber, PullRequestInfo>,
    issue_comments: Vec<(PullNumber, String)>,
    commit_comments: Vec<(Sha, String)>,
    commit_statuses: Vec<(Sha, CommitStatus)>,
    created_check_runs: Vec<RecordedCheckRun>,
    check_run_updates: Vec<(CheckRunId, CheckRunUpdate)>,
    reactions: Vec<(u64, String)>,
    update_delays: HashMap<CheckRunId, Duration>,
    next_check_run_id: u64,
}

/// In-memory [`HostingApi`], scoped to a single notional repository.
#[derive(Debug)]
pub struct FakeHosting {
    state: Mutex<HostingState>,
}

impl FakeHosting {
    pub fn new() -> Self {
        FakeHosting {
            state: Mutex::new(HostingState {
                next_check_run_id: 1000,
                ..HostingState::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HostingState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_collaborator(&self, login: &str) {
        self.lock().collaborators.push(login.to_string());
    }

    pub fn put_config(&self, reference: &str, config: Value) {
        self.lock()
            .configs
            .insert(reference.to_string(), RepoConfig::Parsed(config));
    }

    pub fn put_malformed_config(&self, reference: &str, parse_error: &str) {
        self.lock().configs.insert(
            reference.to_string(),
            RepoConfig::Malformed(parse_error.to_string()),
        );
    }

    pub fn put_commit(&self, reference: &str, sha: Sha) {
        self.lock().commits.insert(reference.to_string(), sha);
    }

    pub fn put_pull_request(&self, number: u64, opener: &str, head_sha: Sha) {
        self.lock().pull_requests.insert(
            PullNumber(number),
            PullRequestInfo {
                head_sha,
                opener: opener.to_string(),
                head_owner: opener.to_string(),
                base_owner: "octo-org".to_string(),
            },
        );
    }

    /// Makes the next update of `run` sleep before being recorded, to
    /// simulate a slow network path.
    pub fn delay_check_run_update(&self, run: CheckRunId, delay: Duration) {
        self.lock().update_delays.insert(run, delay);
    }

    pub fn issue_comments(&self) -> Vec<(PullNumber, String)> {
        self.lock().issue_comments.clone()
    }

    pub fn commit_comments(&self) -> Vec<(Sha, String)> {
        self.lock().commit_comments.clone()
    }

    pub fn commit_statuses(&self) -> Vec<(Sha, CommitStatus)> {
        self.lock().commit_statuses.clone()
    }

    pub fn created_check_runs(&self) -> Vec<RecordedCheckRun> {
        self.lock().created_check_runs.clone()
    }

    pub fn check_run_updates(&self) -> Vec<(CheckRunId, CheckRunUpdate)> {
        self.lock().check_run_updates.clone()
    }

    pub fn reactions(&self) -> Vec<(u64, String)> {
        self.lock().reactions.clone()
    }
}

impl Default for FakeHosting {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HostingApi for FakeHosting {
    async fn repo_config(
        &self,
        _repo: &RepoId,
        reference: &str,
    ) -> crate::github::Result<Option<RepoConfig>> {
        Ok(self.lock().configs.get(reference).cloned())
    }

    async fn default_branch(&self, _repo: &RepoId) -> crate::github::Result<String> {
        Ok("main".to_string())
    }

    async fn commit_for_ref(&self, _repo: &RepoId, reference: &str) -> crate::github::Result<Sha> {
        self.lock()
            .commits
            .get(reference)
            .cloned()
            .ok_or_else(|| HostingError::from_status(404, format!("no commit for {reference}")))
    }

    async fn is_collaborator(&self, _repo: &RepoId, login: &str) -> crate::github::Result<bool> {
        Ok(self.lock().collaborators.iter().any(|l| l == login))
    }

    async fn pull_request(
        &self,
        _repo: &RepoId,
        number: PullNumber,
    ) -> crate::github::Result<PullRequestInfo> {
        self.lock()
            .pull_requests
            .get(&number)
            .cloned()
            .ok_or_else(|| HostingError::from_status(404, format!("no pull request {number}")))
    }

    async fn create_commit_status(
        &self,
        _repo: &RepoId,
        sha: &Sha,
        status: CommitStatus,
    ) -> crate::github::Result<()> {
        self.lock().commit_statuses.push((sha.clone(), status));
        Ok(())
    }

    async fn create_check_run(
        &self,
        _repo: &RepoId,
        check: CheckRunCreate,
    ) -> crate::github::Result<CreatedCheckRun> {
        let mut state = self.lock();
        let id = CreatedCheckRun {
            check_suite_id: CheckSuiteId(1),
            check_run_id: CheckRunId(state.next_check_run_id),
        };
        state.next_check_run_id += 1;
        state.created_check_runs.push(RecordedCheckRun {
            id,
            create: check,
        });
        Ok(id)
    }

    async fn update_check_run(
        &self,
        _repo: &RepoId,
        check_run_id: CheckRunId,
        update: CheckRunUpdate,
    ) -> crate::github::Result<()> {
        let delay = self.lock().update_delays.remove(&check_run_id);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.lock().check_run_updates.push((check_run_id, update));
        Ok(())
    }

    async fn create_issue_comment(
        &self,
        _repo: &RepoId,
        number: PullNumber,
        body: &str,
    ) -> crate::github::Result<()> {
        self.lock().issue_comments.push((number, body.to_string()));
        Ok(())
    }

    async fn create_commit_comment(
        &self,
        _repo: &RepoId,
        sha: &Sha,
        body: &str,
    ) -> crate::github::Result<()> {
        self.lock()
            .commit_comments
            .push((sha.clone(), body.to_string()));
        Ok(())
    }

    async fn add_comment_reaction(
        &self,
        _repo: &RepoId,
        comment_id: u64,
        reaction: &str,
    ) -> crate::github::Result<()> {
        self.lock().reactions.push((comment_id, reaction.to_string()));
        Ok(())
    }
}

// ─── FakeQueue ───

/// A task creation recorded with the scopes of the client that made it.
#[derive(Debug, Clone)]
pub struct CreatedTask {
    pub task_id: TaskId,
    pub definition: Value,
    pub scopes: Vec<String>,
}

/// A rerun recorded with the scopes of the client that made it.
#[derive(Debug, Clone)]
pub struct RecordedRerun {
    pub task_id: TaskId,
    pub scopes: Vec<String>,
}

#[derive(Debug, Default)]
struct QueueState {
    created: Vec<CreatedTask>,
    definitions: HashMap<TaskId, Value>,
    artifacts: HashMap<(TaskId, u32, String), Result<Vec<u8>, QueueError>>,
    groups: HashMap<TaskGroupId, Vec<TaskStatus>>,
    group_page_size: Option<usize>,
    reruns: Vec<RecordedRerun>,
    sealed: Vec<TaskGroupId>,
    cancelled: Vec<TaskGroupId>,
    create_error: Option<QueueError>,
    seal_error: Option<QueueError>,
    cancel_error: Option<QueueError>,
}

/// In-memory [`TaskQueue`]. `scoped` clients share the recording state and
/// tag their calls with the restricted scope set.
#[derive(Debug)]
pub struct FakeQueue {
    state: Arc<Mutex<QueueState>>,
    scopes: Vec<String>,
}

impl FakeQueue {
    pub fn new() -> Self {
        FakeQueue {
            state: Arc::new(Mutex::new(QueueState::default())),
            scopes: Vec::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn fail_create_task(&self, error: QueueError) {
        self.lock().create_error = Some(error);
    }

    pub fn fail_seal(&self, error: QueueError) {
        self.lock().seal_error = Some(error);
    }

    pub fn fail_cancel(&self, error: QueueError) {
        self.lock().cancel_error = Some(error);
    }

    pub fn put_task_definition(&self, task_id: &str, definition: Value) {
        self.lock()
            .definitions
            .insert(TaskId::new(task_id), definition);
    }

    pub fn put_artifact(&self, task_id: &str, run_id: u32, name: &str, content: Vec<u8>) {
        self.lock().artifacts.insert(
            (TaskId::new(task_id), run_id, name.to_string()),
            Ok(content),
        );
    }

    pub fn fail_artifact(&self, task_id: &str, run_id: u32, name: &str, error: QueueError) {
        self.lock().artifacts.insert(
            (TaskId::new(task_id), run_id, name.to_string()),
            Err(error),
        );
    }

    pub fn put_group_tasks(&self, task_group_id: &str, tasks: Vec<TaskStatus>) {
        self.lock()
            .groups
            .insert(TaskGroupId::new(task_group_id), tasks);
    }

    pub fn set_group_page_size(&self, size: usize) {
        self.lock().group_page_size = Some(size);
    }

    pub fn created_tasks(&self) -> Vec<CreatedTask> {
        self.lock().created.clone()
    }

    pub fn reruns(&self) -> Vec<RecordedRerun> {
        self.lock().reruns.clone()
    }

    pub fn sealed_groups(&self) -> Vec<TaskGroupId> {
        self.lock().sealed.clone()
    }

    pub fn cancelled_groups(&self) -> Vec<TaskGroupId> {
        self.lock().cancelled.clone()
    }
}

impl Default for FakeQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskQueue for FakeQueue {
    async fn create_task(
        &self,
        task_id: &TaskId,
        definition: &Value,
    ) -> crate::queue::Result<()> {
        let mut state = self.lock();
        if let Some(error) = &state.create_error {
            return Err(error.clone());
        }
        // Queue-side idempotency: same id with the same definition is a
        // no-op success, a different definition is a conflict.
        if let Some(existing) = state.created.iter().find(|t| &t.task_id == task_id) {
            if &existing.definition == definition {
                return Ok(());
            }
            return Err(QueueError::from_status(
                409,
                format!("task {task_id} already exists with a different definition"),
            ));
        }
        state.created.push(CreatedTask {
            task_id: task_id.clone(),
            definition: definition.clone(),
            scopes: self.scopes.clone(),
        });
        Ok(())
    }

    async fn task(&self, task_id: &TaskId) -> crate::queue::Result<Value> {
        let state = self.lock();
        if let Some(definition) = state.definitions.get(task_id) {
            return Ok(definition.clone());
        }
        if let Some(created) = state.created.iter().find(|t| &t.task_id == task_id) {
            return Ok(created.definition.clone());
        }
        Err(QueueError::not_found(format!("no task {task_id}")))
    }

    async fn list_artifacts(
        &self,
        task_id: &TaskId,
        run_id: u32,
    ) -> crate::queue::Result<Vec<String>> {
        Ok(self
            .lock()
            .artifacts
            .keys()
            .filter(|(t, r, _)| t == task_id && *r == run_id)
            .map(|(_, _, name)| name.clone())
            .collect())
    }

    async fn get_artifact(
        &self,
        task_id: &TaskId,
        run_id: u32,
        name: &str,
    ) -> crate::queue::Result<Vec<u8>> {
        match self
            .lock()
            .artifacts
            .get(&(task_id.clone(), run_id, name.to_string()))
        {
            Some(Ok(content)) => Ok(content.clone()),
            Some(Err(error)) => Err(error.clone()),
            None => Err(QueueError::not_found(format!("no artifact {name}"))),
        }
    }

    async fn rerun_task(&self, task_id: &TaskId) -> crate::queue::Result<()> {
        self.lock().reruns.push(RecordedRerun {
            task_id: task_id.clone(),
            scopes: self.scopes.clone(),
        });
        Ok(())
    }

    async fn seal_task_group(&self, task_group_id: &TaskGroupId) -> crate::queue::Result<()> {
        let mut state = self.lock();
        if let Some(error) = &state.seal_error {
            return Err(error.clone());
        }
        state.sealed.push(task_group_id.clone());
        Ok(())
    }

    async fn cancel_task_group(&self, task_group_id: &TaskGroupId) -> crate::queue::Result<()> {
        let mut state = self.lock();
        if let Some(error) = &state.cancel_error {
            return Err(error.clone());
        }
        state.cancelled.push(task_group_id.clone());
        Ok(())
    }

    async fn list_task_group(
        &self,
        task_group_id: &TaskGroupId,
        continuation: Option<&str>,
    ) -> crate::queue::Result<TaskGroupPage> {
        let state = self.lock();
        let tasks = state.groups.get(task_group_id).cloned().unwrap_or_default();
        let page_size = state.group_page_size.unwrap_or_else(|| tasks.len().max(1));
        let offset: usize = continuation.and_then(|c| c.parse().ok()).unwrap_or(0);
        let end = (offset + page_size).min(tasks.len());
        let page = tasks[offset..end].to_vec();
        let continuation = if end < tasks.len() {
            Some(end.to_string())
        } else {
            None
        };
        Ok(TaskGroupPage {
            tasks: page,
            continuation,
        })
    }

    fn scoped(&self, scopes: &[String]) -> Arc<dyn TaskQueue> {
        Arc::new(FakeQueue {
            state: Arc::clone(&self.state),
            scopes: scopes.to_vec(),
        })
    }
}

// ─── FakeCompiler ───

#[derive(Debug, Default)]
struct CompilerState {
    graph: Option<GraphConfig>,
    error: Option<String>,
    last_scope_mode: Option<ScopeMode>,
}

/// [`GraphCompiler`] that returns a canned graph (or error) and records the
/// scope mode it was asked to compile for.
#[derive(Debug, Default)]
pub struct FakeCompiler {
    state: Mutex<CompilerState>,
}

impl FakeCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_graph(&self, graph: GraphConfig) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.graph = Some(graph);
        state.error = None;
    }

    pub fn set_error(&self, message: &str) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.error = Some(message.to_string());
        state.graph = None;
    }

    pub fn last_scope_mode(&self) -> Option<ScopeMode> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .last_scope_mode
    }
}

impl GraphCompiler for FakeCompiler {
    fn compile(
        &self,
        _config: &Value,
        _event: &GithubEventMessage,
        scope_mode: ScopeMode,
    ) -> Result<GraphConfig, CompileError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.last_scope_mode = Some(scope_mode);
        if let Some(message) = &state.error {
            return Err(CompileError::Invalid(message.clone()));
        }
        Ok(state.graph.clone().unwrap_or_else(|| GraphConfig {
            tasks: Vec::new(),
            scopes: Vec::new(),
            auto_cancel_previous_checks: true,
        }))
    }
}

/// A graph with one task per name, all in `task_group_id`.
pub fn graph(task_group_id: &str, task_ids: &[&str]) -> GraphConfig {
    GraphConfig {
        tasks: task_ids
            .iter()
            .map(|task_id| CompiledTask {
                task_id: TaskId::new(*task_id),
                task_group_id: TaskGroupId::new(task_group_id),
                routes: vec!["checks".to_string()],
                definition: json!({ "metadata": { "name": task_id } }),
            })
            .collect(),
        scopes: vec!["assume:repo:github.com/octo-org/widgets:branch:main".to_string()],
        auto_cancel_previous_checks: true,
    }
}

pub fn empty_graph() -> GraphConfig {
    GraphConfig {
        tasks: Vec::new(),
        scopes: Vec::new(),
        auto_cancel_previous_checks: true,
    }
}

// ─── RecordingPublisher ───

/// [`Publisher`] that records published notifications.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<TaskGroupCreationRequestedMessage>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Vec<TaskGroupCreationRequestedMessage> {
        self.published
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn task_group_creation_requested(
        &self,
        message: TaskGroupCreationRequestedMessage,
    ) -> Result<(), PublishError> {
        self.published
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(message);
        Ok(())
    }
}

// ─── Harness ───

/// Handlers wired to fakes, with every fake exposed for assertions.
pub struct Harness {
    pub handlers: Arc<Handlers>,
    pub store: Arc<InMemoryBuildStore>,
    pub hosting: Arc<FakeHosting>,
    pub queue: Arc<FakeQueue>,
    pub compiler: Arc<FakeCompiler>,
    pub publisher: Arc<RecordingPublisher>,
    pub monitor: Arc<RecordingMonitor>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let store = Arc::new(InMemoryBuildStore::new());
        let hosting = Arc::new(FakeHosting::new());
        let queue = Arc::new(FakeQueue::new());
        let compiler = Arc::new(FakeCompiler::new());
        let publisher = Arc::new(RecordingPublisher::new());
        let monitor = Arc::new(RecordingMonitor::new());
        let handlers = Arc::new(Handlers::new(
            config,
            Arc::clone(&store) as Arc<dyn BuildStore>,
            Arc::clone(&hosting) as Arc<dyn HostingApi>,
            Arc::clone(&queue) as Arc<dyn TaskQueue>,
            Arc::clone(&compiler) as Arc<dyn GraphCompiler>,
            Arc::clone(&publisher) as Arc<dyn Publisher>,
            Arc::clone(&monitor) as Arc<dyn crate::monitor::Monitor>,
        ));
        Harness {
            handlers,
            store,
            hosting,
            queue,
            compiler,
            publisher,
            monitor,
        }
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

/// Inserts a pending build for `octo-org/widgets@sha_a` into the store.
pub async fn seed_build(harness: &Harness, task_group_id: &str, pull: Option<u64>) {
    let now = Utc::now();
    harness
        .store
        .create_build_if_absent(&Build {
            organization: "octo-org".to_string(),
            repository: "widgets".to_string(),
            sha: sha_a(),
            task_group_id: TaskGroupId::new(task_group_id),
            state: BuildState::Pending,
            event_type: "push".to_string(),
            event_id: EventId::new("ev-1"),
            installation_id: InstallationId(5),
            pull_number: pull.map(PullNumber),
            created_at: now,
            updated_at: now,
        })
        .await
        .unwrap();
}

/// Inserts a check mapping into the store.
pub async fn seed_mapping(harness: &Harness, task_group_id: &str, task_id: &str, suite: u64, run: u64) {
    harness
        .store
        .upsert_check_mapping(&CheckMapping {
            task_group_id: TaskGroupId::new(task_group_id),
            task_id: TaskId::new(task_id),
            check_suite_id: CheckSuiteId(suite),
            check_run_id: CheckRunId(run),
        })
        .await
        .unwrap();
}

// ─── Message builders ───

fn base_event(event_type: &str) -> GithubEventMessage {
    GithubEventMessage {
        organization: "octo-org".to_string(),
        repository: "widgets".to_string(),
        event_type: event_type.to_string(),
        event_id: EventId::new("ev-1"),
        installation_id: InstallationId(5),
        head_sha: None,
        pull_request: None,
        release_target: None,
        comment: None,
        body: json!({}),
    }
}

pub fn push_event() -> GithubEventMessage {
    let mut event = base_event("push");
    event.head_sha = Some(sha_a());
    event
}

pub fn pr_event(action: &str, number: u64, opener: &str) -> GithubEventMessage {
    let mut event = base_event(&format!("pull_request.{action}"));
    event.head_sha = Some(sha_a());
    event.pull_request = Some(EventPullRequest {
        number: PullNumber(number),
        opener: opener.to_string(),
        head_owner: opener.to_string(),
        base_owner: "octo-org".to_string(),
    });
    event
}

pub fn release_event(target: &str) -> GithubEventMessage {
    let mut event = base_event("release");
    event.release_target = Some(target.to_string());
    event
}

pub fn comment_event(number: u64, author: &str, comment_id: u64) -> GithubEventMessage {
    let mut event = base_event("issue_comment.created");
    event.comment = Some(EventComment {
        id: comment_id,
        pull_number: PullNumber(number),
        author: author.to_string(),
    });
    event
}

/// A task lifecycle message with a single run at `run_id`.
pub fn task_status(
    kind: TaskEventKind,
    task_id: &str,
    task_group_id: &str,
    run_id: u32,
    reason: Option<&str>,
    retries_left: u32,
) -> TaskStatusMessage {
    let state = match kind {
        TaskEventKind::Defined => TaskState::Pending,
        TaskEventKind::Running => TaskState::Running,
        TaskEventKind::Completed => TaskState::Completed,
        TaskEventKind::Failed => TaskState::Failed,
        TaskEventKind::Exception => TaskState::Exception,
    };
    TaskStatusMessage {
        kind,
        status: TaskStatus {
            task_id: TaskId::new(task_id),
            task_group_id: TaskGroupId::new(task_group_id),
            state,
            runs: vec![TaskRun {
                run_id,
                state: format!("{state:?}").to_lowercase(),
                reason_resolved: reason.map(str::to_string),
            }],
            retries_left,
        },
        run_id,
    }
}

/// A member of a task group listing, as the queue would report it.
pub fn group_member(task_id: &str, task_group_id: &str, state: TaskState) -> TaskStatus {
    TaskStatus {
        task_id: TaskId::new(task_id),
        task_group_id: TaskGroupId::new(task_group_id),
        state,
        runs: Vec::new(),
        retries_left: 0,
    }
}
