//! Binds handlers to their bus subscriptions.
//!
//! One consumer loop per subscription. Handlers are spawned as independent
//! tasks: the loop keeps consuming while a handler is still running, so a
//! slow handler never blocks the queue. That also means handler completion
//! order is unrelated to arrival order - the per-task lock inside the status
//! handler is what restores ordering where it matters.
//!
//! A handler failure is reported to monitoring and the message counts as
//! consumed; the bus never redelivers on our account.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::handlers::{self, Handlers};
use crate::monitor::Monitor;

use super::messages::{
    DeprecatedStatusMessage, GithubEventMessage, RerunRequestMessage,
    TaskGroupCreationRequestedMessage, TaskStatusMessage,
};

/// Per-handler counters, mirroring what monitoring wants to know: how many
/// handlers started, how many finished, and how many of those failed.
#[derive(Debug, Default)]
pub struct HandlerCounts {
    inner: Mutex<HashMap<&'static str, Count>>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Count {
    pub total: u64,
    pub finished: u64,
    pub errors: u64,
}

impl Count {
    pub fn running(&self) -> u64 {
        self.total - self.finished
    }
}

impl HandlerCounts {
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<&'static str, Count>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn started(&self, name: &'static str) {
        self.lock().entry(name).or_default().total += 1;
    }

    fn finished(&self, name: &'static str, errored: bool) {
        let mut map = self.lock();
        let count = map.entry(name).or_default();
        count.finished += 1;
        if errored {
            count.errors += 1;
        }
    }

    pub fn snapshot(&self) -> HashMap<&'static str, Count> {
        self.lock().clone()
    }
}

/// The receivers for every queue this service consumes.
pub struct Subscriptions {
    /// GitHub events: pushes, pull requests, releases, comments.
    pub jobs: mpsc::Receiver<GithubEventMessage>,
    /// Task lifecycle messages routed for check runs.
    pub result_status: mpsc::Receiver<TaskStatusMessage>,
    /// Task failures and group resolutions routed for legacy statuses.
    pub deprecated_result_status: mpsc::Receiver<DeprecatedStatusMessage>,
    /// Task-group-creation notifications for the initial pending status.
    pub initial_status: mpsc::Receiver<TaskGroupCreationRequestedMessage>,
    /// Rerun requests from the GitHub UI.
    pub rerun: mpsc::Receiver<RerunRequestMessage>,
}

/// Consumes every subscription, fanning messages out to handler tasks.
pub struct Dispatcher {
    handlers: Arc<Handlers>,
    monitor: Arc<dyn Monitor>,
    shutdown: CancellationToken,
    counts: Arc<HandlerCounts>,
}

impl Dispatcher {
    pub fn new(
        handlers: Arc<Handlers>,
        monitor: Arc<dyn Monitor>,
        shutdown: CancellationToken,
    ) -> Self {
        Dispatcher {
            handlers,
            monitor,
            shutdown,
            counts: Arc::new(HandlerCounts::default()),
        }
    }

    pub fn counts(&self) -> Arc<HandlerCounts> {
        Arc::clone(&self.counts)
    }

    /// Runs all consumer loops until shutdown or until every sender is gone.
    pub async fn run(&self, subscriptions: Subscriptions) {
        info!("dispatcher started");
        let Subscriptions {
            jobs,
            result_status,
            deprecated_result_status,
            initial_status,
            rerun,
        } = subscriptions;

        let h = &self.handlers;
        tokio::join!(
            self.consume("job", jobs, {
                let h = Arc::clone(h);
                move |m| {
                    let h = Arc::clone(&h);
                    async move { h.handle_job(m).await }
                }
            }),
            self.consume("status", result_status, {
                let h = Arc::clone(h);
                move |m| {
                    let h = Arc::clone(&h);
                    async move { h.handle_task_status(m).await }
                }
            }),
            self.consume("deprecated-status", deprecated_result_status, {
                let h = Arc::clone(h);
                move |m| {
                    let h = Arc::clone(&h);
                    async move { h.handle_deprecated_status(m).await }
                }
            }),
            self.consume("initial-status", initial_status, {
                let h = Arc::clone(h);
                move |m| {
                    let h = Arc::clone(&h);
                    async move { h.handle_task_group_creation(m).await }
                }
            }),
            self.consume("rerun", rerun, {
                let h = Arc::clone(h);
                move |m| {
                    let h = Arc::clone(&h);
                    async move { h.handle_rerun(m).await }
                }
            }),
        );
        info!("dispatcher stopped");
    }

    /// One consumer loop: receive, spawn, continue. Never waits for a
    /// handler to finish before taking the next message.
    async fn consume<M, F, Fut>(&self, name: &'static str, mut rx: mpsc::Receiver<M>, handler: F)
    where
        M: Send + 'static,
        F: Fn(M) -> Fut,
        Fut: Future<Output = handlers::Result<()>> + Send + 'static,
    {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    debug!(queue = name, "consumer stopping on shutdown");
                    break;
                }
                received = rx.recv() => {
                    let Some(message) = received else {
                        debug!(queue = name, "subscription closed");
                        break;
                    };
                    self.counts.started(name);
                    let fut = handler(message);
                    let counts = Arc::clone(&self.counts);
                    let monitor = Arc::clone(&self.monitor);
                    tokio::spawn(async move {
                        match fut.await {
                            Ok(()) => counts.finished(name, false),
                            Err(e) => {
                                monitor.report_error(&e);
                                counts.finished(name, true);
                            }
                        }
                    });
                }
            }
        }
    }
}
