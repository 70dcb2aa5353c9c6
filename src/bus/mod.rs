//! Message-bus plumbing: message types, publishing, and the dispatcher that
//! binds handlers to their subscriptions.

pub mod dispatcher;
pub mod messages;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

pub use dispatcher::{Dispatcher, HandlerCounts, Subscriptions};
pub use messages::{
    DeprecatedStatusMessage, EventComment, EventPullRequest, GithubEventMessage,
    RerunRequestMessage, TaskEventKind, TaskGroupCreationRequestedMessage,
    TaskGroupResolvedMessage, TaskStatusMessage, desanitize, sanitize,
};

/// Failure to publish a message to the bus.
#[derive(Debug, Clone, Error)]
#[error("publish failed: {0}")]
pub struct PublishError(pub String);

/// Outbound side of the bus, as far as the handlers use it.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Announces that a task group's tasks have all been created.
    async fn task_group_creation_requested(
        &self,
        message: TaskGroupCreationRequestedMessage,
    ) -> Result<(), PublishError>;
}

/// Publisher backed by an in-process channel, feeding the corresponding
/// subscription directly.
#[derive(Debug, Clone)]
pub struct ChannelPublisher {
    tx: mpsc::Sender<TaskGroupCreationRequestedMessage>,
}

impl ChannelPublisher {
    pub fn new(tx: mpsc::Sender<TaskGroupCreationRequestedMessage>) -> Self {
        ChannelPublisher { tx }
    }
}

#[async_trait]
impl Publisher for ChannelPublisher {
    async fn task_group_creation_requested(
        &self,
        message: TaskGroupCreationRequestedMessage,
    ) -> Result<(), PublishError> {
        self.tx
            .send(message)
            .await
            .map_err(|e| PublishError(e.to_string()))
    }
}
