//! Handler error taxonomy.
//!
//! Only failures that should reach the dispatcher's error path live here.
//! User-addressable problems (malformed config, missing scopes, policy
//! denials) are rendered as GitHub comments inside the handlers and complete
//! the handler normally.

use thiserror::Error;

use crate::bus::PublishError;
use crate::github::HostingError;
use crate::queue::QueueError;
use crate::store::StoreError;
use crate::types::{CheckRunId, CheckSuiteId};

pub type Result<T> = std::result::Result<T, HandlerError>;

/// A failure that aborts the handler and is reported to monitoring. The
/// message is acknowledged regardless; the bus never redelivers.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Hosting(#[from] HostingError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    /// A rerun request referenced a check run this service never created.
    /// There is no sensible default, so this propagates instead of being
    /// swallowed.
    #[error(
        "no task is mapped to check suite {check_suite_id}, check run {check_run_id}; \
         cannot rerun"
    )]
    MissingRerunMapping {
        check_suite_id: CheckSuiteId,
        check_run_id: CheckRunId,
    },
}
