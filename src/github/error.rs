//! GitHub API error type.
//!
//! Distinguishes transient from permanent failures. The distinction drives
//! retry decisions in the client capability and tolerance decisions in the
//! handlers:
//!
//! - **Transient** errors are retriable (5xx, rate limits, network timeouts)
//! - **Permanent** errors are not (most 4xx); a permanent 404 is frequently
//!   an expected condition (no config file, not a collaborator) that callers
//!   absorb rather than propagate.

use std::fmt;
use thiserror::Error;

/// The kind of GitHub API error, categorized for retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostingErrorKind {
    /// Transient error - safe to retry with backoff.
    ///
    /// Examples:
    /// - HTTP 5xx (server errors)
    /// - HTTP 429 (rate limited)
    /// - HTTP 403 with rate limit messages
    /// - Network timeouts
    Transient,

    /// Permanent error - retrying will not help.
    ///
    /// Examples:
    /// - HTTP 404 (missing file, unknown user)
    /// - HTTP 401/403 (authentication, permissions)
    /// - HTTP 422 (validation)
    Permanent,
}

/// A GitHub API error with categorization for retry decisions.
#[derive(Debug, Clone, Error)]
pub struct HostingError {
    pub kind: HostingErrorKind,

    /// The HTTP status code, if the failure came from an HTTP response.
    pub status: Option<u16>,

    /// A human-readable description of the error.
    pub message: String,
}

impl fmt::Display for HostingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(code) => write!(f, "GitHub API error (HTTP {}): {}", code, self.message),
            None => write!(f, "GitHub API error: {}", self.message),
        }
    }
}

impl HostingError {
    /// Categorizes an HTTP failure by status code.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        let kind = match status {
            429 => HostingErrorKind::Transient,
            403 if is_rate_limit_message(&message) => HostingErrorKind::Transient,
            500..=599 => HostingErrorKind::Transient,
            _ => HostingErrorKind::Permanent,
        };
        HostingError {
            kind,
            status: Some(status),
            message,
        }
    }

    /// A connection-level failure with no HTTP response.
    pub fn connection(message: impl Into<String>) -> Self {
        HostingError {
            kind: HostingErrorKind::Transient,
            status: None,
            message: message.into(),
        }
    }

    /// A permanent error with no HTTP status attached.
    pub fn permanent(message: impl Into<String>) -> Self {
        HostingError {
            kind: HostingErrorKind::Permanent,
            status: None,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind == HostingErrorKind::Transient
    }

    /// True for 404 responses, which callers frequently treat as an expected
    /// absence rather than a failure.
    pub fn is_not_found(&self) -> bool {
        self.status == Some(404)
    }
}

/// Checks if an error message indicates a rate limit.
fn is_rate_limit_message(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("rate limit")
        || message.contains("api rate")
        || message.contains("secondary rate")
        || message.contains("abuse detection")
}
