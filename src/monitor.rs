//! Error and statistics reporting seam.
//!
//! Handlers never surface infrastructural failures to end users; they report
//! them here. The default implementation forwards to `tracing`; deployments
//! wire in whatever sink they use for alerting.

use std::sync::Mutex;

use tracing::error;

/// Sink for handler errors and counters.
pub trait Monitor: Send + Sync {
    /// Reports an error that was swallowed on the handler path.
    fn report_error(&self, error: &dyn std::fmt::Display);

    /// Increments a named counter.
    fn count(&self, name: &str);
}

/// Monitor that forwards everything to `tracing`.
#[derive(Debug, Default)]
pub struct TracingMonitor;

impl Monitor for TracingMonitor {
    fn report_error(&self, err: &dyn std::fmt::Display) {
        error!(error = %err, "reported to monitoring");
    }

    fn count(&self, name: &str) {
        tracing::debug!(counter = name, "count");
    }
}

/// Monitor that records reports in memory. Used by tests to assert that an
/// error was (or was not) reported without failing the handler.
#[derive(Debug, Default)]
pub struct RecordingMonitor {
    errors: Mutex<Vec<String>>,
    counts: Mutex<Vec<String>>,
}

impl RecordingMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn counts(&self) -> Vec<String> {
        self.counts.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Monitor for RecordingMonitor {
    fn report_error(&self, err: &dyn std::fmt::Display) {
        self.errors
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(err.to_string());
    }

    fn count(&self, name: &str) {
        self.counts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(name.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_monitor_captures_reports() {
        let monitor = RecordingMonitor::new();
        monitor.report_error(&"boom");
        monitor.count("handler.finished");

        assert_eq!(monitor.errors(), vec!["boom".to_string()]);
        assert_eq!(monitor.counts(), vec!["handler.finished".to_string()]);
    }
}
