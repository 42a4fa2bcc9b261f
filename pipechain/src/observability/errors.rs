//! Error tracking for failures swallowed at step boundaries.

use tracing::warn;

/// Receives failures that a step caught instead of raising.
pub trait ErrorTracker: Send + Sync {
    /// Records `error` raised inside `step`.
    fn track(&self, error: &anyhow::Error, step: &str);
}

/// Logs tracked errors as warnings.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingErrorTracker;

impl ErrorTracker for LoggingErrorTracker {
    fn track(&self, error: &anyhow::Error, step: &str) {
        warn!(step = %step, error = %format!("{error:#}"), "step failure tracked");
    }
}

/// A tracked failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedError {
    /// Step name.
    pub step: String,
    /// Rendered error chain.
    pub message: String,
}

/// Collects tracked errors for assertions.
#[derive(Debug, Default)]
pub struct CollectingErrorTracker {
    errors: parking_lot::RwLock<Vec<TrackedError>>,
}

impl CollectingErrorTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every tracked error.
    #[must_use]
    pub fn errors(&self) -> Vec<TrackedError> {
        self.errors.read().clone()
    }

    /// Returns true if nothing was tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.read().is_empty()
    }

    /// Returns the errors tracked for `step`.
    #[must_use]
    pub fn for_step(&self, step: &str) -> Vec<TrackedError> {
        self.errors
            .read()
            .iter()
            .filter(|e| e.step == step)
            .cloned()
            .collect()
    }
}

impl ErrorTracker for CollectingErrorTracker {
    fn track(&self, error: &anyhow::Error, step: &str) {
        self.errors.write().push(TrackedError {
            step: step.to_string(),
            message: format!("{error:#}"),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_collecting_tracker_renders_context() {
        let tracker = CollectingErrorTracker::new();
        let err = Err::<(), _>(crate::errors::StoreError::Unavailable("db down".into()))
            .context("creating deployment for job 4")
            .unwrap_err();

        tracker.track(&err, "create_deployments");
        LoggingErrorTracker.track(&err, "create_deployments");

        let tracked = tracker.for_step("create_deployments");
        assert_eq!(tracked.len(), 1);
        assert_eq!(
            tracked[0].message,
            "creating deployment for job 4: Store unavailable: db down"
        );
    }
}
