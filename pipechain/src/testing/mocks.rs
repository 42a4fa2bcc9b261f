//! Steps for exercising the sequence.

use crate::chain::Step;
use crate::context::Command;
use crate::model::Pipeline;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

/// Shared log of performed step names.
pub type StepLog = Arc<Mutex<Vec<String>>>;

/// A step that records each `perform` call and breaks on demand.
#[derive(Debug)]
pub struct RecordingStep {
    name: String,
    log: StepLog,
    breaks: bool,
}

impl RecordingStep {
    /// Creates a step that never breaks.
    #[must_use]
    pub fn new(name: impl Into<String>, log: StepLog) -> Self {
        Self {
            name: name.into(),
            log,
            breaks: false,
        }
    }

    /// Creates a step that breaks after performing.
    #[must_use]
    pub fn breaking(name: impl Into<String>, log: StepLog) -> Self {
        Self {
            breaks: true,
            ..Self::new(name, log)
        }
    }
}

#[async_trait]
impl Step for RecordingStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn perform(&self, _pipeline: &mut Pipeline, _command: &mut Command) {
        self.log.lock().push(self.name.clone());
    }

    fn should_break(&self, _pipeline: &Pipeline, _command: &Command) -> bool {
        self.breaks
    }
}

/// A step that adds a warning to the pipeline, for observing mutations.
#[derive(Debug, Clone)]
pub struct WarningStep {
    warning: String,
}

impl WarningStep {
    /// Creates a step that adds `warning`.
    #[must_use]
    pub fn new(warning: impl Into<String>) -> Self {
        Self {
            warning: warning.into(),
        }
    }
}

#[async_trait]
impl Step for WarningStep {
    fn name(&self) -> &str {
        "warning"
    }

    async fn perform(&self, pipeline: &mut Pipeline, _command: &mut Command) {
        pipeline.add_warning(self.warning.clone());
    }

    fn should_break(&self, _pipeline: &Pipeline, _command: &Command) -> bool {
        false
    }
}
