//! The chain executor.

use super::Step;
use crate::context::Command;
use crate::model::Pipeline;
use tracing::{debug, info, info_span, Instrument};

/// Runs steps in order, stopping at the first step that breaks.
#[derive(Debug)]
pub struct Sequence {
    steps: Vec<Box<dyn Step>>,
    completed: Vec<String>,
}

impl Sequence {
    /// Creates a sequence over `steps`.
    #[must_use]
    pub fn new(steps: Vec<Box<dyn Step>>) -> Self {
        Self {
            steps,
            completed: Vec::new(),
        }
    }

    /// Returns the configured step names in order.
    #[must_use]
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Returns the number of configured steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns true if no step is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Runs the chain for `command` and returns the pipeline in whatever
    /// state the last performed step left it.
    pub async fn build(&mut self, command: &mut Command) -> Pipeline {
        let span = info_span!(
            "pipeline_creation",
            project_id = command.project.id,
            git_ref = %command.origin_ref,
            request_id = %command.request_id,
        );
        self.run(command).instrument(span).await
    }

    async fn run(&mut self, command: &mut Command) -> Pipeline {
        self.completed.clear();
        let mut pipeline = Pipeline::new();

        for step in &self.steps {
            debug!(step = step.name(), "Performing step");
            step.perform(&mut pipeline, command).await;

            if step.should_break(&pipeline, command) {
                info!(
                    step = step.name(),
                    errors = pipeline.errors.len(),
                    persisted = pipeline.is_persisted(),
                    "Chain stopped"
                );
                return pipeline;
            }
            self.completed.push(step.name().to_string());
        }

        debug!(steps = self.completed.len(), "Chain completed");
        pipeline
    }

    /// Returns true iff every configured step ran without breaking.
    #[must_use]
    pub fn completed(&self) -> bool {
        self.completed.len() == self.steps.len()
    }

    /// Returns the names of the steps that ran without breaking.
    #[must_use]
    pub fn completed_steps(&self) -> &[String] {
        &self.completed
    }
}
