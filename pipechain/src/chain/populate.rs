//! Turns surviving seeds into stages and jobs, and attaches metadata.

use super::helpers;
use super::Step;
use crate::config::ChainConfig;
use crate::context::{Command, SeedTarget};
use crate::core::FailureReason;
use crate::errors::{PipelineError, PipelineErrorKind};
use crate::model::{Pipeline, PipelineMetadata};
use crate::ports::ChainPorts;
use crate::seed::StageSeed;
use async_trait::async_trait;
use tracing::debug;

/// Materializes the included stage seeds and allocates the IID.
#[derive(Debug, Clone)]
pub struct Populate {
    ports: ChainPorts,
}

impl Populate {
    /// Creates the step.
    #[must_use]
    pub fn new(ports: ChainPorts) -> Self {
        Self { ports }
    }
}

#[async_trait]
impl Step for Populate {
    fn name(&self) -> &str {
        "populate"
    }

    async fn perform(&self, pipeline: &mut Pipeline, command: &mut Command) {
        pipeline.stages = command
            .stage_seeds()
            .unwrap_or_default()
            .iter()
            .filter(|stage| stage.is_included())
            .map(StageSeed::to_stage)
            .collect();

        for job in pipeline.jobs_mut() {
            command.run_seed_callback(SeedTarget::Job(job));
        }

        if pipeline.stages.is_empty() {
            let error = PipelineError::config("No stages / jobs for this pipeline.")
                .with_drop_reason(FailureReason::FilteredByRules);
            helpers::error(pipeline, command, &self.ports, self.name(), error).await;
            return;
        }

        if let Err(problems) = pipeline.validate() {
            pipeline.add_error(PipelineError::new(
                PipelineErrorKind::Validation,
                format!("Failed to build the pipeline: {}", problems.join(", ")),
            ));
            return;
        }

        // Allocated outside of the Create transaction; Create hands it back
        // if saving fails.
        match self.ports.pipelines.allocate_iid(pipeline.project_id).await {
            Ok(iid) => {
                debug!(
                    iid,
                    stages = pipeline.stages.len(),
                    jobs = pipeline.job_count(),
                    "Populated pipeline"
                );
                pipeline.iid = Some(iid);
            }
            Err(e) => {
                let message = format!("Failed to allocate the pipeline IID: {e}");
                self.ports
                    .error_tracker
                    .track(&anyhow::Error::new(e).context("allocating pipeline iid"), self.name());
                pipeline.add_error(PipelineError::new(PipelineErrorKind::Internal, message));
            }
        }
    }

    fn should_break(&self, pipeline: &Pipeline, _command: &Command) -> bool {
        pipeline.has_errors()
    }
}

/// Attaches the workflow name and auto-cancel settings.
#[derive(Debug, Clone)]
pub struct PopulateMetadata {
    config: ChainConfig,
}

impl PopulateMetadata {
    /// Creates the step.
    #[must_use]
    pub fn new(config: ChainConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Step for PopulateMetadata {
    fn name(&self) -> &str {
        "populate_metadata"
    }

    async fn perform(&self, pipeline: &mut Pipeline, command: &mut Command) {
        let Some(workflow) = command.config.as_ref().map(|c| c.workflow.clone()) else {
            return;
        };
        if workflow.name.is_none() && workflow.auto_cancel.is_none() {
            return;
        }

        let name = match workflow.name {
            Some(name) => Some(command.rule_variables().await.expand(&name)),
            None => None,
        };
        let metadata = PipelineMetadata {
            name,
            auto_cancel: workflow.auto_cancel.unwrap_or_default(),
        };

        match metadata.validate(self.config.max_pipeline_name_length) {
            Ok(()) => pipeline.metadata = Some(metadata),
            Err(detail) => pipeline.add_error(PipelineError::new(
                PipelineErrorKind::Validation,
                format!("Failed to build the pipeline metadata: {detail}"),
            )),
        }
    }

    fn should_break(&self, pipeline: &Pipeline, _command: &Command) -> bool {
        pipeline.has_errors()
    }
}
