//! Persists the pipeline with its stages and jobs.

use super::helpers;
use super::Step;
use crate::context::Command;
use crate::errors::{PipelineError, PipelineErrorKind, StoreError};
use crate::model::Pipeline;
use crate::observability::labels;
use crate::ports::ChainPorts;
use async_trait::async_trait;
use tracing::{info, warn};

/// Counter incremented for each persisted job left without a stage.
pub const JOBS_WITHOUT_STAGE_METRIC: &str = "pipeline_jobs_without_stage_total";

/// Saves the pipeline in one transaction.
///
/// Store failures become a pipeline error and the allocated IID is handed
/// back. Breaks unless the pipeline ended up persisted.
#[derive(Debug, Clone)]
pub struct Create {
    ports: ChainPorts,
}

impl Create {
    /// Creates the step.
    #[must_use]
    pub fn new(ports: ChainPorts) -> Self {
        Self { ports }
    }

    fn audit_jobs(&self, pipeline: &Pipeline) {
        let orphans = pipeline
            .jobs()
            .filter(|job| job.id.is_some() && job.stage_id.is_none())
            .count();
        if orphans == 0 {
            return;
        }

        warn!(pipeline_id = ?pipeline.id, orphans, "Persisted jobs without a stage");
        let labels = labels([("project_id", pipeline.project_id.to_string())]);
        for _ in 0..orphans {
            self.ports.metrics.increment(JOBS_WITHOUT_STAGE_METRIC, &labels);
        }
    }
}

#[async_trait]
impl Step for Create {
    fn name(&self) -> &str {
        "create"
    }

    async fn perform(&self, pipeline: &mut Pipeline, _command: &mut Command) {
        if pipeline.is_persisted() {
            return;
        }

        match self.ports.pipelines.create_pipeline(pipeline.clone()).await {
            Ok(saved) => {
                *pipeline = saved;
                info!(
                    pipeline_id = ?pipeline.id,
                    iid = ?pipeline.iid,
                    jobs = pipeline.job_count(),
                    "Pipeline created"
                );
            }
            Err(e) => {
                pipeline.add_error(PipelineError::new(
                    PipelineErrorKind::Persistence,
                    format!("Failed to persist the pipeline: {e}"),
                ));
                if !matches!(e, StoreError::Validation(_)) {
                    let e = anyhow::Error::new(e).context("creating pipeline");
                    self.ports.error_tracker.track(&e, self.name());
                }
                helpers::release_iid(pipeline, &self.ports, self.name()).await;
            }
        }

        self.audit_jobs(pipeline);
    }

    fn should_break(&self, pipeline: &Pipeline, _command: &Command) -> bool {
        !pipeline.is_persisted()
    }
}
