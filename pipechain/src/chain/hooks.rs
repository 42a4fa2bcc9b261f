//! Dispatches post-creation hooks.

use super::Step;
use crate::context::Command;
use crate::model::Pipeline;
use crate::ports::ChainPorts;
use crate::queue::BackgroundTask;
use async_trait::async_trait;
use tracing::debug;

/// Enqueues the hooks of every persisted job, then the pipeline hooks.
#[derive(Debug, Clone)]
pub struct TriggerBuildHooks {
    ports: ChainPorts,
}

impl TriggerBuildHooks {
    /// Creates the step.
    #[must_use]
    pub fn new(ports: ChainPorts) -> Self {
        Self { ports }
    }

    fn dispatch(&self, task: BackgroundTask) {
        let label = task.label();
        if let Err(e) = self.ports.queue.enqueue(task) {
            let e = anyhow::Error::new(e).context(format!("enqueueing {label}"));
            self.ports.error_tracker.track(&e, self.name());
        }
    }
}

#[async_trait]
impl Step for TriggerBuildHooks {
    fn name(&self) -> &str {
        "trigger_build_hooks"
    }

    async fn perform(&self, pipeline: &mut Pipeline, _command: &mut Command) {
        let Some(pipeline_id) = pipeline.id else {
            return;
        };

        let job_ids: Vec<u64> = pipeline.jobs().filter_map(|job| job.id).collect();
        debug!(pipeline_id, jobs = job_ids.len(), "Triggering build hooks");
        for job_id in job_ids {
            self.dispatch(BackgroundTask::BuildHooks { job_id });
        }
        self.dispatch(BackgroundTask::PipelineHooks { pipeline_id });
    }

    fn should_break(&self, _pipeline: &Pipeline, _command: &Command) -> bool {
        false
    }
}
