//! Honours `[ci skip]` in the commit message and the `ci.skip` push option.

use super::helpers;
use super::Step;
use crate::context::Command;
use crate::model::Pipeline;
use crate::ports::ChainPorts;
use async_trait::async_trait;
use tracing::info;

/// Stops the chain when the commit or the push asks to skip CI.
///
/// With `save_incompleted` the pipeline is persisted as skipped first.
#[derive(Debug, Clone)]
pub struct Skip {
    ports: ChainPorts,
}

impl Skip {
    /// Creates the step.
    #[must_use]
    pub fn new(ports: ChainPorts) -> Self {
        Self { ports }
    }
}

#[async_trait]
impl Step for Skip {
    fn name(&self) -> &str {
        "skip"
    }

    async fn perform(&self, pipeline: &mut Pipeline, command: &mut Command) {
        if !command.skip_ci().await {
            return;
        }

        info!(
            sha = ?pipeline.sha,
            push_option = command.push_options_skip_ci(),
            "Skipping CI"
        );
        if command.save_incompleted {
            pipeline.skip();
            helpers::persist_incomplete(pipeline, &self.ports, self.name()).await;
        }
    }

    fn should_break(&self, _pipeline: &Pipeline, command: &Command) -> bool {
        command.cached_skip_ci() == Some(true)
    }
}
