//! Tags jobs with the trigger or policy they came from.

use super::Step;
use crate::config::ChainConfig;
use crate::context::Command;
use crate::core::BuildSource;
use crate::model::Pipeline;
use async_trait::async_trait;

/// Sets `job.source` for every job that has none.
///
/// Jobs injected by a policy keep their own source; everything else
/// mirrors the pipeline source.
#[derive(Debug, Clone)]
pub struct SetBuildSources {
    config: ChainConfig,
}

impl SetBuildSources {
    /// Creates the step.
    #[must_use]
    pub fn new(config: ChainConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Step for SetBuildSources {
    fn name(&self) -> &str {
        "set_build_sources"
    }

    async fn perform(&self, pipeline: &mut Pipeline, _command: &mut Command) {
        if !self.config.features.build_sources {
            return;
        }

        let source = BuildSource::Pipeline(pipeline.source);
        for job in pipeline.jobs_mut().filter(|j| j.source.is_none()) {
            job.source = Some(source);
        }
    }

    fn should_break(&self, _pipeline: &Pipeline, _command: &Command) -> bool {
        false
    }
}
