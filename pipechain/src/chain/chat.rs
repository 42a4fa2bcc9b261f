//! Narrows chat pipelines to the job named by the chat command.

use super::Step;
use crate::context::Command;
use crate::core::PipelineSource;
use crate::model::Pipeline;
use async_trait::async_trait;
use tracing::debug;

/// For chat pipelines, keeps only the job matching the chat command.
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoveUnwantedChatJobs;

impl RemoveUnwantedChatJobs {
    /// Creates the step.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Step for RemoveUnwantedChatJobs {
    fn name(&self) -> &str {
        "remove_unwanted_chat_jobs"
    }

    async fn perform(&self, _pipeline: &mut Pipeline, command: &mut Command) {
        if command.source != PipelineSource::Chat {
            return;
        }
        let Some(wanted) = command.chat_data.as_ref().map(|c| c.command.clone()) else {
            return;
        };
        let Some(config) = command.config.as_mut() else {
            return;
        };

        let before = config.job_count();
        for stage in &mut config.stages {
            stage.jobs.retain(|job| job.name == wanted);
        }
        debug!(job = %wanted, removed = before - config.job_count(), "Filtered chat jobs");
    }

    fn should_break(&self, _pipeline: &Pipeline, _command: &Command) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ChatData;
    use crate::testing::CommandFixture;

    fn chat(command: &str) -> ChatData {
        ChatData {
            command: command.to_string(),
            arguments: String::new(),
        }
    }

    #[tokio::test]
    async fn test_keeps_only_chat_job() {
        let mut command = CommandFixture::new()
            .command("main")
            .with_source(PipelineSource::Chat)
            .with_chat_data(chat("rspec"));

        RemoveUnwantedChatJobs::new()
            .perform(&mut Pipeline::new(), &mut command)
            .await;

        let config = command.config.as_ref().unwrap();
        assert_eq!(config.job_count(), 1);
        assert_eq!(config.stages[1].jobs[0].name, "rspec");
        assert!(config.stages[0].jobs.is_empty());
    }

    #[tokio::test]
    async fn test_other_sources_untouched() {
        let mut command = CommandFixture::new().command("main").with_chat_data(chat("rspec"));

        RemoveUnwantedChatJobs::new()
            .perform(&mut Pipeline::new(), &mut command)
            .await;

        assert_eq!(command.config.as_ref().unwrap().job_count(), 2);
    }
}
