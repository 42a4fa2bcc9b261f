//! Copies the protected-ref verdict onto the pipeline.

use super::Step;
use crate::context::Command;
use crate::model::Pipeline;
use async_trait::async_trait;
use tracing::warn;

/// Sets `pipeline.protected` and halts if it disagrees with the command.
#[derive(Debug, Clone, Copy, Default)]
pub struct Protect;

impl Protect {
    /// Creates the step.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Step for Protect {
    fn name(&self) -> &str {
        "protect"
    }

    async fn perform(&self, pipeline: &mut Pipeline, command: &mut Command) {
        pipeline.protected = command.protected_ref().await;
    }

    fn should_break(&self, pipeline: &Pipeline, command: &Command) -> bool {
        let consistent = command.cached_protected_ref() == Some(pipeline.protected);
        if !consistent {
            warn!(
                pipeline = pipeline.protected,
                command = ?command.cached_protected_ref(),
                "Protected flag disagrees with the ref"
            );
        }
        !consistent
    }
}
