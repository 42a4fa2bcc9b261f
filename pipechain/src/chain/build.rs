//! Instantiates the pipeline and assigns its partition.

use super::Step;
use crate::config::ChainConfig;
use crate::context::Command;
use crate::core::RefKind;
use crate::model::Pipeline;
use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

/// Fills the pipeline from the command.
#[derive(Debug, Clone, Copy, Default)]
pub struct Build;

impl Build {
    /// Creates the step.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Step for Build {
    fn name(&self) -> &str {
        "build"
    }

    async fn perform(&self, pipeline: &mut Pipeline, command: &mut Command) {
        let ref_kind = command.ref_kind().await;
        let sha = command.sha().await;

        pipeline.project_id = command.project.id;
        pipeline.git_ref = command.ref_name().to_string();
        pipeline.tag = ref_kind == Some(RefKind::Tag);
        pipeline.sha = sha;
        pipeline.before_sha = Some(command.before_sha().to_string());
        pipeline.source = command.source;
        pipeline.config_source = command
            .config
            .as_ref()
            .map(|c| c.config_source)
            .unwrap_or_default();
        pipeline.user_id = command.current_user.as_ref().map(|u| u.id);
        pipeline.trigger_request_id = command.trigger_request.as_ref().map(|t| t.id);
        pipeline.schedule_id = command.schedule.as_ref().map(|s| s.id);
        pipeline.parent_pipeline = command.parent_pipeline;
        pipeline.variables = command.variables.clone();
        pipeline.created_at = Some(Utc::now());
    }

    fn should_break(&self, _pipeline: &Pipeline, _command: &Command) -> bool {
        false
    }
}

/// Assigns the sharding partition exactly once.
///
/// Priority: explicit override, then the parent's partition, then the
/// current system partition.
#[derive(Debug, Clone)]
pub struct AssignPartition {
    config: ChainConfig,
}

impl AssignPartition {
    /// Creates the step.
    #[must_use]
    pub fn new(config: ChainConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Step for AssignPartition {
    fn name(&self) -> &str {
        "assign_partition"
    }

    async fn perform(&self, pipeline: &mut Pipeline, command: &mut Command) {
        let partition_id = command
            .partition_id
            .or_else(|| command.parent_pipeline.map(|p| p.partition_id))
            .unwrap_or(self.config.current_partition_id);

        if !pipeline.assign_partition(partition_id) {
            debug!(
                assigned = ?pipeline.partition_id,
                requested = partition_id,
                "Partition already assigned"
            );
        }
    }

    fn should_break(&self, _pipeline: &Pipeline, _command: &Command) -> bool {
        false
    }
}
