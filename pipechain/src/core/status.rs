//! Pipeline and job status enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The lifecycle status of a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    /// Pipeline has been created but nothing is scheduled yet.
    #[default]
    Created,
    /// Waiting for a resource group slot.
    WaitingForResource,
    /// Preparing the environment.
    Preparing,
    /// Jobs are queued.
    Pending,
    /// Jobs are running.
    Running,
    /// All jobs succeeded.
    Success,
    /// The pipeline failed or was dropped.
    Failed,
    /// Cancellation is in progress.
    Canceling,
    /// The pipeline was cancelled.
    Canceled,
    /// The pipeline was skipped.
    Skipped,
    /// Blocked on a manual action.
    Manual,
    /// Waiting on a delayed job.
    Scheduled,
}

impl PipelineStatus {
    /// Returns true if a pipeline in this status may still be cancelled.
    #[must_use]
    pub fn is_cancelable(&self) -> bool {
        matches!(
            self,
            Self::Created
                | Self::WaitingForResource
                | Self::Preparing
                | Self::Pending
                | Self::Running
                | Self::Scheduled
        )
    }

    /// Returns true if the status is final.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        matches!(
            self,
            Self::Success | Self::Failed | Self::Canceled | Self::Skipped
        )
    }
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::WaitingForResource => "waiting_for_resource",
            Self::Preparing => "preparing",
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Canceling => "canceling",
            Self::Canceled => "canceled",
            Self::Skipped => "skipped",
            Self::Manual => "manual",
            Self::Scheduled => "scheduled",
        };
        write!(f, "{s}")
    }
}

/// The status of a single job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created, not yet processed.
    #[default]
    Created,
    /// Queued for a runner.
    Pending,
    /// Picked up by a runner.
    Running,
    /// Finished successfully.
    Success,
    /// Finished with an error.
    Failed,
    /// Cancelled.
    Canceled,
    /// Skipped.
    Skipped,
    /// Waiting for a manual action.
    Manual,
    /// Delayed start.
    Scheduled,
}

impl JobStatus {
    /// Returns true once a runner has picked the job up.
    #[must_use]
    pub fn is_started(&self) -> bool {
        matches!(self, Self::Running | Self::Success | Self::Failed)
    }

    /// Returns true while the job can still be cancelled.
    #[must_use]
    pub fn is_cancelable(&self) -> bool {
        matches!(self, Self::Created | Self::Pending | Self::Running | Self::Scheduled)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
            Self::Skipped => "skipped",
            Self::Manual => "manual",
            Self::Scheduled => "scheduled",
        };
        write!(f, "{s}")
    }
}

/// Why a pipeline or job ended up failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The configuration could not be processed.
    ConfigError,
    /// Workflow rules excluded the pipeline.
    FilteredByWorkflowRules,
    /// Job rules excluded every job.
    FilteredByRules,
    /// The environment for a job could not be created.
    EnvironmentCreationFailure,
    /// The resource group for a job could not be created.
    ResourceGroupFailure,
    /// Persistence failed.
    PersistenceError,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ConfigError => "config_error",
            Self::FilteredByWorkflowRules => "filtered_by_workflow_rules",
            Self::FilteredByRules => "filtered_by_rules",
            Self::EnvironmentCreationFailure => "environment_creation_failure",
            Self::ResourceGroupFailure => "resource_group_failure",
            Self::PersistenceError => "persistence_error",
        };
        write!(f, "{s}")
    }
}

/// The event that requested the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineSource {
    /// Unknown source.
    #[default]
    Unknown,
    /// A git push.
    Push,
    /// Started from the web UI.
    Web,
    /// A trigger token.
    Trigger,
    /// A pipeline schedule.
    Schedule,
    /// The REST API.
    Api,
    /// An external pull request event.
    ExternalPullRequestEvent,
    /// A merge request event.
    MergeRequestEvent,
    /// A multi-project downstream trigger.
    Pipeline,
    /// A parent/child pipeline.
    ParentPipeline,
    /// A chat command.
    Chat,
    /// A security policy.
    SecurityOrchestrationPolicy,
}

impl fmt::Display for PipelineSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unknown => "unknown",
            Self::Push => "push",
            Self::Web => "web",
            Self::Trigger => "trigger",
            Self::Schedule => "schedule",
            Self::Api => "api",
            Self::ExternalPullRequestEvent => "external_pull_request_event",
            Self::MergeRequestEvent => "merge_request_event",
            Self::Pipeline => "pipeline",
            Self::ParentPipeline => "parent_pipeline",
            Self::Chat => "chat",
            Self::SecurityOrchestrationPolicy => "security_orchestration_policy",
        };
        write!(f, "{s}")
    }
}

/// Where the pipeline configuration came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigSource {
    /// Not known yet.
    #[default]
    Unknown,
    /// A file in the repository.
    RepositorySource,
    /// Auto DevOps template.
    AutoDevopsSource,
    /// Passed in by the caller.
    ParameterSource,
    /// A remote location.
    RemoteSource,
    /// A file in another project.
    ExternalProjectSource,
    /// Generated by a bridge job.
    BridgeSource,
}

/// Whether a ref names a branch or a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefKind {
    /// A branch.
    Branch,
    /// A tag.
    Tag,
}

/// Which kind of trigger or policy a job originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildSource {
    /// Mirrors the pipeline source.
    Pipeline(PipelineSource),
    /// Injected by a scan execution policy.
    ScanExecutionPolicy,
    /// Injected by a pipeline execution policy.
    PipelineExecutionPolicy,
}

/// When a job should run once its stage is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum When {
    /// Run when every earlier stage succeeded.
    #[default]
    OnSuccess,
    /// Run when an earlier stage failed.
    OnFailure,
    /// Always run.
    Always,
    /// Wait for a manual action.
    Manual,
    /// Start after a delay.
    Delayed,
    /// Never run: the job is excluded.
    Never,
}

impl fmt::Display for When {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::OnSuccess => "on_success",
            Self::OnFailure => "on_failure",
            Self::Always => "always",
            Self::Manual => "manual",
            Self::Delayed => "delayed",
            Self::Never => "never",
        };
        write!(f, "{s}")
    }
}
