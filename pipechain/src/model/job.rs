//! Persisted stage and job entities.

use crate::core::{BuildSource, FailureReason, JobStatus, When};
use serde::{Deserialize, Serialize};

/// What a job does to its environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvironmentAction {
    /// Deploys to the environment.
    #[default]
    Start,
    /// Prepares the environment without deploying.
    Prepare,
    /// Stops the environment.
    Stop,
    /// Verifies a deployment.
    Verify,
    /// Accesses the environment without deploying.
    Access,
}

/// An environment declared by a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentDeclaration {
    /// Environment name, with variables already expanded.
    pub name: String,
    /// The action the job takes.
    #[serde(default)]
    pub action: EnvironmentAction,
    /// Environment URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Deployment tier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_tier: Option<String>,
    /// Auto-stop period, e.g. `1 day`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_stop_in: Option<String>,
}

impl EnvironmentDeclaration {
    /// Creates a declaration that deploys to `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            action: EnvironmentAction::Start,
            url: None,
            deployment_tier: None,
            auto_stop_in: None,
        }
    }

    /// Sets the action.
    #[must_use]
    pub fn with_action(mut self, action: EnvironmentAction) -> Self {
        self.action = action;
        self
    }

    /// Returns true if the job produces a deployment.
    #[must_use]
    pub fn starts_environment(&self) -> bool {
        self.action == EnvironmentAction::Start
    }
}

/// A schedulable unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Job id, once persisted.
    pub id: Option<u64>,
    /// Job name, unique within the pipeline.
    pub name: String,
    /// The stage name this job belongs to.
    pub stage_name: String,
    /// The stage ordinal.
    pub stage_idx: usize,
    /// The persisted stage id; `None` after persistence is an integrity fault.
    pub stage_id: Option<u64>,
    /// Current status.
    pub status: JobStatus,
    /// When the job runs.
    pub when: When,
    /// Whether failure is tolerated.
    pub allow_failure: bool,
    /// Delay for delayed jobs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_in: Option<String>,
    /// Jobs this job needs.
    #[serde(default)]
    pub needs: Vec<String>,
    /// Whether a newer pipeline may cancel this job.
    pub interruptible: bool,
    /// Resource group key, with variables expanded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_group_key: Option<String>,
    /// Resolved resource group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_group_id: Option<u64>,
    /// Declared environment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<EnvironmentDeclaration>,
    /// Resolved environment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment_id: Option<u64>,
    /// Created deployment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_id: Option<u64>,
    /// The trigger or policy the job originated from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<BuildSource>,
    /// Why the job failed, if it did.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<FailureReason>,
    /// Opaque job options (script, image, ...).
    #[serde(default)]
    pub options: serde_json::Value,
}

impl Job {
    /// Creates an unpersisted job.
    #[must_use]
    pub fn new(name: impl Into<String>, stage_name: impl Into<String>, stage_idx: usize) -> Self {
        Self {
            id: None,
            name: name.into(),
            stage_name: stage_name.into(),
            stage_idx,
            stage_id: None,
            status: JobStatus::Created,
            when: When::OnSuccess,
            allow_failure: false,
            start_in: None,
            needs: Vec::new(),
            interruptible: false,
            resource_group_key: None,
            resource_group_id: None,
            environment: None,
            environment_id: None,
            deployment_id: None,
            source: None,
            failure_reason: None,
            options: serde_json::Value::Null,
        }
    }

    /// Marks the job failed with a reason.
    pub fn drop_with(&mut self, reason: FailureReason) {
        self.status = JobStatus::Failed;
        self.failure_reason = Some(reason);
    }

    /// Returns true if the job creates a deployment.
    #[must_use]
    pub fn is_deployable(&self) -> bool {
        self.environment
            .as_ref()
            .is_some_and(EnvironmentDeclaration::starts_environment)
    }
}

/// A named, ordered group of jobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    /// Stage id, once persisted.
    pub id: Option<u64>,
    /// Stage name.
    pub name: String,
    /// Ordinal position within the pipeline.
    pub position: usize,
    /// Jobs in declaration order.
    pub jobs: Vec<Job>,
}

impl Stage {
    /// Creates an unpersisted stage.
    #[must_use]
    pub fn new(name: impl Into<String>, position: usize) -> Self {
        Self {
            id: None,
            name: name.into(),
            position,
            jobs: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deployable_only_for_start_action() {
        let mut job = Job::new("deploy", "deploy", 2);
        assert!(!job.is_deployable());

        job.environment = Some(EnvironmentDeclaration::new("production"));
        assert!(job.is_deployable());

        job.environment = Some(
            EnvironmentDeclaration::new("production").with_action(EnvironmentAction::Stop),
        );
        assert!(!job.is_deployable());
    }

    #[test]
    fn test_drop_with_sets_reason() {
        let mut job = Job::new("deploy", "deploy", 0);
        job.drop_with(FailureReason::EnvironmentCreationFailure);

        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.failure_reason, Some(FailureReason::EnvironmentCreationFailure));
    }
}
