//! Project-side handles and entities resolved around a pipeline.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// The project a pipeline is created for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    /// Project id.
    pub id: u64,
    /// Full namespace path, e.g. `group/project`.
    pub full_path: String,
    /// The default branch name.
    pub default_branch: String,
    /// Whether pipelines are enabled for the project.
    pub builds_enabled: bool,
    /// Whether superseded pipelines are cancelled automatically.
    pub auto_cancel_pending_pipelines: bool,
}

impl Project {
    /// Creates a project with pipelines and auto-cancel enabled.
    #[must_use]
    pub fn new(id: u64, full_path: impl Into<String>) -> Self {
        Self {
            id,
            full_path: full_path.into(),
            default_branch: "main".to_string(),
            builds_enabled: true,
            auto_cancel_pending_pipelines: true,
        }
    }

    /// Sets the default branch.
    #[must_use]
    pub fn with_default_branch(mut self, branch: impl Into<String>) -> Self {
        self.default_branch = branch.into();
        self
    }

    /// Enables or disables pipelines.
    #[must_use]
    pub fn with_builds_enabled(mut self, enabled: bool) -> Self {
        self.builds_enabled = enabled;
        self
    }

    /// Enables or disables auto-cancellation of pending pipelines.
    #[must_use]
    pub fn with_auto_cancel_pending_pipelines(mut self, enabled: bool) -> Self {
        self.auto_cancel_pending_pipelines = enabled;
        self
    }
}

/// The acting user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct User {
    /// User id.
    pub id: u64,
    /// Username.
    pub username: String,
}

impl User {
    /// Creates a user.
    #[must_use]
    pub fn new(id: u64, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
        }
    }
}

/// A trigger token invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerRequest {
    /// Trigger request id.
    pub id: u64,
    /// The owner of the trigger token, if any.
    pub owner: Option<User>,
}

/// A pipeline schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleRef {
    /// Schedule id.
    pub id: u64,
}

/// The parent of a child pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentPipeline {
    /// Parent pipeline id.
    pub id: u64,
    /// Parent partition.
    pub partition_id: u64,
    /// Root of the pipeline family.
    pub root_id: u64,
}

/// Chat command data for chat-triggered pipelines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatData {
    /// The command, which names the job to run.
    pub command: String,
    /// Raw command arguments.
    #[serde(default)]
    pub arguments: String,
}

/// A deployment environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    /// Environment id.
    pub id: u64,
    /// Owning project.
    pub project_id: u64,
    /// Environment name.
    pub name: String,
    /// Deployment tier, e.g. `production`.
    pub tier: Option<String>,
}

impl Environment {
    /// Validates an environment name.
    ///
    /// # Errors
    ///
    /// Returns a message describing the first violated constraint.
    pub fn validate_name(name: &str) -> Result<(), String> {
        static NAME: OnceLock<Option<Regex>> = OnceLock::new();

        if name.is_empty() {
            return Err("environment name can't be blank".to_string());
        }
        if name.len() > 255 {
            return Err("environment name is too long (maximum is 255 characters)".to_string());
        }
        if name.starts_with('/') || name.ends_with('/') {
            return Err("environment name cannot start or end with '/'".to_string());
        }

        let valid = NAME
            .get_or_init(|| Regex::new(r"^[a-zA-Z0-9 _/${}.\-]+$").ok())
            .as_ref()
            .is_some_and(|re| re.is_match(name));
        if valid {
            Ok(())
        } else {
            Err(format!("environment name '{name}' contains invalid characters"))
        }
    }
}

/// A mutual-exclusion group for jobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceGroup {
    /// Resource group id.
    pub id: u64,
    /// Owning project.
    pub project_id: u64,
    /// Group key.
    pub key: String,
}

/// A deployment record for a job that starts an environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    /// Deployment id, once persisted.
    pub id: Option<u64>,
    /// Owning project.
    pub project_id: u64,
    /// Target environment.
    pub environment_id: u64,
    /// The deploying job.
    pub job_id: u64,
    /// Ref being deployed.
    pub git_ref: String,
    /// Sha being deployed.
    pub sha: String,
    /// Whether the ref is a tag.
    pub tag: bool,
}
