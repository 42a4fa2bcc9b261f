//! The pipeline aggregate under construction.

use super::{Job, ParentPipeline, Stage};
use crate::core::{ConfigSource, FailureReason, PipelineSource, PipelineStatus};
use crate::errors::{PipelineError, PipelineErrorKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Auto-cancel behaviour when a newer commit is pushed to the same ref.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnNewCommit {
    /// Cancel siblings unless they started a non-interruptible job.
    #[default]
    Conservative,
    /// Cancel only the interruptible jobs of siblings.
    Interruptible,
    /// Never cancel.
    None,
}

/// Auto-cancel behaviour when a job of this pipeline fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnJobFailure {
    /// Keep other jobs running.
    #[default]
    None,
    /// Cancel the remaining jobs.
    All,
}

/// Auto-cancel settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AutoCancel {
    /// On a new commit.
    #[serde(default)]
    pub on_new_commit: OnNewCommit,
    /// On a job failure.
    #[serde(default)]
    pub on_job_failure: OnJobFailure,
}

/// Optional sidecar attached to a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PipelineMetadata {
    /// Derived pipeline name.
    pub name: Option<String>,
    /// Auto-cancel settings.
    pub auto_cancel: AutoCancel,
}

impl PipelineMetadata {
    /// Validates the metadata.
    ///
    /// # Errors
    ///
    /// Returns the reason the metadata is unusable.
    pub fn validate(&self, max_name_length: usize) -> Result<(), String> {
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err("name can't be blank".to_string());
            }
            if name.chars().count() > max_name_length {
                return Err(format!(
                    "name is too long (maximum is {max_name_length} characters)"
                ));
            }
        }
        Ok(())
    }
}

/// One CI run, assembled step by step.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Pipeline {
    /// Pipeline id; `Some` once persisted.
    pub id: Option<u64>,
    /// Project-scoped sequential id.
    pub iid: Option<u64>,
    /// Owning project.
    pub project_id: u64,
    /// Short ref name.
    pub git_ref: String,
    /// Whether the ref is a tag.
    pub tag: bool,
    /// Target commit.
    pub sha: Option<String>,
    /// Previous commit of the ref.
    pub before_sha: Option<String>,
    /// The requesting event.
    pub source: PipelineSource,
    /// Where the config came from.
    pub config_source: ConfigSource,
    /// Current status.
    pub status: PipelineStatus,
    /// Why the pipeline was dropped.
    pub failure_reason: Option<FailureReason>,
    /// Sharding partition; assigned exactly once.
    pub partition_id: Option<u64>,
    /// Whether the ref is protected.
    pub protected: bool,
    /// Acting user.
    pub user_id: Option<u64>,
    /// Trigger request, if triggered.
    pub trigger_request_id: Option<u64>,
    /// Schedule, if scheduled.
    pub schedule_id: Option<u64>,
    /// Parent pipeline, for child pipelines.
    pub parent_pipeline: Option<ParentPipeline>,
    /// Pipeline variables.
    pub variables: BTreeMap<String, String>,
    /// Stages in declaration order.
    pub stages: Vec<Stage>,
    /// Metadata sidecar.
    pub metadata: Option<PipelineMetadata>,
    /// Structured errors.
    pub errors: Vec<PipelineError>,
    /// Non-blocking warnings.
    pub warnings: Vec<String>,
    /// The pipeline that auto-cancelled this one.
    pub auto_canceled_by_id: Option<u64>,
    /// Optimistic-locking version.
    pub lock_version: u64,
    /// Creation time.
    pub created_at: Option<DateTime<Utc>>,
}

impl Pipeline {
    /// Creates an empty pipeline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true once the pipeline has been saved.
    #[must_use]
    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }

    /// Returns true if the pipeline is a child pipeline.
    #[must_use]
    pub fn is_child(&self) -> bool {
        self.parent_pipeline.is_some()
    }

    /// Returns the id of the root of this pipeline's family.
    #[must_use]
    pub fn root_id(&self) -> Option<u64> {
        self.parent_pipeline.map(|p| p.root_id).or(self.id)
    }

    /// Assigns the partition. Returns false if one was already assigned.
    pub fn assign_partition(&mut self, partition_id: u64) -> bool {
        if self.partition_id.is_some() {
            return false;
        }
        self.partition_id = Some(partition_id);
        true
    }

    /// Attaches an error.
    pub fn add_error(&mut self, error: PipelineError) {
        self.errors.push(error);
    }

    /// Attaches a warning.
    pub fn add_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    /// Returns true if any error is attached.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Returns all error messages.
    #[must_use]
    pub fn error_messages(&self) -> Vec<&str> {
        self.errors.iter().map(|e| e.message.as_str()).collect()
    }

    /// Returns configuration error messages joined for display.
    #[must_use]
    pub fn yaml_errors(&self) -> Option<String> {
        let messages: Vec<&str> = self
            .errors
            .iter()
            .filter(|e| e.kind == PipelineErrorKind::Config)
            .map(|e| e.message.as_str())
            .collect();
        if messages.is_empty() {
            None
        } else {
            Some(messages.join(", "))
        }
    }

    /// Iterates over all jobs in stage order.
    pub fn jobs(&self) -> impl Iterator<Item = &Job> {
        self.stages.iter().flat_map(|s| s.jobs.iter())
    }

    /// Iterates mutably over all jobs in stage order.
    pub fn jobs_mut(&mut self) -> impl Iterator<Item = &mut Job> {
        self.stages.iter_mut().flat_map(|s| s.jobs.iter_mut())
    }

    /// Returns the number of jobs.
    #[must_use]
    pub fn job_count(&self) -> usize {
        self.stages.iter().map(|s| s.jobs.len()).sum()
    }

    /// Transitions to `failed` with a reason.
    pub fn drop_with(&mut self, reason: FailureReason) {
        self.status = PipelineStatus::Failed;
        self.failure_reason = Some(reason);
    }

    /// Transitions to `skipped`.
    pub fn skip(&mut self) {
        self.status = PipelineStatus::Skipped;
    }

    /// Validates the assembled pipeline before persistence.
    ///
    /// # Errors
    ///
    /// Returns every violated constraint.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut problems = Vec::new();

        if self.git_ref.trim().is_empty() {
            problems.push("Ref can't be blank".to_string());
        }
        if self.sha.as_deref().map_or(true, str::is_empty) {
            problems.push("Sha can't be blank".to_string());
        }
        if self.partition_id.is_none() {
            problems.push("Partition can't be blank".to_string());
        }

        let mut seen = HashSet::new();
        for job in self.jobs() {
            if !seen.insert(job.name.as_str()) {
                problems.push(format!("Job name '{}' is not unique", job.name));
            }
        }

        if self
            .stages
            .windows(2)
            .any(|pair| pair[0].position >= pair[1].position)
        {
            problems.push("Stages are not in declaration order".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(problems)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_pipeline() -> Pipeline {
        let mut pipeline = Pipeline::new();
        pipeline.git_ref = "main".to_string();
        pipeline.sha = Some("abc123".to_string());
        pipeline.partition_id = Some(100);

        let mut build = Stage::new("build", 0);
        build.jobs.push(Job::new("compile", "build", 0));
        let mut test = Stage::new("test", 1);
        test.jobs.push(Job::new("rspec", "test", 1));
        pipeline.stages = vec![build, test];
        pipeline
    }

    #[test]
    fn test_assign_partition_once() {
        let mut pipeline = Pipeline::new();
        assert!(pipeline.assign_partition(101));
        assert!(!pipeline.assign_partition(102));
        assert_eq!(pipeline.partition_id, Some(101));
    }

    #[test]
    fn test_validate_ok() {
        assert!(valid_pipeline().validate().is_ok());
    }

    #[test]
    fn test_validate_reports_every_problem() {
        let mut pipeline = valid_pipeline();
        pipeline.sha = None;
        pipeline.stages[1].jobs.push(Job::new("compile", "test", 1));

        let problems = pipeline.validate().unwrap_err();
        assert_eq!(problems.len(), 2);
        assert!(problems.contains(&"Sha can't be blank".to_string()));
        assert!(problems.contains(&"Job name 'compile' is not unique".to_string()));
    }

    #[test]
    fn test_yaml_errors_only_config_kind() {
        let mut pipeline = Pipeline::new();
        pipeline.add_error(PipelineError::permission("nope"));
        assert_eq!(pipeline.yaml_errors(), None);

        pipeline.add_error(PipelineError::config("jobs config should contain at least one visible job"));
        assert_eq!(
            pipeline.yaml_errors().as_deref(),
            Some("jobs config should contain at least one visible job")
        );
    }

    #[test]
    fn test_root_id() {
        let mut pipeline = Pipeline::new();
        pipeline.id = Some(9);
        assert_eq!(pipeline.root_id(), Some(9));

        pipeline.parent_pipeline = Some(ParentPipeline {
            id: 5,
            partition_id: 100,
            root_id: 3,
        });
        assert_eq!(pipeline.root_id(), Some(3));
    }

    #[test]
    fn test_metadata_validation() {
        let metadata = PipelineMetadata {
            name: Some("x".repeat(10)),
            auto_cancel: AutoCancel::default(),
        };
        assert!(metadata.validate(10).is_ok());
        assert!(metadata.validate(9).is_err());

        let blank = PipelineMetadata {
            name: Some("  ".to_string()),
            ..PipelineMetadata::default()
        };
        assert!(blank.validate(255).is_err());
    }
}
