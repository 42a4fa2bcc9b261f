//! The config processor result consumed by the chain.
//!
//! Parsing the configuration language happens elsewhere. The chain only
//! sees the declarative attribute lists produced by that parser.

use crate::core::{BuildSource, ConfigSource, When};
use crate::model::{AutoCancel, EnvironmentDeclaration};
use crate::rules::{RefFilter, Rule};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Declarative attributes of one job.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JobAttributes {
    /// Job name.
    pub name: String,
    /// Stage name.
    pub stage: String,
    /// Default `when`.
    pub when: When,
    /// Default `allow_failure`.
    pub allow_failure: bool,
    /// Delay for delayed jobs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_in: Option<String>,
    /// Inclusion rules.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rules: Option<Vec<Rule>>,
    /// `only:` ref filter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub only: Option<RefFilter>,
    /// `except:` ref filter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub except: Option<RefFilter>,
    /// Names of jobs this job needs.
    pub needs: Vec<String>,
    /// Whether the job may be cancelled by a newer pipeline.
    pub interruptible: bool,
    /// Resource group key, may contain variables.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_group: Option<String>,
    /// Environment declaration, name may contain variables.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<EnvironmentDeclaration>,
    /// Set when a security policy injected the job.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub injected_by: Option<BuildSource>,
    /// Opaque options passed through to the job.
    pub options: serde_json::Value,
}

impl JobAttributes {
    /// Creates attributes for a job in `stage`.
    #[must_use]
    pub fn new(name: impl Into<String>, stage: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stage: stage.into(),
            ..Self::default()
        }
    }

    /// Sets the rules.
    #[must_use]
    pub fn with_rules(mut self, rules: Vec<Rule>) -> Self {
        self.rules = Some(rules);
        self
    }

    /// Sets the `only:` filter.
    #[must_use]
    pub fn with_only(mut self, filter: RefFilter) -> Self {
        self.only = Some(filter);
        self
    }

    /// Sets the `except:` filter.
    #[must_use]
    pub fn with_except(mut self, filter: RefFilter) -> Self {
        self.except = Some(filter);
        self
    }

    /// Adds a need.
    #[must_use]
    pub fn with_need(mut self, job: impl Into<String>) -> Self {
        self.needs.push(job.into());
        self
    }

    /// Sets the resource group key.
    #[must_use]
    pub fn with_resource_group(mut self, key: impl Into<String>) -> Self {
        self.resource_group = Some(key.into());
        self
    }

    /// Sets the environment.
    #[must_use]
    pub fn with_environment(mut self, environment: EnvironmentDeclaration) -> Self {
        self.environment = Some(environment);
        self
    }

    /// Marks the job interruptible.
    #[must_use]
    pub fn with_interruptible(mut self, interruptible: bool) -> Self {
        self.interruptible = interruptible;
        self
    }

    /// Sets the default `when`.
    #[must_use]
    pub fn with_when(mut self, when: When) -> Self {
        self.when = when;
        self
    }

    /// Marks the job as injected by a policy.
    #[must_use]
    pub fn with_injected_by(mut self, source: BuildSource) -> Self {
        self.injected_by = Some(source);
        self
    }
}

/// Declarative attributes of one stage.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StageAttributes {
    /// Stage name.
    pub name: String,
    /// Declaration ordinal.
    pub index: usize,
    /// Jobs in declaration order.
    #[serde(default)]
    pub jobs: Vec<JobAttributes>,
}

/// Top-level `workflow:` attributes.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Workflow rules; `None` when the config declares none.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rules: Option<Vec<Rule>>,
    /// Pipeline name, may contain variables.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Auto-cancel settings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_cancel: Option<AutoCancel>,
}

/// A reusable component referenced by the config.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComponentRef {
    /// Catalog project path.
    pub project_path: String,
    /// Component name.
    pub name: String,
    /// Resolved version.
    pub version: String,
}

/// The parsed configuration handed to the chain.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessedConfig {
    /// Stages in declaration order.
    pub stages: Vec<StageAttributes>,
    /// Workflow attributes.
    pub workflow: WorkflowConfig,
    /// Global YAML variables.
    pub variables: BTreeMap<String, String>,
    /// Names of included templates.
    pub included_templates: Vec<String>,
    /// Included catalog components.
    pub included_components: Vec<ComponentRef>,
    /// Keywords used by the config.
    pub keywords: Vec<String>,
    /// Names of the inputs declared in the config header.
    pub declared_inputs: Vec<String>,
    /// Parse errors.
    pub errors: Vec<String>,
    /// Parse warnings.
    pub warnings: Vec<String>,
    /// Where the config came from.
    pub config_source: ConfigSource,
}

impl ProcessedConfig {
    /// Creates an empty config from the repository.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config_source: ConfigSource::RepositorySource,
            ..Self::default()
        }
    }

    /// Appends a stage with its jobs.
    #[must_use]
    pub fn with_stage(mut self, name: impl Into<String>, jobs: Vec<JobAttributes>) -> Self {
        let index = self.stages.len();
        self.stages.push(StageAttributes {
            name: name.into(),
            index,
            jobs,
        });
        self
    }

    /// Sets the workflow attributes.
    #[must_use]
    pub fn with_workflow(mut self, workflow: WorkflowConfig) -> Self {
        self.workflow = workflow;
        self
    }

    /// Adds a global variable.
    #[must_use]
    pub fn with_variable(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(key.into(), value.into());
        self
    }

    /// Adds a parse error.
    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.errors.push(error.into());
        self
    }

    /// Parses a processed config from JSON.
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Returns true when the parser reported errors.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Returns the total number of declared jobs.
    #[must_use]
    pub fn job_count(&self) -> usize {
        self.stages.iter().map(|s| s.jobs.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_stage_assigns_indexes() {
        let config = ProcessedConfig::new()
            .with_stage("build", vec![JobAttributes::new("compile", "build")])
            .with_stage("test", vec![JobAttributes::new("rspec", "test"), JobAttributes::new("lint", "test")]);

        assert_eq!(config.stages[0].index, 0);
        assert_eq!(config.stages[1].index, 1);
        assert_eq!(config.job_count(), 3);
        assert_eq!(config.config_source, ConfigSource::RepositorySource);
    }

    #[test]
    fn test_from_json() {
        let config = ProcessedConfig::from_json_str(
            r#"{
                "stages": [
                    {"name": "deploy", "index": 0, "jobs": [
                        {"name": "production", "stage": "deploy",
                         "rules": [{"if": "$CI_COMMIT_BRANCH == \"main\""}],
                         "environment": {"name": "production"},
                         "resource_group": "prod"}
                    ]}
                ],
                "workflow": {"rules": [{"when": "always"}]},
                "included_templates": ["Auto-DevOps.gitlab-ci.yml"]
            }"#,
        )
        .unwrap();

        let job = &config.stages[0].jobs[0];
        assert_eq!(job.resource_group.as_deref(), Some("prod"));
        assert_eq!(job.environment.as_ref().unwrap().name, "production");
        assert_eq!(job.rules.as_ref().unwrap().len(), 1);
        assert_eq!(job.when, When::OnSuccess);
        assert!(config.workflow.rules.is_some());
        assert_eq!(config.included_templates, vec!["Auto-DevOps.gitlab-ci.yml"]);
    }
}
