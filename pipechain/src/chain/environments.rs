//! Resolves environments and resource groups for persisted jobs.

use super::Step;
use crate::context::Command;
use crate::core::FailureReason;
use crate::model::{Environment, Job, Pipeline};
use crate::ports::ChainPorts;
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use tracing::warn;

async fn save_job(ports: &ChainPorts, pipeline_id: u64, job: &Job, step: &str) {
    if let Err(e) = ports.pipelines.update_job(pipeline_id, job).await {
        let e = anyhow::Error::new(e).context(format!("updating job '{}'", job.name));
        ports.error_tracker.track(&e, step);
    }
}

/// Finds or creates the environment of each job that declares one.
///
/// A job whose environment cannot be resolved is failed on its own; the
/// pipeline carries on.
#[derive(Debug, Clone)]
pub struct EnsureEnvironments {
    ports: ChainPorts,
}

impl EnsureEnvironments {
    /// Creates the step.
    #[must_use]
    pub fn new(ports: ChainPorts) -> Self {
        Self { ports }
    }

    async fn resolve(&self, project_id: u64, job: &Job) -> anyhow::Result<Option<u64>> {
        let Some(declaration) = &job.environment else {
            return Ok(None);
        };
        Environment::validate_name(&declaration.name).map_err(|detail| anyhow!(detail))?;
        let environment = self
            .ports
            .environments
            .find_or_create_environment(
                project_id,
                &declaration.name,
                declaration.deployment_tier.as_deref(),
            )
            .await
            .with_context(|| format!("environment '{}'", declaration.name))?;
        Ok(Some(environment.id))
    }
}

#[async_trait]
impl Step for EnsureEnvironments {
    fn name(&self) -> &str {
        "ensure_environments"
    }

    async fn perform(&self, pipeline: &mut Pipeline, _command: &mut Command) {
        let Some(pipeline_id) = pipeline.id else {
            return;
        };
        let project_id = pipeline.project_id;

        for job in pipeline.jobs_mut() {
            if job.environment.is_none() || job.environment_id.is_some() {
                continue;
            }
            match self.resolve(project_id, job).await {
                Ok(environment_id) => job.environment_id = environment_id,
                Err(e) => {
                    warn!(job = %job.name, error = %e, "Failed to ensure environment");
                    self.ports.error_tracker.track(&e, self.name());
                    job.drop_with(FailureReason::EnvironmentCreationFailure);
                }
            }
            save_job(&self.ports, pipeline_id, job, self.name()).await;
        }
    }

    fn should_break(&self, _pipeline: &Pipeline, _command: &Command) -> bool {
        false
    }
}

/// Finds or creates the resource group of each job that declares a key.
#[derive(Debug, Clone)]
pub struct EnsureResourceGroups {
    ports: ChainPorts,
}

impl EnsureResourceGroups {
    /// Creates the step.
    #[must_use]
    pub fn new(ports: ChainPorts) -> Self {
        Self { ports }
    }
}

#[async_trait]
impl Step for EnsureResourceGroups {
    fn name(&self) -> &str {
        "ensure_resource_groups"
    }

    async fn perform(&self, pipeline: &mut Pipeline, _command: &mut Command) {
        let Some(pipeline_id) = pipeline.id else {
            return;
        };
        let project_id = pipeline.project_id;

        for job in pipeline.jobs_mut() {
            if job.resource_group_id.is_some() {
                continue;
            }
            let Some(key) = job.resource_group_key.clone() else {
                continue;
            };

            let result = self
                .ports
                .resource_groups
                .find_or_create_resource_group(project_id, &key)
                .await;
            match result {
                Ok(group) => job.resource_group_id = Some(group.id),
                Err(e) => {
                    warn!(job = %job.name, key = %key, error = %e, "Failed to ensure resource group");
                    let e = anyhow::Error::new(e).context(format!("resource group '{key}'"));
                    self.ports.error_tracker.track(&e, self.name());
                    job.drop_with(FailureReason::ResourceGroupFailure);
                }
            }
            save_job(&self.ports, pipeline_id, job, self.name()).await;
        }
    }

    fn should_break(&self, _pipeline: &Pipeline, _command: &Command) -> bool {
        false
    }
}
