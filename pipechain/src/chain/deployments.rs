//! Creates deployment records for deployable jobs.

use super::Step;
use crate::context::Command;
use crate::model::{Deployment, Pipeline};
use crate::ports::ChainPorts;
use anyhow::Context;
use async_trait::async_trait;

/// Creates one deployment per job that starts a resolved environment.
#[derive(Debug, Clone)]
pub struct CreateDeployments {
    ports: ChainPorts,
}

impl CreateDeployments {
    /// Creates the step.
    #[must_use]
    pub fn new(ports: ChainPorts) -> Self {
        Self { ports }
    }
}

#[async_trait]
impl Step for CreateDeployments {
    fn name(&self) -> &str {
        "create_deployments"
    }

    async fn perform(&self, pipeline: &mut Pipeline, _command: &mut Command) {
        let Some(pipeline_id) = pipeline.id else {
            return;
        };
        let project_id = pipeline.project_id;
        let git_ref = pipeline.git_ref.clone();
        let sha = pipeline.sha.clone().unwrap_or_default();
        let tag = pipeline.tag;

        for job in pipeline.jobs_mut() {
            if !job.is_deployable() || job.deployment_id.is_some() {
                continue;
            }
            let (Some(job_id), Some(environment_id)) = (job.id, job.environment_id) else {
                continue;
            };

            let deployment = Deployment {
                id: None,
                project_id,
                environment_id,
                job_id,
                git_ref: git_ref.clone(),
                sha: sha.clone(),
                tag,
            };
            let result = self
                .ports
                .deployments
                .create_deployment(deployment)
                .await
                .with_context(|| format!("creating deployment for job '{}'", job.name));
            let deployment = match result {
                Ok(deployment) => deployment,
                Err(e) => {
                    self.ports.error_tracker.track(&e, self.name());
                    continue;
                }
            };

            job.deployment_id = deployment.id;
            if let Err(e) = self.ports.pipelines.update_job(pipeline_id, job).await {
                let e = anyhow::Error::new(e).context(format!("updating job '{}'", job.name));
                self.ports.error_tracker.track(&e, self.name());
            }
        }
    }

    fn should_break(&self, _pipeline: &Pipeline, _command: &Command) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EnvironmentAction, EnvironmentDeclaration, Job, Stage};
    use crate::testing::CommandFixture;

    fn persisted(fixture: &CommandFixture) -> Pipeline {
        let mut pipeline = Pipeline::new();
        pipeline.project_id = 1;
        pipeline.git_ref = "main".into();
        pipeline.sha = Some("a1".into());
        let mut stage = Stage::new("deploy", 0);

        let mut start = Job::new("deploy", "deploy", 0);
        start.environment = Some(EnvironmentDeclaration::new("production"));
        start.environment_id = Some(500);
        let mut stop = Job::new("stop", "deploy", 0);
        stop.environment =
            Some(EnvironmentDeclaration::new("production").with_action(EnvironmentAction::Stop));
        stop.environment_id = Some(500);
        let mut unresolved = Job::new("review", "deploy", 0);
        unresolved.environment = Some(EnvironmentDeclaration::new("review"));

        stage.jobs = vec![start, stop, unresolved];
        pipeline.stages.push(stage);
        fixture.store.insert_pipeline(pipeline)
    }

    #[tokio::test]
    async fn test_creates_deployments_for_deployable_jobs() {
        let fixture = CommandFixture::new();
        let mut pipeline = persisted(&fixture);
        let mut command = fixture.command("main");
        let step = CreateDeployments::new(fixture.ports());

        step.perform(&mut pipeline, &mut command).await;
        step.perform(&mut pipeline, &mut command).await;

        let deployments = fixture.store.deployments();
        assert_eq!(deployments.len(), 1);
        assert_eq!(deployments[0].environment_id, 500);
        assert_eq!(deployments[0].git_ref, "main");
        assert_eq!(pipeline.jobs().next().unwrap().deployment_id, deployments[0].id);
    }

    #[tokio::test]
    async fn test_failures_are_tracked() {
        let fixture = CommandFixture::new();
        fixture.store.fail_deployments();
        let mut pipeline = persisted(&fixture);
        let mut command = fixture.command("main");
        let step = CreateDeployments::new(fixture.ports());

        step.perform(&mut pipeline, &mut command).await;

        assert!(fixture.store.deployments().is_empty());
        assert_eq!(fixture.errors.for_step("create_deployments").len(), 1);
        assert!(!pipeline.has_errors());
        assert!(!step.should_break(&pipeline, &command));
    }
}
