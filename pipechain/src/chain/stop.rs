//! Short-circuits before persistence for lint and dry runs.
//!
//! Both steps hand the IID allocated by `Populate` back to the project
//! sequence before breaking.

use super::helpers;
use super::Step;
use crate::context::Command;
use crate::model::Pipeline;
use crate::ports::ChainPorts;
use async_trait::async_trait;
use tracing::debug;

/// Breaks when the command only lints the config.
#[derive(Debug, Clone)]
pub struct StopLinting {
    ports: ChainPorts,
}

impl StopLinting {
    /// Creates the step.
    #[must_use]
    pub fn new(ports: ChainPorts) -> Self {
        Self { ports }
    }
}

#[async_trait]
impl Step for StopLinting {
    fn name(&self) -> &str {
        "stop_linting"
    }

    async fn perform(&self, pipeline: &mut Pipeline, command: &mut Command) {
        if command.lint_only {
            debug!(iid = ?pipeline.iid, "Lint only, releasing iid");
            helpers::release_iid(pipeline, &self.ports, self.name()).await;
        }
    }

    fn should_break(&self, _pipeline: &Pipeline, command: &Command) -> bool {
        command.lint_only
    }
}

/// Breaks when the command is a dry run.
#[derive(Debug, Clone)]
pub struct StopDryRun {
    ports: ChainPorts,
}

impl StopDryRun {
    /// Creates the step.
    #[must_use]
    pub fn new(ports: ChainPorts) -> Self {
        Self { ports }
    }
}

#[async_trait]
impl Step for StopDryRun {
    fn name(&self) -> &str {
        "stop_dry_run"
    }

    async fn perform(&self, pipeline: &mut Pipeline, command: &mut Command) {
        if command.dry_run {
            debug!(iid = ?pipeline.iid, "Dry run, releasing iid");
            helpers::release_iid(pipeline, &self.ports, self.name()).await;
        }
    }

    fn should_break(&self, _pipeline: &Pipeline, command: &Command) -> bool {
        command.dry_run
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StoreError;
    use crate::ports::PipelineStore;
    use crate::testing::CommandFixture;

    async fn populated(fixture: &CommandFixture) -> Pipeline {
        let mut pipeline = Pipeline::new();
        pipeline.project_id = 1;
        pipeline.iid = Some(fixture.store.allocate_iid(1).await.unwrap());
        pipeline
    }

    #[test]
    fn test_flags_decide() {
        let fixture = CommandFixture::new();
        let pipeline = Pipeline::new();
        let lint_step = StopLinting::new(fixture.ports());
        let dry_step = StopDryRun::new(fixture.ports());

        let plain = fixture.command("main");
        assert!(!lint_step.should_break(&pipeline, &plain));
        assert!(!dry_step.should_break(&pipeline, &plain));

        let lint = fixture.command("main").with_lint_only(true);
        assert!(lint_step.should_break(&pipeline, &lint));
        assert!(!dry_step.should_break(&pipeline, &lint));

        let dry = fixture.command("main").with_dry_run(true);
        assert!(!lint_step.should_break(&pipeline, &dry));
        assert!(dry_step.should_break(&pipeline, &dry));
    }

    #[tokio::test]
    async fn test_breaking_releases_iid() {
        let fixture = CommandFixture::new();

        let mut pipeline = populated(&fixture).await;
        let mut lint = fixture.command("main").with_lint_only(true);
        StopLinting::new(fixture.ports())
            .perform(&mut pipeline, &mut lint)
            .await;
        assert_eq!(pipeline.iid, None);

        let mut pipeline = populated(&fixture).await;
        let mut dry = fixture.command("main").with_dry_run(true);
        StopDryRun::new(fixture.ports())
            .perform(&mut pipeline, &mut dry)
            .await;
        assert_eq!(pipeline.iid, None);

        assert_eq!(fixture.store.released_iids(), vec![(1, 1), (1, 1)]);
        assert_eq!(fixture.store.allocate_iid(1).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_plain_run_keeps_iid() {
        let fixture = CommandFixture::new();
        let mut pipeline = populated(&fixture).await;
        let mut command = fixture.command("main");

        StopLinting::new(fixture.ports())
            .perform(&mut pipeline, &mut command)
            .await;
        StopDryRun::new(fixture.ports())
            .perform(&mut pipeline, &mut command)
            .await;

        assert_eq!(pipeline.iid, Some(1));
        assert!(fixture.store.released_iids().is_empty());
        assert!(fixture.errors.is_empty());
    }

    #[tokio::test]
    async fn test_release_failure_is_tracked() {
        let fixture = CommandFixture::new();
        let mut pipeline = populated(&fixture).await;
        fixture
            .store
            .fail_release_with(StoreError::Unavailable("replica lag".into()));
        let mut dry = fixture.command("main").with_dry_run(true);

        StopDryRun::new(fixture.ports())
            .perform(&mut pipeline, &mut dry)
            .await;

        assert_eq!(pipeline.iid, None);
        let tracked = fixture.errors.for_step("stop_dry_run");
        assert_eq!(tracked.len(), 1);
        assert_eq!(tracked[0].message, "releasing iid 1: Store unavailable: replica lag");
    }
}
