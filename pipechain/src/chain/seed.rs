//! Seeding: the caller's seed block, stage/job seed expansion and the
//! check that something survived.

use super::helpers;
use super::Step;
use crate::context::{Command, SeedTarget};
use crate::core::FailureReason;
use crate::errors::PipelineError;
use crate::model::Pipeline;
use crate::ports::ChainPorts;
use crate::seed::{seed_stages, SeedContext};
use async_trait::async_trait;
use tracing::debug;

/// Hands the pipeline to the caller's seed callback.
#[derive(Debug, Clone, Copy, Default)]
pub struct SeedBlock;

impl SeedBlock {
    /// Creates the step.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Step for SeedBlock {
    fn name(&self) -> &str {
        "seed_block"
    }

    async fn perform(&self, pipeline: &mut Pipeline, command: &mut Command) {
        command.run_seed_callback(SeedTarget::Pipeline(pipeline));
    }

    fn should_break(&self, pipeline: &Pipeline, _command: &Command) -> bool {
        pipeline.has_errors()
    }
}

/// Expands the config into stage seeds and memoizes them on the command.
#[derive(Debug, Clone)]
pub struct Seed {
    ports: ChainPorts,
}

impl Seed {
    /// Creates the step.
    #[must_use]
    pub fn new(ports: ChainPorts) -> Self {
        Self { ports }
    }
}

#[async_trait]
impl Step for Seed {
    fn name(&self) -> &str {
        "seed"
    }

    async fn perform(&self, pipeline: &mut Pipeline, command: &mut Command) {
        let context = SeedContext {
            variables: command.rule_variables().await,
            ref_name: command.ref_name().to_string(),
            ref_kind: command.ref_kind().await,
            source: command.source,
        };

        let seeds = match &command.config {
            Some(config) => seed_stages(&config.stages, &context),
            None => Vec::new(),
        };
        let seeds = command.memoize_stage_seeds(seeds);

        let errors: Vec<String> = seeds.iter().flat_map(|stage| stage.errors()).collect();
        debug!(
            stages = seeds.len(),
            included = seeds.iter().filter(|s| s.is_included()).count(),
            errors = errors.len(),
            "Seeded stages"
        );

        if !errors.is_empty() {
            let error = PipelineError::config(errors.join(", "))
                .with_drop_reason(FailureReason::ConfigError);
            helpers::error(pipeline, command, &self.ports, self.name(), error).await;
        }
    }

    fn should_break(&self, pipeline: &Pipeline, _command: &Command) -> bool {
        pipeline.has_errors()
    }
}

/// Fails the chain when no stage seed survived the rules.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidateSeeds;

impl ValidateSeeds {
    /// Creates the step.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Step for ValidateSeeds {
    fn name(&self) -> &str {
        "validate_seeds"
    }

    async fn perform(&self, pipeline: &mut Pipeline, command: &mut Command) {
        if !command.has_included_stage_seeds() {
            pipeline.add_error(PipelineError::config("No stages / jobs for this pipeline."));
        }
    }

    fn should_break(&self, pipeline: &Pipeline, _command: &Command) -> bool {
        pipeline.has_errors()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::Build;
    use crate::core::PipelineStatus;
    use crate::errors::PipelineErrorKind;
    use crate::processor::{JobAttributes, ProcessedConfig};
    use crate::rules::Rule;
    use crate::testing::CommandFixture;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_seed_block_runs_callback() {
        let mut command = CommandFixture::new()
            .command("main")
            .with_seed_callback(Arc::new(|target: SeedTarget<'_>| {
                if let SeedTarget::Pipeline(pipeline) = target {
                    pipeline.variables.insert("SEEDED".into(), "1".into());
                }
            }));
        let mut pipeline = Pipeline::new();

        SeedBlock::new().perform(&mut pipeline, &mut command).await;

        assert_eq!(pipeline.variables.get("SEEDED").map(String::as_str), Some("1"));
        assert!(!SeedBlock::new().should_break(&pipeline, &command));
    }

    #[tokio::test]
    async fn test_seed_memoizes_stage_seeds() {
        let fixture = CommandFixture::new();
        let mut command = fixture.command("main");
        let mut pipeline = Pipeline::new();
        let step = Seed::new(fixture.ports());

        step.perform(&mut pipeline, &mut command).await;

        let seeds = command.stage_seeds().unwrap();
        assert_eq!(seeds.len(), 2);
        assert_eq!(seeds[0].name, "build");
        assert!(command.has_included_stage_seeds());
        assert!(!step.should_break(&pipeline, &command));
    }

    #[tokio::test]
    async fn test_seed_errors_become_one_config_error() {
        let fixture = CommandFixture::new();
        let config = ProcessedConfig::new()
            .with_stage(
                "build",
                vec![JobAttributes::new("compile", "build")
                    .with_rules(vec![Rule::when_if("$NEVER_SET == \"1\"")])],
            )
            .with_stage("test", vec![JobAttributes::new("rspec", "test").with_need("compile")])
            .with_stage("deploy", vec![JobAttributes::new("deploy", "deploy").with_need("lint")]);
        let mut command = fixture.command("main").with_config(config);
        let mut pipeline = Pipeline::new();
        let step = Seed::new(fixture.ports());

        step.perform(&mut pipeline, &mut command).await;

        assert_eq!(pipeline.errors.len(), 1);
        assert_eq!(pipeline.errors[0].kind, PipelineErrorKind::Config);
        assert_eq!(
            pipeline.errors[0].message,
            "'rspec' job needs 'compile' job, but it was not added to the pipeline, \
             'deploy' job needs 'lint' job, but it was not added to the pipeline"
        );
        assert!(step.should_break(&pipeline, &command));
        assert!(!pipeline.is_persisted());
    }

    #[tokio::test]
    async fn test_seed_errors_drop_when_saving_incomplete() {
        let fixture = CommandFixture::new();
        let config = ProcessedConfig::new()
            .with_stage("test", vec![JobAttributes::new("rspec", "test").with_need("compile")]);
        let mut command = fixture
            .command("main")
            .with_config(config)
            .with_save_incompleted(true);
        let mut pipeline = Pipeline::new();
        Build::new().perform(&mut pipeline, &mut command).await;
        pipeline.partition_id = Some(100);

        Seed::new(fixture.ports()).perform(&mut pipeline, &mut command).await;

        assert!(pipeline.is_persisted());
        assert_eq!(pipeline.status, PipelineStatus::Failed);
        assert_eq!(pipeline.failure_reason, Some(FailureReason::ConfigError));
    }

    #[tokio::test]
    async fn test_validate_seeds_without_included_jobs() {
        let fixture = CommandFixture::new();
        let config = ProcessedConfig::new().with_stage(
            "test",
            vec![JobAttributes::new("rspec", "test").with_rules(vec![Rule::when_if("$X")])],
        );
        let mut command = fixture.command("main").with_config(config);
        let mut pipeline = Pipeline::new();

        Seed::new(fixture.ports()).perform(&mut pipeline, &mut command).await;
        assert!(!pipeline.has_errors());

        let step = ValidateSeeds::new();
        step.perform(&mut pipeline, &mut command).await;

        assert_eq!(pipeline.error_messages(), vec!["No stages / jobs for this pipeline."]);
        assert!(step.should_break(&pipeline, &command));
    }
}
