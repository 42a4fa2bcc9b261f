//! Guard steps: abilities, repository state and config presence.

use super::helpers;
use super::Step;
use crate::context::{Command, RefLookup};
use crate::core::FailureReason;
use crate::errors::{PipelineError, PipelineErrorKind};
use crate::model::Pipeline;
use crate::ports::ChainPorts;
use async_trait::async_trait;

/// Checks that the actor may create a pipeline on the ref.
#[derive(Debug, Clone)]
pub struct ValidateAbilities {
    ports: ChainPorts,
}

impl ValidateAbilities {
    /// Creates the step.
    #[must_use]
    pub fn new(ports: ChainPorts) -> Self {
        Self { ports }
    }

    async fn check(&self, pipeline: &Pipeline, command: &mut Command) -> Option<PipelineError> {
        if !command.project.builds_enabled {
            return Some(PipelineError::permission("Pipelines are disabled!"));
        }

        let lookup = command.ref_lookup().await;
        let command = &*command;
        let protected_ref_denied = || {
            PipelineError::permission(format!(
                "Insufficient permissions for protected ref '{}'",
                command.ref_name()
            ))
        };

        let Some(user) = command.actor() else {
            if command.trigger_request.is_none() {
                return Some(PipelineError::permission(
                    "Insufficient permissions to create a new pipeline",
                ));
            }
            return pipeline.protected.then(protected_ref_denied);
        };

        let permissions = &self.ports.permissions;
        if !permissions.can_create_pipeline(user, &command.project).await {
            return Some(PipelineError::permission(
                "Insufficient permissions to create a new pipeline",
            ));
        }

        let ref_name = command.ref_name();
        let allowed = if lookup.branch_exists() {
            permissions.can_update_branch(user, &command.project, ref_name).await
        } else if lookup.tag_exists() {
            permissions.can_create_tag(user, &command.project, ref_name).await
        } else {
            // Missing refs are reported by ValidateRepository.
            true
        };
        if !allowed {
            return Some(protected_ref_denied());
        }

        if let Some(extension) = &self.ports.ability_extension {
            if let Err(message) = extension.validate(pipeline, command).await {
                return Some(PipelineError::permission(message));
            }
        }
        None
    }
}

#[async_trait]
impl Step for ValidateAbilities {
    fn name(&self) -> &str {
        "validate_abilities"
    }

    async fn perform(&self, pipeline: &mut Pipeline, command: &mut Command) {
        if let Some(error) = self.check(pipeline, command).await {
            helpers::error(pipeline, command, &self.ports, self.name(), error).await;
        }
    }

    fn should_break(&self, pipeline: &Pipeline, _command: &Command) -> bool {
        pipeline.has_errors()
    }
}

/// Checks that the ref and its commit exist and the ref is unambiguous.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidateRepository;

impl ValidateRepository {
    /// Creates the step.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Step for ValidateRepository {
    fn name(&self) -> &str {
        "validate_repository"
    }

    async fn perform(&self, pipeline: &mut Pipeline, command: &mut Command) {
        let lookup = command.ref_lookup().await;
        let message = if lookup == RefLookup::Missing {
            Some("Reference not found")
        } else if command.sha().await.filter(|sha| !sha.is_empty()).is_none() {
            Some("Commit not found")
        } else if lookup == RefLookup::Ambiguous {
            Some("Ref is ambiguous")
        } else {
            None
        };

        if let Some(message) = message {
            pipeline.add_error(PipelineError::new(PipelineErrorKind::Repository, message));
        }
    }

    fn should_break(&self, pipeline: &Pipeline, _command: &Command) -> bool {
        pipeline.has_errors()
    }
}

/// Checks that a usable config was found.
#[derive(Debug, Clone)]
pub struct ValidateConfig {
    ports: ChainPorts,
}

impl ValidateConfig {
    /// Creates the step.
    #[must_use]
    pub fn new(ports: ChainPorts) -> Self {
        Self { ports }
    }
}

#[async_trait]
impl Step for ValidateConfig {
    fn name(&self) -> &str {
        "validate_config"
    }

    async fn perform(&self, pipeline: &mut Pipeline, command: &mut Command) {
        let Some(config) = &command.config else {
            pipeline.add_error(PipelineError::config("Missing CI config file"));
            return;
        };

        pipeline.warnings.extend(config.warnings.iter().cloned());
        pipeline.config_source = config.config_source;

        if config.has_errors() {
            let error = PipelineError::config(config.errors.join(", "))
                .with_drop_reason(FailureReason::ConfigError);
            helpers::error(pipeline, command, &self.ports, self.name(), error).await;
        }
    }

    fn should_break(&self, pipeline: &Pipeline, _command: &Command) -> bool {
        pipeline.has_errors() || pipeline.is_persisted()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::PipelineStatus;
    use crate::model::{Project, TriggerRequest, User};
    use crate::ports::AbilityExtension;
    use crate::processor::ProcessedConfig;
    use crate::testing::{CommandFixture, InMemoryRepository, StaticPermissions, DEFAULT_SHA};
    use std::sync::Arc;

    async fn abilities(fixture: &CommandFixture, mut command: Command) -> Pipeline {
        let mut pipeline = Pipeline::new();
        pipeline.protected = command.protected_ref().await;
        ValidateAbilities::new(fixture.ports())
            .perform(&mut pipeline, &mut command)
            .await;
        pipeline
    }

    fn protected_main() -> InMemoryRepository {
        InMemoryRepository::new()
            .with_branch("main", DEFAULT_SHA, "m")
            .with_tag("v1", "t1", "t")
            .with_protected("main")
            .with_protected("v1")
    }

    #[tokio::test]
    async fn test_maintainer_is_allowed() {
        let fixture = CommandFixture::new().with_repository(protected_main());
        let pipeline = abilities(&fixture, fixture.command("main")).await;
        assert!(!pipeline.has_errors());
    }

    #[tokio::test]
    async fn test_builds_disabled() {
        let fixture = CommandFixture::new()
            .with_project(Project::new(1, "group/project").with_builds_enabled(false));
        let pipeline = abilities(&fixture, fixture.command("main")).await;
        assert_eq!(pipeline.error_messages(), vec!["Pipelines are disabled!"]);
        assert_eq!(pipeline.errors[0].kind, PipelineErrorKind::Permission);
    }

    #[tokio::test]
    async fn test_cannot_create_pipeline() {
        let fixture = CommandFixture::new().with_permissions(StaticPermissions::denied());
        let pipeline = abilities(&fixture, fixture.command("main")).await;
        assert_eq!(
            pipeline.error_messages(),
            vec!["Insufficient permissions to create a new pipeline"]
        );
    }

    #[tokio::test]
    async fn test_developer_on_protected_refs() {
        let fixture = CommandFixture::new()
            .with_repository(protected_main())
            .with_permissions(StaticPermissions::developer(["main", "v1"]));

        let pipeline = abilities(&fixture, fixture.command("main")).await;
        assert_eq!(
            pipeline.error_messages(),
            vec!["Insufficient permissions for protected ref 'main'"]
        );

        let pipeline = abilities(&fixture, fixture.command("refs/tags/v1")).await;
        assert_eq!(
            pipeline.error_messages(),
            vec!["Insufficient permissions for protected ref 'v1'"]
        );
    }

    #[tokio::test]
    async fn test_ownerless_trigger() {
        let fixture = CommandFixture::new().with_repository(protected_main());
        let trigger = TriggerRequest { id: 1, owner: None };
        let command = |origin_ref: &str| {
            Command::new(fixture.project.clone(), fixture.repository.clone(), origin_ref)
                .with_trigger_request(trigger.clone())
        };

        let pipeline = abilities(&fixture, command("main")).await;
        assert_eq!(
            pipeline.error_messages(),
            vec!["Insufficient permissions for protected ref 'main'"]
        );

        let pipeline = abilities(&fixture, command("refs/tags/v2")).await;
        assert!(!pipeline.has_errors());
    }

    #[tokio::test]
    async fn test_no_actor_and_no_trigger() {
        let fixture = CommandFixture::new();
        let command = Command::new(fixture.project.clone(), fixture.repository.clone(), "main");
        let pipeline = abilities(&fixture, command).await;
        assert_eq!(
            pipeline.error_messages(),
            vec!["Insufficient permissions to create a new pipeline"]
        );
    }

    #[tokio::test]
    async fn test_trigger_owner_is_checked() {
        let fixture = CommandFixture::new()
            .with_repository(protected_main())
            .with_permissions(StaticPermissions::developer(["main"]));
        let command = Command::new(fixture.project.clone(), fixture.repository.clone(), "main")
            .with_trigger_request(TriggerRequest {
                id: 1,
                owner: Some(User::new(3, "owner")),
            });

        let pipeline = abilities(&fixture, command).await;
        assert_eq!(
            pipeline.error_messages(),
            vec!["Insufficient permissions for protected ref 'main'"]
        );
    }

    #[derive(Debug)]
    struct Veto;

    #[async_trait]
    impl AbilityExtension for Veto {
        fn name(&self) -> &str {
            "veto"
        }

        async fn validate(&self, _pipeline: &Pipeline, command: &Command) -> Result<(), String> {
            if command.ref_name() == "main" {
                Err("Pipeline blocked by compliance policy".to_string())
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn test_ability_extension_veto() {
        let fixture = CommandFixture::new();
        let step = ValidateAbilities::new(fixture.ports().with_ability_extension(Arc::new(Veto)));
        let mut command = fixture.command("main");
        let mut pipeline = Pipeline::new();

        step.perform(&mut pipeline, &mut command).await;

        assert_eq!(pipeline.error_messages(), vec!["Pipeline blocked by compliance policy"]);
        assert!(step.should_break(&pipeline, &command));
    }

    async fn repository_errors(repository: InMemoryRepository, origin_ref: &str) -> Vec<String> {
        let fixture = CommandFixture::new().with_repository(repository);
        let mut command = fixture.command(origin_ref);
        let mut pipeline = Pipeline::new();
        ValidateRepository::new().perform(&mut pipeline, &mut command).await;
        pipeline.errors.into_iter().map(|e| e.message).collect()
    }

    #[tokio::test]
    async fn test_repository_checks() {
        let repo = || {
            InMemoryRepository::new()
                .with_branch("main", DEFAULT_SHA, "m")
                .with_branch("dup", "b1", "b")
                .with_tag("dup", "t1", "t")
                .with_branch("orphan", "", "")
        };

        assert!(repository_errors(repo(), "main").await.is_empty());
        assert_eq!(repository_errors(repo(), "nope").await, vec!["Reference not found"]);
        assert_eq!(repository_errors(repo(), "orphan").await, vec!["Commit not found"]);
        assert_eq!(repository_errors(repo(), "dup").await, vec!["Ref is ambiguous"]);
    }

    #[tokio::test]
    async fn test_missing_config() {
        let fixture = CommandFixture::new();
        let mut command = fixture.command("main");
        command.config = None;
        let mut pipeline = Pipeline::new();
        let step = ValidateConfig::new(fixture.ports());

        step.perform(&mut pipeline, &mut command).await;

        assert_eq!(pipeline.error_messages(), vec!["Missing CI config file"]);
        assert_eq!(pipeline.errors[0].drop_reason, None);
        assert!(step.should_break(&pipeline, &command));
    }

    #[tokio::test]
    async fn test_yaml_errors_drop_when_saving_incomplete() {
        let fixture = CommandFixture::new();
        let config = ProcessedConfig::new()
            .with_error("jobs:rspec script can't be blank")
            .with_error("stages config should be an array");
        let mut command = fixture
            .command("main")
            .with_config(config)
            .with_save_incompleted(true);
        let mut pipeline = Pipeline::new();
        crate::chain::Build::new().perform(&mut pipeline, &mut command).await;
        pipeline.partition_id = Some(100);

        let step = ValidateConfig::new(fixture.ports());
        step.perform(&mut pipeline, &mut command).await;

        assert_eq!(
            pipeline.yaml_errors().as_deref(),
            Some("jobs:rspec script can't be blank, stages config should be an array")
        );
        assert!(pipeline.is_persisted());
        assert_eq!(pipeline.status, PipelineStatus::Failed);
        assert_eq!(pipeline.failure_reason, Some(FailureReason::ConfigError));
        assert!(step.should_break(&pipeline, &command));
    }

    #[tokio::test]
    async fn test_config_warnings_are_copied() {
        let fixture = CommandFixture::new();
        let mut config = CommandFixture::simple_config();
        config.warnings.push("jobs:rspec may allow multiple pipelines".to_string());
        let mut command = fixture.command("main").with_config(config);
        let mut pipeline = Pipeline::new();
        let step = ValidateConfig::new(fixture.ports());

        step.perform(&mut pipeline, &mut command).await;

        assert!(!pipeline.has_errors());
        assert_eq!(pipeline.warnings, vec!["jobs:rspec may allow multiple pipelines"]);
        assert!(!step.should_break(&pipeline, &command));
    }
}
