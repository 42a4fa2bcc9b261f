//! Top-level workflow rules.

use super::helpers;
use super::Step;
use crate::config::ChainConfig;
use crate::context::Command;
use crate::core::FailureReason;
use crate::errors::{PipelineError, PipelineErrorKind};
use crate::model::Pipeline;
use crate::ports::ChainPorts;
use crate::rules::{evaluate_rules, RuleOutcome};
use async_trait::async_trait;
use tracing::info;

/// Decides whether the pipeline is created at all.
#[derive(Debug, Clone)]
pub struct EvaluateWorkflowRules {
    ports: ChainPorts,
    config: ChainConfig,
}

impl EvaluateWorkflowRules {
    /// Creates the step.
    #[must_use]
    pub fn new(ports: ChainPorts, config: ChainConfig) -> Self {
        Self { ports, config }
    }
}

#[async_trait]
impl Step for EvaluateWorkflowRules {
    fn name(&self) -> &str {
        "evaluate_workflow_rules"
    }

    async fn perform(&self, pipeline: &mut Pipeline, command: &mut Command) {
        let Some(rules) = command
            .config
            .as_ref()
            .and_then(|c| c.workflow.rules.clone())
        else {
            return;
        };

        if !self.config.features.workflow_rules {
            pipeline.add_error(PipelineError::config(
                "Workflow rules are disabled for this project",
            ));
            return;
        }

        let variables = command.rule_variables().await;
        match evaluate_rules(&rules, &variables) {
            Ok(RuleOutcome::Included { variables, .. }) => {
                command.set_workflow_variables(variables);
            }
            Ok(RuleOutcome::Excluded) => {
                info!(git_ref = %pipeline.git_ref, "Pipeline filtered out by workflow rules");
                let error = PipelineError::new(
                    PipelineErrorKind::Filtered,
                    "Pipeline filtered out by workflow rules.",
                )
                .with_drop_reason(FailureReason::FilteredByWorkflowRules);
                helpers::error(pipeline, command, &self.ports, self.name(), error).await;
            }
            Err(e) => {
                pipeline.add_error(PipelineError::config(format!("workflow:rules {e}")));
            }
        }
    }

    fn should_break(&self, pipeline: &Pipeline, _command: &Command) -> bool {
        pipeline.has_errors() || pipeline.is_persisted()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FeatureFlags;
    use crate::core::{PipelineStatus, When};
    use crate::processor::WorkflowConfig;
    use crate::rules::Rule;
    use crate::testing::CommandFixture;
    use std::collections::BTreeMap;

    fn workflow(rules: Vec<Rule>) -> WorkflowConfig {
        WorkflowConfig {
            rules: Some(rules),
            ..WorkflowConfig::default()
        }
    }

    fn command(fixture: &CommandFixture, rules: Vec<Rule>) -> Command {
        let config = CommandFixture::simple_config().with_workflow(workflow(rules));
        fixture.command("main").with_config(config)
    }

    #[tokio::test]
    async fn test_no_rules_runs() {
        let fixture = CommandFixture::new();
        let mut command = fixture.command("main");
        let mut pipeline = Pipeline::new();
        let step = EvaluateWorkflowRules::new(fixture.ports(), ChainConfig::new());

        step.perform(&mut pipeline, &mut command).await;

        assert!(!step.should_break(&pipeline, &command));
    }

    #[tokio::test]
    async fn test_matching_rule_sets_variables() {
        let fixture = CommandFixture::new();
        let mut rule = Rule::when_if("$CI_COMMIT_BRANCH == \"main\"");
        rule.variables = BTreeMap::from([("DEPLOY_TARGET".to_string(), "prod".to_string())]);
        let mut command = command(&fixture, vec![rule]);
        let mut pipeline = Pipeline::new();
        let step = EvaluateWorkflowRules::new(fixture.ports(), ChainConfig::new());

        step.perform(&mut pipeline, &mut command).await;

        assert!(!step.should_break(&pipeline, &command));
        let variables = command.rule_variables().await;
        assert_eq!(variables.get("DEPLOY_TARGET"), Some("prod"));
    }

    #[tokio::test]
    async fn test_filtered_out() {
        let fixture = CommandFixture::new();
        let mut command = command(
            &fixture,
            vec![Rule::when_if("$CI_COMMIT_TAG").with_when(When::Always)],
        );
        let mut pipeline = Pipeline::new();
        let step = EvaluateWorkflowRules::new(fixture.ports(), ChainConfig::new());

        step.perform(&mut pipeline, &mut command).await;

        assert_eq!(pipeline.error_messages(), vec!["Pipeline filtered out by workflow rules."]);
        assert_eq!(pipeline.errors[0].kind, PipelineErrorKind::Filtered);
        assert_eq!(
            pipeline.errors[0].drop_reason,
            Some(FailureReason::FilteredByWorkflowRules)
        );
        assert!(step.should_break(&pipeline, &command));
        assert_eq!(pipeline.status, PipelineStatus::Created);
    }

    #[tokio::test]
    async fn test_never_rule_filters() {
        let fixture = CommandFixture::new();
        let mut command = command(&fixture, vec![Rule::default().with_when(When::Never)]);
        let mut pipeline = Pipeline::new();
        let step = EvaluateWorkflowRules::new(fixture.ports(), ChainConfig::new());

        step.perform(&mut pipeline, &mut command).await;

        assert!(step.should_break(&pipeline, &command));
    }

    #[tokio::test]
    async fn test_disabled_feature_with_rules() {
        let fixture = CommandFixture::new();
        let mut command = command(&fixture, vec![Rule::default()]);
        let mut pipeline = Pipeline::new();
        let config = ChainConfig::new().with_features(FeatureFlags {
            workflow_rules: false,
            ..FeatureFlags::default()
        });
        let step = EvaluateWorkflowRules::new(fixture.ports(), config);

        step.perform(&mut pipeline, &mut command).await;

        assert_eq!(
            pipeline.error_messages(),
            vec!["Workflow rules are disabled for this project"]
        );
        assert!(step.should_break(&pipeline, &command));
    }

    #[tokio::test]
    async fn test_malformed_rule_is_a_config_error() {
        let fixture = CommandFixture::new();
        let mut command = command(&fixture, vec![Rule::when_if("$A ==")]);
        let mut pipeline = Pipeline::new();
        let step = EvaluateWorkflowRules::new(fixture.ports(), ChainConfig::new());

        step.perform(&mut pipeline, &mut command).await;

        assert_eq!(pipeline.errors[0].kind, PipelineErrorKind::Config);
        assert!(pipeline.errors[0].message.starts_with("workflow:rules "));
        assert!(step.should_break(&pipeline, &command));
    }
}
