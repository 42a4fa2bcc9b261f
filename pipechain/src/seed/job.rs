//! Job seeds.

use super::SeedContext;
use crate::core::{BuildSource, When};
use crate::model::{EnvironmentDeclaration, Job};
use crate::processor::JobAttributes;
use crate::rules::{evaluate_rules, RuleOutcome, Variables};
use crate::errors::ExpressionError;
use serde::Serialize;

/// One job after rule evaluation, before persistence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSeed {
    /// Job name.
    pub name: String,
    /// Stage name.
    pub stage_name: String,
    /// Stage ordinal.
    pub stage_idx: usize,
    /// Whether the rules kept the job.
    pub included: bool,
    /// Effective `when`.
    pub when: When,
    /// Effective `allow_failure`.
    pub allow_failure: bool,
    /// Effective delay.
    pub start_in: Option<String>,
    /// Needed job names.
    pub needs: Vec<String>,
    /// Whether the job is interruptible.
    pub interruptible: bool,
    /// Expanded resource group key.
    pub resource_group_key: Option<String>,
    /// Environment with its name expanded.
    pub environment: Option<EnvironmentDeclaration>,
    /// Policy source, if injected.
    pub source: Option<BuildSource>,
    /// Opaque options.
    pub options: serde_json::Value,
    /// Problems found while seeding.
    pub errors: Vec<String>,
}

impl JobSeed {
    /// Evaluates `attributes` against the seeding context.
    #[must_use]
    pub fn evaluate(attributes: &JobAttributes, stage_idx: usize, context: &SeedContext) -> Self {
        let mut seed = Self {
            name: attributes.name.clone(),
            stage_name: attributes.stage.clone(),
            stage_idx,
            included: false,
            when: attributes.when,
            allow_failure: attributes.allow_failure,
            start_in: attributes.start_in.clone(),
            needs: attributes.needs.clone(),
            interruptible: attributes.interruptible,
            resource_group_key: None,
            environment: None,
            source: attributes.injected_by,
            options: attributes.options.clone(),
            errors: Vec::new(),
        };

        let mut variables = context.variables.clone();
        match seed.inclusion(attributes, context, &mut variables) {
            Ok(included) => seed.included = included && seed.when != When::Never,
            Err(err) => {
                seed.errors.push(format!("jobs:{} {err}", seed.name));
                return seed;
            }
        }

        if seed.included {
            seed.expand(attributes, &variables);
        }
        seed
    }

    fn inclusion(
        &mut self,
        attributes: &JobAttributes,
        context: &SeedContext,
        variables: &mut Variables,
    ) -> Result<bool, ExpressionError> {
        if let Some(rules) = &attributes.rules {
            return match evaluate_rules(rules, &context.variables)? {
                RuleOutcome::Included {
                    when,
                    allow_failure,
                    start_in,
                    variables: rule_variables,
                } => {
                    if let Some(when) = when {
                        self.when = when;
                    }
                    if let Some(allow_failure) = allow_failure {
                        self.allow_failure = allow_failure;
                    }
                    if start_in.is_some() {
                        self.start_in = start_in;
                    }
                    variables.extend(rule_variables);
                    Ok(true)
                }
                RuleOutcome::Excluded => Ok(false),
            };
        }

        if let Some(only) = &attributes.only {
            if !only.matches(&context.ref_name, context.ref_kind, context.source)? {
                return Ok(false);
            }
        }
        if let Some(except) = &attributes.except {
            if except.matches(&context.ref_name, context.ref_kind, context.source)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn expand(&mut self, attributes: &JobAttributes, variables: &Variables) {
        if let Some(key) = &attributes.resource_group {
            let expanded = variables.expand(key);
            if expanded.trim().is_empty() {
                self.errors
                    .push(format!("jobs:{} resource_group key can't be blank", self.name));
            } else {
                self.resource_group_key = Some(expanded);
            }
        }

        if let Some(environment) = &attributes.environment {
            let mut environment = environment.clone();
            environment.name = variables.expand(&environment.name);
            self.environment = Some(environment);
        }
    }

    /// Converts the seed into an unpersisted job.
    #[must_use]
    pub fn to_job(&self) -> Job {
        let mut job = Job::new(&self.name, &self.stage_name, self.stage_idx);
        job.when = self.when;
        job.allow_failure = self.allow_failure;
        job.start_in.clone_from(&self.start_in);
        job.needs.clone_from(&self.needs);
        job.interruptible = self.interruptible;
        job.resource_group_key.clone_from(&self.resource_group_key);
        job.environment.clone_from(&self.environment);
        job.source = self.source;
        job.options = self.options.clone();
        job
    }
}
