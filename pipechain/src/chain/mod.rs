//! The pipeline creation chain.
//!
//! This module provides:
//! - The `Step` trait every chain link implements
//! - The `Sequence` executor with break semantics
//! - Every step of the canonical creation chain, and `canonical_steps`
//!   which wires them in order

mod build;
mod build_sources;
mod cancel_pending;
mod chat;
mod create;
mod deployments;
mod environments;
mod helpers;
mod hooks;
mod populate;
mod protect;
mod seed;
mod sequence;
mod skip;
mod stop;
mod telemetry;
mod validate;
mod workflow;


pub use build::{AssignPartition, Build};
pub use build_sources::SetBuildSources;
pub use cancel_pending::CancelPendingPipelines;
pub use chat::RemoveUnwantedChatJobs;
pub use create::Create;
pub use deployments::CreateDeployments;
pub use environments::{EnsureEnvironments, EnsureResourceGroups};
pub use hooks::TriggerBuildHooks;
pub use populate::{Populate, PopulateMetadata};
pub use protect::Protect;
pub use seed::{Seed, SeedBlock, ValidateSeeds};
pub use sequence::Sequence;
pub use skip::Skip;
pub use stop::{StopDryRun, StopLinting};
pub use telemetry::{ComponentUsage, KeywordUsage, Metrics, TemplateUsage};
pub use validate::{ValidateAbilities, ValidateConfig, ValidateRepository};
pub use workflow::EvaluateWorkflowRules;

use crate::config::ChainConfig;
use crate::context::Command;
use crate::model::Pipeline;
use crate::ports::ChainPorts;
use async_trait::async_trait;
use std::fmt::Debug;

/// One link of the creation chain.
///
/// Constructing a step has no effect; all work happens in `perform`.
/// `should_break` is evaluated right after `perform` of the same step.
#[async_trait]
pub trait Step: Send + Sync + Debug {
    /// Returns the name of the step.
    fn name(&self) -> &str;

    /// Mutates the pipeline and the command.
    ///
    /// Expected failures are attached to the pipeline as errors; unexpected
    /// ones are handed to the error tracker. Nothing is raised.
    async fn perform(&self, pipeline: &mut Pipeline, command: &mut Command);

    /// Returns true if the chain must stop after this step.
    fn should_break(&self, pipeline: &Pipeline, command: &Command) -> bool;
}

/// Returns every step of the creation chain in canonical order.
///
/// Several steps read state that an earlier step computes (for example
/// `ValidateSeeds` reads the seeds memoized by `Seed`), so the order is
/// fixed and covered by tests.
#[must_use]
pub fn canonical_steps(ports: &ChainPorts, config: &ChainConfig) -> Vec<Box<dyn Step>> {
    vec![
        Box::new(Build::new()),
        Box::new(AssignPartition::new(config.clone())),
        Box::new(Protect::new()),
        Box::new(ValidateAbilities::new(ports.clone())),
        Box::new(ValidateRepository::new()),
        Box::new(Skip::new(ports.clone())),
        Box::new(ValidateConfig::new(ports.clone())),
        Box::new(RemoveUnwantedChatJobs::new()),
        Box::new(SeedBlock::new()),
        Box::new(EvaluateWorkflowRules::new(ports.clone(), config.clone())),
        Box::new(Seed::new(ports.clone())),
        Box::new(ValidateSeeds::new()),
        Box::new(Populate::new(ports.clone())),
        Box::new(SetBuildSources::new(config.clone())),
        Box::new(PopulateMetadata::new(config.clone())),
        Box::new(StopLinting::new(ports.clone())),
        Box::new(StopDryRun::new(ports.clone())),
        Box::new(Create::new(ports.clone())),
        Box::new(EnsureEnvironments::new(ports.clone())),
        Box::new(EnsureResourceGroups::new(ports.clone())),
        Box::new(CreateDeployments::new(ports.clone())),
        Box::new(CancelPendingPipelines::new(ports.clone(), config.clone())),
        Box::new(TriggerBuildHooks::new(ports.clone())),
        Box::new(Metrics::new(ports.clone())),
        Box::new(TemplateUsage::new(ports.clone(), config.clone())),
        Box::new(KeywordUsage::new(ports.clone(), config.clone())),
        Box::new(ComponentUsage::new(ports.clone(), config.clone())),
    ]
}

/// Builds a `Sequence` over the canonical steps.
#[must_use]
pub fn canonical_sequence(ports: &ChainPorts, config: &ChainConfig) -> Sequence {
    Sequence::new(canonical_steps(ports, config))
}
