//! Stage and job seeds: the expansion of declarative config into an
//! ordered, rule-filtered graph.
//!
//! Seeds are ephemeral. The Seed step produces them, Populate turns the
//! surviving ones into persisted stages and jobs.

mod job;
mod stage;

pub use job::JobSeed;
pub use stage::StageSeed;

use crate::core::{PipelineSource, RefKind};
use crate::processor::StageAttributes;
use crate::rules::Variables;

/// Inputs shared by every seed of one pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedContext {
    /// Variables visible to rules and expansion.
    pub variables: Variables,
    /// Short ref name.
    pub ref_name: String,
    /// Branch or tag, if known.
    pub ref_kind: Option<RefKind>,
    /// The requesting event.
    pub source: PipelineSource,
}

/// Seeds every stage in declaration order.
///
/// Each stage sees the stages before it, so needs can only point backwards
/// or sideways.
#[must_use]
pub fn seed_stages(stages: &[StageAttributes], context: &SeedContext) -> Vec<StageSeed> {
    let mut ordered: Vec<&StageAttributes> = stages.iter().collect();
    ordered.sort_by_key(|s| s.index);

    let mut seeds: Vec<StageSeed> = Vec::with_capacity(ordered.len());
    for attributes in ordered {
        let seed = StageSeed::build(attributes, context, &seeds);
        seeds.push(seed);
    }
    seeds
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::{JobAttributes, ProcessedConfig};
    use crate::rules::Rule;
    use pretty_assertions::assert_eq;

    fn context(branch: &str) -> SeedContext {
        SeedContext {
            variables: [("CI_COMMIT_REF_NAME", branch), ("CI_COMMIT_BRANCH", branch)]
                .into_iter()
                .collect(),
            ref_name: branch.to_string(),
            ref_kind: Some(RefKind::Branch),
            source: PipelineSource::Push,
        }
    }

    fn master_only() -> Vec<Rule> {
        vec![Rule::when_if(r#"$CI_COMMIT_REF_NAME == "master""#)]
    }

    #[test]
    fn test_stage_without_included_jobs_is_dropped() {
        let config = ProcessedConfig::new()
            .with_stage("build", vec![JobAttributes::new("compile", "build")])
            .with_stage(
                "deploy",
                vec![JobAttributes::new("production", "deploy").with_rules(master_only())],
            );

        let seeds = seed_stages(&config.stages, &context("feature"));
        let included: Vec<&str> = seeds.iter().filter(|s| s.is_included()).map(|s| s.name.as_str()).collect();
        assert_eq!(included, vec!["build"]);

        let seeds = seed_stages(&config.stages, &context("master"));
        assert!(seeds.iter().all(StageSeed::is_included));
    }

    #[test]
    fn test_need_on_excluded_job_is_an_error() {
        let config = ProcessedConfig::new()
            .with_stage(
                "build",
                vec![JobAttributes::new("build_a", "build").with_rules(master_only())],
            )
            .with_stage("test", vec![JobAttributes::new("test_a", "test").with_need("build_a")]);

        let seeds = seed_stages(&config.stages, &context("feature"));
        assert_eq!(
            seeds[1].errors(),
            vec!["'test_a' job needs 'build_a' job, but it was not added to the pipeline".to_string()]
        );
    }

    #[test]
    fn test_need_in_same_stage_and_earlier_stage() {
        let config = ProcessedConfig::new()
            .with_stage("build", vec![JobAttributes::new("compile", "build")])
            .with_stage(
                "test",
                vec![
                    JobAttributes::new("unit", "test").with_need("compile"),
                    JobAttributes::new("report", "test").with_need("unit"),
                ],
            );

        let seeds = seed_stages(&config.stages, &context("feature"));
        assert!(seeds.iter().all(|s| s.errors().is_empty()));
    }

    #[test]
    fn test_need_on_later_stage_is_an_error() {
        let config = ProcessedConfig::new()
            .with_stage("build", vec![JobAttributes::new("compile", "build").with_need("unit")])
            .with_stage("test", vec![JobAttributes::new("unit", "test")]);

        let seeds = seed_stages(&config.stages, &context("feature"));
        assert_eq!(seeds[0].errors().len(), 1);
    }

    #[test]
    fn test_excluded_job_needs_are_not_checked() {
        let config = ProcessedConfig::new().with_stage(
            "test",
            vec![JobAttributes::new("unit", "test")
                .with_need("missing")
                .with_rules(master_only())],
        );

        let seeds = seed_stages(&config.stages, &context("feature"));
        assert!(seeds[0].errors().is_empty());
    }

    #[test]
    fn test_to_stage_keeps_declaration_order() {
        let config = ProcessedConfig::new().with_stage(
            "test",
            vec![
                JobAttributes::new("b", "test"),
                JobAttributes::new("skipped", "test").with_rules(master_only()),
                JobAttributes::new("a", "test"),
            ],
        );

        let stage = seed_stages(&config.stages, &context("feature"))[0].to_stage();
        let names: Vec<&str> = stage.jobs.iter().map(|j| j.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert_eq!(stage.position, 0);
    }
}
