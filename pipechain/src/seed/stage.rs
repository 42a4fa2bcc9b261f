//! Stage seeds.

use super::{JobSeed, SeedContext};
use crate::model::Stage;
use crate::processor::StageAttributes;
use serde::Serialize;
use std::collections::HashSet;

/// One stage after rule evaluation, before persistence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageSeed {
    /// Stage name.
    pub name: String,
    /// Declaration ordinal.
    pub index: usize,
    /// Every job seed, included or not.
    pub seeds: Vec<JobSeed>,
}

impl StageSeed {
    /// Seeds a stage, resolving needs against `previous` stages.
    #[must_use]
    pub fn build(attributes: &StageAttributes, context: &SeedContext, previous: &[StageSeed]) -> Self {
        let mut seeds: Vec<JobSeed> = attributes
            .jobs
            .iter()
            .map(|job| JobSeed::evaluate(job, attributes.index, context))
            .collect();

        let available: HashSet<String> = previous
            .iter()
            .flat_map(|stage| stage.included_seeds())
            .chain(seeds.iter().filter(|s| s.included))
            .map(|s| s.name.clone())
            .collect();

        for seed in seeds.iter_mut().filter(|s| s.included) {
            for need in &seed.needs {
                if !available.contains(need) {
                    seed.errors.push(format!(
                        "'{}' job needs '{}' job, but it was not added to the pipeline",
                        seed.name, need
                    ));
                }
            }
        }

        Self {
            name: attributes.name.clone(),
            index: attributes.index,
            seeds,
        }
    }

    /// Iterates over the included job seeds.
    pub fn included_seeds(&self) -> impl Iterator<Item = &JobSeed> {
        self.seeds.iter().filter(|s| s.included)
    }

    /// A stage with no included job is dropped.
    #[must_use]
    pub fn is_included(&self) -> bool {
        self.seeds.iter().any(|s| s.included)
    }

    /// Returns every seeding error of the stage.
    #[must_use]
    pub fn errors(&self) -> Vec<String> {
        self.seeds.iter().flat_map(|s| s.errors.iter().cloned()).collect()
    }

    /// Converts the included seeds into an unpersisted stage.
    #[must_use]
    pub fn to_stage(&self) -> Stage {
        let mut stage = Stage::new(&self.name, self.index);
        stage.jobs = self.included_seeds().map(JobSeed::to_job).collect();
        stage
    }
}
