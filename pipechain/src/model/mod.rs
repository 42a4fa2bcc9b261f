//! Domain model for pipelines under construction.
//!
//! This module provides:
//! - The `Pipeline` aggregate and its metadata sidecar
//! - Persisted `Stage` and `Job` entities
//! - Project-side handles (project, user, trigger, environment, resource group)

mod job;
mod pipeline;
mod project;

pub use job::{EnvironmentAction, EnvironmentDeclaration, Job, Stage};
pub use pipeline::{AutoCancel, OnJobFailure, OnNewCommit, Pipeline, PipelineMetadata};
pub use project::{
    ChatData, Deployment, Environment, ParentPipeline, Project, ResourceGroup, ScheduleRef,
    TriggerRequest, User,
};
