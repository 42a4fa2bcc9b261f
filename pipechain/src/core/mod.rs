//! Core enums shared by pipelines, stages and jobs.

mod status;

pub use status::{
    BuildSource, ConfigSource, FailureReason, JobStatus, PipelineSource, PipelineStatus, RefKind, When,
};
