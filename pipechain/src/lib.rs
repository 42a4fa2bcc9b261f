//! # Pipechain
//!
//! Builds CI pipelines by running a request through a fixed chain of steps.
//!
//! Pipechain turns a push, trigger, schedule or API call into a persisted
//! pipeline with support for:
//!
//! - **Step chain**: validation, seeding and persistence steps run in a
//!   fixed order, any of which may stop the chain
//! - **Memoized request context**: ref, sha and protection are resolved at
//!   most once per run
//! - **Rules**: `rules:`, `only:`/`except:` and `workflow:rules` evaluation
//! - **Side effects**: environments, resource groups, deployments and
//!   auto-cancellation of superseded pipelines
//! - **Telemetry**: counters, events and usage tracking that never block
//!   creation
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use pipechain::prelude::*;
//!
//! let ports = ChainPorts::new(permissions, store);
//! let mut sequence = canonical_sequence(&ports, &ChainConfig::default());
//!
//! let mut command = Command::new(project, repository, "main")
//!     .with_user(user)
//!     .with_config(processed);
//! let pipeline = sequence.build(&mut command).await;
//!
//! if sequence.completed() {
//!     println!("created pipeline #{:?}", pipeline.iid);
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod chain;
pub mod config;
pub mod context;
pub mod core;
pub mod errors;
pub mod model;
pub mod observability;
pub mod ports;
pub mod processor;
pub mod queue;
pub mod retry;
pub mod rules;
pub mod seed;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::chain::{canonical_sequence, canonical_steps, Sequence, Step};
    pub use crate::config::{ChainConfig, FeatureFlags};
    pub use crate::context::{Command, SeedCallback, SeedTarget};
    pub use crate::core::{
        BuildSource, ConfigSource, FailureReason, JobStatus, PipelineSource, PipelineStatus,
    };
    pub use crate::errors::{ChainError, PipelineError, PipelineErrorKind, StoreError};
    pub use crate::model::{Job, Pipeline, PipelineMetadata, Project, Stage, User};
    pub use crate::observability::{init_tracing, ErrorTracker, LogFormat, MetricsSink};
    pub use crate::ports::{ChainPorts, PermissionOracle, PipelineStore, RepositoryOracle};
    pub use crate::processor::{JobAttributes, ProcessedConfig, WorkflowConfig};
    pub use crate::queue::{BackgroundTask, TaskQueue};
    pub use crate::rules::Rule;
}
