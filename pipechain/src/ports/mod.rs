//! Injected collaborators for chain steps.
//!
//! Steps only hold `Arc` handles to these ports. Production code binds them
//! to real services; the `testing` module provides in-memory adapters.

mod permissions;
mod repository;
mod store;

pub use permissions::{AbilityExtension, PermissionOracle};
pub use repository::{Commit, RepositoryOracle};
pub use store::{
    CancelOutcome, CancelRequest, CancelScope, DeploymentStore, EnvironmentStore, PipelineStore,
    ResourceGroupStore, SiblingPipeline,
};

use crate::observability::{ErrorTracker, LoggingErrorTracker, MetricsSink, NoOpMetricsSink};
use crate::queue::{NoOpTaskQueue, TaskQueue};
use std::fmt;
use std::sync::Arc;

/// Every collaborator the canonical chain needs.
#[derive(Clone)]
pub struct ChainPorts {
    /// Authorization decisions.
    pub permissions: Arc<dyn PermissionOracle>,
    /// Pipeline persistence.
    pub pipelines: Arc<dyn PipelineStore>,
    /// Environment persistence.
    pub environments: Arc<dyn EnvironmentStore>,
    /// Resource group persistence.
    pub resource_groups: Arc<dyn ResourceGroupStore>,
    /// Deployment persistence.
    pub deployments: Arc<dyn DeploymentStore>,
    /// Background dispatch.
    pub queue: Arc<dyn TaskQueue>,
    /// Counters and events.
    pub metrics: Arc<dyn MetricsSink>,
    /// Sink for swallowed failures.
    pub error_tracker: Arc<dyn ErrorTracker>,
    /// Optional extra ability checks.
    pub ability_extension: Option<Arc<dyn AbilityExtension>>,
}

impl fmt::Debug for ChainPorts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainPorts")
            .field(
                "ability_extension",
                &self.ability_extension.as_ref().map(|e| e.name().to_string()),
            )
            .finish_non_exhaustive()
    }
}

impl ChainPorts {
    /// Creates ports backed by one store implementing every persistence port.
    ///
    /// Background tasks are discarded, metrics are dropped and swallowed
    /// failures are logged until replaced with the `with_*` builders.
    #[must_use]
    pub fn new<S>(permissions: Arc<dyn PermissionOracle>, store: Arc<S>) -> Self
    where
        S: PipelineStore + EnvironmentStore + ResourceGroupStore + DeploymentStore + 'static,
    {
        Self {
            permissions,
            pipelines: store.clone(),
            environments: store.clone(),
            resource_groups: store.clone(),
            deployments: store,
            queue: Arc::new(NoOpTaskQueue),
            metrics: Arc::new(NoOpMetricsSink),
            error_tracker: Arc::new(LoggingErrorTracker),
            ability_extension: None,
        }
    }

    /// Sets the task queue.
    #[must_use]
    pub fn with_queue(mut self, queue: Arc<dyn TaskQueue>) -> Self {
        self.queue = queue;
        self
    }

    /// Sets the metrics sink.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Sets the error tracker.
    #[must_use]
    pub fn with_error_tracker(mut self, tracker: Arc<dyn ErrorTracker>) -> Self {
        self.error_tracker = tracker;
        self
    }

    /// Sets the ability extension.
    #[must_use]
    pub fn with_ability_extension(mut self, extension: Arc<dyn AbilityExtension>) -> Self {
        self.ability_extension = Some(extension);
        self
    }

    /// Returns true if an ability extension is configured.
    #[must_use]
    pub fn has_ability_extension(&self) -> bool {
        self.ability_extension.is_some()
    }
}
