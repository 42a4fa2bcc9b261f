//! Fixtures wiring a command to in-memory ports.

use super::{InMemoryRepository, InMemoryStore, StaticPermissions};
use crate::context::Command;
use crate::model::{Project, User};
use crate::observability::{CollectingErrorTracker, CollectingMetricsSink};
use crate::ports::ChainPorts;
use crate::processor::{JobAttributes, ProcessedConfig};
use crate::queue::RecordingTaskQueue;
use std::sync::Arc;

/// Head of `main` in the default fixture repository.
pub const DEFAULT_SHA: &str = "b83d6e391c22777fca1ed3012fce84f633d7fed0";

/// A project, repository, user and recording ports for chain tests.
#[derive(Debug, Clone)]
pub struct CommandFixture {
    /// The target project.
    pub project: Project,
    /// The acting user.
    pub user: User,
    /// Repository backing every command.
    pub repository: Arc<InMemoryRepository>,
    /// Permission answers.
    pub permissions: Arc<StaticPermissions>,
    /// Persistence.
    pub store: Arc<InMemoryStore>,
    /// Recorded background tasks.
    pub queue: Arc<RecordingTaskQueue>,
    /// Recorded metrics.
    pub metrics: Arc<CollectingMetricsSink>,
    /// Recorded swallowed failures.
    pub errors: Arc<CollectingErrorTracker>,
}

impl Default for CommandFixture {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandFixture {
    /// Creates a fixture with a `main` branch and a maintainer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            project: Project::new(1, "gitlab-org/gitlab-test"),
            user: User::new(10, "maintainer"),
            repository: Arc::new(
                InMemoryRepository::new().with_branch("main", DEFAULT_SHA, "Update README"),
            ),
            permissions: Arc::new(StaticPermissions::maintainer()),
            store: Arc::new(InMemoryStore::new()),
            queue: Arc::new(RecordingTaskQueue::new()),
            metrics: Arc::new(CollectingMetricsSink::new()),
            errors: Arc::new(CollectingErrorTracker::new()),
        }
    }

    /// Replaces the repository.
    #[must_use]
    pub fn with_repository(mut self, repository: InMemoryRepository) -> Self {
        self.repository = Arc::new(repository);
        self
    }

    /// Replaces the permissions.
    #[must_use]
    pub fn with_permissions(mut self, permissions: StaticPermissions) -> Self {
        self.permissions = Arc::new(permissions);
        self
    }

    /// Replaces the project.
    #[must_use]
    pub fn with_project(mut self, project: Project) -> Self {
        self.project = project;
        self
    }

    /// Creates a command for `origin_ref` with the fixture user and a
    /// two-stage config.
    #[must_use]
    pub fn command(&self, origin_ref: &str) -> Command {
        Command::new(self.project.clone(), self.repository.clone(), origin_ref)
            .with_user(self.user.clone())
            .with_config(Self::simple_config())
    }

    /// Returns ports bound to the fixture's recorders.
    #[must_use]
    pub fn ports(&self) -> ChainPorts {
        ChainPorts::new(self.permissions.clone(), self.store.clone())
            .with_queue(self.queue.clone())
            .with_metrics(self.metrics.clone())
            .with_error_tracker(self.errors.clone())
    }

    /// A `build` stage with `compile` and a `test` stage with `rspec`.
    #[must_use]
    pub fn simple_config() -> ProcessedConfig {
        ProcessedConfig::new()
            .with_stage("build", vec![JobAttributes::new("compile", "build")])
            .with_stage("test", vec![JobAttributes::new("rspec", "test").with_need("compile")])
    }
}
