//! Background task dispatch.
//!
//! Steps enqueue work through the `TaskQueue` port and never wait for it.

mod task;
mod worker;

pub use task::{usage_key, BackgroundTask, UsageKind};
pub use worker::{TaskHandler, TokioTaskQueue};

use crate::errors::QueueError;
use parking_lot::RwLock;

/// Fire-and-forget dispatch of background work.
#[cfg_attr(test, mockall::automock)]
pub trait TaskQueue: Send + Sync {
    /// Enqueues a task without waiting for it to run.
    fn enqueue(&self, task: BackgroundTask) -> Result<(), QueueError>;
}

/// Accepts and drops every task.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpTaskQueue;

impl TaskQueue for NoOpTaskQueue {
    fn enqueue(&self, _task: BackgroundTask) -> Result<(), QueueError> {
        Ok(())
    }
}

/// Records enqueued tasks for assertions.
#[derive(Debug, Default)]
pub struct RecordingTaskQueue {
    tasks: RwLock<Vec<BackgroundTask>>,
}

impl RecordingTaskQueue {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every recorded task in enqueue order.
    #[must_use]
    pub fn tasks(&self) -> Vec<BackgroundTask> {
        self.tasks.read().clone()
    }

    /// Returns the number of recorded tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.read().len()
    }

    /// Returns true if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.read().is_empty()
    }

    /// Returns the recorded usage names of `kind`.
    #[must_use]
    pub fn usage_names(&self, kind: UsageKind) -> Vec<String> {
        self.tasks
            .read()
            .iter()
            .filter_map(|task| match task {
                BackgroundTask::TrackUsage { kind: k, name, .. } if *k == kind => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    /// Clears the recorder.
    pub fn clear(&self) {
        self.tasks.write().clear();
    }
}

impl TaskQueue for RecordingTaskQueue {
    fn enqueue(&self, task: BackgroundTask) -> Result<(), QueueError> {
        self.tasks.write().push(task);
        Ok(())
    }
}
