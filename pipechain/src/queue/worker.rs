//! Tokio-backed task queue.

use super::{BackgroundTask, TaskQueue};
use crate::errors::QueueError;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Processes dequeued tasks.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Handles one task.
    async fn handle(&self, task: BackgroundTask) -> anyhow::Result<()>;
}

/// Forwards tasks to a worker over an unbounded channel.
///
/// Enqueue order is preserved; completion is not awaited by callers.
#[derive(Debug, Clone)]
pub struct TokioTaskQueue {
    sender: mpsc::UnboundedSender<BackgroundTask>,
}

impl TokioTaskQueue {
    /// Spawns the worker on the current runtime.
    ///
    /// The worker stops once every queue handle is dropped.
    #[must_use]
    pub fn spawn(handler: Arc<dyn TaskHandler>) -> (Self, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::unbounded_channel::<BackgroundTask>();

        let worker = tokio::spawn(async move {
            while let Some(task) = receiver.recv().await {
                let label = task.label();
                debug!(task = label, "processing background task");
                if let Err(err) = handler.handle(task).await {
                    warn!(task = label, error = %format!("{err:#}"), "background task failed");
                }
            }
        });

        (Self { sender }, worker)
    }
}

impl TaskQueue for TokioTaskQueue {
    fn enqueue(&self, task: BackgroundTask) -> Result<(), QueueError> {
        self.sender.send(task).map_err(|_| QueueError::Closed)
    }
}
