//! Persistence ports.

use crate::core::PipelineStatus;
use crate::errors::StoreError;
use crate::model::{Deployment, Environment, Job, Pipeline, ResourceGroup};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A same-ref pipeline that may be superseded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiblingPipeline {
    /// Pipeline id.
    pub id: u64,
    /// Root of the sibling's family.
    pub root_id: u64,
    /// Commit the sibling was built for.
    pub sha: Option<String>,
    /// Current status.
    pub status: PipelineStatus,
    /// Optimistic-locking version.
    pub lock_version: u64,
    /// True if a job that is not interruptible has started.
    pub has_uninterruptible_started_jobs: bool,
}

/// Which part of a sibling to cancel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelScope {
    /// Cancel the whole pipeline.
    Pipeline,
    /// Cancel only interruptible jobs.
    InterruptibleJobs,
}

/// A compare-and-swap cancellation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelRequest {
    /// The sibling to cancel.
    pub pipeline_id: u64,
    /// The version the caller read.
    pub lock_version: u64,
    /// The pipeline that supersedes it.
    pub canceled_by: u64,
    /// What to cancel.
    pub scope: CancelScope,
}

/// Result of a cancellation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelOutcome {
    /// The pipeline (or its interruptible jobs) was cancelled.
    Canceled,
    /// Someone else finished or cancelled it first.
    NotCancelable,
}

/// Pipeline persistence.
#[async_trait]
pub trait PipelineStore: Send + Sync {
    /// Allocates the next project-scoped IID. Must be serialized per project.
    async fn allocate_iid(&self, project_id: u64) -> Result<u64, StoreError>;

    /// Returns an unused IID to the project sequence.
    async fn release_iid(&self, project_id: u64, iid: u64) -> Result<(), StoreError>;

    /// Saves the pipeline with its stages and jobs in one transaction.
    ///
    /// Returns the saved copy with ids assigned. Nothing is visible on error.
    async fn create_pipeline(&self, pipeline: Pipeline) -> Result<Pipeline, StoreError>;

    /// Saves changes to one job of a persisted pipeline.
    async fn update_job(&self, pipeline_id: u64, job: &Job) -> Result<(), StoreError>;

    /// Lists cancelable pipelines of `project_id` on `git_ref`.
    async fn cancelable_pipelines(
        &self,
        project_id: u64,
        git_ref: &str,
    ) -> Result<Vec<SiblingPipeline>, StoreError>;

    /// Reloads one sibling.
    async fn sibling(&self, pipeline_id: u64) -> Result<Option<SiblingPipeline>, StoreError>;

    /// Cancels a sibling if its version still matches.
    ///
    /// Fails with [`StoreError::StaleObject`] when the version moved on.
    async fn cancel_pipeline(&self, request: CancelRequest) -> Result<CancelOutcome, StoreError>;
}

/// Environment persistence.
#[async_trait]
pub trait EnvironmentStore: Send + Sync {
    /// Finds the environment by name or creates it.
    async fn find_or_create_environment(
        &self,
        project_id: u64,
        name: &str,
        tier: Option<&str>,
    ) -> Result<Environment, StoreError>;
}

/// Resource group persistence.
#[async_trait]
pub trait ResourceGroupStore: Send + Sync {
    /// Finds the resource group by key or creates it.
    async fn find_or_create_resource_group(
        &self,
        project_id: u64,
        key: &str,
    ) -> Result<ResourceGroup, StoreError>;
}

/// Deployment persistence.
#[async_trait]
pub trait DeploymentStore: Send + Sync {
    /// Saves a deployment and returns it with its id.
    async fn create_deployment(&self, deployment: Deployment) -> Result<Deployment, StoreError>;
}
