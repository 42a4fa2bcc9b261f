//! Auto-cancels pipelines superseded by the new one.

use super::Step;
use crate::config::ChainConfig;
use crate::context::Command;
use crate::errors::{ChainError, StoreError};
use crate::model::{OnNewCommit, Pipeline};
use crate::ports::{CancelOutcome, CancelRequest, CancelScope, ChainPorts, SiblingPipeline};
use crate::retry::retry_on_conflict;
use async_trait::async_trait;
use tracing::{debug, info};

const OPERATION: &str = "cancel_pending_pipelines";

/// What happened to one sibling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SiblingResult {
    Canceled,
    AlreadyDone,
    Kept,
}

/// Returns the cancel scope for a sibling, or `None` to leave it alone.
fn scope_for(mode: OnNewCommit, sibling: &SiblingPipeline) -> Option<CancelScope> {
    match mode {
        OnNewCommit::Conservative if sibling.has_uninterruptible_started_jobs => None,
        OnNewCommit::Conservative => Some(CancelScope::Pipeline),
        OnNewCommit::Interruptible => Some(CancelScope::InterruptibleJobs),
        OnNewCommit::None => None,
    }
}

/// Cancels older cancelable pipelines on the same ref that belong to
/// another pipeline family. Pipelines built for the ref's current head
/// are never cancelled.
///
/// Each cancellation is a compare-and-swap on the sibling's lock version,
/// retried on conflict.
#[derive(Debug, Clone)]
pub struct CancelPendingPipelines {
    ports: ChainPorts,
    config: ChainConfig,
}

impl CancelPendingPipelines {
    /// Creates the step.
    #[must_use]
    pub fn new(ports: ChainPorts, config: ChainConfig) -> Self {
        Self { ports, config }
    }

    async fn cancel_sibling(
        &self,
        sibling_id: u64,
        canceled_by: u64,
        mode: OnNewCommit,
    ) -> Result<SiblingResult, ChainError> {
        retry_on_conflict(&self.config.cancel_retry, OPERATION, |attempt| {
            self.try_cancel(sibling_id, canceled_by, mode, attempt)
        })
        .await
    }

    /// Reloads the sibling and attempts one compare-and-swap cancellation.
    async fn try_cancel(
        &self,
        sibling_id: u64,
        canceled_by: u64,
        mode: OnNewCommit,
        attempt: usize,
    ) -> Result<SiblingResult, StoreError> {
        let pipelines = &self.ports.pipelines;
        let Some(current) = pipelines.sibling(sibling_id).await? else {
            return Ok(SiblingResult::AlreadyDone);
        };
        if !current.status.is_cancelable() {
            return Ok(SiblingResult::AlreadyDone);
        }
        let Some(scope) = scope_for(mode, &current) else {
            return Ok(SiblingResult::Kept);
        };

        debug!(sibling_id, attempt, lock_version = current.lock_version, "Cancelling sibling");
        let request = CancelRequest {
            pipeline_id: sibling_id,
            lock_version: current.lock_version,
            canceled_by,
            scope,
        };
        match pipelines.cancel_pipeline(request).await? {
            CancelOutcome::Canceled => Ok(SiblingResult::Canceled),
            CancelOutcome::NotCancelable => Ok(SiblingResult::AlreadyDone),
        }
    }
}

#[async_trait]
impl Step for CancelPendingPipelines {
    fn name(&self) -> &str {
        "cancel_pending_pipelines"
    }

    async fn perform(&self, pipeline: &mut Pipeline, command: &mut Command) {
        if !self.config.features.auto_cancel_pending_pipelines
            || !command.project.auto_cancel_pending_pipelines
        {
            return;
        }
        let Some(pipeline_id) = pipeline.id else {
            return;
        };
        let mode = pipeline
            .metadata
            .as_ref()
            .map(|m| m.auto_cancel.on_new_commit)
            .unwrap_or_default();
        if mode == OnNewCommit::None {
            return;
        }

        let siblings = match self
            .ports
            .pipelines
            .cancelable_pipelines(pipeline.project_id, &pipeline.git_ref)
            .await
        {
            Ok(siblings) => siblings,
            Err(e) => {
                let e = anyhow::Error::new(e).context("listing cancelable pipelines");
                self.ports.error_tracker.track(&e, self.name());
                return;
            }
        };

        let root_id = pipeline.root_id().unwrap_or(pipeline_id);
        let head_sha = command.head_sha().await;
        let mut canceled = 0_usize;
        for sibling in siblings.iter().filter(|s| {
            s.id < pipeline_id
                && s.root_id != root_id
                && (head_sha.is_none() || s.sha != head_sha)
        }) {
            match self.cancel_sibling(sibling.id, pipeline_id, mode).await {
                Ok(SiblingResult::Canceled) => canceled += 1,
                Ok(SiblingResult::AlreadyDone | SiblingResult::Kept) => {}
                Err(e) => {
                    let e = anyhow::Error::new(e)
                        .context(format!("auto-cancelling pipeline {}", sibling.id));
                    self.ports.error_tracker.track(&e, self.name());
                }
            }
        }

        if canceled > 0 {
            info!(pipeline_id, canceled, mode = ?mode, "Auto-cancelled superseded pipelines");
        }
    }

    fn should_break(&self, _pipeline: &Pipeline, _command: &Command) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FeatureFlags;
    use crate::core::{JobStatus, PipelineStatus};
    use crate::model::{AutoCancel, Job, ParentPipeline, PipelineMetadata, Project, Stage};
    use crate::retry::{JitterStrategy, RetryConfig};
    use crate::testing::{CommandFixture, DEFAULT_SHA};

    fn fast() -> ChainConfig {
        ChainConfig::new().with_cancel_retry(
            RetryConfig::new()
                .with_max_attempts(3)
                .with_base_delay_ms(1)
                .with_jitter(JitterStrategy::None),
        )
    }

    fn running(git_ref: &str, jobs: Vec<Job>) -> Pipeline {
        let mut pipeline = Pipeline::new();
        pipeline.project_id = 1;
        pipeline.git_ref = git_ref.into();
        pipeline.sha = Some("old".into());
        pipeline.partition_id = Some(100);
        pipeline.status = PipelineStatus::Running;
        let mut stage = Stage::new("test", 0);
        stage.jobs = jobs;
        pipeline.stages.push(stage);
        pipeline
    }

    fn job(name: &str, status: JobStatus, interruptible: bool) -> Job {
        let mut job = Job::new(name, "test", 0);
        job.status = status;
        job.interruptible = interruptible;
        job
    }

    fn pending_job(name: &str) -> Job {
        job(name, JobStatus::Pending, false)
    }

    async fn run(fixture: &CommandFixture, config: ChainConfig, mut newest: Pipeline) -> Pipeline {
        newest = fixture.store.insert_pipeline(newest);
        let mut command = fixture.command("main");
        CancelPendingPipelines::new(fixture.ports(), config)
            .perform(&mut newest, &mut command)
            .await;
        newest
    }

    fn status(fixture: &CommandFixture, pipeline: &Pipeline) -> PipelineStatus {
        fixture.store.pipeline(pipeline.id.unwrap()).unwrap().status
    }

    #[tokio::test]
    async fn test_cancels_every_older_sibling() {
        let fixture = CommandFixture::new();
        let siblings: Vec<Pipeline> = (0..3)
            .map(|i| fixture.store.insert_pipeline(running("main", vec![pending_job(&format!("j{i}"))])))
            .collect();
        let other_ref = fixture.store.insert_pipeline(running("feature", vec![pending_job("f")]));

        let newest = run(&fixture, fast(), running("main", vec![pending_job("n")])).await;

        for sibling in &siblings {
            assert_eq!(status(&fixture, sibling), PipelineStatus::Canceled);
            let stored = fixture.store.pipeline(sibling.id.unwrap()).unwrap();
            assert_eq!(stored.auto_canceled_by_id, newest.id);
        }
        assert_eq!(status(&fixture, &other_ref), PipelineStatus::Running);
        assert_eq!(status(&fixture, &newest), PipelineStatus::Running);
        assert!(fixture.errors.is_empty());
    }

    #[tokio::test]
    async fn test_head_pipeline_is_never_cancelled() {
        let fixture = CommandFixture::new();
        let mut at_head = running("main", vec![pending_job("h")]);
        at_head.sha = Some(DEFAULT_SHA.into());
        let at_head = fixture.store.insert_pipeline(at_head);
        let outdated = fixture.store.insert_pipeline(running("main", vec![pending_job("o")]));

        run(&fixture, fast(), running("main", vec![pending_job("n")])).await;

        let stored = fixture.store.pipeline(at_head.id.unwrap()).unwrap();
        assert_eq!(stored.status, PipelineStatus::Running);
        assert_eq!(stored.auto_canceled_by_id, None);
        assert_eq!(status(&fixture, &outdated), PipelineStatus::Canceled);
        assert_eq!(fixture.store.cancel_attempts(), 1);
    }

    #[tokio::test]
    async fn test_converges_under_racing_writers() {
        let fixture = CommandFixture::new();
        let siblings: Vec<Pipeline> = (0..3)
            .map(|i| fixture.store.insert_pipeline(running("main", vec![pending_job(&format!("j{i}"))])))
            .collect();
        fixture.store.race_cancellations(2);

        run(&fixture, fast(), running("main", vec![pending_job("n")])).await;

        for sibling in &siblings {
            assert_eq!(status(&fixture, sibling), PipelineStatus::Canceled);
        }
        assert_eq!(fixture.store.cancel_attempts(), 5);
        assert!(fixture.errors.is_empty());
    }

    #[tokio::test]
    async fn test_exhaustion_is_tracked() {
        let fixture = CommandFixture::new();
        let sibling = fixture.store.insert_pipeline(running("main", vec![pending_job("a")]));
        fixture.store.race_cancellations(10);

        run(&fixture, fast(), running("main", vec![pending_job("n")])).await;

        assert_eq!(status(&fixture, &sibling), PipelineStatus::Running);
        let tracked = fixture.errors.for_step("cancel_pending_pipelines");
        assert_eq!(tracked.len(), 1);
        assert!(tracked[0].message.contains("Retries exhausted"));
    }

    #[tokio::test]
    async fn test_conservative_keeps_started_uninterruptible() {
        let fixture = CommandFixture::new();
        let started = fixture
            .store
            .insert_pipeline(running("main", vec![job("deploy", JobStatus::Running, false)]));
        let interruptible = fixture
            .store
            .insert_pipeline(running("main", vec![job("test", JobStatus::Running, true)]));

        run(&fixture, fast(), running("main", vec![pending_job("n")])).await;

        assert_eq!(status(&fixture, &started), PipelineStatus::Running);
        assert_eq!(status(&fixture, &interruptible), PipelineStatus::Canceled);
    }

    #[tokio::test]
    async fn test_interruptible_mode_cancels_only_interruptible_jobs() {
        let fixture = CommandFixture::new();
        let sibling = fixture.store.insert_pipeline(running(
            "main",
            vec![
                job("deploy", JobStatus::Running, false),
                job("lint", JobStatus::Pending, true),
            ],
        ));
        let mut newest = running("main", vec![pending_job("n")]);
        newest.metadata = Some(PipelineMetadata {
            name: None,
            auto_cancel: AutoCancel {
                on_new_commit: OnNewCommit::Interruptible,
                ..AutoCancel::default()
            },
        });

        run(&fixture, fast(), newest).await;

        let stored = fixture.store.pipeline(sibling.id.unwrap()).unwrap();
        let statuses: Vec<JobStatus> = stored.jobs().map(|j| j.status).collect();
        assert_eq!(statuses, vec![JobStatus::Running, JobStatus::Canceled]);
        assert_eq!(stored.status, PipelineStatus::Running);
    }

    #[tokio::test]
    async fn test_same_family_is_spared() {
        let fixture = CommandFixture::new();
        let parent = fixture.store.insert_pipeline(running("main", vec![pending_job("p")]));
        let parent_id = parent.id.unwrap();
        let mut child = running("main", vec![pending_job("c")]);
        child.parent_pipeline = Some(ParentPipeline {
            id: parent_id,
            partition_id: 100,
            root_id: parent_id,
        });

        run(&fixture, fast(), child).await;

        assert_eq!(status(&fixture, &parent), PipelineStatus::Running);
    }

    #[tokio::test]
    async fn test_disabled_by_mode_flag_or_project() {
        let mut none = running("main", vec![pending_job("n")]);
        none.metadata = Some(PipelineMetadata {
            name: None,
            auto_cancel: AutoCancel {
                on_new_commit: OnNewCommit::None,
                ..AutoCancel::default()
            },
        });
        let flag_off = fast().with_features(FeatureFlags {
            auto_cancel_pending_pipelines: false,
            ..FeatureFlags::default()
        });

        let fixture = CommandFixture::new();
        let sibling = fixture.store.insert_pipeline(running("main", vec![pending_job("a")]));
        run(&fixture, fast(), none).await;
        run(&fixture, flag_off, running("main", vec![pending_job("b")])).await;
        assert_eq!(status(&fixture, &sibling), PipelineStatus::Running);

        let fixture = CommandFixture::new()
            .with_project(Project::new(1, "group/project").with_auto_cancel_pending_pipelines(false));
        let sibling = fixture.store.insert_pipeline(running("main", vec![pending_job("a")]));
        run(&fixture, fast(), running("main", vec![pending_job("b")])).await;
        assert_eq!(status(&fixture, &sibling), PipelineStatus::Running);
        assert_eq!(fixture.store.cancel_attempts(), 0);
    }
}
