//! In-memory adapters for every port.

use crate::core::{JobStatus, PipelineStatus, RefKind};
use crate::errors::StoreError;
use crate::model::{Deployment, Environment, Job, Pipeline, Project, ResourceGroup, User};
use crate::ports::{
    CancelOutcome, CancelRequest, CancelScope, Commit, DeploymentStore, EnvironmentStore,
    PermissionOracle, PipelineStore, RepositoryOracle, ResourceGroupStore, SiblingPipeline,
};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// A repository with fixed branches, tags and commits.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    branches: DashMap<String, String>,
    tags: DashMap<String, String>,
    commits: DashMap<String, Commit>,
    protected: DashSet<String>,
    lookups: AtomicUsize,
}

impl InMemoryRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a branch whose head is a commit with `message`.
    #[must_use]
    pub fn with_branch(self, name: &str, sha: &str, message: &str) -> Self {
        self.branches.insert(name.to_string(), sha.to_string());
        self.commits.insert(sha.to_string(), Commit::new(sha, message));
        self
    }

    /// Adds a tag whose head is a commit with `message`.
    #[must_use]
    pub fn with_tag(self, name: &str, sha: &str, message: &str) -> Self {
        self.tags.insert(name.to_string(), sha.to_string());
        self.commits.insert(sha.to_string(), Commit::new(sha, message));
        self
    }

    /// Adds a commit that no ref points at.
    #[must_use]
    pub fn with_commit(self, sha: &str, message: &str) -> Self {
        self.commits.insert(sha.to_string(), Commit::new(sha, message));
        self
    }

    /// Marks a branch or tag name as protected.
    #[must_use]
    pub fn with_protected(self, name: &str) -> Self {
        self.protected.insert(name.to_string());
        self
    }

    /// Returns how many lookups hit the repository.
    #[must_use]
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    fn hit(&self) {
        self.lookups.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl RepositoryOracle for InMemoryRepository {
    async fn branch_exists(&self, name: &str) -> bool {
        self.hit();
        self.branches.contains_key(name)
    }

    async fn tag_exists(&self, name: &str) -> bool {
        self.hit();
        self.tags.contains_key(name)
    }

    async fn head_sha(&self, name: &str, kind: RefKind) -> Option<String> {
        self.hit();
        let refs = match kind {
            RefKind::Branch => &self.branches,
            RefKind::Tag => &self.tags,
        };
        refs.get(name).map(|sha| sha.value().clone())
    }

    async fn commit(&self, sha: &str) -> Option<Commit> {
        self.hit();
        self.commits.get(sha).map(|c| c.value().clone())
    }

    async fn is_protected_ref(&self, name: &str, _kind: RefKind) -> bool {
        self.hit();
        self.protected.contains(name)
    }
}

/// Fixed permission answers.
#[derive(Debug, Clone)]
pub struct StaticPermissions {
    /// Answer for `can_create_pipeline`.
    pub create_pipeline: bool,
    /// Answer for `can_update_branch` on protected refs.
    pub update_protected_branch: bool,
    /// Answer for `can_create_tag` on protected refs.
    pub create_protected_tag: bool,
    protected: HashSet<String>,
}

impl StaticPermissions {
    /// A maintainer: everything allowed.
    #[must_use]
    pub fn maintainer() -> Self {
        Self {
            create_pipeline: true,
            update_protected_branch: true,
            create_protected_tag: true,
            protected: HashSet::new(),
        }
    }

    /// A developer: may create pipelines but not write `protected` refs.
    #[must_use]
    pub fn developer<S: Into<String>>(protected: impl IntoIterator<Item = S>) -> Self {
        Self {
            create_pipeline: true,
            update_protected_branch: false,
            create_protected_tag: false,
            protected: protected.into_iter().map(Into::into).collect(),
        }
    }

    /// A user with no access at all.
    #[must_use]
    pub fn denied() -> Self {
        Self {
            create_pipeline: false,
            update_protected_branch: false,
            create_protected_tag: false,
            protected: HashSet::new(),
        }
    }
}

#[async_trait]
impl PermissionOracle for StaticPermissions {
    async fn can_create_pipeline(&self, _user: &User, _project: &Project) -> bool {
        self.create_pipeline
    }

    async fn can_update_branch(&self, _user: &User, _project: &Project, branch: &str) -> bool {
        !self.protected.contains(branch) || self.update_protected_branch
    }

    async fn can_create_tag(&self, _user: &User, _project: &Project, tag: &str) -> bool {
        !self.protected.contains(tag) || self.create_protected_tag
    }
}

#[derive(Debug, Default)]
struct Faults {
    iids: Option<StoreError>,
    release: Option<StoreError>,
    create: Option<StoreError>,
    update_job: Option<StoreError>,
    environments: HashSet<String>,
    resource_groups: HashSet<String>,
    deployments: bool,
    stale_cancels: usize,
    orphan_jobs: bool,
}

/// One store implementing every persistence port, with fault injection.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    next_id: AtomicU64,
    iids: DashMap<u64, u64>,
    released_iids: Mutex<Vec<(u64, u64)>>,
    pipelines: DashMap<u64, Pipeline>,
    environments: DashMap<(u64, String), Environment>,
    resource_groups: DashMap<(u64, String), ResourceGroup>,
    deployments: DashMap<u64, Deployment>,
    cancel_attempts: AtomicUsize,
    faults: Mutex<Faults>,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Makes `allocate_iid` fail with `error`.
    pub fn fail_iids_with(&self, error: StoreError) {
        self.faults.lock().iids = Some(error);
    }

    /// Makes `release_iid` fail with `error`.
    pub fn fail_release_with(&self, error: StoreError) {
        self.faults.lock().release = Some(error);
    }

    /// Makes `create_pipeline` fail with `error`.
    pub fn fail_create_with(&self, error: StoreError) {
        self.faults.lock().create = Some(error);
    }

    /// Makes `update_job` fail with `error`.
    pub fn fail_update_job_with(&self, error: StoreError) {
        self.faults.lock().update_job = Some(error);
    }

    /// Makes environment creation fail for `name`.
    pub fn fail_environment(&self, name: &str) {
        self.faults.lock().environments.insert(name.to_string());
    }

    /// Makes resource group creation fail for `key`.
    pub fn fail_resource_group(&self, key: &str) {
        self.faults.lock().resource_groups.insert(key.to_string());
    }

    /// Makes deployment creation fail.
    pub fn fail_deployments(&self) {
        self.faults.lock().deployments = true;
    }

    /// Simulates `count` concurrent writers racing cancellation: each
    /// attempt bumps the sibling's version and reports a stale object.
    pub fn race_cancellations(&self, count: usize) {
        self.faults.lock().stale_cancels = count;
    }

    /// Saves jobs without a stage id.
    pub fn orphan_jobs(&self) {
        self.faults.lock().orphan_jobs = true;
    }

    /// Inserts an already persisted pipeline, assigning ids where missing.
    pub fn insert_pipeline(&self, mut pipeline: Pipeline) -> Pipeline {
        let id = pipeline.id.unwrap_or_else(|| self.next_id());
        pipeline.id = Some(id);
        for stage in &mut pipeline.stages {
            let stage_id = stage.id.unwrap_or_else(|| self.next_id());
            stage.id = Some(stage_id);
            for job in &mut stage.jobs {
                job.id = Some(job.id.unwrap_or_else(|| self.next_id()));
                job.stage_id = Some(stage_id);
            }
        }
        self.pipelines.insert(id, pipeline.clone());
        pipeline
    }

    /// Returns a stored pipeline.
    #[must_use]
    pub fn pipeline(&self, id: u64) -> Option<Pipeline> {
        self.pipelines.get(&id).map(|p| p.value().clone())
    }

    /// Returns the number of stored pipelines.
    #[must_use]
    pub fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }

    /// Returns the last allocated IID of a project.
    #[must_use]
    pub fn last_iid(&self, project_id: u64) -> u64 {
        self.iids.get(&project_id).map_or(0, |v| *v)
    }

    /// Returns every released `(project_id, iid)` pair.
    #[must_use]
    pub fn released_iids(&self) -> Vec<(u64, u64)> {
        self.released_iids.lock().clone()
    }

    /// Returns the number of stored environments.
    #[must_use]
    pub fn environment_count(&self) -> usize {
        self.environments.len()
    }

    /// Returns the number of stored resource groups.
    #[must_use]
    pub fn resource_group_count(&self) -> usize {
        self.resource_groups.len()
    }

    /// Returns every stored deployment.
    #[must_use]
    pub fn deployments(&self) -> Vec<Deployment> {
        let mut deployments: Vec<Deployment> =
            self.deployments.iter().map(|d| d.value().clone()).collect();
        deployments.sort_by_key(|d| d.id);
        deployments
    }

    /// Returns how many cancellation attempts were made.
    #[must_use]
    pub fn cancel_attempts(&self) -> usize {
        self.cancel_attempts.load(Ordering::SeqCst)
    }

    fn summarize(pipeline: &Pipeline, id: u64) -> SiblingPipeline {
        SiblingPipeline {
            id,
            root_id: pipeline.root_id().unwrap_or(id),
            sha: pipeline.sha.clone(),
            status: pipeline.status,
            lock_version: pipeline.lock_version,
            has_uninterruptible_started_jobs: pipeline
                .jobs()
                .any(|j| j.status.is_started() && !j.interruptible),
        }
    }
}

#[async_trait]
impl PipelineStore for InMemoryStore {
    async fn allocate_iid(&self, project_id: u64) -> Result<u64, StoreError> {
        if let Some(err) = &self.faults.lock().iids {
            return Err(err.clone());
        }
        let mut last = self.iids.entry(project_id).or_insert(0);
        *last += 1;
        Ok(*last)
    }

    async fn release_iid(&self, project_id: u64, iid: u64) -> Result<(), StoreError> {
        if let Some(err) = &self.faults.lock().release {
            return Err(err.clone());
        }
        if let Some(mut last) = self.iids.get_mut(&project_id) {
            if *last == iid {
                *last -= 1;
            }
        }
        self.released_iids.lock().push((project_id, iid));
        Ok(())
    }

    async fn create_pipeline(&self, mut pipeline: Pipeline) -> Result<Pipeline, StoreError> {
        let orphan_jobs = {
            let faults = self.faults.lock();
            if let Some(err) = &faults.create {
                return Err(err.clone());
            }
            faults.orphan_jobs
        };

        pipeline
            .validate()
            .map_err(|problems| StoreError::Validation(problems.join(", ")))?;

        let id = self.next_id();
        pipeline.id = Some(id);
        pipeline.created_at.get_or_insert_with(Utc::now);
        for stage in &mut pipeline.stages {
            let stage_id = self.next_id();
            stage.id = Some(stage_id);
            for job in &mut stage.jobs {
                job.id = Some(self.next_id());
                job.stage_id = if orphan_jobs { None } else { Some(stage_id) };
            }
        }

        self.pipelines.insert(id, pipeline.clone());
        Ok(pipeline)
    }

    async fn update_job(&self, pipeline_id: u64, job: &Job) -> Result<(), StoreError> {
        if let Some(err) = &self.faults.lock().update_job {
            return Err(err.clone());
        }

        let job_id = job.id.ok_or_else(|| StoreError::Validation("job is not persisted".into()))?;
        let mut pipeline = self
            .pipelines
            .get_mut(&pipeline_id)
            .ok_or_else(|| StoreError::not_found("pipeline", pipeline_id))?;
        let stored = pipeline
            .jobs_mut()
            .find(|j| j.id == Some(job_id))
            .ok_or_else(|| StoreError::not_found("job", job_id))?;
        *stored = job.clone();
        Ok(())
    }

    async fn cancelable_pipelines(
        &self,
        project_id: u64,
        git_ref: &str,
    ) -> Result<Vec<SiblingPipeline>, StoreError> {
        let mut siblings: Vec<SiblingPipeline> = self
            .pipelines
            .iter()
            .filter(|p| {
                p.project_id == project_id && p.git_ref == git_ref && p.status.is_cancelable()
            })
            .map(|p| Self::summarize(p.value(), *p.key()))
            .collect();
        siblings.sort_by_key(|s| s.id);
        Ok(siblings)
    }

    async fn sibling(&self, pipeline_id: u64) -> Result<Option<SiblingPipeline>, StoreError> {
        Ok(self
            .pipelines
            .get(&pipeline_id)
            .map(|p| Self::summarize(p.value(), pipeline_id)))
    }

    async fn cancel_pipeline(&self, request: CancelRequest) -> Result<CancelOutcome, StoreError> {
        self.cancel_attempts.fetch_add(1, Ordering::SeqCst);

        let mut pipeline = self
            .pipelines
            .get_mut(&request.pipeline_id)
            .ok_or_else(|| StoreError::not_found("pipeline", request.pipeline_id))?;

        {
            let mut faults = self.faults.lock();
            if faults.stale_cancels > 0 {
                faults.stale_cancels -= 1;
                pipeline.lock_version += 1;
                return Err(StoreError::stale("pipeline", request.pipeline_id));
            }
        }

        if pipeline.lock_version != request.lock_version {
            return Err(StoreError::stale("pipeline", request.pipeline_id));
        }
        if !pipeline.status.is_cancelable() {
            return Ok(CancelOutcome::NotCancelable);
        }

        let interruptible_only = request.scope == CancelScope::InterruptibleJobs;
        for job in pipeline.jobs_mut() {
            if job.status.is_cancelable() && (!interruptible_only || job.interruptible) {
                job.status = JobStatus::Canceled;
            }
        }
        if !pipeline.jobs().any(|j| j.status.is_cancelable()) {
            pipeline.status = PipelineStatus::Canceled;
            pipeline.auto_canceled_by_id = Some(request.canceled_by);
        }
        pipeline.lock_version += 1;
        Ok(CancelOutcome::Canceled)
    }
}

#[async_trait]
impl EnvironmentStore for InMemoryStore {
    async fn find_or_create_environment(
        &self,
        project_id: u64,
        name: &str,
        tier: Option<&str>,
    ) -> Result<Environment, StoreError> {
        if self.faults.lock().environments.contains(name) {
            return Err(StoreError::Unavailable(format!("environment '{name}'")));
        }

        let environment = self
            .environments
            .entry((project_id, name.to_string()))
            .or_insert_with(|| Environment {
                id: self.next_id(),
                project_id,
                name: name.to_string(),
                tier: tier.map(str::to_string),
            });
        Ok(environment.value().clone())
    }
}

#[async_trait]
impl ResourceGroupStore for InMemoryStore {
    async fn find_or_create_resource_group(
        &self,
        project_id: u64,
        key: &str,
    ) -> Result<ResourceGroup, StoreError> {
        if self.faults.lock().resource_groups.contains(key) {
            return Err(StoreError::Unavailable(format!("resource group '{key}'")));
        }

        let group = self
            .resource_groups
            .entry((project_id, key.to_string()))
            .or_insert_with(|| ResourceGroup {
                id: self.next_id(),
                project_id,
                key: key.to_string(),
            });
        Ok(group.value().clone())
    }
}

#[async_trait]
impl DeploymentStore for InMemoryStore {
    async fn create_deployment(&self, mut deployment: Deployment) -> Result<Deployment, StoreError> {
        if self.faults.lock().deployments {
            return Err(StoreError::Unavailable("deployments".into()));
        }

        let id = self.next_id();
        deployment.id = Some(id);
        self.deployments.insert(id, deployment.clone());
        Ok(deployment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Stage;

    fn pipeline(project_id: u64, git_ref: &str) -> Pipeline {
        let mut pipeline = Pipeline::new();
        pipeline.project_id = project_id;
        pipeline.git_ref = git_ref.to_string();
        pipeline.sha = Some("abc".to_string());
        pipeline.partition_id = Some(100);
        let mut stage = Stage::new("test", 0);
        stage.jobs.push(Job::new("rspec", "test", 0));
        pipeline.stages.push(stage);
        pipeline
    }

    #[tokio::test]
    async fn test_iid_allocation_and_rewind() {
        let store = InMemoryStore::new();
        assert_eq!(store.allocate_iid(1).await.unwrap(), 1);
        assert_eq!(store.allocate_iid(1).await.unwrap(), 2);
        assert_eq!(store.allocate_iid(2).await.unwrap(), 1);

        store.release_iid(1, 2).await.unwrap();
        assert_eq!(store.last_iid(1), 1);
        assert_eq!(store.allocate_iid(1).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_create_assigns_ids() {
        let store = InMemoryStore::new();
        let saved = store.create_pipeline(pipeline(1, "main")).await.unwrap();

        assert!(saved.is_persisted());
        let job = saved.jobs().next().unwrap();
        assert!(job.id.is_some());
        assert_eq!(job.stage_id, saved.stages[0].id);
        assert_eq!(store.pipeline_count(), 1);
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_pipeline_atomically() {
        let store = InMemoryStore::new();
        let mut invalid = pipeline(1, "main");
        invalid.sha = None;

        let err = store.create_pipeline(invalid).await.unwrap_err();
        assert_eq!(err, StoreError::Validation("Sha can't be blank".into()));
        assert_eq!(store.pipeline_count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_checks_lock_version() {
        let store = InMemoryStore::new();
        let saved = store.insert_pipeline(pipeline(1, "main"));
        let id = saved.id.unwrap();

        let stale = CancelRequest {
            pipeline_id: id,
            lock_version: 5,
            canceled_by: 99,
            scope: CancelScope::Pipeline,
        };
        assert!(store.cancel_pipeline(stale).await.unwrap_err().is_stale());

        let fresh = CancelRequest {
            pipeline_id: id,
            lock_version: 0,
            canceled_by: 99,
            scope: CancelScope::Pipeline,
        };
        assert_eq!(store.cancel_pipeline(fresh.clone()).await.unwrap(), CancelOutcome::Canceled);

        let cancelled = store.pipeline(id).unwrap();
        assert_eq!(cancelled.status, PipelineStatus::Canceled);
        assert_eq!(cancelled.auto_canceled_by_id, Some(99));

        let again = CancelRequest { lock_version: 1, ..fresh };
        assert_eq!(store.cancel_pipeline(again).await.unwrap(), CancelOutcome::NotCancelable);
    }

    #[tokio::test]
    async fn test_find_or_create_is_idempotent() {
        let store = InMemoryStore::new();
        let a = store.find_or_create_environment(1, "production", None).await.unwrap();
        let b = store.find_or_create_environment(1, "production", None).await.unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(store.environment_count(), 1);

        let g1 = store.find_or_create_resource_group(1, "prod").await.unwrap();
        let g2 = store.find_or_create_resource_group(1, "prod").await.unwrap();
        assert_eq!(g1, g2);
    }

    #[tokio::test]
    async fn test_repository_lookups() {
        let repo = InMemoryRepository::new()
            .with_branch("main", "a1", "init")
            .with_tag("v1", "b2", "release")
            .with_protected("main");

        assert!(repo.branch_exists("main").await);
        assert!(!repo.tag_exists("main").await);
        assert_eq!(repo.head_sha("v1", RefKind::Tag).await.as_deref(), Some("b2"));
        assert!(repo.is_protected_ref("main", RefKind::Branch).await);
        assert_eq!(repo.commit("a1").await.unwrap().message, "init");
        assert_eq!(repo.lookup_count(), 5);
    }
}
