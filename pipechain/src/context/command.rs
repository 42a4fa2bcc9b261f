//! The request context shared by every step.

use crate::core::{PipelineSource, RefKind};
use crate::model::{ChatData, Job, ParentPipeline, Pipeline, Project, ScheduleRef, TriggerRequest, User};
use crate::ports::RepositoryOracle;
use crate::processor::ProcessedConfig;
use crate::rules::Variables;
use crate::seed::StageSeed;
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock};
use uuid::Uuid;

/// Push option that asks to skip CI.
pub const SKIP_CI_PUSH_OPTION: &str = "ci.skip";

/// The sha reported for refs without a previous commit.
pub const BLANK_SHA: &str = "0000000000000000000000000000000000000000";

const BRANCH_PREFIX: &str = "refs/heads/";
const TAG_PREFIX: &str = "refs/tags/";

/// What the caller's seed callback receives.
pub enum SeedTarget<'a> {
    /// The pipeline, before seeding.
    Pipeline(&'a mut Pipeline),
    /// A job, after population.
    Job(&'a mut Job),
}

/// Caller-supplied hook that may adjust the pipeline or its jobs.
pub type SeedCallback = Arc<dyn Fn(SeedTarget<'_>) + Send + Sync>;

/// How the origin ref resolved against the repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefLookup {
    /// The ref is a branch.
    Branch,
    /// The ref is a tag.
    Tag,
    /// A bare name matching both a branch and a tag.
    Ambiguous,
    /// Nothing matched.
    Missing,
}

impl RefLookup {
    /// Returns the kind of an unambiguous ref.
    #[must_use]
    pub fn kind(self) -> Option<RefKind> {
        match self {
            Self::Branch => Some(RefKind::Branch),
            Self::Tag => Some(RefKind::Tag),
            Self::Ambiguous | Self::Missing => None,
        }
    }

    /// Returns true if a branch exists under the name.
    #[must_use]
    pub fn branch_exists(self) -> bool {
        matches!(self, Self::Branch | Self::Ambiguous)
    }

    /// Returns true if a tag exists under the name.
    #[must_use]
    pub fn tag_exists(self) -> bool {
        matches!(self, Self::Tag | Self::Ambiguous)
    }
}

/// Values derived from the inputs, each computed at most once.
#[derive(Debug, Default)]
struct Memo {
    ref_lookup: Option<RefLookup>,
    sha: Option<Option<String>>,
    head_sha: Option<Option<String>>,
    protected_ref: Option<bool>,
    skip_ci: Option<bool>,
    workflow_variables: Option<BTreeMap<String, String>>,
    stage_seeds: Option<Vec<StageSeed>>,
}

/// Request inputs plus memoized derived values.
///
/// Inputs are set once through the `with_*` builders. Derived values
/// (ref kind, sha, protected verdict, skip verdict, stage seeds) are
/// computed on first access and never recomputed.
pub struct Command {
    /// Correlation id for logs.
    pub request_id: Uuid,
    /// The requesting event.
    pub source: PipelineSource,
    /// Target project.
    pub project: Project,
    /// Acting user.
    pub current_user: Option<User>,
    /// The ref as given by the caller, possibly fully qualified.
    pub origin_ref: String,
    /// Explicit commit to check out.
    pub checkout_sha: Option<String>,
    /// Commit after a push.
    pub after_sha: Option<String>,
    /// Commit before a push.
    pub before_sha: Option<String>,
    /// Trigger request, for trigger pipelines.
    pub trigger_request: Option<TriggerRequest>,
    /// Schedule, for scheduled pipelines.
    pub schedule: Option<ScheduleRef>,
    /// Parent, for child pipelines.
    pub parent_pipeline: Option<ParentPipeline>,
    /// Explicit partition override.
    pub partition_id: Option<u64>,
    /// Pipeline variables; highest precedence.
    pub variables: BTreeMap<String, String>,
    /// Chat command data, for chat pipelines.
    pub chat_data: Option<ChatData>,
    /// Git push options, such as `ci.skip`.
    pub push_options: Vec<String>,
    /// Ignore `[ci skip]` in the commit message and the `ci.skip` push option.
    pub ignore_skip_ci: bool,
    /// Persist pipelines dropped by expected errors.
    pub save_incompleted: bool,
    /// Stop before persistence.
    pub dry_run: bool,
    /// Stop before persistence, for config linting.
    pub lint_only: bool,
    /// Caller hook invoked on the pipeline and on each job.
    pub seed_callback: Option<SeedCallback>,
    /// The config processor result; `None` when no config was found.
    pub config: Option<ProcessedConfig>,
    repository: Arc<dyn RepositoryOracle>,
    memo: Memo,
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("request_id", &self.request_id)
            .field("source", &self.source)
            .field("project_id", &self.project.id)
            .field("origin_ref", &self.origin_ref)
            .field("dry_run", &self.dry_run)
            .field("lint_only", &self.lint_only)
            .field("has_config", &self.config.is_some())
            .field("has_seed_callback", &self.seed_callback.is_some())
            .field("memo", &self.memo)
            .finish_non_exhaustive()
    }
}

impl Command {
    /// Creates a command for `origin_ref` of `project`.
    #[must_use]
    pub fn new(
        project: Project,
        repository: Arc<dyn RepositoryOracle>,
        origin_ref: impl Into<String>,
    ) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            source: PipelineSource::Push,
            project,
            current_user: None,
            origin_ref: origin_ref.into(),
            checkout_sha: None,
            after_sha: None,
            before_sha: None,
            trigger_request: None,
            schedule: None,
            parent_pipeline: None,
            partition_id: None,
            variables: BTreeMap::new(),
            chat_data: None,
            push_options: Vec::new(),
            ignore_skip_ci: false,
            save_incompleted: false,
            dry_run: false,
            lint_only: false,
            seed_callback: None,
            config: None,
            repository,
            memo: Memo::default(),
        }
    }

    /// Sets the source.
    #[must_use]
    pub fn with_source(mut self, source: PipelineSource) -> Self {
        self.source = source;
        self
    }

    /// Sets the acting user.
    #[must_use]
    pub fn with_user(mut self, user: User) -> Self {
        self.current_user = Some(user);
        self
    }

    /// Sets the checkout sha.
    #[must_use]
    pub fn with_checkout_sha(mut self, sha: impl Into<String>) -> Self {
        self.checkout_sha = Some(sha.into());
        self
    }

    /// Sets the push shas.
    #[must_use]
    pub fn with_push_shas(mut self, before: impl Into<String>, after: impl Into<String>) -> Self {
        self.before_sha = Some(before.into());
        self.after_sha = Some(after.into());
        self
    }

    /// Sets the trigger request.
    #[must_use]
    pub fn with_trigger_request(mut self, trigger: TriggerRequest) -> Self {
        self.trigger_request = Some(trigger);
        self
    }

    /// Sets the schedule.
    #[must_use]
    pub fn with_schedule(mut self, schedule: ScheduleRef) -> Self {
        self.schedule = Some(schedule);
        self
    }

    /// Sets the parent pipeline.
    #[must_use]
    pub fn with_parent_pipeline(mut self, parent: ParentPipeline) -> Self {
        self.parent_pipeline = Some(parent);
        self
    }

    /// Sets the partition override.
    #[must_use]
    pub fn with_partition_id(mut self, partition_id: u64) -> Self {
        self.partition_id = Some(partition_id);
        self
    }

    /// Adds a pipeline variable.
    #[must_use]
    pub fn with_variable(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(key.into(), value.into());
        self
    }

    /// Sets chat data.
    #[must_use]
    pub fn with_chat_data(mut self, chat_data: ChatData) -> Self {
        self.chat_data = Some(chat_data);
        self
    }

    /// Sets the git push options.
    #[must_use]
    pub fn with_push_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push_options = options.into_iter().map(Into::into).collect();
        self
    }

    /// Sets `ignore_skip_ci`.
    #[must_use]
    pub fn with_ignore_skip_ci(mut self, ignore: bool) -> Self {
        self.ignore_skip_ci = ignore;
        self
    }

    /// Sets `save_incompleted`.
    #[must_use]
    pub fn with_save_incompleted(mut self, save: bool) -> Self {
        self.save_incompleted = save;
        self
    }

    /// Sets `dry_run`.
    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Sets `lint_only`.
    #[must_use]
    pub fn with_lint_only(mut self, lint_only: bool) -> Self {
        self.lint_only = lint_only;
        self
    }

    /// Sets the seed callback.
    #[must_use]
    pub fn with_seed_callback(mut self, callback: SeedCallback) -> Self {
        self.seed_callback = Some(callback);
        self
    }

    /// Sets the config processor result.
    #[must_use]
    pub fn with_config(mut self, config: ProcessedConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Returns the short ref name.
    #[must_use]
    pub fn ref_name(&self) -> &str {
        self.origin_ref
            .strip_prefix(BRANCH_PREFIX)
            .or_else(|| self.origin_ref.strip_prefix(TAG_PREFIX))
            .unwrap_or(&self.origin_ref)
    }

    /// Returns the before sha, or the blank sha.
    #[must_use]
    pub fn before_sha(&self) -> &str {
        self.before_sha.as_deref().unwrap_or(BLANK_SHA)
    }

    /// Returns the user acting for the request: the current user, or the
    /// trigger owner.
    #[must_use]
    pub fn actor(&self) -> Option<&User> {
        self.current_user
            .as_ref()
            .or_else(|| self.trigger_request.as_ref().and_then(|t| t.owner.as_ref()))
    }

    /// Invokes the seed callback, if any.
    pub fn run_seed_callback(&self, target: SeedTarget<'_>) {
        if let Some(callback) = &self.seed_callback {
            callback(target);
        }
    }

    /// Resolves the origin ref against the repository.
    pub async fn ref_lookup(&mut self) -> RefLookup {
        if let Some(lookup) = self.memo.ref_lookup {
            return lookup;
        }

        let repository = Arc::clone(&self.repository);
        let lookup = if let Some(branch) = self.origin_ref.strip_prefix(BRANCH_PREFIX) {
            if repository.branch_exists(branch).await {
                RefLookup::Branch
            } else {
                RefLookup::Missing
            }
        } else if let Some(tag) = self.origin_ref.strip_prefix(TAG_PREFIX) {
            if repository.tag_exists(tag).await {
                RefLookup::Tag
            } else {
                RefLookup::Missing
            }
        } else {
            let branch = repository.branch_exists(&self.origin_ref).await;
            let tag = repository.tag_exists(&self.origin_ref).await;
            match (branch, tag) {
                (true, true) => RefLookup::Ambiguous,
                (true, false) => RefLookup::Branch,
                (false, true) => RefLookup::Tag,
                (false, false) => RefLookup::Missing,
            }
        };

        self.memo.ref_lookup = Some(lookup);
        lookup
    }

    /// Returns the kind of the origin ref, if it is unambiguous.
    pub async fn ref_kind(&mut self) -> Option<RefKind> {
        self.ref_lookup().await.kind()
    }

    /// Resolves the target sha: checkout sha, after sha, then the ref head.
    pub async fn sha(&mut self) -> Option<String> {
        if let Some(sha) = &self.memo.sha {
            return sha.clone();
        }

        let explicit = self
            .checkout_sha
            .clone()
            .or_else(|| self.after_sha.clone())
            .filter(|sha| !sha.is_empty() && sha != BLANK_SHA);

        let sha = match explicit {
            Some(sha) => Some(sha),
            None => self.head_sha().await,
        };

        self.memo.sha = Some(sha.clone());
        sha
    }

    /// Resolves the current head of the origin ref, ignoring any explicit
    /// sha.
    pub async fn head_sha(&mut self) -> Option<String> {
        if let Some(head) = &self.memo.head_sha {
            return head.clone();
        }

        // Ambiguous names resolve to the tag, like git does.
        let kind = match self.ref_lookup().await {
            RefLookup::Branch => Some(RefKind::Branch),
            RefLookup::Tag | RefLookup::Ambiguous => Some(RefKind::Tag),
            RefLookup::Missing => None,
        };
        let head = match kind {
            Some(kind) => {
                let repository = Arc::clone(&self.repository);
                repository.head_sha(self.ref_name(), kind).await
            }
            None => None,
        };

        self.memo.head_sha = Some(head.clone());
        head
    }

    /// Returns true if the origin ref is protected.
    pub async fn protected_ref(&mut self) -> bool {
        if let Some(protected) = self.memo.protected_ref {
            return protected;
        }

        let protected = match self.ref_kind().await {
            Some(kind) => {
                let repository = Arc::clone(&self.repository);
                repository.is_protected_ref(self.ref_name(), kind).await
            }
            None => false,
        };

        self.memo.protected_ref = Some(protected);
        protected
    }

    /// Returns true if the push options or the commit message ask to skip
    /// CI and the request does not ignore it.
    pub async fn skip_ci(&mut self) -> bool {
        if let Some(skip) = self.memo.skip_ci {
            return skip;
        }

        let skip = if self.ignore_skip_ci {
            false
        } else if self.push_options_skip_ci() {
            true
        } else {
            match self.sha().await {
                Some(sha) => {
                    let repository = Arc::clone(&self.repository);
                    repository
                        .commit(&sha)
                        .await
                        .is_some_and(|commit| message_skips_ci(&commit.message))
                }
                None => false,
            }
        };

        self.memo.skip_ci = Some(skip);
        skip
    }

    /// Returns true if the push options carry `ci.skip`.
    #[must_use]
    pub fn push_options_skip_ci(&self) -> bool {
        self.push_options
            .iter()
            .any(|option| option.trim() == SKIP_CI_PUSH_OPTION)
    }

    /// The protected verdict, if already computed.
    #[must_use]
    pub fn cached_protected_ref(&self) -> Option<bool> {
        self.memo.protected_ref
    }

    /// The skip verdict, if already computed.
    #[must_use]
    pub fn cached_skip_ci(&self) -> Option<bool> {
        self.memo.skip_ci
    }

    /// Records the variables set by the matching workflow rule. Only the
    /// first call has an effect.
    pub fn set_workflow_variables(&mut self, variables: BTreeMap<String, String>) {
        if self.memo.workflow_variables.is_none() {
            self.memo.workflow_variables = Some(variables);
        }
    }

    /// Builds the variables visible to rules.
    ///
    /// Precedence, lowest first: predefined, YAML globals, workflow rule
    /// variables, pipeline variables.
    pub async fn rule_variables(&mut self) -> Variables {
        let mut variables = Variables::new();
        let ref_name = self.ref_name().to_string();

        variables.insert("CI_COMMIT_REF_NAME", ref_name.as_str());
        match self.ref_kind().await {
            Some(RefKind::Branch) => variables.insert("CI_COMMIT_BRANCH", ref_name.as_str()),
            Some(RefKind::Tag) => variables.insert("CI_COMMIT_TAG", ref_name.as_str()),
            None => {}
        }
        if let Some(sha) = self.sha().await {
            variables.insert("CI_COMMIT_SHA", sha);
        }
        variables.insert("CI_PIPELINE_SOURCE", self.source.to_string());
        variables.insert("CI_PROJECT_PATH", self.project.full_path.as_str());
        variables.insert("CI_DEFAULT_BRANCH", self.project.default_branch.as_str());

        if let Some(config) = &self.config {
            variables.extend(config.variables.clone());
        }
        if let Some(workflow) = &self.memo.workflow_variables {
            variables.extend(workflow.clone());
        }
        variables.extend(self.variables.clone());
        variables
    }

    /// Stores the stage seeds. The first stored list wins and is returned.
    pub fn memoize_stage_seeds(&mut self, seeds: Vec<StageSeed>) -> &[StageSeed] {
        self.memo.stage_seeds.get_or_insert(seeds)
    }

    /// Returns the stage seeds once the Seed step has run.
    #[must_use]
    pub fn stage_seeds(&self) -> Option<&[StageSeed]> {
        self.memo.stage_seeds.as_deref()
    }

    /// Returns true if at least one stage seed survived the rules.
    #[must_use]
    pub fn has_included_stage_seeds(&self) -> bool {
        self.stage_seeds()
            .is_some_and(|seeds| seeds.iter().any(StageSeed::is_included))
    }
}

/// Returns true if `message` contains a CI skip directive.
#[must_use]
pub fn message_skips_ci(message: &str) -> bool {
    static SKIP: OnceLock<Option<Regex>> = OnceLock::new();
    SKIP.get_or_init(|| Regex::new(r"(?i)\[(ci[ _-]skip|skip[ _-]ci)\]").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(message))
}
