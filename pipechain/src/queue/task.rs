//! Background task payloads.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// What a usage-tracking task records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageKind {
    /// An included template.
    Template,
    /// A configuration keyword.
    Keyword,
    /// A catalog component.
    Component,
}

impl fmt::Display for UsageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Template => "template",
            Self::Keyword => "keyword",
            Self::Component => "component",
        };
        write!(f, "{s}")
    }
}

/// Work dispatched after the chain, processed out of band.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackgroundTask {
    /// Run the hooks of one job.
    BuildHooks {
        /// Job id.
        job_id: u64,
    },
    /// Run the hooks of the pipeline.
    PipelineHooks {
        /// Pipeline id.
        pipeline_id: u64,
    },
    /// Record usage of a template, keyword or component.
    TrackUsage {
        /// What is being tracked.
        kind: UsageKind,
        /// Template, keyword or component name.
        name: String,
        /// Project id.
        project_id: u64,
        /// Acting user.
        user_id: Option<u64>,
        /// Deduplication key.
        idempotency_key: String,
    },
}

impl BackgroundTask {
    /// Creates a usage task keyed by `(kind, name, pipeline_id)`.
    #[must_use]
    pub fn track_usage(
        kind: UsageKind,
        name: impl Into<String>,
        project_id: u64,
        user_id: Option<u64>,
        pipeline_id: u64,
    ) -> Self {
        let name = name.into();
        let idempotency_key = usage_key(kind, &name, pipeline_id);
        Self::TrackUsage {
            kind,
            name,
            project_id,
            user_id,
            idempotency_key,
        }
    }

    /// Returns a short label for logs.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::BuildHooks { .. } => "build_hooks",
            Self::PipelineHooks { .. } => "pipeline_hooks",
            Self::TrackUsage { .. } => "track_usage",
        }
    }
}

/// Returns the sha256-hex deduplication key of a usage event.
#[must_use]
pub fn usage_key(kind: UsageKind, name: &str, pipeline_id: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{kind}:{name}:{pipeline_id}").as_bytes());
    hex::encode(hasher.finalize())
}
