//! Telemetry steps.
//!
//! This module provides:
//! - `Metrics`: creation counter, named-pipeline and inputs events
//! - `TemplateUsage`, `KeywordUsage`, `ComponentUsage`: usage tracking
//!   dispatched to the background queue
//!
//! Every step here only reads the pipeline and the command.

use super::Step;
use crate::config::ChainConfig;
use crate::context::Command;
use crate::model::Pipeline;
use crate::observability::labels;
use crate::ports::ChainPorts;
use crate::processor::ProcessedConfig;
use crate::queue::{BackgroundTask, UsageKind};
use async_trait::async_trait;
use serde_json::json;
use std::collections::BTreeSet;
use tracing::debug;

/// Counter incremented once per created pipeline.
pub const PIPELINES_CREATED_METRIC: &str = "pipelines_created_total";
/// Event emitted when the pipeline carries a name.
pub const NAMED_PIPELINE_EVENT: &str = "create_pipeline_with_name";
/// Event emitted when the config declares inputs.
pub const INPUTS_DECLARED_EVENT: &str = "create_pipeline_with_inputs";

/// Records the creation counter and creation events.
#[derive(Debug, Clone)]
pub struct Metrics {
    ports: ChainPorts,
}

impl Metrics {
    /// Creates the step.
    #[must_use]
    pub fn new(ports: ChainPorts) -> Self {
        Self { ports }
    }
}

#[async_trait]
impl Step for Metrics {
    fn name(&self) -> &str {
        "metrics"
    }

    async fn perform(&self, pipeline: &mut Pipeline, command: &mut Command) {
        let Some(pipeline_id) = pipeline.id else {
            return;
        };
        let metrics = &self.ports.metrics;

        let partition = pipeline
            .partition_id
            .map_or_else(String::new, |id| id.to_string());
        metrics.increment(
            PIPELINES_CREATED_METRIC,
            &labels([
                ("source", pipeline.source.to_string()),
                ("partition_id", partition),
            ]),
        );

        if pipeline.metadata.as_ref().is_some_and(|m| m.name.is_some()) {
            metrics.event(
                NAMED_PIPELINE_EVENT,
                json!({ "project_id": pipeline.project_id, "pipeline_id": pipeline_id }),
            );
        }

        let inputs = command
            .config
            .as_ref()
            .map_or(0, |config| config.declared_inputs.len());
        if inputs > 0 {
            metrics.event(
                INPUTS_DECLARED_EVENT,
                json!({
                    "project_id": pipeline.project_id,
                    "pipeline_id": pipeline_id,
                    "inputs": inputs,
                }),
            );
        }
    }

    fn should_break(&self, _pipeline: &Pipeline, _command: &Command) -> bool {
        false
    }
}

/// Enqueues one usage task per distinct name.
fn track_usage(
    ports: &ChainPorts,
    step: &str,
    pipeline: &Pipeline,
    kind: UsageKind,
    names: BTreeSet<String>,
) {
    let Some(pipeline_id) = pipeline.id else {
        return;
    };
    if names.is_empty() {
        return;
    }

    debug!(pipeline_id, kind = %kind, count = names.len(), "Tracking usage");
    for name in names {
        let task = BackgroundTask::track_usage(
            kind,
            name,
            pipeline.project_id,
            pipeline.user_id,
            pipeline_id,
        );
        if let Err(e) = ports.queue.enqueue(task) {
            let e = anyhow::Error::new(e).context(format!("tracking {kind} usage"));
            ports.error_tracker.track(&e, step);
        }
    }
}

macro_rules! usage_step {
    ($(#[$doc:meta])* $step:ident, $name:literal, $kind:expr, $names:expr) => {
        $(#[$doc])*
        #[derive(Debug, Clone)]
        pub struct $step {
            ports: ChainPorts,
            config: ChainConfig,
        }

        impl $step {
            /// Creates the step.
            #[must_use]
            pub fn new(ports: ChainPorts, config: ChainConfig) -> Self {
                Self { ports, config }
            }
        }

        #[async_trait]
        impl Step for $step {
            fn name(&self) -> &str {
                $name
            }

            async fn perform(&self, pipeline: &mut Pipeline, command: &mut Command) {
                if !self.config.features.usage_tracking {
                    return;
                }
                let Some(config) = command.config.as_ref() else {
                    return;
                };
                let names: fn(&ProcessedConfig) -> BTreeSet<String> = $names;
                track_usage(&self.ports, self.name(), pipeline, $kind, names(config));
            }

            fn should_break(&self, _pipeline: &Pipeline, _command: &Command) -> bool {
                false
            }
        }
    };
}

usage_step!(
    /// Tracks the templates the config included.
    TemplateUsage,
    "template_usage",
    UsageKind::Template,
    |config| config.included_templates.iter().cloned().collect()
);

usage_step!(
    /// Tracks the keywords the config used.
    KeywordUsage,
    "keyword_usage",
    UsageKind::Keyword,
    |config| config.keywords.iter().cloned().collect()
);

usage_step!(
    /// Tracks catalog components as `project/name@version`.
    ComponentUsage,
    "component_usage",
    UsageKind::Component,
    |config| {
        config
            .included_components
            .iter()
            .map(|c| format!("{}/{}@{}", c.project_path, c.name, c.version))
            .collect()
    }
);
