//! Chain configuration and feature flags.

use crate::errors::ConfigError;
use crate::retry::RetryConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Feature toggles consulted by individual steps.
///
/// A disabled feature makes the corresponding step a non-breaking no-op.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureFlags {
    /// Evaluate top-level workflow rules.
    pub workflow_rules: bool,
    /// Cancel superseded pipelines on the same ref.
    pub auto_cancel_pending_pipelines: bool,
    /// Dispatch template/keyword/component usage tracking.
    pub usage_tracking: bool,
    /// Tag jobs with their originating source.
    pub build_sources: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            workflow_rules: true,
            auto_cancel_pending_pipelines: true,
            usage_tracking: true,
            build_sources: true,
        }
    }
}

/// Configuration shared by every step of a chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// The partition assigned to pipelines that have no override or parent.
    pub current_partition_id: u64,
    /// Feature toggles.
    pub features: FeatureFlags,
    /// Retry policy for the optimistic-locking cancellation loop.
    pub cancel_retry: RetryConfig,
    /// Upper bound on the pipeline name length.
    pub max_pipeline_name_length: usize,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            current_partition_id: 100,
            features: FeatureFlags::default(),
            cancel_retry: RetryConfig::default(),
            max_pipeline_name_length: 255,
        }
    }
}

impl ChainConfig {
    /// Creates a config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a config from JSON. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads and parses a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Sets the current partition id.
    #[must_use]
    pub fn with_current_partition_id(mut self, partition_id: u64) -> Self {
        self.current_partition_id = partition_id;
        self
    }

    /// Replaces the feature flags.
    #[must_use]
    pub fn with_features(mut self, features: FeatureFlags) -> Self {
        self.features = features;
        self
    }

    /// Sets the cancellation retry policy.
    #[must_use]
    pub fn with_cancel_retry(mut self, retry: RetryConfig) -> Self {
        self.cancel_retry = retry;
        self
    }

    /// Sets the maximum pipeline name length.
    #[must_use]
    pub fn with_max_pipeline_name_length(mut self, length: usize) -> Self {
        self.max_pipeline_name_length = length;
        self
    }
}
