//! Error types for the pipeline creation chain.
//!
//! Two families live here. `ChainError` and its sources describe unexpected
//! failures of collaborators; they are caught at step boundaries and handed
//! to the error tracker. `PipelineError` describes expected validation
//! failures; it is attached to the pipeline and never raised.

use crate::core::FailureReason;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// The main error type for chain collaborators.
#[derive(Debug, Error)]
pub enum ChainError {
    /// A persistence port failed.
    #[error("{0}")]
    Store(#[from] StoreError),

    /// The background queue rejected a task.
    #[error("{0}")]
    Queue(#[from] QueueError),

    /// A rule expression could not be parsed or evaluated.
    #[error("{0}")]
    Expression(#[from] ExpressionError),

    /// Configuration could not be loaded.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// An optimistic-locking loop gave up.
    #[error("Retries exhausted for '{operation}' after {attempts} attempts")]
    RetryExhausted {
        /// The operation being retried.
        operation: String,
        /// How many attempts were made.
        attempts: usize,
    },

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ChainError {
    /// Creates a retry exhausted error.
    #[must_use]
    pub fn retry_exhausted(operation: impl Into<String>, attempts: usize) -> Self {
        Self::RetryExhausted {
            operation: operation.into(),
            attempts,
        }
    }
}

/// Errors raised by persistence ports.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The record failed validation while saving.
    #[error("{0}")]
    Validation(String),

    /// The record changed since it was read.
    #[error("Stale object: {entity} {id} was modified concurrently")]
    StaleObject {
        /// Entity name.
        entity: String,
        /// Entity id.
        id: u64,
    },

    /// The record does not exist.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Entity name.
        entity: String,
        /// Entity id.
        id: u64,
    },

    /// The backend could not be reached.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Creates a stale object error.
    #[must_use]
    pub fn stale(entity: impl Into<String>, id: u64) -> Self {
        Self::StaleObject {
            entity: entity.into(),
            id,
        }
    }

    /// Creates a not found error.
    #[must_use]
    pub fn not_found(entity: impl Into<String>, id: u64) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id,
        }
    }

    /// Returns true for optimistic-locking conflicts.
    #[must_use]
    pub fn is_stale(&self) -> bool {
        matches!(self, Self::StaleObject { .. })
    }
}

/// Errors raised by the background task queue.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// The receiving worker has shut down.
    #[error("Task queue is closed")]
    Closed,

    /// The task was refused.
    #[error("Task rejected: {0}")]
    Rejected(String),
}

/// Errors raised while parsing or evaluating rule expressions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExpressionError {
    /// The lexer met a character it does not understand.
    #[error("Unexpected character '{character}' at position {position} in `{expression}`")]
    UnexpectedCharacter {
        /// The offending character.
        character: char,
        /// Byte offset.
        position: usize,
        /// The full expression.
        expression: String,
    },

    /// The parser met a token it did not expect.
    #[error("Invalid expression syntax in `{expression}`: {detail}")]
    Syntax {
        /// The full expression.
        expression: String,
        /// What went wrong.
        detail: String,
    },

    /// A regular expression literal did not compile.
    #[error("Invalid regular expression /{pattern}/: {detail}")]
    InvalidRegex {
        /// The pattern source.
        pattern: String,
        /// Compiler message.
        detail: String,
    },
}

impl ExpressionError {
    /// Creates a syntax error.
    #[must_use]
    pub fn syntax(expression: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Syntax {
            expression: expression.into(),
            detail: detail.into(),
        }
    }
}

/// Errors raised while loading chain configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// The contents were not valid.
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Classification of an error attached to a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineErrorKind {
    /// The actor may not create this pipeline.
    Permission,
    /// The ref or commit could not be resolved.
    Repository,
    /// The configuration is missing or invalid.
    Config,
    /// Rules filtered the pipeline out.
    Filtered,
    /// The assembled pipeline is invalid.
    Validation,
    /// Saving the pipeline failed.
    Persistence,
    /// Something unexpected happened.
    Internal,
}

impl fmt::Display for PipelineErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Permission => "permission",
            Self::Repository => "repository",
            Self::Config => "config",
            Self::Filtered => "filtered",
            Self::Validation => "validation",
            Self::Persistence => "persistence",
            Self::Internal => "internal",
        };
        write!(f, "{s}")
    }
}

/// A structured error attached to a pipeline under construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{message}")]
pub struct PipelineError {
    /// The classification.
    pub kind: PipelineErrorKind,
    /// The human-readable message.
    pub message: String,
    /// The failure reason to record if the pipeline is dropped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drop_reason: Option<FailureReason>,
}

impl PipelineError {
    /// Creates a new pipeline error.
    #[must_use]
    pub fn new(kind: PipelineErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            drop_reason: None,
        }
    }

    /// Shorthand for a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(PipelineErrorKind::Config, message)
    }

    /// Shorthand for a permission error.
    #[must_use]
    pub fn permission(message: impl Into<String>) -> Self {
        Self::new(PipelineErrorKind::Permission, message)
    }

    /// Sets the drop reason.
    #[must_use]
    pub fn with_drop_reason(mut self, reason: FailureReason) -> Self {
        self.drop_reason = Some(reason);
        self
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("kind".to_string(), serde_json::json!(self.kind.to_string()));
        map.insert("message".to_string(), serde_json::json!(self.message));
        if let Some(reason) = self.drop_reason {
            map.insert("drop_reason".to_string(), serde_json::json!(reason.to_string()));
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_exhausted_message() {
        let err = ChainError::retry_exhausted("cancel_pending_pipelines", 3);
        assert_eq!(
            err.to_string(),
            "Retries exhausted for 'cancel_pending_pipelines' after 3 attempts"
        );
    }

    #[test]
    fn test_store_error_conversion() {
        let err: ChainError = StoreError::stale("pipeline", 7).into();
        assert!(matches!(err, ChainError::Store(ref e) if e.is_stale()));
        assert!(err.to_string().contains("pipeline 7"));
    }

    #[test]
    fn test_pipeline_error_to_dict() {
        let err = PipelineError::config("Missing CI config file")
            .with_drop_reason(FailureReason::ConfigError);

        let dict = err.to_dict();
        assert_eq!(dict.get("kind").unwrap(), "config");
        assert_eq!(dict.get("message").unwrap(), "Missing CI config file");
        assert_eq!(dict.get("drop_reason").unwrap(), "config_error");
    }

    #[test]
    fn test_pipeline_error_display() {
        let err = PipelineError::permission("Insufficient permissions to create a new pipeline");
        assert_eq!(err.to_string(), "Insufficient permissions to create a new pipeline");
    }
}
