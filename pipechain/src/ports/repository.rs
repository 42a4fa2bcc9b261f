//! Repository oracle: ref existence, commits and protection.

use crate::core::RefKind;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A commit as seen by the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    /// Full sha.
    pub sha: String,
    /// Commit message.
    pub message: String,
}

impl Commit {
    /// Creates a commit.
    #[must_use]
    pub fn new(sha: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            sha: sha.into(),
            message: message.into(),
        }
    }
}

/// Read-only view of the project's repository.
///
/// Lookups answer yes/no; an unreachable repository reads as "not found".
#[async_trait]
pub trait RepositoryOracle: Send + Sync {
    /// Returns true if the branch exists.
    async fn branch_exists(&self, name: &str) -> bool;

    /// Returns true if the tag exists.
    async fn tag_exists(&self, name: &str) -> bool;

    /// Returns the head sha of a ref.
    async fn head_sha(&self, name: &str, kind: RefKind) -> Option<String>;

    /// Looks up a commit by sha.
    async fn commit(&self, sha: &str) -> Option<Commit>;

    /// Returns true if the ref is protected.
    async fn is_protected_ref(&self, name: &str, kind: RefKind) -> bool;
}
