//! Authorization outcomes and the edition extension seam.

use crate::context::Command;
use crate::model::{Pipeline, Project, User};
use async_trait::async_trait;

/// Yes/no authorization decisions.
#[async_trait]
pub trait PermissionOracle: Send + Sync {
    /// May `user` create pipelines in `project`?
    async fn can_create_pipeline(&self, user: &User, project: &Project) -> bool;

    /// May `user` push to `branch`?
    async fn can_update_branch(&self, user: &User, project: &Project, branch: &str) -> bool;

    /// May `user` create `tag`?
    async fn can_create_tag(&self, user: &User, project: &Project, tag: &str) -> bool;
}

/// Extra ability checks selected at startup.
///
/// `ValidateAbilities` runs the extension after its own checks pass. A
/// returned message becomes a permission error on the pipeline.
#[async_trait]
pub trait AbilityExtension: Send + Sync {
    /// Extension name, used in logs.
    fn name(&self) -> &str;

    /// Returns `Err(message)` to veto creation.
    async fn validate(&self, pipeline: &Pipeline, command: &Command) -> Result<(), String>;
}
