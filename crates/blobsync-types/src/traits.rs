//! Traits for the remote collaborators of a sync run
//!
//! The walker and the cache invalidator only talk to object storage and the
//! CDN through these traits, so the same engine runs against Azure or an
//! in-memory double.

use crate::{PurgeStatus, PurgeTarget, PutOptions, RemoteMetadata, Result};
use async_trait::async_trait;

/// Remote object storage scoped to a single container
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Name of the container objects are written to
    fn container(&self) -> &str;

    /// Fetch stored properties of the object at `relative_path`
    ///
    /// Returns [`crate::Error::NotFound`] when the object does not exist. Any
    /// other failure must be reported as such, never as `NotFound`.
    async fn get_metadata(&self, relative_path: &str) -> Result<RemoteMetadata>;

    /// Create or overwrite the object at `relative_path`
    async fn put_object(
        &self,
        relative_path: &str,
        content: Vec<u8>,
        options: PutOptions,
    ) -> Result<()>;
}

/// In-flight purge request
#[async_trait]
pub trait PurgeHandle: Send {
    /// Wait until the provider acknowledges completion
    async fn wait(self: Box<Self>) -> Result<PurgeStatus>;
}

/// CDN management API able to invalidate cached paths
#[async_trait]
pub trait PurgeClient: Send + Sync {
    /// Submit a purge of `paths` on `target`
    async fn begin_purge(
        &self,
        target: &PurgeTarget,
        paths: &[String],
    ) -> Result<Box<dyn PurgeHandle>>;
}

/// Handle for providers that answer synchronously
#[derive(Debug, Clone, Copy)]
pub struct CompletedPurge(pub PurgeStatus);

#[async_trait]
impl PurgeHandle for CompletedPurge {
    async fn wait(self: Box<Self>) -> Result<PurgeStatus> {
        Ok(self.0)
    }
}
