//! Content transfer with digest tagging

use blobsync_types::{ContentDigest, Error, ObjectStore, PutOptions, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Uploads local files to the object store
#[derive(Clone)]
pub struct Uploader {
    store: Arc<dyn ObjectStore>,
}

impl Uploader {
    /// Create an uploader writing to `store`
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Create or overwrite `relative_path` with the content of `local_path`
    pub async fn upload(
        &self,
        local_path: &Path,
        relative_path: &str,
        digest: ContentDigest,
    ) -> Result<()> {
        let content_type = content_type_for(local_path);
        if content_type.is_none() {
            warn!("No content type known for {}", local_path.display());
        }

        let content = tokio::fs::read(local_path).await.map_err(|e| Error::Io {
            message: format!("Failed to read '{}': {}", local_path.display(), e),
        })?;
        let size = content.len();

        self.store
            .put_object(
                relative_path,
                content,
                PutOptions {
                    digest,
                    content_type,
                },
            )
            .await?;

        info!(
            "Uploaded {} ({} bytes) to {}/{}",
            local_path.display(),
            size,
            self.store.container(),
            relative_path
        );
        Ok(())
    }
}

/// MIME type guessed from the file name
pub fn content_type_for(path: &Path) -> Option<String> {
    mime_guess::from_path(path).first_raw().map(str::to_string)
}
