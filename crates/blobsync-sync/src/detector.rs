//! Content-addressed change detection

use blobsync_types::{ContentDigest, Error, ObjectStore, Result};
use md5::{Digest, Md5};
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::debug;

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Upload-or-skip verdict for one file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeDecision {
    /// Whether the local content must be transferred
    pub should_upload: bool,
    /// Digest of the local content
    pub local_digest: ContentDigest,
    /// Whether an object already existed at the remote path
    pub existed_remotely: bool,
}

/// Decides whether a local file differs from its remote counterpart
#[derive(Clone)]
pub struct ChangeDetector {
    store: Arc<dyn ObjectStore>,
}

impl ChangeDetector {
    /// Create a detector reading metadata from `store`
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Compare the local file's digest with the stored remote digest
    ///
    /// Only a `NotFound` lookup counts as "absent"; every other lookup
    /// failure is returned to the caller.
    pub async fn decide(&self, local_path: &Path, relative_path: &str) -> Result<ChangeDecision> {
        let local_digest = compute_digest(local_path).await?;

        let decision = match self.store.get_metadata(relative_path).await {
            Ok(metadata) => ChangeDecision {
                should_upload: metadata.digest != Some(local_digest),
                local_digest,
                existed_remotely: true,
            },
            Err(Error::NotFound { .. }) => ChangeDecision {
                should_upload: true,
                local_digest,
                existed_remotely: false,
            },
            Err(e) => return Err(e),
        };

        debug!(
            path = relative_path,
            digest = %local_digest,
            upload = decision.should_upload,
            existed = decision.existed_remotely,
            "Change decision"
        );
        Ok(decision)
    }
}

/// MD5 digest of a file, read in chunks
pub async fn compute_digest(path: &Path) -> Result<ContentDigest> {
    let mut file = tokio::fs::File::open(path).await.map_err(|e| Error::Io {
        message: format!("Failed to open '{}': {}", path.display(), e),
    })?;

    let mut hasher = Md5::new();
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];
    loop {
        let read = file.read(&mut buffer).await.map_err(|e| Error::Io {
            message: format!("Failed to read '{}': {}", path.display(), e),
        })?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(finish(hasher))
}

/// MD5 digest of an in-memory buffer
pub fn digest_bytes(data: &[u8]) -> ContentDigest {
    let mut hasher = Md5::new();
    hasher.update(data);
    finish(hasher)
}

fn finish(hasher: Md5) -> ContentDigest {
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&hasher.finalize());
    ContentDigest::from_bytes(bytes)
}
