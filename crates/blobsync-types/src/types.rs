//! Core data types for BlobSync

use crate::{Error, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// MD5 fingerprint of a file's content
///
/// Object stores keep this value as the `Content-MD5` property, encoded as
/// base64, which is why that is the canonical text form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentDigest([u8; 16]);

impl ContentDigest {
    /// Wrap raw digest bytes
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Raw digest bytes
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Base64 form, as stored in object metadata
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    /// Parse the base64 form returned by an object store
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let decoded = STANDARD
            .decode(encoded.trim())
            .map_err(|e| Error::invalid_response(format!("content digest '{encoded}': {e}")))?;
        let bytes: [u8; 16] = decoded.try_into().map_err(|raw: Vec<u8>| {
            Error::invalid_response(format!(
                "content digest '{encoded}' has {} bytes, expected 16",
                raw.len()
            ))
        })?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64())
    }
}

/// One entry of a single directory listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Full local path of the entry
    pub path: PathBuf,
    /// Last modification time
    pub modified_at: SystemTime,
    /// Whether the entry is a directory
    pub is_directory: bool,
}

impl DirEntry {
    /// Create a new entry
    pub fn new(path: impl Into<PathBuf>, modified_at: SystemTime, is_directory: bool) -> Self {
        Self {
            path: path.into(),
            modified_at,
            is_directory,
        }
    }

    /// Entries whose name starts with a dot are never synced
    pub fn is_hidden(&self) -> bool {
        is_hidden_name(&self.path)
    }
}

/// Whether the final component of `path` starts with a dot
pub fn is_hidden_name(path: &Path) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy().starts_with('.'))
        .unwrap_or(false)
}

/// Properties of a remote object relevant to change detection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteMetadata {
    /// Stored content digest, if the object carries one
    pub digest: Option<ContentDigest>,
    /// Object size in bytes
    pub content_length: Option<u64>,
    /// Stored content type
    pub content_type: Option<String>,
}

/// Options attached to an object upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutOptions {
    /// Digest stored alongside the content
    pub digest: ContentDigest,
    /// Content type, when one could be determined
    pub content_type: Option<String>,
}

/// Outcome of processing a single leaf file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadResult {
    /// Whether content was transferred
    pub changed: bool,
    /// Modification time to fold into the directory watermark
    pub observed_date: Option<SystemTime>,
    /// Relative path to report for cache invalidation
    pub uploaded_path: Option<String>,
}

impl UploadResult {
    /// File was identical to its remote counterpart
    pub fn unchanged(modified_at: SystemTime) -> Self {
        Self {
            changed: false,
            observed_date: Some(modified_at),
            uploaded_path: None,
        }
    }

    /// File overwrote an existing remote object
    pub fn updated(relative_path: impl Into<String>) -> Self {
        Self {
            changed: true,
            observed_date: None,
            uploaded_path: Some(relative_path.into()),
        }
    }

    /// File was uploaded for the first time
    pub fn created() -> Self {
        Self {
            changed: true,
            observed_date: None,
            uploaded_path: None,
        }
    }
}

/// Relative paths uploaded during a run, for cache invalidation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangedPathSet {
    paths: Vec<String>,
}

impl ChangedPathSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an uploaded path
    pub fn insert(&mut self, relative_path: impl Into<String>) {
        self.paths.push(relative_path.into());
    }

    /// Fold another set into this one
    pub fn merge(&mut self, other: ChangedPathSet) {
        self.paths.extend(other.paths);
    }

    /// Number of recorded paths
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Whether nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Whether `relative_path` was recorded
    pub fn contains(&self, relative_path: &str) -> bool {
        self.paths.iter().any(|p| p == relative_path)
    }

    /// Iterate over the recorded paths
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.paths.iter().map(String::as_str)
    }

    /// Absolute CDN paths of the form `/<container>/<relative>`
    pub fn cache_paths(&self, container: &str) -> Vec<String> {
        let container = container.trim_matches('/');
        self.paths
            .iter()
            .map(|p| format!("/{}/{}", container, p.trim_start_matches('/')))
            .collect()
    }

    /// Consume the set
    pub fn into_vec(self) -> Vec<String> {
        self.paths
    }
}

impl FromIterator<String> for ChangedPathSet {
    fn from_iter<T: IntoIterator<Item = String>>(iter: T) -> Self {
        Self {
            paths: iter.into_iter().collect(),
        }
    }
}

/// CDN endpoint addressed by a purge request
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PurgeTarget {
    /// Resource group owning the CDN profile
    pub resource_group: String,
    /// CDN profile name
    pub profile: String,
    /// CDN endpoint name
    pub endpoint: String,
}

/// Acknowledgement of a completed purge request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PurgeStatus {
    /// Final HTTP status reported by the provider
    pub status_code: u16,
}

/// Container-relative object path for `path` under `root`, using `/` separators
pub fn relative_object_path(root: &Path, path: &Path) -> Result<String> {
    let relative = path.strip_prefix(root).map_err(|_| {
        Error::other(format!(
            "'{}' is not inside '{}'",
            path.display(),
            root.display()
        ))
    })?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Ok(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::time::Duration;

    #[test]
    fn test_digest_base64() {
        let digest = ContentDigest::from_bytes([
            0xd4, 0x1d, 0x8c, 0xd9, 0x8f, 0x00, 0xb2, 0x04, 0xe9, 0x80, 0x09, 0x98, 0xec, 0xf8,
            0x42, 0x7e,
        ]);
        assert_eq!(digest.to_base64(), "1B2M2Y8AsgTpgAmY7PhCfg==");
        assert_eq!(
            ContentDigest::from_base64("1B2M2Y8AsgTpgAmY7PhCfg==").unwrap(),
            digest
        );
    }

    #[rstest]
    #[case("not base64!")]
    #[case("AAAA")]
    fn test_digest_rejects_malformed(#[case] encoded: &str) {
        let error = ContentDigest::from_base64(encoded).unwrap_err();
        assert_eq!(error.kind(), crate::ErrorKind::Remote);
    }

    #[rstest]
    #[case("/site/.git", true)]
    #[case("/site/.htaccess", true)]
    #[case("/site/index.html", false)]
    #[case("/site/a.b", false)]
    fn test_hidden_names(#[case] path: &str, #[case] hidden: bool) {
        let entry = DirEntry::new(path, SystemTime::UNIX_EPOCH, false);
        assert_eq!(entry.is_hidden(), hidden);
    }

    #[test]
    fn test_upload_result_constructors() {
        let when = SystemTime::UNIX_EPOCH + Duration::from_secs(10);
        assert_eq!(UploadResult::unchanged(when).observed_date, Some(when));
        assert!(!UploadResult::unchanged(when).changed);
        assert_eq!(
            UploadResult::updated("a.txt").uploaded_path.as_deref(),
            Some("a.txt")
        );
        assert!(UploadResult::created().uploaded_path.is_none());
        assert!(UploadResult::created().changed);
    }

    #[test]
    fn test_changed_paths_cache_paths() {
        let mut paths = ChangedPathSet::new();
        paths.insert("index.html");
        let mut nested = ChangedPathSet::new();
        nested.insert("css/app.css");
        paths.merge(nested);

        assert_eq!(paths.len(), 2);
        assert!(paths.contains("css/app.css"));
        assert_eq!(
            paths.cache_paths("www"),
            vec!["/www/index.html".to_string(), "/www/css/app.css".to_string()]
        );
    }

    #[test]
    fn test_relative_object_path() {
        let root = Path::new("/srv/site");
        assert_eq!(
            relative_object_path(root, Path::new("/srv/site/css/app.css")).unwrap(),
            "css/app.css"
        );
        assert!(relative_object_path(root, Path::new("/tmp/x")).is_err());
    }
}
