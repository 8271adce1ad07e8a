//! In-memory object store
//!
//! Behaves like a real container for the walker: missing objects report
//! `NotFound`, uploads overwrite, and failures can be injected per path.

use crate::detector::digest_bytes;
use async_trait::async_trait;
use blobsync_types::{ContentDigest, Error, ObjectStore, PutOptions, RemoteMetadata, Result};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// Object held by [`MemoryObjectStore`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Object content
    pub content: Vec<u8>,
    /// Stored digest metadata
    pub digest: Option<ContentDigest>,
    /// Stored content type
    pub content_type: Option<String>,
}

#[derive(Debug, Clone)]
enum Failure {
    Transient(String),
    Malformed(String),
}

impl Failure {
    fn to_error(&self) -> Error {
        match self {
            Self::Transient(message) => Error::transient(message.clone()),
            Self::Malformed(message) => Error::invalid_response(message.clone()),
        }
    }
}

/// Object store kept entirely in memory
#[derive(Debug)]
pub struct MemoryObjectStore {
    container: String,
    objects: RwLock<BTreeMap<String, StoredObject>>,
    metadata_failures: RwLock<HashMap<String, Failure>>,
    put_failures: RwLock<HashMap<String, Failure>>,
    uploads: RwLock<Vec<String>>,
    metadata_calls: AtomicUsize,
    put_calls: AtomicUsize,
}

impl MemoryObjectStore {
    /// Create an empty container
    pub fn new(container: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            objects: RwLock::new(BTreeMap::new()),
            metadata_failures: RwLock::new(HashMap::new()),
            put_failures: RwLock::new(HashMap::new()),
            uploads: RwLock::new(Vec::new()),
            metadata_calls: AtomicUsize::new(0),
            put_calls: AtomicUsize::new(0),
        }
    }

    /// Seed an object with a correct digest
    pub async fn insert(&self, relative_path: &str, content: impl Into<Vec<u8>>) {
        let content = content.into();
        let object = StoredObject {
            digest: Some(digest_bytes(&content)),
            content,
            content_type: None,
        };
        self.insert_object(relative_path, object).await;
    }

    /// Seed an object verbatim
    pub async fn insert_object(&self, relative_path: &str, object: StoredObject) {
        self.objects
            .write()
            .await
            .insert(relative_path.to_string(), object);
    }

    /// Make metadata lookups for `relative_path` fail with a transient error
    pub async fn fail_metadata(&self, relative_path: &str, message: &str) {
        self.metadata_failures.write().await.insert(
            relative_path.to_string(),
            Failure::Transient(message.to_string()),
        );
    }

    /// Make metadata lookups for `relative_path` return an unreadable response
    pub async fn corrupt_metadata(&self, relative_path: &str, message: &str) {
        self.metadata_failures.write().await.insert(
            relative_path.to_string(),
            Failure::Malformed(message.to_string()),
        );
    }

    /// Make uploads to `relative_path` fail with a transient error
    pub async fn fail_put(&self, relative_path: &str, message: &str) {
        self.put_failures.write().await.insert(
            relative_path.to_string(),
            Failure::Transient(message.to_string()),
        );
    }

    /// Stored object at `relative_path`
    pub async fn get(&self, relative_path: &str) -> Option<StoredObject> {
        self.objects.read().await.get(relative_path).cloned()
    }

    /// Every stored path, sorted
    pub async fn paths(&self) -> Vec<String> {
        self.objects.read().await.keys().cloned().collect()
    }

    /// Paths written by `put_object`, in completion order
    pub async fn uploaded(&self) -> Vec<String> {
        self.uploads.read().await.clone()
    }

    /// Number of `get_metadata` calls so far
    pub fn metadata_calls(&self) -> usize {
        self.metadata_calls.load(Ordering::SeqCst)
    }

    /// Number of `put_object` calls so far
    pub fn put_calls(&self) -> usize {
        self.put_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    fn container(&self) -> &str {
        &self.container
    }

    async fn get_metadata(&self, relative_path: &str) -> Result<RemoteMetadata> {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(failure) = self.metadata_failures.read().await.get(relative_path) {
            return Err(failure.to_error());
        }

        match self.objects.read().await.get(relative_path) {
            Some(object) => Ok(RemoteMetadata {
                digest: object.digest,
                content_length: Some(object.content.len() as u64),
                content_type: object.content_type.clone(),
            }),
            None => Err(Error::NotFound {
                path: relative_path.to_string(),
            }),
        }
    }

    async fn put_object(
        &self,
        relative_path: &str,
        content: Vec<u8>,
        options: PutOptions,
    ) -> Result<()> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(failure) = self.put_failures.read().await.get(relative_path) {
            return Err(failure.to_error());
        }

        let object = StoredObject {
            content,
            digest: Some(options.digest),
            content_type: options.content_type,
        };
        self.objects
            .write()
            .await
            .insert(relative_path.to_string(), object);
        self.uploads.write().await.push(relative_path.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_object_is_not_found() {
        let store = MemoryObjectStore::new("www");
        let error = store.get_metadata("index.html").await.unwrap_err();
        assert!(error.is_not_found());
        assert_eq!(store.metadata_calls(), 1);
    }

    #[tokio::test]
    async fn test_put_then_get_metadata() {
        let store = MemoryObjectStore::new("www");
        let digest = digest_bytes(b"hello");
        store
            .put_object(
                "a.txt",
                b"hello".to_vec(),
                PutOptions {
                    digest,
                    content_type: Some("text/plain".to_string()),
                },
            )
            .await
            .unwrap();

        let metadata = store.get_metadata("a.txt").await.unwrap();
        assert_eq!(metadata.digest, Some(digest));
        assert_eq!(metadata.content_length, Some(5));
        assert_eq!(metadata.content_type.as_deref(), Some("text/plain"));
        assert_eq!(store.uploaded().await, vec!["a.txt".to_string()]);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let store = MemoryObjectStore::new("www");
        store.insert("a.txt", "x").await;
        store.fail_metadata("a.txt", "throttled").await;
        store.corrupt_metadata("b.txt", "bad md5").await;

        let transient = store.get_metadata("a.txt").await.unwrap_err();
        assert!(transient.is_retryable());
        let malformed = store.get_metadata("b.txt").await.unwrap_err();
        assert!(!malformed.is_not_found());
    }
}
