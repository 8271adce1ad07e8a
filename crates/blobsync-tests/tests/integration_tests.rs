//! Integration tests for BlobSync
//!
//! These tests drive the walker, the cache invalidator and the configuration
//! loader together the way a full upload run does.

use std::sync::Arc;
use std::time::Duration;

use blobsync_cdn::{CacheInvalidator, MemoryPurgeClient, PurgeBatchConfig};
use blobsync_config::{ConfigLoader, StorageConfig};
use blobsync_network::{AzureBlobStore, RetryPolicy};
use blobsync_sync::{MemoryObjectStore, TreeWalker, WalkOptions};
use blobsync_tests::test_utils::{at, create_tree, write_config, FixtureFile};
use blobsync_types::{ErrorKind, PurgeTarget};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn target() -> PurgeTarget {
    PurgeTarget {
        resource_group: "web".to_string(),
        profile: "static".to_string(),
        endpoint: "edge".to_string(),
    }
}

#[tokio::test]
async fn test_full_run_purges_only_overwritten_objects() {
    let tree = create_tree(&[
        FixtureFile::new("index.html", "<h1>v2</h1>", 200),
        FixtureFile::new("about.html", "<h1>about</h1>", 150),
        FixtureFile::new("css/site.css", "body { color: red }", 180),
        FixtureFile::new("js/new.js", "console.log(1)", 190),
        FixtureFile::new(".git/config", "[core]", 300),
    ]);

    let store = Arc::new(MemoryObjectStore::new("www"));
    store.insert("index.html", "<h1>v1</h1>").await;
    store.insert("about.html", "<h1>about</h1>").await;
    store.insert("css/site.css", "body { color: blue }").await;

    let report = TreeWalker::new(store.clone(), tree.path(), WalkOptions::default())
        .walk(None)
        .await
        .unwrap();

    assert!(report.is_clean());
    assert_eq!(report.stats.files_checked, 4);
    assert_eq!(report.stats.files_uploaded, 3);
    assert_eq!(report.stats.files_created, 1);
    assert_eq!(report.stats.files_unchanged, 1);
    assert!(store.get(".git/config").await.is_none());

    let mut cache_paths = report.changed_paths.cache_paths("www");
    cache_paths.sort();
    assert_eq!(cache_paths, vec!["/www/css/site.css", "/www/index.html"]);

    let client = Arc::new(MemoryPurgeClient::new());
    let purge = CacheInvalidator::new(client.clone(), PurgeBatchConfig::new(target()))
        .purge(&cache_paths)
        .await
        .unwrap();

    assert!(purge.is_complete());
    let calls = client.calls().await;
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].paths, cache_paths);
    assert_eq!(calls[0].target, target());
}

#[tokio::test]
async fn test_watermark_from_previous_run_skips_old_files() {
    let tree = create_tree(&[
        FixtureFile::new("old.txt", "old", 100),
        FixtureFile::new("fresh.txt", "fresh", 500),
        FixtureFile::new("archive/2019.txt", "2019", 50),
    ]);

    let store = Arc::new(MemoryObjectStore::new("www"));
    let first = TreeWalker::new(store.clone(), tree.path(), WalkOptions::default())
        .walk(None)
        .await
        .unwrap();
    assert_eq!(first.stats.files_uploaded, 3);
    assert!(first.changed_paths.is_empty());

    let metadata_calls = store.metadata_calls();
    let second = TreeWalker::new(store.clone(), tree.path(), WalkOptions::default())
        .walk(Some(at(400)))
        .await
        .unwrap();

    assert_eq!(second.stats.files_checked, 1);
    assert_eq!(second.stats.files_uploaded, 0);
    assert_eq!(store.metadata_calls(), metadata_calls + 1);
    assert!(second.stats.pruned > 0);
}

#[tokio::test(start_paused = true)]
async fn test_large_change_set_is_purged_in_paced_batches() {
    let files: Vec<(String, String)> = (0..120)
        .map(|i| (format!("pages/page{i:03}.html"), format!("<p>v2 {i}</p>")))
        .collect();
    let fixtures: Vec<FixtureFile<'_>> = files
        .iter()
        .map(|(p, c)| FixtureFile::new(p, c, 1_000))
        .collect();
    let tree = create_tree(&fixtures);

    let store = Arc::new(MemoryObjectStore::new("www"));
    for (p, _) in &files {
        store.insert(p, "<p>v1</p>").await;
    }

    let report = TreeWalker::new(store.clone(), tree.path(), WalkOptions::process_all())
        .walk(None)
        .await
        .unwrap();
    assert_eq!(report.changed_paths.len(), 120);

    let client = Arc::new(MemoryPurgeClient::new());
    let invalidator = CacheInvalidator::new(
        client.clone(),
        PurgeBatchConfig::new(target()).with_inter_batch_delay(Duration::from_secs(180)),
    );
    let purge = invalidator
        .purge(&report.changed_paths.cache_paths("www"))
        .await
        .unwrap();

    assert_eq!(purge.total_batches, 3);
    assert_eq!(purge.purged_paths(), 120);

    let calls = client.calls().await;
    let sizes: Vec<usize> = calls.iter().map(|c| c.paths.len()).collect();
    assert_eq!(sizes, vec![50, 50, 20]);
    for pair in calls.windows(2) {
        assert_eq!(pair[1].at - pair[0].at, Duration::from_secs(180));
    }
}

#[tokio::test(start_paused = true)]
async fn test_rejected_batch_reports_progress() {
    let paths: Vec<String> = (0..75).map(|i| format!("/www/f{i}.txt")).collect();
    let client = Arc::new(MemoryPurgeClient::new());
    client.fail_on_call(2).await;

    let error = CacheInvalidator::new(client.clone(), PurgeBatchConfig::new(target()))
        .purge(&paths)
        .await
        .unwrap_err();

    assert_eq!(error.kind(), ErrorKind::PurgeBatch);
    assert_eq!(error.stage(), "cache purge");
    assert_eq!(client.calls().await.len(), 2);
}

#[tokio::test]
async fn test_walk_against_blob_service() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/www/hello.txt"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-MD5", "XUFAKrxLKna5cZ2REBfFkg==")
                .insert_header("Content-Length", "5"),
        )
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/www/docs/new.txt"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/www/docs/new.txt"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let tree = create_tree(&[
        FixtureFile::new("hello.txt", "hello", 10),
        FixtureFile::new("docs/new.txt", "brand new", 20),
    ]);
    let storage = StorageConfig {
        account: "devaccount".to_string(),
        access_key: "c2VjcmV0LWtleQ==".to_string(),
        blob_endpoint: server.uri(),
    };
    let store = AzureBlobStore::new(&storage, "www")
        .unwrap()
        .with_retry(RetryPolicy::new(1, Duration::from_millis(1), Duration::from_millis(2)).unwrap());

    let report = TreeWalker::new(Arc::new(store), tree.path(), WalkOptions::default())
        .walk(None)
        .await
        .unwrap();

    assert!(report.is_clean());
    assert_eq!(report.stats.files_uploaded, 1);
    assert_eq!(report.stats.files_created, 1);
    assert_eq!(report.stats.files_unchanged, 1);
    assert!(report.changed_paths.is_empty());
}

#[test]
fn test_config_file_feeds_validated_cdn_settings() {
    let dir = TempDir::new().unwrap();
    let config = write_config(
        dir.path(),
        r#"
client_id: "app"
subscription_id: "sub"
private_key: "secret"
tenant_id: "tenant"
storage_account: "devaccount"
storage_access_key: "c2VjcmV0LWtleQ=="
CDN:
  resource_group: "web"
  profile: "static"
  endpoint: "edge"
  inter_batch_delay_secs: 30
"#,
    );

    let settings = ConfigLoader::load_from_file(&config).unwrap();
    let cdn = settings.require_cdn().unwrap();
    assert_eq!(cdn.target, target());
    assert_eq!(cdn.inter_batch_delay, Duration::from_secs(30));

    let invalidator = CacheInvalidator::new(
        Arc::new(MemoryPurgeClient::new()),
        PurgeBatchConfig::from(&cdn),
    );
    assert_eq!(invalidator.config().max_batch_size, 50);

    let storage = settings.require_storage().unwrap();
    assert_eq!(storage.blob_endpoint, "https://devaccount.blob.core.windows.net");
}

#[test]
fn test_config_missing_keys_are_all_reported() {
    let dir = TempDir::new().unwrap();
    let config = write_config(
        dir.path(),
        r#"
client_id: "app"
subscription_id: "sub"
private_key: "secret"
CDN:
  resource_group: "web"
  profile: "static"
  endpoint: "edge"
"#,
    );

    let settings = ConfigLoader::load_from_file(&config).unwrap();
    let error = settings.require_cdn().unwrap_err();
    assert_eq!(error.missing_keys(), ["tenant_id".to_string()]);

    let error = settings.require_storage().unwrap_err();
    assert_eq!(
        error.missing_keys(),
        ["storage_account".to_string(), "storage_access_key".to_string()]
    );
}
