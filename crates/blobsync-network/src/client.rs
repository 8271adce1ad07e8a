//! Blob service client implementing [`ObjectStore`]

use crate::auth::{SharedKeySigner, CONTENT_MD5};
use crate::retry::{parse_retry_after, RetryPolicy};
use async_trait::async_trait;
use blobsync_config::StorageConfig;
use blobsync_types::{
    ContentDigest, Error, ObjectStore, PutOptions, RemoteMetadata, Result,
};
use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE, RETRY_AFTER,
};
use reqwest::{Client, Method, Response, StatusCode, Url};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// REST API version sent with every request
pub const API_VERSION: &str = "2021-08-06";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Azure Blob Storage container accessed with a shared key
pub struct AzureBlobStore {
    client: Client,
    signer: SharedKeySigner,
    endpoint: Url,
    container: String,
    retry: RetryPolicy,
}

impl AzureBlobStore {
    /// Create a store for `container` from validated storage settings
    pub fn new(config: &StorageConfig, container: impl Into<String>) -> Result<Self> {
        let endpoint = Url::parse(&config.blob_endpoint).map_err(|e| {
            Error::config(format!(
                "invalid blob endpoint '{}': {}",
                config.blob_endpoint, e
            ))
        })?;
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            signer: SharedKeySigner::new(config.account.clone(), &config.access_key)?,
            endpoint,
            container: container.into(),
            retry: RetryPolicy::default(),
        })
    }

    /// Replace the retry policy for transient failures
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Full URL of the object at `relative_path`
    pub fn object_url(&self, relative_path: &str) -> Result<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|()| {
                Error::config(format!("blob endpoint '{}' cannot hold a path", self.endpoint))
            })?
            .pop_if_empty()
            .push(&self.container)
            .extend(relative_path.split('/').filter(|s| !s.is_empty()));
        Ok(url)
    }

    async fn send_signed(
        &self,
        method: Method,
        url: Url,
        mut headers: HeaderMap,
        body: Option<Vec<u8>>,
    ) -> Result<Response> {
        let date = chrono::Utc::now()
            .format("%a, %d %b %Y %H:%M:%S GMT")
            .to_string();
        headers.insert(HeaderName::from_static("x-ms-date"), header_value(&date)?);
        headers.insert(
            HeaderName::from_static("x-ms-version"),
            HeaderValue::from_static(API_VERSION),
        );

        let authorization = self.signer.authorization(&method, &url, &headers)?;
        headers.insert(reqwest::header::AUTHORIZATION, header_value(&authorization)?);

        let mut request = self.client.request(method, url).headers(headers);
        if let Some(body) = body {
            request = request.body(body);
        }
        request.send().await.map_err(transport_error)
    }

    async fn retrying<T, F, Fut>(&self, operation: &str, mut attempt_fn: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match attempt_fn().await {
                Err(e) if self.retry.should_retry(attempt, &e) => {
                    let delay = self.retry.delay_for(attempt, &e);
                    warn!(
                        "{} failed (attempt {}), retrying in {:?}: {}",
                        operation,
                        attempt + 1,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    async fn head_once(&self, relative_path: &str) -> Result<RemoteMetadata> {
        let url = self.object_url(relative_path)?;
        let response = self
            .send_signed(Method::HEAD, url, HeaderMap::new(), None)
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(Error::NotFound {
                path: relative_path.to_string(),
            });
        }
        if !status.is_success() {
            return Err(status_error(
                status,
                response.headers(),
                format!("HEAD {relative_path}"),
            ));
        }

        let headers = response.headers();
        let digest = match headers.get(CONTENT_MD5) {
            Some(value) => {
                let encoded = value.to_str().map_err(|_| {
                    Error::invalid_response(format!("non-ASCII Content-MD5 for {relative_path}"))
                })?;
                Some(ContentDigest::from_base64(encoded)?)
            }
            None => None,
        };

        Ok(RemoteMetadata {
            digest,
            content_length: headers
                .get(CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok()),
            content_type: headers
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        })
    }

    async fn put_once(&self, relative_path: &str, content: &[u8], options: &PutOptions) -> Result<()> {
        let url = self.object_url(relative_path)?;

        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("x-ms-blob-type"),
            HeaderValue::from_static("BlockBlob"),
        );
        headers.insert(CONTENT_LENGTH, HeaderValue::from(content.len()));
        headers.insert(CONTENT_MD5, header_value(&options.digest.to_base64())?);
        if let Some(content_type) = &options.content_type {
            headers.insert(CONTENT_TYPE, header_value(content_type)?);
        }

        let response = self
            .send_signed(Method::PUT, url, headers, Some(content.to_vec()))
            .await?;

        let status = response.status();
        if status.is_success() {
            debug!("PUT {} -> {}", relative_path, status);
            return Ok(());
        }

        let headers = response.headers().clone();
        let body = response.text().await.unwrap_or_default();
        Err(status_error(
            status,
            &headers,
            format!("PUT {relative_path}: {}", error_code(&body)),
        ))
    }
}

#[async_trait]
impl ObjectStore for AzureBlobStore {
    fn container(&self) -> &str {
        &self.container
    }

    async fn get_metadata(&self, relative_path: &str) -> Result<RemoteMetadata> {
        self.retrying("HEAD", || self.head_once(relative_path))
            .await
    }

    async fn put_object(
        &self,
        relative_path: &str,
        content: Vec<u8>,
        options: PutOptions,
    ) -> Result<()> {
        self.retrying("PUT", || self.put_once(relative_path, &content, &options))
            .await
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| Error::other(format!("invalid header value '{value}': {e}")))
}

// Throttled responses keep the service's Retry-After hint.
fn status_error(status: StatusCode, headers: &HeaderMap, message: String) -> Error {
    match Error::from_status(status.as_u16(), message) {
        Error::TransientRemote { message, .. } => {
            let hint = headers
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            Error::throttled(message, hint)
        }
        other => other,
    }
}

fn transport_error(error: reqwest::Error) -> Error {
    Error::transient(format!("request failed: {error}"))
}

// The service reports failures as `<Error><Code>...</Code>...</Error>`.
fn error_code(body: &str) -> &str {
    body.split_once("<Code>")
        .and_then(|(_, rest)| rest.split_once("</Code>"))
        .map_or("no error code", |(code, _)| code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use rstest::rstest;
    use wiremock::matchers::{header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store(server: &MockServer) -> AzureBlobStore {
        let config = StorageConfig {
            account: "devaccount".to_string(),
            access_key: STANDARD.encode(b"secret-key"),
            blob_endpoint: server.uri(),
        };
        AzureBlobStore::new(&config, "www")
            .unwrap()
            .with_retry(RetryPolicy::new(2, Duration::from_millis(1), Duration::from_millis(5)).unwrap())
    }

    fn digest() -> ContentDigest {
        ContentDigest::from_base64("XUFAKrxLKna5cZ2REBfFkg==").unwrap()
    }

    #[test]
    fn test_object_url_encodes_segments() {
        let config = StorageConfig {
            account: "devaccount".to_string(),
            access_key: STANDARD.encode(b"k"),
            blob_endpoint: "https://devaccount.blob.core.windows.net".to_string(),
        };
        let store = AzureBlobStore::new(&config, "www").unwrap();
        let url = store.object_url("img/my photo.png").unwrap();
        assert_eq!(
            url.as_str(),
            "https://devaccount.blob.core.windows.net/www/img/my%20photo.png"
        );
    }

    #[rstest]
    #[case("https://devaccount.blob.core.windows.net", "a.txt", "/www/a.txt")]
    #[case("https://devaccount.blob.core.windows.net/", "/a.txt", "/www/a.txt")]
    #[case("http://127.0.0.1:10000/devaccount", "b/c.js", "/devaccount/www/b/c.js")]
    fn test_object_url_paths(#[case] endpoint: &str, #[case] rel: &str, #[case] expected: &str) {
        let config = StorageConfig {
            account: "devaccount".to_string(),
            access_key: STANDARD.encode(b"k"),
            blob_endpoint: endpoint.to_string(),
        };
        let store = AzureBlobStore::new(&config, "www").unwrap();
        assert_eq!(store.object_url(rel).unwrap().path(), expected);
    }

    #[test]
    fn test_error_code_extraction() {
        let body = "<?xml version=\"1.0\"?><Error><Code>AuthenticationFailed</Code></Error>";
        assert_eq!(error_code(body), "AuthenticationFailed");
        assert_eq!(error_code(""), "no error code");
    }

    #[tokio::test]
    async fn test_get_metadata_reads_properties() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/www/index.html"))
            .and(header_exists("authorization"))
            .and(header("x-ms-version", API_VERSION))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-MD5", "XUFAKrxLKna5cZ2REBfFkg==")
                    .insert_header("Content-Type", "text/html"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let metadata = store(&server).get_metadata("index.html").await.unwrap();
        assert_eq!(metadata.digest, Some(digest()));
        assert_eq!(metadata.content_type.as_deref(), Some("text/html"));
    }

    #[tokio::test]
    async fn test_get_metadata_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/www/missing.html"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let error = store(&server).get_metadata("missing.html").await.unwrap_err();
        assert!(error.is_not_found());
    }

    #[tokio::test]
    async fn test_get_metadata_retries_transient_failures() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/www/a.txt"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/www/a.txt"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let metadata = store(&server).get_metadata("a.txt").await.unwrap();
        assert_eq!(metadata.digest, None);
    }

    #[tokio::test]
    async fn test_get_metadata_gives_up_after_max_retries() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let error = store(&server).get_metadata("a.txt").await.unwrap_err();
        assert!(error.is_retryable());
        assert!(!error.is_not_found());
    }

    #[tokio::test]
    async fn test_server_busy_keeps_retry_after_hint() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(503).insert_header("Retry-After", "1"))
            .expect(3)
            .mount(&server)
            .await;

        // The 5 ms cap bounds the wait even though the service asked for 1 s.
        let error = store(&server).get_metadata("a.txt").await.unwrap_err();
        assert!(error.is_retryable());
        assert_eq!(error.retry_after(), Some(Duration::from_secs(1)));
    }

    #[tokio::test]
    async fn test_malformed_digest_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(200).insert_header("Content-MD5", "%%%"))
            .mount(&server)
            .await;

        let error = store(&server).get_metadata("a.txt").await.unwrap_err();
        assert!(!error.is_not_found());
        assert!(!error.is_retryable());
    }

    #[tokio::test]
    async fn test_put_object_sends_block_blob() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/www/css/site.css"))
            .and(header("x-ms-blob-type", "BlockBlob"))
            .and(header("content-md5", "XUFAKrxLKna5cZ2REBfFkg=="))
            .and(header("content-type", "text/css"))
            .and(header_exists("x-ms-date"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        store(&server)
            .put_object(
                "css/site.css",
                b"body {}".to_vec(),
                PutOptions {
                    digest: digest(),
                    content_type: Some("text/css".to_string()),
                },
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_put_object_rejection_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(
                ResponseTemplate::new(403)
                    .set_body_string("<Error><Code>AuthenticationFailed</Code></Error>"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let error = store(&server)
            .put_object(
                "a.txt",
                b"a".to_vec(),
                PutOptions {
                    digest: digest(),
                    content_type: None,
                },
            )
            .await
            .unwrap_err();

        match error {
            Error::Remote { status, message } => {
                assert_eq!(status, 403);
                assert!(message.contains("AuthenticationFailed"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
