//! Azure CDN purge client
//!
//! Authenticates as a service principal (client credentials grant) and
//! calls the `purge` action of a CDN endpoint through Resource Manager.
//! Accepted requests are long-running operations; [`PurgeHandle::wait`]
//! polls the operation URL until it reaches a terminal status.

use async_trait::async_trait;
use blobsync_config::{CdnConfig, CdnCredentials};
use blobsync_types::{
    CompletedPurge, Error, PurgeClient, PurgeHandle, PurgeStatus, PurgeTarget, Result,
};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info};

/// Resource Manager API version of the CDN provider
pub const CDN_API_VERSION: &str = "2024-02-01";

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);
const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(30 * 60);
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct OperationStatus {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Purge client for Azure CDN endpoints
pub struct AzureCdnClient {
    client: Client,
    credentials: CdnCredentials,
    management_endpoint: String,
    authority_host: String,
    poll_interval: Duration,
    poll_timeout: Duration,
    token: RwLock<Option<CachedToken>>,
}

impl AzureCdnClient {
    /// Create a client from validated CDN settings
    pub fn new(config: &CdnConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            credentials: config.credentials.clone(),
            management_endpoint: config.management_endpoint.trim_end_matches('/').to_string(),
            authority_host: config.authority_host.trim_end_matches('/').to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            token: RwLock::new(None),
        })
    }

    /// Set how often a running purge is polled
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set how long a running purge may take before giving up
    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// Resource Manager URL of the purge action for `target`
    pub fn purge_url(&self, target: &PurgeTarget) -> String {
        format!(
            "{}/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Cdn/profiles/{}/endpoints/{}/purge?api-version={}",
            self.management_endpoint,
            self.credentials.subscription_id,
            target.resource_group,
            target.profile,
            target.endpoint,
            CDN_API_VERSION
        )
    }

    async fn access_token(&self) -> Result<String> {
        if let Some(token) = self.token.read().await.as_ref() {
            if Instant::now() + TOKEN_REFRESH_MARGIN < token.expires_at {
                return Ok(token.value.clone());
            }
        }

        let mut cached = self.token.write().await;
        // Another task may have refreshed while we waited for the lock
        if let Some(token) = cached.as_ref() {
            if Instant::now() + TOKEN_REFRESH_MARGIN < token.expires_at {
                return Ok(token.value.clone());
            }
        }

        let url = format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority_host, self.credentials.tenant_id
        );
        let scope = format!("{}/.default", self.management_endpoint);
        debug!("Requesting management token from {}", url);

        let response = self
            .client
            .post(&url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.private_key.as_str()),
                ("scope", scope.as_str()),
            ])
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::from_status(
                status.as_u16(),
                format!("token request rejected: {body}"),
            ));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::invalid_response(format!("token response: {e}")))?;
        let lifetime = Duration::from_secs(token.expires_in.unwrap_or(3600));

        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });
        Ok(token.access_token)
    }
}

#[async_trait]
impl PurgeClient for AzureCdnClient {
    async fn begin_purge(
        &self,
        target: &PurgeTarget,
        paths: &[String],
    ) -> Result<Box<dyn PurgeHandle>> {
        let token = self.access_token().await?;
        let url = self.purge_url(target);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&token)
            .json(&serde_json::json!({ "contentPaths": paths }))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        info!("Purge request for {} paths answered {}", paths.len(), status);

        if status == StatusCode::ACCEPTED {
            let operation_url = ["azure-asyncoperation", "location"]
                .iter()
                .find_map(|name| response.headers().get(*name))
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);

            if let Some(operation_url) = operation_url {
                return Ok(Box::new(PurgeOperation {
                    client: self.client.clone(),
                    token,
                    operation_url,
                    poll_interval: self.poll_interval,
                    poll_timeout: self.poll_timeout,
                }));
            }
        }

        if status.is_success() {
            return Ok(Box::new(CompletedPurge(PurgeStatus {
                status_code: status.as_u16(),
            })));
        }

        let body = response.text().await.unwrap_or_default();
        Err(Error::from_status(
            status.as_u16(),
            format!("purge of endpoint '{}' rejected: {}", target.endpoint, body),
        ))
    }
}

/// Long-running purge operation
struct PurgeOperation {
    client: Client,
    token: String,
    operation_url: String,
    poll_interval: Duration,
    poll_timeout: Duration,
}

#[async_trait]
impl PurgeHandle for PurgeOperation {
    async fn wait(self: Box<Self>) -> Result<PurgeStatus> {
        let deadline = Instant::now() + self.poll_timeout;

        loop {
            tokio::time::sleep(self.poll_interval).await;

            let response = self
                .client
                .get(&self.operation_url)
                .bearer_auth(&self.token)
                .send()
                .await
                .map_err(transport_error)?;
            let status = response.status();

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(Error::from_status(
                    status.as_u16(),
                    format!("purge status request failed: {body}"),
                ));
            }

            if status != StatusCode::ACCEPTED {
                let body = response.text().await.map_err(transport_error)?;
                let operation: OperationStatus = if body.trim().is_empty() {
                    OperationStatus::default()
                } else {
                    serde_json::from_str(&body)
                        .map_err(|e| Error::invalid_response(format!("purge status: {e}")))?
                };

                match operation.status.as_deref() {
                    None | Some("Succeeded") => {
                        return Ok(PurgeStatus {
                            status_code: status.as_u16(),
                        })
                    }
                    Some(terminal @ ("Failed" | "Canceled")) => {
                        let detail = operation
                            .error
                            .map(|e| e.to_string())
                            .unwrap_or_default();
                        return Err(Error::Remote {
                            status: status.as_u16(),
                            message: format!("purge operation {terminal} {detail}")
                                .trim_end()
                                .to_string(),
                        });
                    }
                    Some(running) => debug!("Purge operation {}", running),
                }
            }

            if Instant::now() >= deadline {
                return Err(Error::transient(format!(
                    "purge did not finish within {:?}",
                    self.poll_timeout
                )));
            }
        }
    }
}

fn transport_error(error: reqwest::Error) -> Error {
    Error::transient(format!("request failed: {error}"))
}
