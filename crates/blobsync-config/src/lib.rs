//! Layered configuration for BlobSync
//!
//! Settings are merged once per run from an ordered list of sources and then
//! passed around as an immutable value. In ascending precedence:
//!
//! - **Defaults**: batch size, purge delay and walk concurrency
//! - **User file**: `~/.azure_upload.yml` or an explicit path (YAML)
//! - **Environment**: `AZURE_STORAGE_*` and `BLOBSYNC_*` variables
//! - **In-process overrides**: dotted `key = value` pairs
//! - **Call-site arguments**: values passed explicitly by the caller
//!
//! Components never read raw [`Settings`]; they ask for a validated subset
//! ([`Settings::require_cdn`], [`Settings::require_storage`]) which reports
//! every missing key at once.
//!
//! # Examples
//!
//! ```rust
//! use blobsync_config::{ConfigBuilder, Settings};
//!
//! let settings = ConfigBuilder::new()
//!     .add_defaults()
//!     .add_override("client_id", "app")
//!     .build()
//!     .unwrap();
//!
//! let missing = settings.require_cdn().unwrap_err();
//! assert!(missing.missing_keys().contains(&"tenant_id".to_string()));
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

use blobsync_types::PurgeTarget;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub mod builder;
pub mod error;
pub mod loader;

pub use builder::ConfigBuilder;
pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;

/// Default number of paths per CDN purge request
pub const DEFAULT_MAX_BATCH_SIZE: usize = 50;
/// Default pause between CDN purge requests, in seconds
pub const DEFAULT_INTER_BATCH_DELAY_SECS: u64 = 180;
/// Default number of entries processed concurrently per directory batch
pub const DEFAULT_CONCURRENCY: usize = 10;
/// Azure Resource Manager endpoint
pub const DEFAULT_MANAGEMENT_ENDPOINT: &str = "https://management.azure.com";
/// Azure AD authority
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

/// Merged configuration for one run
///
/// Every field is optional so that partial sources can be layered; use the
/// `require_*` accessors to obtain validated values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Service principal application id
    pub client_id: Option<String>,
    /// Azure subscription holding the CDN profile
    pub subscription_id: Option<String>,
    /// Service principal secret
    pub private_key: Option<String>,
    /// Azure AD tenant
    pub tenant_id: Option<String>,
    /// Storage account name
    pub storage_account: Option<String>,
    /// Storage account shared key (base64)
    pub storage_access_key: Option<String>,
    /// Blob service endpoint, defaults to `https://<account>.blob.core.windows.net`
    pub blob_endpoint: Option<String>,
    /// Entries processed concurrently per directory batch
    pub concurrency: Option<usize>,
    /// CDN section
    #[serde(rename = "CDN", alias = "cdn")]
    pub cdn: CdnSettings,
}

/// CDN section of the configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CdnSettings {
    /// Resource group owning the CDN profile
    pub resource_group: Option<String>,
    /// CDN profile name
    pub profile: Option<String>,
    /// CDN endpoint name
    pub endpoint: Option<String>,
    /// Paths per purge request
    pub max_batch_size: Option<usize>,
    /// Pause between purge requests, in seconds
    pub inter_batch_delay_secs: Option<u64>,
    /// Resource Manager endpoint override
    pub management_endpoint: Option<String>,
    /// Azure AD authority override
    pub authority_host: Option<String>,
}

/// Service principal credentials for the CDN management API
#[derive(Clone, PartialEq, Eq)]
pub struct CdnCredentials {
    /// Application id
    pub client_id: String,
    /// Subscription id
    pub subscription_id: String,
    /// Client secret
    pub private_key: String,
    /// Tenant id
    pub tenant_id: String,
}

impl std::fmt::Debug for CdnCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CdnCredentials")
            .field("client_id", &self.client_id)
            .field("subscription_id", &self.subscription_id)
            .field("private_key", &"<redacted>")
            .field("tenant_id", &self.tenant_id)
            .finish()
    }
}

/// Validated configuration for cache invalidation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CdnConfig {
    /// Credentials for the management API
    pub credentials: CdnCredentials,
    /// Endpoint being purged
    pub target: PurgeTarget,
    /// Paths per purge request
    pub max_batch_size: usize,
    /// Pause between purge requests
    pub inter_batch_delay: Duration,
    /// Resource Manager endpoint
    pub management_endpoint: String,
    /// Azure AD authority
    pub authority_host: String,
}

/// Validated configuration for object storage
#[derive(Clone, PartialEq, Eq)]
pub struct StorageConfig {
    /// Storage account name
    pub account: String,
    /// Shared key (base64)
    pub access_key: String,
    /// Blob service endpoint
    pub blob_endpoint: String,
}

impl std::fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageConfig")
            .field("account", &self.account)
            .field("access_key", &"<redacted>")
            .field("blob_endpoint", &self.blob_endpoint)
            .finish()
    }
}

impl Settings {
    /// Built-in defaults, the lowest-precedence layer
    pub fn defaults() -> Self {
        Self {
            concurrency: Some(DEFAULT_CONCURRENCY),
            cdn: CdnSettings {
                max_batch_size: Some(DEFAULT_MAX_BATCH_SIZE),
                inter_batch_delay_secs: Some(DEFAULT_INTER_BATCH_DELAY_SECS),
                ..CdnSettings::default()
            },
            ..Self::default()
        }
    }

    /// Layer `higher` on top of `self`; values present in `higher` win
    pub fn overlay(self, higher: Settings) -> Settings {
        Settings {
            client_id: higher.client_id.or(self.client_id),
            subscription_id: higher.subscription_id.or(self.subscription_id),
            private_key: higher.private_key.or(self.private_key),
            tenant_id: higher.tenant_id.or(self.tenant_id),
            storage_account: higher.storage_account.or(self.storage_account),
            storage_access_key: higher.storage_access_key.or(self.storage_access_key),
            blob_endpoint: higher.blob_endpoint.or(self.blob_endpoint),
            concurrency: higher.concurrency.or(self.concurrency),
            cdn: self.cdn.overlay(higher.cdn),
        }
    }

    /// Walk concurrency, falling back to the default
    pub fn concurrency(&self) -> usize {
        self.concurrency.unwrap_or(DEFAULT_CONCURRENCY)
    }

    /// Validated CDN configuration, or every missing key
    pub fn require_cdn(&self) -> ConfigResult<CdnConfig> {
        let mut missing = Vec::new();
        let client_id = required(&self.client_id, "client_id", &mut missing);
        let subscription_id = required(&self.subscription_id, "subscription_id", &mut missing);
        let private_key = required(&self.private_key, "private_key", &mut missing);
        let tenant_id = required(&self.tenant_id, "tenant_id", &mut missing);
        let resource_group = required(&self.cdn.resource_group, "CDN.resource_group", &mut missing);
        let profile = required(&self.cdn.profile, "CDN.profile", &mut missing);
        let endpoint = required(&self.cdn.endpoint, "CDN.endpoint", &mut missing);

        if !missing.is_empty() {
            return Err(ConfigError::missing_required(missing));
        }

        let max_batch_size = self.cdn.max_batch_size.unwrap_or(DEFAULT_MAX_BATCH_SIZE);
        if max_batch_size == 0 {
            return Err(ConfigError::validation(
                "CDN.max_batch_size must be greater than 0",
            ));
        }

        Ok(CdnConfig {
            credentials: CdnCredentials {
                client_id,
                subscription_id,
                private_key,
                tenant_id,
            },
            target: PurgeTarget {
                resource_group,
                profile,
                endpoint,
            },
            max_batch_size,
            inter_batch_delay: Duration::from_secs(
                self.cdn
                    .inter_batch_delay_secs
                    .unwrap_or(DEFAULT_INTER_BATCH_DELAY_SECS),
            ),
            management_endpoint: self
                .cdn
                .management_endpoint
                .clone()
                .unwrap_or_else(|| DEFAULT_MANAGEMENT_ENDPOINT.to_string()),
            authority_host: self
                .cdn
                .authority_host
                .clone()
                .unwrap_or_else(|| DEFAULT_AUTHORITY_HOST.to_string()),
        })
    }

    /// Validated storage configuration, or every missing key
    pub fn require_storage(&self) -> ConfigResult<StorageConfig> {
        let mut missing = Vec::new();
        let account = required(&self.storage_account, "storage_account", &mut missing);
        let access_key = required(&self.storage_access_key, "storage_access_key", &mut missing);

        if !missing.is_empty() {
            return Err(ConfigError::missing_required(missing));
        }

        let blob_endpoint = self
            .blob_endpoint
            .clone()
            .unwrap_or_else(|| format!("https://{account}.blob.core.windows.net"));

        Ok(StorageConfig {
            account,
            access_key,
            blob_endpoint,
        })
    }
}

impl CdnSettings {
    fn overlay(self, higher: CdnSettings) -> CdnSettings {
        CdnSettings {
            resource_group: higher.resource_group.or(self.resource_group),
            profile: higher.profile.or(self.profile),
            endpoint: higher.endpoint.or(self.endpoint),
            max_batch_size: higher.max_batch_size.or(self.max_batch_size),
            inter_batch_delay_secs: higher.inter_batch_delay_secs.or(self.inter_batch_delay_secs),
            management_endpoint: higher.management_endpoint.or(self.management_endpoint),
            authority_host: higher.authority_host.or(self.authority_host),
        }
    }
}

// Blank values count as missing.
fn required(value: &Option<String>, key: &str, missing: &mut Vec<String>) -> String {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => {
            missing.push(key.to_string());
            String::new()
        }
    }
}
