//! CDN cache invalidation for BlobSync
//!
//! After a sync run, objects that were overwritten may still be served from
//! CDN edge caches. This crate purges those paths:
//!
//! - **Batching**: paths are split into provider-sized batches
//! - **Pacing**: a fixed pause separates consecutive batches
//! - **Azure CDN**: purge requests through Resource Manager with a service principal
//!
//! # Examples
//!
//! ```rust
//! use blobsync_cdn::{CacheInvalidator, MemoryPurgeClient, PurgeBatchConfig};
//! use blobsync_types::PurgeTarget;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let target = PurgeTarget {
//!     resource_group: "web".into(),
//!     profile: "static".into(),
//!     endpoint: "edge".into(),
//! };
//! let invalidator = CacheInvalidator::new(
//!     Arc::new(MemoryPurgeClient::new()),
//!     PurgeBatchConfig::new(target),
//! );
//! let report = invalidator.purge(&["/www/index.html".to_string()]).await?;
//! assert_eq!(report.purged_paths(), 1);
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod azure;
pub mod invalidator;
pub mod memory;

pub use azure::{AzureCdnClient, CDN_API_VERSION};
pub use invalidator::{
    BatchOutcome, CacheInvalidator, PurgeBatchConfig, PurgeReport, PurgeState,
    DEFAULT_INTER_BATCH_DELAY, DEFAULT_MAX_BATCH_SIZE,
};
pub use memory::{MemoryPurgeClient, RecordedPurge};

use blobsync_config::CdnConfig;
use blobsync_types::Result;
use std::sync::Arc;

impl CacheInvalidator {
    /// Invalidator backed by Azure CDN, configured from validated settings
    pub fn azure(config: &CdnConfig) -> Result<Self> {
        Ok(Self::new(
            Arc::new(AzureCdnClient::new(config)?),
            PurgeBatchConfig::from(config),
        ))
    }
}
