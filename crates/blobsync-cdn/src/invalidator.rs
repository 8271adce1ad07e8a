//! Batched CDN cache invalidation
//!
//! Purge requests are rate limited by the provider, so paths are submitted
//! in fixed-size batches with a pause between consecutive batches. A failed
//! batch stops the sequence; the error names the batch and how many were
//! already acknowledged.

use blobsync_config::CdnConfig;
use blobsync_types::{Error, PurgeClient, PurgeStatus, PurgeTarget, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default maximum number of paths per purge request
pub const DEFAULT_MAX_BATCH_SIZE: usize = 50;

/// Default pause between consecutive purge requests
pub const DEFAULT_INTER_BATCH_DELAY: Duration = Duration::from_secs(180);

/// Batch parameters of a purge sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurgeBatchConfig {
    /// Endpoint to purge
    pub target: PurgeTarget,
    /// Maximum paths per request
    pub max_batch_size: usize,
    /// Pause after every batch but the last
    pub inter_batch_delay: Duration,
}

impl PurgeBatchConfig {
    /// Default batching for `target`
    pub fn new(target: PurgeTarget) -> Self {
        Self {
            target,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            inter_batch_delay: DEFAULT_INTER_BATCH_DELAY,
        }
    }

    /// Set the batch size
    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size;
        self
    }

    /// Set the pause between batches
    pub fn with_inter_batch_delay(mut self, delay: Duration) -> Self {
        self.inter_batch_delay = delay;
        self
    }
}

impl From<&CdnConfig> for PurgeBatchConfig {
    fn from(config: &CdnConfig) -> Self {
        Self {
            target: config.target.clone(),
            max_batch_size: config.max_batch_size,
            inter_batch_delay: config.inter_batch_delay,
        }
    }
}

/// Progress of a purge sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurgeState {
    /// Nothing submitted yet
    Idle,
    /// Submitting batch `batch` (one-based)
    Dispatching {
        /// Batch being submitted
        batch: usize,
    },
    /// Batch `batch` acknowledged, pausing before the next one
    Waiting {
        /// Last acknowledged batch
        batch: usize,
    },
    /// Sequence finished or stopped
    Done,
}

/// One acknowledged batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOutcome {
    /// One-based batch index
    pub batch_index: usize,
    /// Paths in the batch
    pub path_count: usize,
    /// Status reported by the provider
    pub status_code: u16,
}

/// Result of a purge sequence
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PurgeReport {
    /// Acknowledged batches, in order
    pub batches: Vec<BatchOutcome>,
    /// Number of batches the paths were split into
    pub total_batches: usize,
    /// Whether the sequence stopped early on cancellation
    pub cancelled: bool,
}

impl PurgeReport {
    /// Number of paths in acknowledged batches
    pub fn purged_paths(&self) -> usize {
        self.batches.iter().map(|b| b.path_count).sum()
    }

    /// Whether every batch was acknowledged
    pub fn is_complete(&self) -> bool {
        !self.cancelled && self.batches.len() == self.total_batches
    }
}

/// Submits purge batches one after another
pub struct CacheInvalidator {
    client: Arc<dyn PurgeClient>,
    config: PurgeBatchConfig,
    cancel: CancellationToken,
}

impl CacheInvalidator {
    /// Create an invalidator using `client`
    pub fn new(client: Arc<dyn PurgeClient>, config: PurgeBatchConfig) -> Self {
        Self {
            client,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop before the next batch once `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Batch parameters
    pub fn config(&self) -> &PurgeBatchConfig {
        &self.config
    }

    /// Purge `paths`, at most `max_batch_size` per request
    pub async fn purge(&self, paths: &[String]) -> Result<PurgeReport> {
        if paths.is_empty() {
            info!("No paths to purge");
            return Ok(PurgeReport::default());
        }

        let chunks: Vec<&[String]> = paths.chunks(self.config.max_batch_size.max(1)).collect();
        let total_batches = chunks.len();
        let target = &self.config.target;
        info!(
            "Purging {} paths from {}/{}/{} in {} batch(es)",
            paths.len(),
            target.resource_group,
            target.profile,
            target.endpoint,
            total_batches
        );

        let mut report = PurgeReport {
            total_batches,
            ..PurgeReport::default()
        };
        let mut state = PurgeState::Idle;

        for (i, chunk) in chunks.into_iter().enumerate() {
            let batch_index = i + 1;
            if self.cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            state = transition(state, PurgeState::Dispatching { batch: batch_index });
            let status = self
                .purge_batch(chunk)
                .await
                .map_err(|e| Error::PurgeBatch {
                    batch_index,
                    completed_batches: i,
                    total_batches,
                    message: e.to_string(),
                })?;

            info!(
                "Purge batch {}/{} ({} paths) completed with status {}",
                batch_index,
                total_batches,
                chunk.len(),
                status.status_code
            );
            report.batches.push(BatchOutcome {
                batch_index,
                path_count: chunk.len(),
                status_code: status.status_code,
            });

            if batch_index < total_batches {
                state = transition(state, PurgeState::Waiting { batch: batch_index });
                info!(
                    "Waiting {:?} before purge batch {}",
                    self.config.inter_batch_delay,
                    batch_index + 1
                );
                tokio::select! {
                    () = tokio::time::sleep(self.config.inter_batch_delay) => {}
                    () = self.cancel.cancelled() => {
                        report.cancelled = true;
                        break;
                    }
                }
            }
        }

        if report.cancelled {
            warn!(
                "Purge cancelled after {} of {} batches",
                report.batches.len(),
                total_batches
            );
        }
        transition(state, PurgeState::Done);
        Ok(report)
    }

    async fn purge_batch(&self, paths: &[String]) -> Result<PurgeStatus> {
        let handle = self.client.begin_purge(&self.config.target, paths).await?;
        handle.wait().await
    }
}

fn transition(from: PurgeState, to: PurgeState) -> PurgeState {
    debug!("Purge state {:?} -> {:?}", from, to);
    to
}
