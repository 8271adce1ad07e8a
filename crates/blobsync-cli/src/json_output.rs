//! JSON output structures for the BlobSync CLI

use crate::display::format_timestamp;
use blobsync_cdn::PurgeReport;
use blobsync_sync::WalkReport;
use blobsync_types::Error;
use serde::Serialize;
use std::path::Path;
use std::time::Duration;

/// Complete JSON output for an upload run
#[derive(Debug, Serialize)]
pub struct RunSummaryJson {
    /// Run metadata
    pub metadata: RunMetadata,
    /// Walk counters
    pub sync: SyncStatsJson,
    /// Overwritten objects, relative to the container
    pub changed_paths: Vec<String>,
    /// Per-entry failures
    pub failures: Vec<FailureJson>,
    /// Cache purge outcome, when a purge ran
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purge: Option<PurgeJson>,
    /// Overall result
    pub result: RunResult,
}

/// Run metadata
#[derive(Debug, Serialize)]
pub struct RunMetadata {
    /// BlobSync version
    pub version: String,
    /// Destination container
    pub container: String,
    /// Local source directory
    pub source: String,
    /// Timestamp when the run finished
    pub timestamp: String,
}

/// Walk counters in JSON format
#[derive(Debug, Serialize)]
pub struct SyncStatsJson {
    /// Files compared against the object store
    pub files_checked: u64,
    /// Files transferred
    pub files_uploaded: u64,
    /// Transfers that created a new object
    pub files_created: u64,
    /// Files identical to their remote counterpart
    pub files_unchanged: u64,
    /// Directories listed
    pub directories_walked: u64,
    /// Newest modification time observed
    pub watermark: Option<String>,
    /// Walk duration in seconds
    pub duration_secs: f64,
    /// Whether the walk was cancelled
    pub cancelled: bool,
}

/// One failure in JSON format
#[derive(Debug, Serialize)]
pub struct FailureJson {
    /// Stage the failure belongs to
    pub stage: String,
    /// Error message
    pub message: String,
}

/// Purge outcome in JSON format
#[derive(Debug, Serialize)]
pub struct PurgeJson {
    /// Number of batches the paths were split into
    pub total_batches: usize,
    /// Acknowledged batches
    pub completed_batches: usize,
    /// Paths in acknowledged batches
    pub purged_paths: usize,
    /// Whether the purge was cancelled
    pub cancelled: bool,
}

/// Overall result
#[derive(Debug, Serialize)]
pub struct RunResult {
    /// Whether every stage finished cleanly
    pub success: bool,
    /// First stage that failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<String>,
}

impl RunSummaryJson {
    /// Build the summary of a finished run
    pub fn new(
        container: &str,
        source: &Path,
        walk: &WalkReport,
        elapsed: Duration,
        purge: Option<&PurgeReport>,
        purge_error: Option<&Error>,
    ) -> Self {
        let mut failures: Vec<FailureJson> = walk.failures.iter().map(FailureJson::from).collect();
        if let Some(error) = purge_error {
            failures.push(FailureJson::from(error));
        }

        let failed_stage = failures.first().map(|f| f.stage.clone()).or_else(|| {
            let cancelled = walk.cancelled || purge.is_some_and(|p| p.cancelled);
            cancelled.then(|| "cancelled".to_string())
        });

        Self {
            metadata: RunMetadata {
                version: env!("CARGO_PKG_VERSION").to_string(),
                container: container.to_string(),
                source: source.display().to_string(),
                timestamp: chrono::Utc::now().to_rfc3339(),
            },
            sync: SyncStatsJson {
                files_checked: walk.stats.files_checked,
                files_uploaded: walk.stats.files_uploaded,
                files_created: walk.stats.files_created,
                files_unchanged: walk.stats.files_unchanged,
                directories_walked: walk.stats.directories_walked,
                watermark: walk.watermark.map(format_timestamp),
                duration_secs: elapsed.as_secs_f64(),
                cancelled: walk.cancelled,
            },
            changed_paths: walk.changed_paths.iter().map(str::to_string).collect(),
            failures,
            purge: purge.map(|report| PurgeJson {
                total_batches: report.total_batches,
                completed_batches: report.batches.len(),
                purged_paths: report.purged_paths(),
                cancelled: report.cancelled,
            }),
            result: RunResult {
                success: failed_stage.is_none(),
                failed_stage,
            },
        }
    }
}

impl From<&Error> for FailureJson {
    fn from(error: &Error) -> Self {
        Self {
            stage: error.stage().to_string(),
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blobsync_types::ChangedPathSet;

    fn walk_report() -> WalkReport {
        let mut changed = ChangedPathSet::new();
        changed.insert("index.html");
        WalkReport {
            changed_paths: changed,
            ..WalkReport::default()
        }
    }

    #[test]
    fn test_clean_run() {
        let summary = RunSummaryJson::new(
            "www",
            Path::new("site"),
            &walk_report(),
            Duration::from_secs(1),
            None,
            None,
        );
        let json = serde_json::to_value(&summary).unwrap();

        assert_eq!(json["result"]["success"], true);
        assert_eq!(json["changed_paths"][0], "index.html");
        assert!(json.get("purge").is_none());
    }

    #[test]
    fn test_failed_purge_names_stage() {
        let error = Error::PurgeBatch {
            batch_index: 2,
            completed_batches: 1,
            total_batches: 3,
            message: "rejected".to_string(),
        };
        let summary = RunSummaryJson::new(
            "www",
            Path::new("site"),
            &walk_report(),
            Duration::from_secs(1),
            None,
            Some(&error),
        );

        assert!(!summary.result.success);
        assert_eq!(summary.result.failed_stage.as_deref(), Some("cache purge"));
    }
}
