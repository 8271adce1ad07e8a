//! Newest-first directory walker with watermark pruning
//!
//! Each directory is listed, sorted by modification time (newest first) and
//! processed in bounded batches. After every batch the watermark advances to
//! the newest date that batch observed; once an entry older than the
//! watermark shows up the rest of the directory is pruned, because
//! everything after it is older still.

use crate::detector::ChangeDetector;
use crate::progress::{ProgressReporter, WalkEvent};
use crate::uploader::Uploader;
use blobsync_types::{
    relative_object_path, ChangedPathSet, DirEntry, Error, ObjectStore, Result, UploadResult,
};
use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Instant, SystemTime};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default number of entries processed concurrently per batch
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Walker options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkOptions {
    /// Maximum entries per batch, which is also the in-flight cap
    pub concurrency: usize,
    /// Ignore the watermark and evaluate every entry
    pub process_all: bool,
}

impl WalkOptions {
    /// Options that evaluate every entry regardless of age
    pub fn process_all() -> Self {
        Self {
            process_all: true,
            ..Self::default()
        }
    }

    /// Set the batch size
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            process_all: false,
        }
    }
}

/// Why batch formation stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchEnd {
    /// The batch reached its size limit and more entries remain
    Full,
    /// An entry older than the watermark was found; nothing after it is processed
    Pruned,
    /// The listing ran out of entries
    Exhausted,
}

impl BatchEnd {
    /// Whether another batch should be formed after this one
    pub const fn has_more(self) -> bool {
        matches!(self, Self::Full)
    }
}

/// Entries selected for one concurrent dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// Selected entries, newest first
    pub entries: Vec<DirEntry>,
    /// Why formation stopped
    pub end: BatchEnd,
}

/// Form the next batch from a newest-first listing
///
/// `cursor` is advanced past every entry consumed, hidden ones included, so
/// repeated calls walk the listing once.
pub fn next_batch(
    entries: &[DirEntry],
    cursor: &mut usize,
    limit: usize,
    watermark: Option<SystemTime>,
    process_all: bool,
) -> Batch {
    let limit = limit.max(1);
    let mut selected = Vec::with_capacity(limit.min(entries.len()));

    while let Some(entry) = entries.get(*cursor) {
        if entry.is_hidden() {
            *cursor += 1;
            continue;
        }
        if !process_all && watermark.is_some_and(|w| entry.modified_at < w) {
            return Batch {
                entries: selected,
                end: BatchEnd::Pruned,
            };
        }
        if selected.len() == limit {
            return Batch {
                entries: selected,
                end: BatchEnd::Full,
            };
        }
        selected.push(entry.clone());
        *cursor += 1;
    }

    Batch {
        entries: selected,
        end: BatchEnd::Exhausted,
    }
}

/// Counters accumulated over a walk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkStats {
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
    /// Batches dispatched
    pub batches: u64,
    /// Batch formations stopped by the watermark
    pub pruned: u64,
}

impl WalkStats {
    fn merge(&mut self, other: &Self) {
        self.files_checked += other.files_checked;
        self.files_uploaded += other.files_uploaded;
        self.files_created += other.files_created;
        self.files_unchanged += other.files_unchanged;
        self.directories_walked += other.directories_walked;
        self.batches += other.batches;
        self.pruned += other.pruned;
    }
}

/// Outcome of walking a directory tree
#[derive(Debug, Default)]
pub struct WalkReport {
    /// Newest date observed, never older than the watermark passed in
    pub watermark: Option<SystemTime>,
    /// Overwritten objects, relative to the walk root
    pub changed_paths: ChangedPathSet,
    /// Per-entry failures; siblings of a failed entry were still processed
    pub failures: Vec<Error>,
    /// Counters
    pub stats: WalkStats,
    /// Whether the walk stopped early on cancellation
    pub cancelled: bool,
}

impl WalkReport {
    /// Whether every entry was processed without error
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && !self.cancelled
    }

    fn absorb(&mut self, child: Self) {
        self.changed_paths.merge(child.changed_paths);
        self.failures.extend(child.failures);
        self.stats.merge(&child.stats);
        self.cancelled |= child.cancelled;
    }

    fn from_file(result: &UploadResult) -> Self {
        let mut report = Self {
            watermark: result.observed_date,
            ..Self::default()
        };
        report.stats.files_checked = 1;
        if result.changed {
            report.stats.files_uploaded = 1;
            match &result.uploaded_path {
                Some(path) => report.changed_paths.insert(path.clone()),
                None => report.stats.files_created = 1,
            }
        } else {
            report.stats.files_unchanged = 1;
        }
        report
    }

    fn from_failure(path: &Path, error: Error) -> Self {
        Self {
            failures: vec![Error::for_entry(path, error)],
            ..Self::default()
        }
    }
}

/// Walks a local tree and uploads whatever differs from the object store
pub struct TreeWalker {
    root: PathBuf,
    container: String,
    detector: ChangeDetector,
    uploader: Uploader,
    options: WalkOptions,
    cancel: CancellationToken,
    progress: ProgressReporter,
}

impl TreeWalker {
    /// Create a walker syncing `root` into `store`
    pub fn new(store: Arc<dyn ObjectStore>, root: impl Into<PathBuf>, options: WalkOptions) -> Self {
        Self {
            root: root.into(),
            container: store.container().to_string(),
            detector: ChangeDetector::new(store.clone()),
            uploader: Uploader::new(store),
            options,
            cancel: CancellationToken::new(),
            progress: ProgressReporter::disabled(),
        }
    }

    /// Stop at the next batch boundary once `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Send progress events to `reporter`
    pub fn with_progress(mut self, reporter: ProgressReporter) -> Self {
        self.progress = reporter;
        self
    }

    /// Walk the whole tree from the root
    ///
    /// A failure to list the root itself is returned as an error; every
    /// other failure lands in [`WalkReport::failures`].
    pub async fn walk(&self, watermark: Option<SystemTime>) -> Result<WalkReport> {
        let start = Instant::now();
        info!(
            "Syncing {} into container '{}'",
            self.root.display(),
            self.container
        );

        let report = self.walk_dir(self.root.clone(), watermark).await?;

        info!(
            "Walk finished in {:?}: {} checked, {} uploaded, {} unchanged, {} failed",
            start.elapsed(),
            report.stats.files_checked,
            report.stats.files_uploaded,
            report.stats.files_unchanged,
            report.failures.len()
        );
        Ok(report)
    }

    /// Walk one directory below the root
    pub fn walk_dir(
        &self,
        dir: PathBuf,
        watermark: Option<SystemTime>,
    ) -> BoxFuture<'_, Result<WalkReport>> {
        async move {
            self.progress.emit(WalkEvent::DirectoryEntered(dir.clone()));
            let (entries, listing_failures) = list_entries(&dir).await?;

            let mut report = WalkReport {
                watermark,
                failures: listing_failures,
                ..WalkReport::default()
            };
            report.stats.directories_walked = 1;

            let mut cursor = 0;
            loop {
                if self.cancel.is_cancelled() {
                    warn!("Walk of {} cancelled", dir.display());
                    report.cancelled = true;
                    break;
                }

                let batch = next_batch(
                    &entries,
                    &mut cursor,
                    self.options.concurrency,
                    report.watermark,
                    self.options.process_all,
                );
                debug!(
                    "Batch of {} in {} ({:?})",
                    batch.entries.len(),
                    dir.display(),
                    batch.end
                );

                if !batch.entries.is_empty() {
                    report.stats.batches += 1;
                    let current = report.watermark;
                    let results: Vec<WalkReport> = futures::stream::iter(batch.entries)
                        .map(|entry| self.process_entry(entry, current))
                        .buffer_unordered(self.options.concurrency.max(1))
                        .collect()
                        .await;

                    let observed = results.iter().filter_map(|r| r.watermark).max();
                    report.watermark = report.watermark.max(observed);
                    for result in results {
                        report.absorb(result);
                    }
                }

                if batch.end == BatchEnd::Pruned {
                    report.stats.pruned += 1;
                    debug!("Pruned remaining entries of {}", dir.display());
                }
                if !batch.end.has_more() {
                    break;
                }
            }

            Ok(report)
        }
        .boxed()
    }

    async fn process_entry(&self, entry: DirEntry, watermark: Option<SystemTime>) -> WalkReport {
        if entry.is_directory {
            return match self.walk_dir(entry.path.clone(), watermark).await {
                Ok(report) => report,
                Err(e) => self.failed(&entry.path, e),
            };
        }

        match self.process_file(&entry).await {
            Ok(result) => {
                if result.changed {
                    self.progress.emit(WalkEvent::FileUploaded(entry.path));
                } else {
                    self.progress.emit(WalkEvent::FileChecked(entry.path));
                }
                WalkReport::from_file(&result)
            }
            Err(e) => self.failed(&entry.path, e),
        }
    }

    async fn process_file(&self, entry: &DirEntry) -> Result<UploadResult> {
        let relative = relative_object_path(&self.root, &entry.path)?;
        let decision = self.detector.decide(&entry.path, &relative).await?;

        if !decision.should_upload {
            debug!("Unchanged: {}", relative);
            return Ok(UploadResult::unchanged(entry.modified_at));
        }

        self.uploader
            .upload(&entry.path, &relative, decision.local_digest)
            .await?;

        Ok(if decision.existed_remotely {
            UploadResult::updated(relative)
        } else {
            UploadResult::created()
        })
    }

    fn failed(&self, path: &Path, error: Error) -> WalkReport {
        warn!("Failed to process {}: {}", path.display(), error);
        self.progress.emit(WalkEvent::EntryFailed(path.to_path_buf()));
        WalkReport::from_failure(path, error)
    }
}

/// List `dir` newest first
///
/// Entries whose metadata cannot be read are returned as failures, except
/// hidden ones, which would be skipped anyway.
async fn list_entries(dir: &Path) -> Result<(Vec<DirEntry>, Vec<Error>)> {
    let listing_error = |e: std::io::Error| Error::Io {
        message: format!("Failed to list '{}': {}", dir.display(), e),
    };

    let mut read_dir = tokio::fs::read_dir(dir).await.map_err(listing_error)?;
    let mut entries = Vec::new();
    let mut failures = Vec::new();

    while let Some(item) = read_dir.next_entry().await.map_err(listing_error)? {
        let path = item.path();
        let metadata = tokio::fs::metadata(&path)
            .await
            .and_then(|m| Ok((m.modified()?, m.is_dir())));

        match metadata {
            Ok((modified_at, is_directory)) => {
                entries.push(DirEntry::new(path, modified_at, is_directory));
            }
            Err(_) if blobsync_types::is_hidden_name(&path) => {}
            Err(e) => failures.push(Error::for_entry(path, e.into())),
        }
    }

    entries.sort_by(|a, b| b.modified_at.cmp(&a.modified_at));
    Ok((entries, failures))
}
