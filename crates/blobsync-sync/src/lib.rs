//! Incremental directory-to-container synchronization for BlobSync
//!
//! This crate walks a local tree and uploads the files whose content differs
//! from the object store:
//!
//! - **Change detection**: MD5 content digests compared with stored `Content-MD5`
//! - **Upload**: content type guessed from the file name, digest attached
//! - **Tree walking**: newest-first batches pruned by a modification-time watermark
//! - **In-memory store**: an `ObjectStore` double for tests and dry runs
//!
//! # Examples
//!
//! ```rust
//! use blobsync_sync::{MemoryObjectStore, TreeWalker, WalkOptions};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(MemoryObjectStore::new("www"));
//! let walker = TreeWalker::new(store, "site", WalkOptions::default());
//! let report = walker.walk(None).await?;
//! println!("{} objects overwritten", report.changed_paths.len());
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod detector;
pub mod memory;
pub mod progress;
pub mod uploader;
pub mod walker;

pub use detector::{compute_digest, digest_bytes, ChangeDecision, ChangeDetector};
pub use memory::{MemoryObjectStore, StoredObject};
pub use progress::{ProgressReporter, WalkEvent};
pub use uploader::{content_type_for, Uploader};
pub use walker::{next_batch, Batch, BatchEnd, TreeWalker, WalkOptions, WalkReport, WalkStats};
