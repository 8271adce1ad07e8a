//! Core type system and error handling for BlobSync
//!
//! This crate provides the foundational types shared by every BlobSync crate:
//!
//! - **Error handling**: one error taxonomy covering configuration, walk, upload and purge stages
//! - **Core types**: content digests, directory entries, upload outcomes and changed-path sets
//! - **Traits**: async collaborator seams for object storage and CDN purging
//!
//! # Examples
//!
//! ```rust
//! use blobsync_types::{ChangedPathSet, ContentDigest};
//!
//! let mut changed = ChangedPathSet::new();
//! changed.insert("css/site.css");
//! assert_eq!(changed.cache_paths("www"), vec!["/www/css/site.css".to_string()]);
//!
//! let digest = ContentDigest::from_base64("1B2M2Y8AsgTpgAmY7PhCfg==").unwrap();
//! assert_eq!(digest.as_bytes().len(), 16);
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod result;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use error::{Error, ErrorKind};
pub use result::Result;
pub use traits::*;
pub use types::*;
