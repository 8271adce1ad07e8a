//! Azure Blob Storage client for BlobSync
//!
//! Implements [`blobsync_types::ObjectStore`] over the Blob service REST API
//! with Shared Key authentication. Throttling and server errors are retried
//! with exponential backoff; a missing blob is reported as `NotFound`.

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod auth;
pub mod client;
pub mod retry;

pub use auth::SharedKeySigner;
pub use client::{AzureBlobStore, API_VERSION};
pub use retry::RetryPolicy;
