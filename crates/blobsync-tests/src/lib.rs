//! BlobSync integration test support
//!
//! Shared fixtures for the end-to-end tests under `tests/`.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Directory tree fixtures
pub mod test_utils;
