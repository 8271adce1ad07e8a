//! Result type alias for BlobSync operations

use crate::Error;

/// Result type alias for BlobSync operations
pub type Result<T> = std::result::Result<T, Error>;
