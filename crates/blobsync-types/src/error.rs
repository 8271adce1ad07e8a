//! Error types and handling for BlobSync
//!
//! Every stage of a run (configuration, tree walk, upload, cache purge) reports
//! failures through [`Error`]. The variants map onto the stages so the caller
//! can tell which one failed and which keys or paths were involved.

use std::path::PathBuf;
use std::time::Duration;

/// Main error type for BlobSync operations
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Local I/O operation failed
    #[error("I/O error: {message}")]
    Io {
        /// Error message from the I/O operation
        message: String,
    },

    /// Remote object does not exist
    #[error("Remote object not found: {path}")]
    NotFound {
        /// Container-relative path of the missing object
        path: String,
    },

    /// Network failure, throttling or a server-side error worth retrying
    #[error("Transient remote error: {message}")]
    TransientRemote {
        /// Error message describing the remote failure
        message: String,
        /// Minimum wait the service asked for before the next attempt
        retry_after: Option<Duration>,
    },

    /// Remote service rejected the request
    #[error("Remote error (status {status}): {message}")]
    Remote {
        /// HTTP status returned by the service
        status: u16,
        /// Error message describing the rejection
        message: String,
    },

    /// Remote service answered with something we cannot interpret
    #[error("Invalid remote response: {message}")]
    InvalidResponse {
        /// Description of the malformed part
        message: String,
    },

    /// One or more required configuration keys are absent
    #[error("Missing required configuration: {}", keys.join(", "))]
    MissingConfiguration {
        /// Every missing key, in declaration order
        keys: Vec<String>,
    },

    /// Configuration is present but unusable
    #[error("Configuration error: {message}")]
    Config {
        /// Error message describing the configuration issue
        message: String,
    },

    /// Processing of a single directory entry failed
    #[error("Failed to process '{}': {source}", path.display())]
    EntryProcessing {
        /// Local path of the entry
        path: PathBuf,
        /// Underlying failure
        source: Box<Error>,
    },

    /// A cache purge batch failed and the remaining batches were abandoned
    #[error(
        "Purge batch {batch_index} of {total_batches} failed after {completed_batches} completed: {message}"
    )]
    PurgeBatch {
        /// One-based index of the failing batch
        batch_index: usize,
        /// Number of batches acknowledged before the failure
        completed_batches: usize,
        /// Total number of batches in the sequence
        total_batches: usize,
        /// Error message describing the failure
        message: String,
    },

    /// Operation cancelled
    #[error("Operation cancelled")]
    Cancelled,

    /// Generic error with custom message
    #[error("{message}")]
    Other {
        /// Custom error message
        message: String,
    },
}

/// Error kind for categorizing errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Local I/O errors
    Io,
    /// Remote object absent
    NotFound,
    /// Retryable remote failures
    TransientRemote,
    /// Non-retryable remote failures
    Remote,
    /// Configuration errors
    Configuration,
    /// Per-entry walk failures
    EntryProcessing,
    /// Cache purge sequence failures
    PurgeBatch,
    /// Cancellation
    Cancelled,
    /// Other errors
    Other,
}

impl Error {
    /// Get the error kind
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io { .. } => ErrorKind::Io,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::TransientRemote { .. } => ErrorKind::TransientRemote,
            Self::Remote { .. } | Self::InvalidResponse { .. } => ErrorKind::Remote,
            Self::MissingConfiguration { .. } | Self::Config { .. } => ErrorKind::Configuration,
            Self::EntryProcessing { .. } => ErrorKind::EntryProcessing,
            Self::PurgeBatch { .. } => ErrorKind::PurgeBatch,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Other { .. } => ErrorKind::Other,
        }
    }

    /// Whether the collaborator layer should retry the failed call
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::TransientRemote { .. } => true,
            Self::EntryProcessing { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// Whether this is the expected "object absent" condition
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Human-readable name of the stage this error belongs to
    pub fn stage(&self) -> &'static str {
        match self.kind() {
            ErrorKind::Configuration => "configuration",
            ErrorKind::EntryProcessing | ErrorKind::Io => "directory sync",
            ErrorKind::NotFound | ErrorKind::TransientRemote | ErrorKind::Remote => {
                "object storage"
            }
            ErrorKind::PurgeBatch => "cache purge",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Other => "other",
        }
    }

    /// Wrap an error with the path of the entry that produced it
    pub fn for_entry(path: impl Into<PathBuf>, source: Error) -> Self {
        Self::EntryProcessing {
            path: path.into(),
            source: Box::new(source),
        }
    }

    /// Create a missing-configuration error
    pub fn missing_configuration<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::MissingConfiguration {
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new transient remote error
    pub fn transient<S: Into<String>>(message: S) -> Self {
        Self::TransientRemote {
            message: message.into(),
            retry_after: None,
        }
    }

    /// Transient error carrying the service's `Retry-After` hint
    pub fn throttled<S: Into<String>>(message: S, retry_after: Option<Duration>) -> Self {
        Self::TransientRemote {
            message: message.into(),
            retry_after,
        }
    }

    /// Wait requested by the service, if this is a throttled failure
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::TransientRemote { retry_after, .. } => *retry_after,
            Self::EntryProcessing { source, .. } => source.retry_after(),
            _ => None,
        }
    }

    /// Create a new invalid-response error
    pub fn invalid_response<S: Into<String>>(message: S) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }

    /// Create a new generic error
    pub fn other<S: Into<String>>(message: S) -> Self {
        Self::Other {
            message: message.into(),
        }
    }

    /// Classify a failed HTTP status; throttling and server errors are transient
    pub fn from_status<S: Into<String>>(status: u16, message: S) -> Self {
        let message = message.into();
        if status == 429 || (500..600).contains(&status) {
            Self::transient(format!("{message} (HTTP {status})"))
        } else {
            Self::Remote { status, message }
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Self::Io {
            message: error.to_string(),
        }
    }
}
