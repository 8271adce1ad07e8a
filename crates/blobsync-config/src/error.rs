//! Error types for configuration management

use blobsync_types::Error as BlobsyncError;
use std::path::PathBuf;
use thiserror::Error;

/// Configuration error type
#[derive(Error, Debug)]
pub enum ConfigError {
    /// I/O error when reading or writing a configuration file
    #[error("I/O error on config file '{path}': {source}")]
    Io {
        /// Path to the configuration file
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// Configuration source could not be parsed
    #[error("Failed to parse configuration from {origin}: {message}")]
    Parse {
        /// Where the bad input came from
        origin: String,
        /// Error message
        message: String,
    },

    /// Configuration validation error
    #[error("Configuration validation failed: {message}")]
    Validation {
        /// Validation error message
        message: String,
    },

    /// Required keys are missing
    #[error("Missing required configuration: {}", keys.join(", "))]
    MissingRequired {
        /// Every missing key
        keys: Vec<String>,
    },

    /// Serialization error
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error message
        message: String,
    },
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(error: serde_yaml::Error) -> Self {
        Self::Serialization {
            message: error.to_string(),
        }
    }
}

impl From<ConfigError> for BlobsyncError {
    fn from(error: ConfigError) -> Self {
        match error {
            ConfigError::MissingRequired { keys } => BlobsyncError::MissingConfiguration { keys },
            other => BlobsyncError::config(other.to_string()),
        }
    }
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

impl ConfigError {
    /// Create a new validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a new missing required error
    pub fn missing_required(keys: Vec<String>) -> Self {
        Self::MissingRequired { keys }
    }

    /// Create a parse error for the given origin
    pub fn parse<O: Into<String>, M: ToString>(origin: O, message: M) -> Self {
        Self::Parse {
            origin: origin.into(),
            message: message.to_string(),
        }
    }

    /// Keys reported as missing, if this is a missing-key error
    pub fn missing_keys(&self) -> &[String] {
        match self {
            Self::MissingRequired { keys } => keys,
            _ => &[],
        }
    }
}
