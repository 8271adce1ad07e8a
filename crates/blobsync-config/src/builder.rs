//! Configuration builder resolving an ordered list of sources

use crate::{ConfigError, ConfigResult, Settings};
use config::{Environment, File, FileFormat};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Configuration builder for loading settings from multiple sources
///
/// Sources may be added in any order; they are always resolved by
/// precedence: defaults, files, environment, in-process overrides, then
/// explicit call-site values.
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    sources: Vec<ConfigSource>,
    overrides: BTreeMap<String, String>,
    explicit: Option<Settings>,
    env_separator: Option<String>,
}

#[derive(Debug, Clone)]
enum ConfigSource {
    Defaults,
    File { path: PathBuf, required: bool },
    AzureEnvironment,
    Environment { prefix: String },
}

impl ConfigSource {
    fn rank(&self) -> u8 {
        match self {
            Self::Defaults => 0,
            Self::File { .. } => 1,
            Self::AzureEnvironment | Self::Environment { .. } => 2,
        }
    }
}

impl ConfigBuilder {
    /// Create a new configuration builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Add built-in default values
    pub fn add_defaults(mut self) -> Self {
        self.sources.push(ConfigSource::Defaults);
        self
    }

    /// Add a YAML file that must exist
    pub fn add_source_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.sources.push(ConfigSource::File {
            path: path.as_ref().to_path_buf(),
            required: true,
        });
        self
    }

    /// Add a YAML file that is skipped when absent
    pub fn add_optional_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.sources.push(ConfigSource::File {
            path: path.as_ref().to_path_buf(),
            required: false,
        });
        self
    }

    /// Read `AZURE_STORAGE_ACCOUNT` and `AZURE_STORAGE_ACCESS_KEY`
    pub fn add_azure_environment(mut self) -> Self {
        self.sources.push(ConfigSource::AzureEnvironment);
        self
    }

    /// Add environment variables with `prefix`, e.g. `BLOBSYNC_CDN__PROFILE`
    pub fn add_env_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.sources.push(ConfigSource::Environment {
            prefix: prefix.into(),
        });
        self
    }

    /// Set environment variable separator (default: "__")
    pub fn env_separator<S: Into<String>>(mut self, separator: S) -> Self {
        self.env_separator = Some(separator.into());
        self
    }

    /// Add an in-process override for a dotted key such as `cdn.profile`
    pub fn add_override<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.overrides.insert(key.into(), value.into());
        self
    }

    /// Set values passed explicitly by the caller; they beat every other source
    pub fn with_explicit(mut self, explicit: Settings) -> Self {
        self.explicit = Some(match self.explicit.take() {
            Some(previous) => previous.overlay(explicit),
            None => explicit,
        });
        self
    }

    /// Resolve every source and merge them by precedence
    pub fn build(mut self) -> ConfigResult<Settings> {
        self.sources.sort_by_key(ConfigSource::rank);
        let separator = self.env_separator.as_deref().unwrap_or("__");

        let mut merged = Settings::default();
        for source in &self.sources {
            let layer = match source {
                ConfigSource::Defaults => Settings::defaults(),
                ConfigSource::File { path, required } => {
                    if !*required && !path.exists() {
                        debug!("Skipping absent config file {}", path.display());
                        continue;
                    }
                    Self::load_file(path)?
                }
                ConfigSource::AzureEnvironment => Self::load_azure_environment(),
                ConfigSource::Environment { prefix } => Self::load_environment(prefix, separator)?,
            };
            merged = merged.overlay(layer);
        }

        if !self.overrides.is_empty() {
            merged = merged.overlay(Self::load_overrides(&self.overrides)?);
        }
        if let Some(explicit) = self.explicit {
            merged = merged.overlay(explicit);
        }

        Self::validate(&merged)?;
        Ok(merged)
    }

    fn load_file(path: &Path) -> ConfigResult<Settings> {
        if !path.exists() {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "Configuration file not found",
                ),
            });
        }

        debug!("Loading config file {}", path.display());
        let origin = path.display().to_string();
        config::Config::builder()
            .add_source(File::from(path.to_path_buf()).format(FileFormat::Yaml))
            .build()
            .and_then(|c| c.try_deserialize::<Settings>())
            .map_err(|e| ConfigError::parse(origin, e))
    }

    fn load_environment(prefix: &str, separator: &str) -> ConfigResult<Settings> {
        config::Config::builder()
            .add_source(
                Environment::with_prefix(prefix)
                    .prefix_separator("_")
                    .separator(separator),
            )
            .build()
            .and_then(|c| c.try_deserialize::<Settings>())
            .map_err(|e| ConfigError::parse(format!("environment ({prefix}_*)"), e))
    }

    fn load_azure_environment() -> Settings {
        Settings {
            storage_account: std::env::var("AZURE_STORAGE_ACCOUNT").ok(),
            storage_access_key: std::env::var("AZURE_STORAGE_ACCESS_KEY").ok(),
            ..Settings::default()
        }
    }

    fn load_overrides(overrides: &BTreeMap<String, String>) -> ConfigResult<Settings> {
        let mut builder = config::Config::builder();
        for (key, value) in overrides {
            builder = builder
                .set_override(key.as_str(), value.as_str())
                .map_err(|e| ConfigError::parse("overrides", e))?;
        }
        builder
            .build()
            .and_then(|c| c.try_deserialize::<Settings>())
            .map_err(|e| ConfigError::parse("overrides", e))
    }

    fn validate(settings: &Settings) -> ConfigResult<()> {
        if settings.concurrency == Some(0) {
            return Err(ConfigError::validation("concurrency must be greater than 0"));
        }
        if settings.cdn.max_batch_size == Some(0) {
            return Err(ConfigError::validation(
                "CDN.max_batch_size must be greater than 0",
            ));
        }
        Ok(())
    }
}
