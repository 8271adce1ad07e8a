//! Configuration loader utilities

use crate::{ConfigBuilder, ConfigError, ConfigResult, Settings};
use std::path::{Path, PathBuf};

/// File name of the per-user configuration in the home directory
pub const USER_CONFIG_FILE: &str = ".azure_upload.yml";

/// Prefix of the environment variables read by [`ConfigLoader::load`]
pub const ENV_PREFIX: &str = "BLOBSYNC";

const TEMPLATE: &str = "\
# Service principal used for CDN purges
client_id: \"\"
subscription_id: \"\"
private_key: \"\"
tenant_id: \"\"

# Storage account receiving the uploads
storage_account: \"\"
storage_access_key: \"\"

CDN:
  resource_group: \"\"
  profile: \"\"
  endpoint: \"\"
  max_batch_size: 50
  inter_batch_delay_secs: 180
";

/// Configuration loader with the standard source layout
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load settings for a run
    ///
    /// `config_path` replaces the user-home file when given (and must then
    /// exist). `overrides` are dotted in-process keys and `explicit` holds
    /// values supplied at the call site.
    pub fn load(
        config_path: Option<&Path>,
        overrides: &[(String, String)],
        explicit: Settings,
    ) -> ConfigResult<Settings> {
        let mut builder = ConfigBuilder::new().add_defaults();

        builder = match config_path {
            Some(path) => builder.add_source_file(path),
            None => match Self::user_config_path() {
                Some(path) => builder.add_optional_file(path),
                None => builder,
            },
        };

        builder = builder.add_azure_environment().add_env_prefix(ENV_PREFIX);

        for (key, value) in overrides {
            builder = builder.add_override(key.clone(), value.clone());
        }

        builder.with_explicit(explicit).build()
    }

    /// Load settings from a specific file only, on top of the defaults
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Settings> {
        ConfigBuilder::new()
            .add_defaults()
            .add_source_file(path)
            .build()
    }

    /// `~/.azure_upload.yml`, if a home directory can be determined
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(USER_CONFIG_FILE))
    }

    /// Save settings to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(settings: &Settings, path: P) -> ConfigResult<()> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(settings).map_err(|e| ConfigError::Serialization {
            message: format!("Failed to serialize to YAML: {}", e),
        })?;

        std::fs::write(path, content).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Write a commented template with every recognised key
    pub fn generate_template<P: AsRef<Path>>(path: P) -> ConfigResult<()> {
        let path = path.as_ref();
        std::fs::write(path, TEMPLATE).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_save_and_load_yaml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.yml");

        let mut original = Settings::defaults();
        original.client_id = Some("app".to_string());
        original.cdn.endpoint = Some("edge".to_string());
        ConfigLoader::save_to_file(&original, &config_path).unwrap();

        let loaded = ConfigLoader::load_from_file(&config_path).unwrap();
        assert_eq!(loaded.client_id.as_deref(), Some("app"));
        assert_eq!(loaded.cdn.endpoint.as_deref(), Some("edge"));
        assert_eq!(loaded.cdn.max_batch_size, Some(50));
    }

    #[test]
    fn test_generated_template_lists_every_missing_key() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("template.yml");

        ConfigLoader::generate_template(&config_path).unwrap();
        let settings = ConfigLoader::load_from_file(&config_path).unwrap();

        let error = settings.require_cdn().unwrap_err();
        assert_eq!(error.missing_keys().len(), 7);
        assert_eq!(settings.cdn.inter_batch_delay_secs, Some(180));
    }

    #[test]
    fn test_load_with_explicit_file_and_arguments() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.yml");
        std::fs::write(
            &config_path,
            "client_id: app\nCDN:\n  profile: from-file\n  endpoint: from-file\n",
        )
        .unwrap();

        let mut explicit = Settings::default();
        explicit.cdn.endpoint = Some("from-cli".to_string());

        let settings = ConfigLoader::load(
            Some(&config_path),
            &[("tenant_id".to_string(), "from-override".to_string())],
            explicit,
        )
        .unwrap();

        assert_eq!(settings.client_id.as_deref(), Some("app"));
        assert_eq!(settings.tenant_id.as_deref(), Some("from-override"));
        assert_eq!(settings.cdn.profile.as_deref(), Some("from-file"));
        assert_eq!(settings.cdn.endpoint.as_deref(), Some("from-cli"));
    }
}
