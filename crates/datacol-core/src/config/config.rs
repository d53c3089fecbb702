//! CLI settings
//!
//! Settings are read from `config.toml` in the datacol root. A missing file
//! means defaults; every field is optional in the file.

use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use super::error::{ConfigError, Result};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Cloud backend used to provision and inspect stacks
    pub provider: ProviderKind,
    /// External cluster-exec tool used by `datacol run`
    pub exec_tool: String,
    /// Cloud SDK binary used by the gcp provider
    pub cloud_tool: String,
    /// Storage CLI used by the gcp provider for buckets
    pub storage_tool: String,
    /// Timeout for unary controller calls (log streams are never timed out)
    pub request_timeout_secs: u64,
    /// Username sent with the stack API key
    pub api_user: String,
}

/// Supported cloud backends
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Gcp,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Gcp,
            exec_tool: "kubectl".to_string(),
            cloud_tool: "gcloud".to_string(),
            storage_tool: "gsutil".to_string(),
            request_timeout_secs: 30,
            api_user: "datacol".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a specific path
    pub fn load_from_path(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(config_path).map_err(|e| ConfigError::LoadError {
            path: config_path.display().to_string(),
            source: e,
        })?;

        // Expand environment variables in the config content
        let expanded_content = Self::expand_env_vars(&content);

        let config: Config = toml::from_str(&expanded_content)?;

        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Expand environment variables in configuration content
    ///
    /// Supports ${VAR} and ${VAR:-default} syntax.
    ///
    /// Example:
    /// ```toml
    /// exec_tool = "${KUBECTL:-kubectl}"
    /// ```
    fn expand_env_vars(content: &str) -> String {
        // Unset variables are left as-is rather than failing the load
        let expanded =
            shellexpand::env_with_context_no_errors(content, |var| std::env::var(var).ok());
        expanded.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_default() {
        let config = Config::load_from_path(Path::new("/nonexistent/datacol/config.toml")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.exec_tool, "kubectl");
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "exec_tool = \"/usr/local/bin/kubectl\"\n").unwrap();

        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.exec_tool, "/usr/local/bin/kubectl");
        assert_eq!(config.cloud_tool, "gcloud");
        assert_eq!(config.provider, ProviderKind::Gcp);
    }

    #[test]
    #[serial]
    fn test_env_expansion_with_default() {
        unsafe {
            std::env::set_var("DATACOL_TEST_GCLOUD", "/opt/gcloud/bin/gcloud");
        }

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "cloud_tool = \"${DATACOL_TEST_GCLOUD}\"\nstorage_tool = \"${DATACOL_TEST_UNSET:-gsutil}\"\n",
        )
        .unwrap();

        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.cloud_tool, "/opt/gcloud/bin/gcloud");
        assert_eq!(config.storage_tool, "gsutil");

        unsafe {
            std::env::remove_var("DATACOL_TEST_GCLOUD");
        }
    }

    #[test]
    fn test_corrupt_file_is_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "provider = [[[").unwrap();

        let err = Config::load_from_path(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }
}
