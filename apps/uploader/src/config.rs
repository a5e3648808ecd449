//! Uploader configuration.
//!
//! Configuration is stored as TOML:
//! - Linux: `~/.config/partload/uploader.toml`
//! - Windows: `%APPDATA%/partload/uploader.toml`

use std::path::{Path, PathBuf};

use partload_upload::UploadSettings;
use serde::{Deserialize, Serialize};

/// Uploader configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Storage service API root.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// User the upload links are issued for.
    #[serde(default)]
    pub user_id: Option<String>,

    /// Bearer token for the storage service.
    #[serde(default)]
    pub api_token: Option<String>,

    /// Engine tuning.
    #[serde(default)]
    pub upload: UploadSettings,
}

fn default_base_url() -> String {
    "http://localhost:8080/v0".into()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_id: None,
            api_token: None,
            upload: UploadSettings::default(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from `path`, or the platform default location.
    ///
    /// A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => config_path(),
        };

        if !path.exists() {
            tracing::debug!(path = %path.display(), "no configuration file");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)?;
        let config: AppConfig = toml::from_str(&content)?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }
}

/// Returns the platform-specific configuration file path.
fn config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        PathBuf::from(appdata).join("partload").join("uploader.toml")
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home)
            .join(".config")
            .join("partload")
            .join("uploader.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn default_config() {
        let config = AppConfig::default();
        assert_eq!(config.base_url, "http://localhost:8080/v0");
        assert!(config.api_token.is_none());
        assert_eq!(config.upload.concurrency, 1);
    }

    #[test]
    fn partial_toml() {
        let toml_str = r#"
base_url = "https://storage.example/v0"
user_id = "17"

[upload]
concurrency = 4
poll_interval = 0.5
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.base_url, "https://storage.example/v0");
        assert_eq!(config.user_id.as_deref(), Some("17"));
        assert_eq!(config.upload.concurrency, 4);
        assert_eq!(config.upload.poll_interval, Duration::from_millis(500));
        assert!(config.upload.compute_checksum);
    }

    #[test]
    fn missing_file_gives_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let config = AppConfig::load(Some(&tmp.path().join("absent.toml"))).unwrap();
        assert_eq!(config.base_url, default_base_url());
    }

    #[test]
    fn load_from_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("uploader.toml");
        std::fs::write(&path, "api_token = \"t0k\"\n[upload]\nmax_poll_attempts = 30\n").unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.api_token.as_deref(), Some("t0k"));
        assert_eq!(config.upload.max_poll_attempts, Some(30));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("uploader.toml");
        std::fs::write(&path, "base_url = [").unwrap();
        assert!(AppConfig::load(Some(&path)).is_err());
    }

    #[test]
    fn config_path_not_empty() {
        assert!(config_path().to_string_lossy().contains("partload"));
    }
}
