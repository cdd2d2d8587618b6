//! Application configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/possync/config.toml)
//! 3. Environment variables (POSSYNC_* prefix)
//!
//! Environment variables take precedence over config file values.
//!
//! This is the host's own configuration. The sync settings edited by the
//! user (`SyncConfiguration`) live in a separate file under `data_dir`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable prefix
const ENV_PREFIX: &str = "POSSYNC";

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Directory for the ledger, sync settings and credential
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Base URL of the local API server (e.g. http://127.0.0.1:8000/api/v1)
    ///
    /// When unset the embedded ledger acts as the local store.
    #[serde(default)]
    pub local_api_url: Option<String>,

    /// Session token for the local API server
    #[serde(default)]
    pub local_token: Option<String>,

    /// Write logs here instead of stderr
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            local_api_url: None,
            local_token: None,
            log_file: None,
        }
    }
}

impl Config {
    /// Load configuration from default location and environment
    ///
    /// Order of precedence (highest to lowest):
    /// 1. Environment variables (POSSYNC_DATA_DIR, POSSYNC_LOCAL_API_URL, POSSYNC_LOCAL_TOKEN)
    /// 2. Config file (~/.config/possync/config.toml or POSSYNC_CONFIG)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load from `--config` when given, otherwise from the default location
    pub fn load_with_cli_override(path: Option<&PathBuf>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => Self::load(),
        }
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config.ensure_data_dir()?;
        Ok(config)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var(format!("{}_DATA_DIR", ENV_PREFIX)) {
            self.data_dir = PathBuf::from(val);
        }

        // Empty string clears the optional values
        if let Ok(val) = std::env::var(format!("{}_LOCAL_API_URL", ENV_PREFIX)) {
            self.local_api_url = non_empty(val);
        }
        if let Ok(val) = std::env::var(format!("{}_LOCAL_TOKEN", ENV_PREFIX)) {
            self.local_token = non_empty(val);
        }
    }

    fn ensure_data_dir(&self) -> Result<()> {
        if !self.data_dir.exists() {
            std::fs::create_dir_all(&self.data_dir)
                .with_context(|| format!("Failed to create data directory: {:?}", self.data_dir))?;
        }
        Ok(())
    }

    /// Save configuration to the default file
    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::config_file_path())
    }

    /// Save configuration to a specific file
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;
        Ok(())
    }

    /// Get the config file path
    ///
    /// Can be overridden with POSSYNC_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = std::env::var(format!("{}_CONFIG", ENV_PREFIX)) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("possync")
            .join("config.toml")
    }

    /// SQLite pending ledger
    pub fn ledger_path(&self) -> PathBuf {
        self.data_dir.join("ledger.db")
    }

    /// Persisted `SyncConfiguration`
    pub fn sync_config_path(&self) -> PathBuf {
        self.data_dir.join("sync.toml")
    }

    /// Persisted cloud token
    pub fn credential_path(&self) -> PathBuf {
        self.data_dir.join("credential")
    }

    /// Whether the embedded ledger is the local store
    pub fn uses_embedded_store(&self) -> bool {
        self.local_api_url.is_none()
    }
}

fn non_empty(val: String) -> Option<String> {
    if val.trim().is_empty() {
        None
    } else {
        Some(val)
    }
}

/// Get the default data directory
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("possync")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;
    use tempfile::TempDir;

    // Mutex to serialize tests that touch environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Guard that locks env access and saves/restores env vars
    struct EnvGuard<'a> {
        _lock: std::sync::MutexGuard<'a, ()>,
        saved: Vec<(String, Option<String>)>,
    }

    impl<'a> EnvGuard<'a> {
        fn new(vars: &[&str]) -> Self {
            let lock = ENV_MUTEX.lock().unwrap_or_else(|p| p.into_inner());
            let saved = vars
                .iter()
                .map(|&name| (name.to_string(), env::var(name).ok()))
                .collect();
            for name in vars {
                env::remove_var(name);
            }
            Self { _lock: lock, saved }
        }
    }

    impl Drop for EnvGuard<'_> {
        fn drop(&mut self) {
            for (name, value) in &self.saved {
                match value {
                    Some(v) => env::set_var(name, v),
                    None => env::remove_var(name),
                }
            }
        }
    }

    const ENV_VARS: &[&str] = &[
        "POSSYNC_DATA_DIR",
        "POSSYNC_LOCAL_API_URL",
        "POSSYNC_LOCAL_TOKEN",
    ];

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.local_api_url.is_none());
        assert!(config.uses_embedded_store());
        assert!(config.data_dir.ends_with("possync"));
    }

    #[test]
    fn test_file_paths() {
        let config = Config {
            data_dir: PathBuf::from("/data/possync"),
            ..Config::default()
        };

        assert_eq!(config.ledger_path(), PathBuf::from("/data/possync/ledger.db"));
        assert!(config.sync_config_path().ends_with("sync.toml"));
        assert!(config.credential_path().ends_with("credential"));
    }

    #[test]
    fn test_env_override_data_dir() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();

        env::set_var("POSSYNC_DATA_DIR", "/tmp/possync-test");
        config.apply_env_overrides();

        assert_eq!(config.data_dir, PathBuf::from("/tmp/possync-test"));
    }

    #[test]
    fn test_env_override_local_api() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();

        env::set_var("POSSYNC_LOCAL_API_URL", "http://127.0.0.1:8000/api/v1");
        env::set_var("POSSYNC_LOCAL_TOKEN", "session");
        config.apply_env_overrides();
        assert_eq!(
            config.local_api_url.as_deref(),
            Some("http://127.0.0.1:8000/api/v1")
        );
        assert_eq!(config.local_token.as_deref(), Some("session"));
        assert!(!config.uses_embedded_store());

        // Empty string clears it
        env::set_var("POSSYNC_LOCAL_API_URL", "");
        config.apply_env_overrides();
        assert!(config.local_api_url.is_none());
    }

    #[test]
    fn test_load_from_str() {
        let _guard = EnvGuard::new(ENV_VARS);

        let toml = r#"
            data_dir = "/custom/data"
            local_api_url = "http://localhost:8000/api/v1"
            log_file = "/var/log/possync.log"
        "#;

        let config = Config::load_from_str(toml).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/custom/data"));
        assert_eq!(
            config.local_api_url.as_deref(),
            Some("http://localhost:8000/api/v1")
        );
        assert_eq!(config.log_file, Some(PathBuf::from("/var/log/possync.log")));
        assert!(config.local_token.is_none());
    }

    #[test]
    fn test_load_from_path_missing_file() {
        let _guard = EnvGuard::new(ENV_VARS);
        let temp_dir = TempDir::new().unwrap();
        env::set_var("POSSYNC_DATA_DIR", temp_dir.path().join("data"));

        let config = Config::load_from_path(&temp_dir.path().join("missing.toml")).unwrap();

        assert!(config.local_api_url.is_none());
        assert!(config.data_dir.exists());
    }

    #[test]
    fn test_save_and_reload() {
        let _guard = EnvGuard::new(ENV_VARS);
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("conf").join("config.toml");

        let config = Config {
            data_dir: temp_dir.path().join("data"),
            local_api_url: Some("http://127.0.0.1:8000/api/v1".to_string()),
            local_token: None,
            log_file: None,
        };
        config.save_to_path(&path).unwrap();

        let loaded = Config::load_from_path(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_from_path_rejects_bad_toml() {
        let _guard = EnvGuard::new(ENV_VARS);
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "data_dir = [").unwrap();

        assert!(Config::load_from_path(&path).is_err());
    }
}
