//! Persistence for sync settings and the cloud credential
//!
//! The orchestrator only sees the `ConfigStore` trait, so the backing can be
//! a file, an embedded database or an OS keychain.
//!
//! ## Files
//!
//! `FileConfigStore` keeps the configuration as TOML (`sync.toml`) and the
//! credential as a bare token string (`credential`) in separate files. Both
//! are written atomically via a temporary file and rename.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::model::SyncConfiguration;
use crate::storage::{StorageError, StorageResult};

/// Storage for `SyncConfiguration` and the `SyncCredential` token
pub trait ConfigStore: Send + Sync {
    /// The saved configuration, or `None` on first run
    fn load_configuration(&self) -> StorageResult<Option<SyncConfiguration>>;

    fn save_configuration(&self, config: &SyncConfiguration) -> StorageResult<()>;

    /// The saved token, or `None` when logged out
    fn load_credential(&self) -> StorageResult<Option<String>>;

    fn save_credential(&self, token: &str) -> StorageResult<()>;

    /// Remove the saved token (no-op when none is saved)
    fn clear_credential(&self) -> StorageResult<()>;
}

/// File-backed `ConfigStore`
#[derive(Debug, Clone)]
pub struct FileConfigStore {
    config_path: PathBuf,
    credential_path: PathBuf,
}

impl FileConfigStore {
    pub fn new(config_path: PathBuf, credential_path: PathBuf) -> Self {
        Self {
            config_path,
            credential_path,
        }
    }

    /// Store both files in one directory
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join("sync.toml"), dir.join("credential"))
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn credential_path(&self) -> &Path {
        &self.credential_path
    }
}

impl ConfigStore for FileConfigStore {
    fn load_configuration(&self) -> StorageResult<Option<SyncConfiguration>> {
        let Some(content) = read_optional(&self.config_path)? else {
            return Ok(None);
        };

        toml::from_str(&content)
            .map(Some)
            .map_err(|e| StorageError::InvalidFormat {
                path: self.config_path.clone(),
                details: e.to_string(),
            })
    }

    fn save_configuration(&self, config: &SyncConfiguration) -> StorageResult<()> {
        let content = toml::to_string_pretty(config).map_err(|e| StorageError::InvalidFormat {
            path: self.config_path.clone(),
            details: e.to_string(),
        })?;
        write_atomic(&self.config_path, content.as_bytes())
    }

    fn load_credential(&self) -> StorageResult<Option<String>> {
        let token = read_optional(&self.credential_path)?
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        Ok(token)
    }

    fn save_credential(&self, token: &str) -> StorageResult<()> {
        write_atomic(&self.credential_path, token.trim().as_bytes())?;
        restrict_permissions(&self.credential_path)
    }

    fn clear_credential(&self) -> StorageResult<()> {
        match fs::remove_file(&self.credential_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::from_io(e, self.credential_path.clone())),
        }
    }
}

fn read_optional(path: &Path) -> StorageResult<Option<String>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StorageError::from_io(e, path.to_path_buf())),
    }
}

fn write_atomic(path: &Path, content: &[u8]) -> StorageResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| StorageError::CreateDirectory {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, content).map_err(|e| StorageError::from_io(e, tmp_path.clone()))?;
    fs::rename(&tmp_path, path).map_err(|e| StorageError::from_io(e, path.to_path_buf()))?;
    Ok(())
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> StorageResult<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
        .map_err(|e| StorageError::from_io(e, path.to_path_buf()))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> StorageResult<()> {
    Ok(())
}

/// In-process `ConfigStore`
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    config: Mutex<Option<SyncConfiguration>>,
    credential: Mutex<Option<String>>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_configuration(config: SyncConfiguration) -> Self {
        Self {
            config: Mutex::new(Some(config)),
            credential: Mutex::new(None),
        }
    }

    pub fn with_credential(self, token: &str) -> Self {
        *self.credential.lock().unwrap_or_else(|p| p.into_inner()) = Some(token.to_string());
        self
    }
}

impl ConfigStore for MemoryConfigStore {
    fn load_configuration(&self) -> StorageResult<Option<SyncConfiguration>> {
        Ok(self.config.lock().unwrap_or_else(|p| p.into_inner()).clone())
    }

    fn save_configuration(&self, config: &SyncConfiguration) -> StorageResult<()> {
        *self.config.lock().unwrap_or_else(|p| p.into_inner()) = Some(config.clone());
        Ok(())
    }

    fn load_credential(&self) -> StorageResult<Option<String>> {
        Ok(self.credential.lock().unwrap_or_else(|p| p.into_inner()).clone())
    }

    fn save_credential(&self, token: &str) -> StorageResult<()> {
        *self.credential.lock().unwrap_or_else(|p| p.into_inner()) = Some(token.to_string());
        Ok(())
    }

    fn clear_credential(&self) -> StorageResult<()> {
        *self.credential.lock().unwrap_or_else(|p| p.into_inner()) = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_config() -> SyncConfiguration {
        SyncConfiguration {
            cloud_url: "https://x.test".to_string(),
            enabled: true,
            auto_sync: true,
            sync_interval: 10,
        }
    }

    #[test]
    fn test_file_store_first_run_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileConfigStore::in_dir(temp_dir.path());

        assert!(store.load_configuration().unwrap().is_none());
        assert!(store.load_credential().unwrap().is_none());
    }

    #[test]
    fn test_file_store_configuration_persists() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileConfigStore::in_dir(&temp_dir.path().join("nested"));

        store.save_configuration(&sample_config()).unwrap();
        let content = fs::read_to_string(store.config_path()).unwrap();
        assert!(content.contains("cloudUrl"));
        assert!(content.contains("syncInterval"));

        let loaded = store.load_configuration().unwrap().unwrap();
        assert_eq!(loaded, sample_config());
    }

    #[test]
    fn test_file_store_overwrites_configuration() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileConfigStore::in_dir(temp_dir.path());

        store.save_configuration(&sample_config()).unwrap();
        let updated = SyncConfiguration {
            enabled: false,
            ..sample_config()
        };
        store.save_configuration(&updated).unwrap();

        assert_eq!(store.load_configuration().unwrap().unwrap(), updated);
    }

    #[test]
    fn test_file_store_rejects_corrupt_configuration() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileConfigStore::in_dir(temp_dir.path());
        fs::write(store.config_path(), "enabled = \"maybe\"").unwrap();

        let err = store.load_configuration().unwrap_err();
        assert!(matches!(err, StorageError::InvalidFormat { .. }));
    }

    #[test]
    fn test_file_store_credential_lifecycle() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileConfigStore::in_dir(temp_dir.path());

        store.save_credential("token-123\n").unwrap();
        assert_eq!(store.load_credential().unwrap().as_deref(), Some("token-123"));

        store.clear_credential().unwrap();
        assert!(store.load_credential().unwrap().is_none());

        // Clearing twice is fine
        store.clear_credential().unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_credential_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let store = FileConfigStore::in_dir(temp_dir.path());
        store.save_credential("secret").unwrap();

        let mode = fs::metadata(store.credential_path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryConfigStore::with_configuration(sample_config()).with_credential("t");
        assert_eq!(store.load_configuration().unwrap(), Some(sample_config()));
        assert_eq!(store.load_credential().unwrap().as_deref(), Some("t"));

        store.clear_credential().unwrap();
        assert!(store.load_credential().unwrap().is_none());
    }
}
