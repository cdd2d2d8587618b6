//! Composition root
//!
//! Builds the one `SyncOrchestrator` the commands share, wired to either the
//! local API server or the embedded ledger depending on `Config`.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use tracing::debug;

use crate::commands::with_recovery_hint;
use possync_core::{
    BearerToken, Config, ConnectivityMonitor, EntityRegistry, FileConfigStore, HttpLocalGateway,
    HttpRemoteConnector, LedgerGateway, LocalDataGateway, PendingLedger, SyncOrchestrator,
};

/// Session used when this process is the local store itself
const EMBEDDED_SESSION: &str = "embedded";

pub struct AppContext {
    pub config: Config,
    pub orchestrator: Arc<SyncOrchestrator>,
    /// Present when the embedded ledger is the local store
    pub ledger: Option<Arc<PendingLedger>>,
}

impl AppContext {
    /// Wire everything up and load persisted sync settings
    ///
    /// Needs a running tokio runtime when auto-sync is enabled.
    pub fn open(config: Config) -> Result<Self> {
        let registry = EntityRegistry::default();

        let (local, ledger, session) = match &config.local_api_url {
            Some(url) => {
                debug!("Using local API server at {}", url);
                let session = BearerToken::new(config.local_token.clone());
                let gateway = HttpLocalGateway::new(url, session.clone());
                (Arc::new(gateway) as Arc<dyn LocalDataGateway>, None, session)
            }
            None => {
                let path = config.ledger_path();
                debug!("Using embedded ledger at {:?}", path);
                let ledger = PendingLedger::open(&path).map_err(|e| {
                    anyhow!(with_recovery_hint(
                        format!("Failed to open ledger {:?}: {}", path, e),
                        e.recovery_suggestion()
                    ))
                })?;
                let ledger = Arc::new(ledger);
                let session = BearerToken::new(
                    config
                        .local_token
                        .clone()
                        .or_else(|| Some(EMBEDDED_SESSION.to_string())),
                );
                let gateway = LedgerGateway::new(ledger.clone(), registry.clone());
                (Arc::new(gateway) as Arc<dyn LocalDataGateway>, Some(ledger), session)
            }
        };

        let store = FileConfigStore::new(config.sync_config_path(), config.credential_path());
        let monitor = Arc::new(ConnectivityMonitor::new(session, true));

        let orchestrator = Arc::new(
            SyncOrchestrator::new(
                Arc::new(store),
                local,
                Arc::new(HttpRemoteConnector),
                monitor,
            )
            .with_registry(registry),
        );
        orchestrator.load_configuration();

        Ok(Self {
            config,
            orchestrator,
            ledger,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_config(temp_dir: &TempDir) -> Config {
        Config {
            data_dir: temp_dir.path().to_path_buf(),
            local_api_url: None,
            local_token: None,
            log_file: None,
        }
    }

    #[tokio::test]
    async fn test_embedded_store_is_signed_in() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = AppContext::open(test_config(&temp_dir)).unwrap();

        assert!(ctx.ledger.is_some());
        assert!(ctx.orchestrator.monitor().is_authenticated());
        assert!(!ctx.orchestrator.is_connected());
        assert!(temp_dir.path().join("ledger.db").exists());
    }

    #[tokio::test]
    async fn test_local_api_uses_configured_token() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config {
            local_api_url: Some("http://127.0.0.1:8000".to_string()),
            ..test_config(&temp_dir)
        };
        let ctx = AppContext::open(config).unwrap();

        assert!(ctx.ledger.is_none());
        assert!(!ctx.orchestrator.monitor().is_authenticated());
    }

    #[tokio::test]
    async fn test_unusable_data_dir_explains_recovery() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("not-a-dir");
        std::fs::write(&blocker, "").unwrap();
        let config = Config {
            data_dir: blocker.join("data"),
            ..test_config(&temp_dir)
        };

        let err = match AppContext::open(config) {
            Ok(_) => panic!("expected the ledger open to fail"),
            Err(e) => e.to_string(),
        };
        assert!(err.starts_with("Failed to open ledger"));
        assert!(err.contains("Check that the parent directory exists"));
    }
}
