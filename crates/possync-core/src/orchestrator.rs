//! Sync orchestrator
//!
//! Owns the sync configuration, the cloud credential and the auto-sync
//! timer, and drives one full bidirectional sync cycle at a time.
//!
//! ## Cycle
//!
//! For each tracked entity type, in registry order:
//! 1. Upload: local unsynced batch -> remote `/sync/upload`, then drain the
//!    uploaded records from the local pending set
//! 2. Download: remote batch -> local apply
//!
//! A failure in one entity type's phase is recorded as `"<entity>: <message>"`
//! and never stops the other phases or entity types. `full_sync` never fails;
//! everything ends up in the returned `SyncResult`.
//!
//! ## Concurrency
//!
//! At most one cycle runs at any instant. A second caller (manual trigger or
//! timer tick) is rejected immediately with "sync already in progress"; calls
//! are never queued. Nothing here retries: a failed entity type is simply
//! retried with the next cycle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::entity::{EntityBatch, EntityRegistry, EntityType};
use crate::error::{GatewayResult, Result, SyncError};
use crate::gateway::{LocalDataGateway, RemoteConnector, RemoteDataGateway};
use crate::model::{
    ConnectionTestResult, SyncConfiguration, SyncResult, SyncStatusSnapshot,
    MAX_SYNC_INTERVAL_MINUTES,
};
use crate::monitor::{ConnectivityMonitor, Transition};
use crate::store::ConfigStore;

/// Settings state, mutated only by configuration and login/logout calls
#[derive(Default)]
struct Settings {
    config: SyncConfiguration,
    credential: Option<String>,
    remote: Option<Arc<dyn RemoteDataGateway>>,
    remote_url: Option<String>,
}

struct AutoSyncTimer {
    handle: JoinHandle<()>,
    period: Duration,
}

/// Clears the in-progress flag on every exit path, including cancellation
struct CycleGuard<'a>(&'a AtomicBool);

impl<'a> CycleGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Coordinates bidirectional sync between the local store and the cloud
pub struct SyncOrchestrator {
    store: Arc<dyn ConfigStore>,
    local: Arc<dyn LocalDataGateway>,
    connector: Arc<dyn RemoteConnector>,
    monitor: Arc<ConnectivityMonitor>,
    registry: EntityRegistry,
    settings: RwLock<Settings>,
    in_progress: AtomicBool,
    timer: Mutex<Option<AutoSyncTimer>>,
    last_result: RwLock<Option<SyncResult>>,
}

impl SyncOrchestrator {
    /// Create an orchestrator with default settings
    ///
    /// Call `load_configuration` to pick up persisted settings.
    pub fn new(
        store: Arc<dyn ConfigStore>,
        local: Arc<dyn LocalDataGateway>,
        connector: Arc<dyn RemoteConnector>,
        monitor: Arc<ConnectivityMonitor>,
    ) -> Self {
        Self {
            store,
            local,
            connector,
            monitor,
            registry: EntityRegistry::default(),
            settings: RwLock::new(Settings::default()),
            in_progress: AtomicBool::new(false),
            timer: Mutex::new(None),
            last_result: RwLock::new(None),
        }
    }

    /// Replace the tracked entity types
    pub fn with_registry(mut self, registry: EntityRegistry) -> Self {
        self.registry = registry;
        self
    }

    fn settings(&self) -> RwLockReadGuard<'_, Settings> {
        self.settings.read().unwrap_or_else(|p| p.into_inner())
    }

    fn settings_mut(&self) -> RwLockWriteGuard<'_, Settings> {
        self.settings.write().unwrap_or_else(|p| p.into_inner())
    }

    // ==================== Configuration ====================

    /// Load persisted settings, falling back to defaults
    ///
    /// Never fails: unreadable settings are logged and replaced by defaults
    /// so sync can never break startup.
    pub fn load_configuration(self: &Arc<Self>) -> SyncConfiguration {
        let config = match self.store.load_configuration() {
            Ok(Some(config)) => config,
            Ok(None) => {
                debug!("No saved sync configuration, using defaults");
                SyncConfiguration::default()
            }
            Err(e) => {
                warn!("Failed to load sync configuration, using defaults: {}", e);
                SyncConfiguration::default()
            }
        };

        let config = match config.validate() {
            Ok(()) => config,
            Err(e) => {
                warn!("Ignoring invalid sync configuration ({}), using defaults", e);
                SyncConfiguration::default()
            }
        };

        let credential = self.store.load_credential().unwrap_or_else(|e| {
            warn!("Failed to load sync credential: {}", e);
            None
        });
        self.settings_mut().credential = credential;

        self.apply_configuration(config.clone());
        config
    }

    /// Persist new settings and bring the remote gateway and timer in line
    ///
    /// Saving the same configuration twice leaves the same end state.
    pub fn save_configuration(self: &Arc<Self>, config: SyncConfiguration) -> Result<()> {
        config.validate()?;
        self.store.save_configuration(&config)?;
        info!(
            "Saved sync configuration (enabled={}, auto_sync={}, interval={}m)",
            config.enabled, config.auto_sync, config.sync_interval
        );
        self.apply_configuration(config);
        Ok(())
    }

    fn apply_configuration(self: &Arc<Self>, config: SyncConfiguration) {
        {
            let mut settings = self.settings_mut();

            if config.is_configured() {
                let url = config.normalized_url();
                let same_endpoint = settings.remote_url.as_deref() == Some(url.as_str());
                if settings.remote.is_none() || !same_endpoint {
                    debug!("Initializing remote gateway for {}", url);
                    settings.remote = Some(self.connector.connect(&url));
                    settings.remote_url = Some(url);
                }
            } else if settings.remote.take().is_some() {
                debug!("Sync disabled, remote gateway torn down");
                settings.remote_url = None;
            }

            if let Some(remote) = &settings.remote {
                remote.set_token(settings.credential.clone());
            }

            settings.config = config.clone();
        }

        if !config.auto_sync {
            self.stop_auto_sync();
        } else if self.armed_period() != Some(interval_of(&config)) {
            self.start_auto_sync();
        }
    }

    /// Current settings
    pub fn configuration(&self) -> SyncConfiguration {
        self.settings().config.clone()
    }

    /// Tracked entity types
    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    // ==================== Connection & session ====================

    /// Check a URL without touching stored settings
    pub async fn test_connection(&self, url: &str) -> ConnectionTestResult {
        let candidate = SyncConfiguration {
            cloud_url: url.to_string(),
            enabled: true,
            ..SyncConfiguration::default()
        };
        if let Err(e) = candidate.validate() {
            return ConnectionTestResult {
                success: false,
                message: e.to_string(),
            };
        }

        let gateway = self.connector.connect(&candidate.normalized_url());
        match gateway.health_check().await {
            Ok(true) => ConnectionTestResult {
                success: true,
                message: "Connection successful".to_string(),
            },
            Ok(false) => ConnectionTestResult {
                success: false,
                message: "Server responded but reported itself unhealthy".to_string(),
            },
            Err(e) => ConnectionTestResult {
                success: false,
                message: format!("Connection failed: {}", e),
            },
        }
    }

    /// Authenticate against the cloud and keep the token
    pub async fn login(&self, identifier: &str, secret: &str) -> Result<()> {
        let remote = self.settings().remote.clone().ok_or_else(SyncError::not_configured)?;

        let token = remote
            .login(identifier, secret)
            .await
            .map_err(|e| SyncError::Authentication(e.message))?;

        self.store.save_credential(&token)?;
        remote.set_token(Some(token.clone()));
        self.settings_mut().credential = Some(token);

        info!("Logged in to {}", remote.base_url());
        Ok(())
    }

    /// Forget the cloud token
    ///
    /// Always succeeds locally; a storage failure is only logged.
    pub fn logout(&self) {
        if let Err(e) = self.store.clear_credential() {
            warn!("Failed to remove saved credential: {}", e);
        }

        let mut settings = self.settings_mut();
        settings.credential = None;
        if let Some(remote) = &settings.remote {
            remote.set_token(None);
        }
        info!("Logged out");
    }

    /// Credential present and remote gateway initialized (no network call)
    pub fn is_connected(&self) -> bool {
        let settings = self.settings();
        settings.credential.is_some() && settings.remote.is_some()
    }

    /// Whether a local write would be uploaded without waiting for reconnection
    pub fn sync_available(&self) -> bool {
        self.monitor.is_online() && self.configuration().is_configured()
    }

    pub fn monitor(&self) -> &Arc<ConnectivityMonitor> {
        &self.monitor
    }

    // ==================== Sync cycle ====================

    /// Whether a cycle is running right now
    pub fn is_syncing(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    /// Result of the most recent completed cycle
    pub fn last_result(&self) -> Option<SyncResult> {
        self.last_result
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// Run one full bidirectional sync cycle
    pub async fn full_sync(&self) -> SyncResult {
        let Some(_guard) = CycleGuard::acquire(&self.in_progress) else {
            debug!("Sync requested while a cycle is running, rejecting");
            return SyncResult::rejected(SyncError::Reentrancy);
        };

        let remote = {
            let settings = self.settings();
            if settings.config.is_configured() {
                settings.remote.clone()
            } else {
                None
            }
        };
        let Some(remote) = remote else {
            return SyncResult::rejected(SyncError::not_configured());
        };
        if !self.monitor.is_authenticated() {
            return SyncResult::rejected(SyncError::not_authenticated());
        }

        info!(
            "Starting sync cycle with {} ({} entity types)",
            remote.base_url(),
            self.registry.len()
        );

        let mut uploaded = 0;
        let mut downloaded = 0;
        let mut errors = Vec::new();

        for entity in self.registry.iter() {
            match self.upload_phase(entity, remote.as_ref()).await {
                Ok(batch) if batch.is_empty() => {}
                Ok(batch) => {
                    uploaded += batch.count;
                    if let Err(e) = self.local.mark_synced(entity, &batch).await {
                        let message = format!("acknowledge failed: {}", e);
                        record_failure(&mut errors, entity, "acknowledge", &message);
                    }
                }
                Err(e) => record_failure(&mut errors, entity, "upload", &e.to_string()),
            }

            match self.download_phase(entity, remote.as_ref()).await {
                Ok(count) => downloaded += count,
                Err(e) => record_failure(&mut errors, entity, "download", &e.to_string()),
            }
        }

        let result = SyncResult {
            success: errors.is_empty(),
            uploaded,
            downloaded,
            errors,
            completed_at: Utc::now(),
        };

        if result.success {
            info!(
                "Sync cycle complete: uploaded={}, downloaded={}",
                result.uploaded, result.downloaded
            );
        } else {
            warn!(
                "Sync cycle finished with {} error(s): uploaded={}, downloaded={}",
                result.errors.len(),
                result.uploaded,
                result.downloaded
            );
        }

        self.refresh_pending_count().await;
        self.monitor.clear_sync_expectation();
        *self.last_result.write().unwrap_or_else(|p| p.into_inner()) = Some(result.clone());

        result
    }

    /// Push local unsynced records; returns the uploaded batch
    async fn upload_phase(
        &self,
        entity: &EntityType,
        remote: &dyn RemoteDataGateway,
    ) -> GatewayResult<EntityBatch> {
        let batch = self.local.get_unsynced_batch(entity).await?;
        if batch.is_empty() {
            debug!("No pending {} to upload", entity);
            return Ok(batch);
        }

        debug!("Uploading {} {}", batch.count, entity);
        remote.apply_batch(entity, &batch.data).await?;
        Ok(batch)
    }

    /// Pull remote records and apply them locally; returns how many
    async fn download_phase(
        &self,
        entity: &EntityType,
        remote: &dyn RemoteDataGateway,
    ) -> GatewayResult<usize> {
        let batch = remote.get_unsynced_batch(entity).await?;
        if batch.is_empty() {
            debug!("No remote {} to download", entity);
            return Ok(0);
        }

        debug!("Applying {} downloaded {}", batch.count, entity);
        self.local.apply_batch(entity, &batch.data).await?;
        Ok(batch.count)
    }

    async fn refresh_pending_count(&self) {
        match self.local.get_sync_status().await {
            Ok(status) => self.monitor.set_pending_count(status.pending_sync.total),
            Err(e) => debug!("Could not refresh pending count: {}", e),
        }
    }

    /// Local sync status; also refreshes the monitor's pending count
    pub async fn sync_status(&self) -> Result<SyncStatusSnapshot> {
        let status = self.local.get_sync_status().await?;
        self.monitor.set_pending_count(status.pending_sync.total);
        Ok(status)
    }

    /// Pending operation count as last refreshed
    pub fn pending_count(&self) -> u64 {
        self.monitor.pending_count()
    }

    // ==================== Auto-sync ====================

    /// Arm the recurring timer at the configured interval
    ///
    /// Any previously armed timer is stopped first, so at most one is live.
    pub fn start_auto_sync(self: &Arc<Self>) {
        self.stop_auto_sync();

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No async runtime available, auto-sync not armed");
            return;
        };

        let period = interval_of(&self.configuration());
        let weak = Arc::downgrade(self);
        let handle = runtime.spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(orchestrator) = weak.upgrade() else {
                    break;
                };
                orchestrator.auto_sync_tick().await;
            }
        });

        let mut timer = self.timer.lock().unwrap_or_else(|p| p.into_inner());
        *timer = Some(AutoSyncTimer { handle, period });
        drop(timer);
        info!("Auto-sync armed every {} minute(s)", period.as_secs() / 60);
    }

    /// Disarm the timer; no-op when nothing is armed
    pub fn stop_auto_sync(&self) {
        if let Some(timer) = self.timer.lock().unwrap_or_else(|p| p.into_inner()).take() {
            timer.handle.abort();
            info!("Auto-sync stopped");
        }
    }

    pub fn is_auto_sync_armed(&self) -> bool {
        self.armed_period().is_some()
    }

    fn armed_period(&self) -> Option<Duration> {
        self.timer
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .as_ref()
            .map(|timer| timer.period)
    }

    /// One automatic attempt: syncs only when online, signed in and connected
    ///
    /// Returns `None` when the attempt was skipped without any network call.
    pub async fn auto_sync_tick(&self) -> Option<SyncResult> {
        if !self.monitor.can_sync() || !self.is_connected() {
            debug!("Skipping automatic sync (offline, signed out or not connected)");
            return None;
        }
        Some(self.full_sync().await)
    }

    /// Run a one-shot sync whenever the network comes back or a local
    /// session starts, if auto-sync is enabled
    pub fn spawn_reconnect_hook(self: &Arc<Self>) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        let mut state_rx = self.monitor.subscribe();
        let mut previous = *state_rx.borrow_and_update();

        tokio::spawn(async move {
            while state_rx.changed().await.is_ok() {
                let current = *state_rx.borrow_and_update();
                let transition = Transition::between(previous, current);
                previous = current;

                let Some(orchestrator) = weak.upgrade() else {
                    break;
                };
                if transition.triggers_sync() && orchestrator.configuration().auto_sync {
                    info!("{:?}: running one-shot sync", transition);
                    orchestrator.auto_sync_tick().await;
                }
            }
        })
    }
}

impl Drop for SyncOrchestrator {
    fn drop(&mut self) {
        self.stop_auto_sync();
    }
}

fn interval_of(config: &SyncConfiguration) -> Duration {
    let minutes = config.sync_interval.clamp(1, MAX_SYNC_INTERVAL_MINUTES);
    Duration::from_secs(minutes * 60)
}

fn record_failure(errors: &mut Vec<String>, entity: &EntityType, phase: &str, message: &str) {
    warn!("{} {} failed: {}", entity, phase, message);
    errors.push(format!("{}: {}", entity, message));
}

#[cfg(test)]
#[path = "orchestrator_test.rs"]
mod orchestrator_test;
