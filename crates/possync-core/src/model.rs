//! Sync data model
//!
//! Configuration, results, status snapshots and write outcomes exchanged
//! between the orchestrator, the gateways and the CLI.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::{EntityRegistry, EntityType};
use crate::error::{Result, SyncError};

/// Remote endpoint used until the user configures their own
pub const DEFAULT_CLOUD_URL: &str = "https://cloud.possync.app";

/// Auto-sync interval used when none is configured (minutes)
pub const DEFAULT_SYNC_INTERVAL_MINUTES: u64 = 5;

/// Longest accepted auto-sync interval: one week (minutes)
pub const MAX_SYNC_INTERVAL_MINUTES: u64 = 7 * 24 * 60;

/// Persisted sync settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConfiguration {
    #[serde(default = "default_cloud_url")]
    pub cloud_url: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub auto_sync: bool,
    /// Minutes between automatic sync cycles
    #[serde(default = "default_sync_interval")]
    pub sync_interval: u64,
}

impl Default for SyncConfiguration {
    fn default() -> Self {
        Self {
            cloud_url: default_cloud_url(),
            enabled: false,
            auto_sync: false,
            sync_interval: DEFAULT_SYNC_INTERVAL_MINUTES,
        }
    }
}

impl SyncConfiguration {
    /// Enabled and pointing at a remote endpoint
    pub fn is_configured(&self) -> bool {
        self.enabled && !self.cloud_url.trim().is_empty()
    }

    /// Check the settings before they are persisted
    pub fn validate(&self) -> Result<()> {
        if self.sync_interval == 0 {
            return Err(SyncError::Configuration(
                "sync interval must be at least one minute".to_string(),
            ));
        }
        if self.sync_interval > MAX_SYNC_INTERVAL_MINUTES {
            return Err(SyncError::Configuration(format!(
                "sync interval must be at most {} minutes (got {})",
                MAX_SYNC_INTERVAL_MINUTES, self.sync_interval
            )));
        }

        let url = self.cloud_url.trim();
        if self.enabled && url.is_empty() {
            return Err(SyncError::Configuration(
                "cloud URL is required when sync is enabled".to_string(),
            ));
        }
        if !url.is_empty() && !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(SyncError::Configuration(format!(
                "cloud URL must start with http:// or https:// (got '{}')",
                url
            )));
        }

        Ok(())
    }

    /// The remote endpoint without trailing slashes
    pub fn normalized_url(&self) -> String {
        self.cloud_url.trim().trim_end_matches('/').to_string()
    }
}

fn default_cloud_url() -> String {
    DEFAULT_CLOUD_URL.to_string()
}

fn default_sync_interval() -> u64 {
    DEFAULT_SYNC_INTERVAL_MINUTES
}

/// Outcome of one full sync cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    pub success: bool,
    pub uploaded: usize,
    pub downloaded: usize,
    pub errors: Vec<String>,
    pub completed_at: DateTime<Utc>,
}

impl SyncResult {
    /// A cycle that never started
    pub fn rejected(error: impl ToString) -> Self {
        Self {
            success: false,
            uploaded: 0,
            downloaded: 0,
            errors: vec![error.to_string()],
            completed_at: Utc::now(),
        }
    }
}

/// Pending-record counts per entity type plus a total
///
/// Serializes flat: `{"products": 3, "sales": 1, "customers": 0, "total": 4}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingCounts {
    #[serde(flatten)]
    pub by_entity: BTreeMap<String, u64>,
    #[serde(default)]
    pub total: u64,
}

impl PendingCounts {
    /// Build counts for every registered entity type (missing ones are zero)
    pub fn from_counts(registry: &EntityRegistry, counts: &BTreeMap<String, u64>) -> Self {
        let by_entity: BTreeMap<String, u64> = registry
            .iter()
            .map(|e| (e.as_str().to_string(), counts.get(e.as_str()).copied().unwrap_or(0)))
            .collect();
        let total = by_entity.values().sum();
        Self { by_entity, total }
    }

    pub fn get(&self, entity: &EntityType) -> u64 {
        self.by_entity.get(entity.as_str()).copied().unwrap_or(0)
    }
}

/// Read-only projection of local sync state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatusSnapshot {
    #[serde(default)]
    pub pharmacy_id: Option<String>,
    #[serde(default)]
    pub last_sync_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_sync_id: Option<String>,
    #[serde(default)]
    pub pending_sync: PendingCounts,
    #[serde(default)]
    pub is_synced: bool,
}

/// Result of a local write as seen by the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Written locally; will be uploaded on the next sync cycle
    Applied,
    /// Written locally while offline or with sync disabled
    QueuedOffline,
    /// Not written
    Failed(String),
}

impl WriteOutcome {
    /// Whether the record is now stored locally
    pub fn is_stored(&self) -> bool {
        !matches!(self, WriteOutcome::Failed(_))
    }
}

/// Outcome of a reachability check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionTestResult {
    pub success: bool,
    pub message: String,
}
