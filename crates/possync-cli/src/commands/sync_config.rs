//! Sync settings command handlers
//!
//! These edit the `SyncConfiguration` through the orchestrator, so a change
//! takes effect the same way it would from a settings screen.

use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};

use possync_core::{SyncConfiguration, SyncOrchestrator};

use super::with_recovery_hint;
use crate::output::Output;

/// Show current sync settings
pub fn show(orchestrator: &SyncOrchestrator, output: &Output) -> Result<()> {
    output.print_sync_configuration(&orchestrator.configuration());
    Ok(())
}

/// Change one sync setting and persist it
pub fn set(
    orchestrator: &Arc<SyncOrchestrator>,
    key: String,
    value: String,
    output: &Output,
) -> Result<()> {
    let config = apply(orchestrator.configuration(), &key, &value)?;
    orchestrator.save_configuration(config).map_err(|e| {
        anyhow!(with_recovery_hint(
            format!("Failed to save sync settings: {}", e),
            e.recovery_suggestion()
        ))
    })?;
    output.success(&format!("Set {} = {}", key, value));
    Ok(())
}

fn apply(mut config: SyncConfiguration, key: &str, value: &str) -> Result<SyncConfiguration> {
    match key {
        "cloud_url" => {
            config.cloud_url = value.trim().to_string();
        }
        "enabled" => {
            config.enabled = value
                .parse()
                .context("Invalid value for enabled. Use 'true' or 'false'.")?;
        }
        "auto_sync" => {
            config.auto_sync = value
                .parse()
                .context("Invalid value for auto_sync. Use 'true' or 'false'.")?;
        }
        "sync_interval" => {
            config.sync_interval = value
                .parse()
                .context("Invalid value for sync_interval. Use a number of minutes.")?;
        }
        _ => {
            bail!(
                "Unknown sync setting: '{}'\n\
                 Valid keys: cloud_url, enabled, auto_sync, sync_interval",
                key
            );
        }
    }
    Ok(config)
}
