//! Sync command handlers

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use possync_core::SyncOrchestrator;

use crate::output::Output;

/// How often `watch` checks that the cloud is reachable
const REACHABILITY_INTERVAL: Duration = Duration::from_secs(30);

/// Run one full sync cycle now
pub async fn sync(orchestrator: &SyncOrchestrator, output: &Output) -> Result<()> {
    let config = orchestrator.configuration();

    if !config.is_configured() {
        bail!(
            "Sync is not enabled. Enable it with:\n  \
             possync sync-config set cloud_url https://your-server\n  \
             possync sync-config set enabled true"
        );
    }

    if !orchestrator.is_connected() {
        bail!("Not logged in. Log in with:\n  possync login -u <username>");
    }

    output.message(&format!("Syncing with {}...", config.normalized_url()));

    let result = orchestrator.full_sync().await;
    output.print_sync_result(&result);

    if !result.success {
        bail!("Sync finished with {} error(s)", result.errors.len());
    }
    Ok(())
}

/// Keep auto-sync running until interrupted
///
/// Runs an initial cycle, then relies on the auto-sync timer and the
/// reconnect hook. Periodic cloud health checks stand in for network
/// events: a failed check marks the monitor offline, and the next
/// successful one brings it back online, which triggers a one-shot sync.
pub async fn watch(orchestrator: &Arc<SyncOrchestrator>, output: &Output) -> Result<()> {
    let config = orchestrator.configuration();
    if !config.is_configured() || !config.auto_sync {
        bail!(
            "Auto-sync is not enabled. Enable it with:\n  \
             possync sync-config set enabled true\n  \
             possync sync-config set auto_sync true"
        );
    }

    if !orchestrator.is_auto_sync_armed() {
        orchestrator.start_auto_sync();
    }
    let hook = orchestrator.spawn_reconnect_hook();
    check_reachability(orchestrator).await;
    let reachability = spawn_reachability_checks(orchestrator);

    output.message(&format!(
        "Watching: syncing every {} minute(s). Press Ctrl-C to stop.",
        config.sync_interval
    ));

    if let Some(result) = orchestrator.auto_sync_tick().await {
        output.print_sync_result(&result);
    }

    tokio::signal::ctrl_c().await?;
    info!("Interrupted, stopping auto-sync");

    reachability.abort();
    hook.abort();
    orchestrator.stop_auto_sync();
    output.message("Stopped.");
    Ok(())
}

/// Feed the connectivity monitor from one cloud health check
async fn check_reachability(orchestrator: &SyncOrchestrator) -> bool {
    let url = orchestrator.configuration().cloud_url;
    let result = orchestrator.test_connection(&url).await;
    if !result.success {
        debug!("Cloud unreachable: {}", result.message);
    }
    orchestrator.monitor().set_online(result.success);
    result.success
}

fn spawn_reachability_checks(orchestrator: &Arc<SyncOrchestrator>) -> JoinHandle<()> {
    let weak = Arc::downgrade(orchestrator);
    tokio::spawn(async move {
        let mut ticker =
            tokio::time::interval_at(Instant::now() + REACHABILITY_INTERVAL, REACHABILITY_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let Some(orchestrator) = weak.upgrade() else {
                break;
            };
            check_reachability(&orchestrator).await;
        }
    })
}
