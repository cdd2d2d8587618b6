//! Status command handler

use anyhow::{Context, Result};

use possync_core::SyncOrchestrator;

use crate::output::Output;

/// Show local sync status and pending counts
pub async fn show(orchestrator: &SyncOrchestrator, output: &Output) -> Result<()> {
    let status = orchestrator
        .sync_status()
        .await
        .context("Failed to read local sync status")?;

    output.print_status(
        &status,
        orchestrator.registry(),
        orchestrator.is_connected(),
        &orchestrator.configuration(),
    );

    Ok(())
}
