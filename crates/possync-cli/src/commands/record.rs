//! Record command handler

use anyhow::{bail, Context, Result};
use serde_json::Value;

use possync_core::entity::record_id;
use possync_core::{EntityType, PendingLedger, SyncOrchestrator};

use crate::output::Output;

/// Queue a local write in the embedded ledger
pub fn record(
    ledger: Option<&PendingLedger>,
    orchestrator: &SyncOrchestrator,
    entity: String,
    json: String,
    output: &Output,
) -> Result<()> {
    let Some(ledger) = ledger else {
        bail!(
            "Records can only be written to the embedded ledger.\n\
             Unset local_api_url to use it:\n  possync config set local_api_url none"
        );
    };

    let (entity, payload) = parse(orchestrator, &entity, &json)?;
    let Some(id) = record_id(&payload) else {
        bail!("Record must have an \"id\" field");
    };

    let outcome = ledger.record_write(&entity, &payload, orchestrator.sync_available());
    if outcome.is_stored() && orchestrator.configuration().auto_sync {
        orchestrator.monitor().expect_sync();
    }
    output.print_write_outcome(entity.as_str(), &id, &outcome);

    if !outcome.is_stored() {
        bail!("Write failed");
    }
    Ok(())
}

fn parse(orchestrator: &SyncOrchestrator, entity: &str, json: &str) -> Result<(EntityType, Value)> {
    let entity = EntityType::new(entity);
    if !orchestrator.registry().contains(&entity) {
        let known: Vec<&str> = orchestrator.registry().iter().map(|e| e.as_str()).collect();
        bail!(
            "Unknown entity type '{}'. Known types: {}",
            entity,
            known.join(", ")
        );
    }

    let payload: Value = serde_json::from_str(json).context("Record is not valid JSON")?;
    if !payload.is_object() {
        bail!("Record must be a JSON object");
    }
    Ok((entity, payload))
}
