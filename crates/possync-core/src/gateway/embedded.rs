//! Local gateway over the embedded pending ledger
//!
//! Used when no local API server is configured: the ledger itself is the
//! local store, so the orchestrator drains it directly.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::{DataGateway, LocalDataGateway};
use crate::entity::{EntityBatch, EntityRegistry, EntityType};
use crate::error::{GatewayError, GatewayResult};
use crate::model::SyncStatusSnapshot;
use crate::storage::{PendingLedger, StorageError};

/// `LocalDataGateway` backed by a `PendingLedger`
#[derive(Clone)]
pub struct LedgerGateway {
    ledger: Arc<PendingLedger>,
    registry: EntityRegistry,
}

impl LedgerGateway {
    pub fn new(ledger: Arc<PendingLedger>, registry: EntityRegistry) -> Self {
        Self { ledger, registry }
    }

    pub fn ledger(&self) -> &Arc<PendingLedger> {
        &self.ledger
    }
}

fn local_error(entity: Option<&EntityType>, error: StorageError) -> GatewayError {
    let err = GatewayError::transport(format!("local store: {}", error));
    match entity {
        Some(entity) => err.for_entity(entity),
        None => err,
    }
}

#[async_trait]
impl DataGateway for LedgerGateway {
    async fn get_unsynced_batch(&self, entity: &EntityType) -> GatewayResult<EntityBatch> {
        self.ledger
            .pending_batch(entity)
            .map_err(|e| local_error(Some(entity), e))
    }

    async fn apply_batch(&self, entity: &EntityType, records: &[Value]) -> GatewayResult<()> {
        self.ledger
            .apply_remote(entity, records)
            .map(|_| ())
            .map_err(|e| local_error(Some(entity), e))
    }

    async fn health_check(&self) -> GatewayResult<bool> {
        Ok(true)
    }
}

#[async_trait]
impl LocalDataGateway for LedgerGateway {
    async fn get_sync_status(&self) -> GatewayResult<SyncStatusSnapshot> {
        self.ledger
            .status(&self.registry)
            .map_err(|e| local_error(None, e))
    }

    async fn mark_synced(&self, entity: &EntityType, batch: &EntityBatch) -> GatewayResult<()> {
        self.ledger
            .acknowledge(entity, batch)
            .map(|_| ())
            .map_err(|e| local_error(Some(entity), e))
    }
}
