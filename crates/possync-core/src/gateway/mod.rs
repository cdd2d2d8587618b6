//! Data gateways
//!
//! Thin clients over one API surface each. The local gateway talks to the
//! on-device API (or the embedded ledger); the remote gateway talks to the
//! cloud API and carries the remote bearer token.
//!
//! Gateways never retry. Any failure, including a timeout, surfaces as a
//! `GatewayError` and the caller decides what to do with it.

mod embedded;
mod http;
mod local;
mod remote;

#[cfg(test)]
pub(crate) mod mock_server;

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde_json::Value;

use crate::entity::{EntityBatch, EntityType};
use crate::error::GatewayResult;
use crate::model::SyncStatusSnapshot;

pub use embedded::LedgerGateway;
pub use local::{HttpLocalGateway, LOCAL_TIMEOUT};
pub use remote::{HttpRemoteConnector, HttpRemoteGateway, HEALTH_TIMEOUT, REMOTE_TIMEOUT};

/// Path prefix of both APIs
pub const API_PREFIX: &str = "/api/v1";

/// Operations shared by the local and remote gateways
#[async_trait]
pub trait DataGateway: Send + Sync {
    /// Fetch the records of one entity type not yet synced to the other side
    async fn get_unsynced_batch(&self, entity: &EntityType) -> GatewayResult<EntityBatch>;

    /// Upsert records of one entity type on this side
    async fn apply_batch(&self, entity: &EntityType, records: &[Value]) -> GatewayResult<()>;

    /// Liveness check
    async fn health_check(&self) -> GatewayResult<bool>;
}

/// The on-device side of sync
#[async_trait]
pub trait LocalDataGateway: DataGateway {
    /// Last sync and pending counts
    async fn get_sync_status(&self) -> GatewayResult<SyncStatusSnapshot>;

    /// Clear the records of a successfully uploaded batch from the pending set
    async fn mark_synced(&self, entity: &EntityType, batch: &EntityBatch) -> GatewayResult<()>;
}

/// The cloud side of sync
#[async_trait]
pub trait RemoteDataGateway: DataGateway {
    /// Endpoint this gateway was initialized with
    fn base_url(&self) -> &str;

    /// Exchange credentials for an access token
    async fn login(&self, identifier: &str, secret: &str) -> GatewayResult<String>;

    /// Attach or remove the bearer token sent with every call
    fn set_token(&self, token: Option<String>);

    fn has_token(&self) -> bool;
}

/// Builds remote gateways for a given endpoint
pub trait RemoteConnector: Send + Sync {
    fn connect(&self, base_url: &str) -> Arc<dyn RemoteDataGateway>;
}

/// Shared slot holding a bearer token
///
/// Clones share the same slot, so a token set through one handle is seen by
/// every gateway holding another. Empty tokens are treated as absent.
#[derive(Debug, Clone, Default)]
pub struct BearerToken(Arc<RwLock<Option<String>>>);

impl BearerToken {
    pub fn new(token: Option<String>) -> Self {
        let slot = Self::default();
        slot.set(token);
        slot
    }

    pub fn set(&self, token: Option<String>) {
        let token = token.filter(|t| !t.trim().is_empty());
        let mut slot = self.0.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = token;
    }

    pub fn clear(&self) {
        self.set(None);
    }

    pub fn get(&self) -> Option<String> {
        self.0
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn is_present(&self) -> bool {
        self.get().is_some()
    }
}
