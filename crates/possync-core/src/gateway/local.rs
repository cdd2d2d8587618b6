//! Client for the on-device API server

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::http::{server_root, HttpClient};
use super::{BearerToken, DataGateway, LocalDataGateway, API_PREFIX};
use crate::entity::{EntityBatch, EntityType};
use crate::error::GatewayResult;
use crate::model::SyncStatusSnapshot;

/// Timeout for calls to the local API
pub const LOCAL_TIMEOUT: Duration = Duration::from_secs(30);

/// Local gateway backed by the on-device REST API
///
/// Calls carry the local session's bearer token, which is distinct from the
/// cloud token.
#[derive(Debug, Clone)]
pub struct HttpLocalGateway {
    api: HttpClient,
    root_url: String,
}

impl HttpLocalGateway {
    /// `server_url` is the server root, e.g. `http://localhost:8000`
    pub fn new(server_url: &str, session: BearerToken) -> Self {
        let root_url = server_root(server_url);
        Self {
            api: HttpClient::new(&format!("{}{}", root_url, API_PREFIX), LOCAL_TIMEOUT, session),
            root_url,
        }
    }

    /// Handle to the local session token used by this gateway
    pub fn session(&self) -> &BearerToken {
        self.api.token()
    }
}

#[async_trait]
impl DataGateway for HttpLocalGateway {
    async fn get_unsynced_batch(&self, entity: &EntityType) -> GatewayResult<EntityBatch> {
        self.api.fetch_batch(entity).await
    }

    async fn apply_batch(&self, entity: &EntityType, records: &[Value]) -> GatewayResult<()> {
        self.api.upload_batch(entity, records).await
    }

    async fn health_check(&self) -> GatewayResult<bool> {
        self.api
            .check_health(&format!("{}/health", self.root_url), LOCAL_TIMEOUT)
            .await
    }
}

#[async_trait]
impl LocalDataGateway for HttpLocalGateway {
    async fn get_sync_status(&self) -> GatewayResult<SyncStatusSnapshot> {
        self.api.get_json("/sync/status").await
    }

    /// No call is made: the local server drains its own pending set once
    /// the records it handed out have been read for upload
    async fn mark_synced(&self, entity: &EntityType, batch: &EntityBatch) -> GatewayResult<()> {
        debug!(
            "{} {} uploaded; pending set is managed by the local server",
            batch.count, entity
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::mock_server::MockServer;
    use serde_json::json;

    /// Serves only `/sync/status`, `/sync/data/{e}` and `/sync/upload`
    async fn local_server() -> MockServer {
        MockServer::start(|request| match (request.method.as_str(), request.path.as_str()) {
            ("GET", "/api/v1/sync/data/products") => (
                200,
                r#"{"count": 3, "data": [{"id": "p1"}, {"id": "p2"}, {"id": "p3"}]}"#.to_string(),
            ),
            ("GET", path) if path.starts_with("/api/v1/sync/data/") => {
                (200, r#"{"count": 0, "data": []}"#.to_string())
            }
            ("POST", "/api/v1/sync/upload") => (200, r#"{"status": "ok"}"#.to_string()),
            ("GET", "/api/v1/sync/status") => (
                200,
                r#"{"pharmacy_id": "ph-1", "pending_sync": {"products": 3, "total": 3}, "is_synced": false}"#
                    .to_string(),
            ),
            _ => (404, r#"{"detail": "Not Found"}"#.to_string()),
        })
        .await
    }

    #[test]
    fn test_local_gateway_urls() {
        let gateway = HttpLocalGateway::new("http://localhost:8000/", BearerToken::default());
        assert_eq!(gateway.root_url, "http://localhost:8000");
        assert_eq!(gateway.api.base_url(), "http://localhost:8000/api/v1");
    }

    #[test]
    fn test_local_gateway_accepts_api_url() {
        let gateway = HttpLocalGateway::new("http://localhost:8000/api/v1", BearerToken::default());
        assert_eq!(gateway.api.base_url(), "http://localhost:8000/api/v1");
    }

    #[test]
    fn test_session_is_shared() {
        let session = BearerToken::default();
        let gateway = HttpLocalGateway::new("http://localhost:8000", session.clone());
        session.set(Some("local-token".to_string()));
        assert_eq!(gateway.session().get().as_deref(), Some("local-token"));
    }

    #[tokio::test]
    async fn test_local_cycle_uses_only_sync_endpoints() {
        let server = local_server().await;
        let session = BearerToken::default();
        session.set(Some("local-token".to_string()));
        let gateway = HttpLocalGateway::new(server.url(), session);
        let products = EntityType::products();

        let batch = gateway.get_unsynced_batch(&products).await.unwrap();
        assert_eq!(batch.count, 3);
        gateway.mark_synced(&products, &batch).await.unwrap();
        gateway
            .apply_batch(&products, &[json!({"id": "p9"})])
            .await
            .unwrap();
        let status = gateway.get_sync_status().await.unwrap();

        assert_eq!(status.pharmacy_id.as_deref(), Some("ph-1"));
        assert_eq!(status.pending_sync.total, 3);
        assert_eq!(
            server.calls(),
            vec![
                "GET /api/v1/sync/data/products",
                "POST /api/v1/sync/upload",
                "GET /api/v1/sync/status",
            ]
        );
        assert!(server
            .requests()
            .iter()
            .all(|r| r.header("authorization") == Some("Bearer local-token")));
    }

    #[tokio::test]
    async fn test_mark_synced_makes_no_request() {
        let gateway = HttpLocalGateway::new("http://127.0.0.1:9", BearerToken::default());
        let batch = EntityBatch::new(EntityType::sales(), vec![json!({"id": "s1"})]);
        assert!(gateway.mark_synced(&EntityType::sales(), &batch).await.is_ok());
    }
}
