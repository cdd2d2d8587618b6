//! Client for the cloud sync API

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::http::{server_root, HttpClient};
use super::{BearerToken, DataGateway, RemoteConnector, RemoteDataGateway, API_PREFIX};
use crate::entity::{EntityBatch, EntityType};
use crate::error::{GatewayError, GatewayResult};

/// Timeout for remote uploads and downloads
pub const REMOTE_TIMEOUT: Duration = Duration::from_secs(60);

/// Timeout for the reachability check
pub const HEALTH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    access_token: String,
}

/// Remote gateway backed by the cloud REST API
#[derive(Debug, Clone)]
pub struct HttpRemoteGateway {
    api: HttpClient,
    root_url: String,
}

impl HttpRemoteGateway {
    /// `cloud_url` is the server root; the API lives under `/api/v1` and the
    /// health check at `/health`
    pub fn new(cloud_url: &str) -> Self {
        let root_url = server_root(cloud_url);
        Self {
            api: HttpClient::new(
                &format!("{}{}", root_url, API_PREFIX),
                REMOTE_TIMEOUT,
                BearerToken::default(),
            ),
            root_url,
        }
    }
}

#[async_trait]
impl DataGateway for HttpRemoteGateway {
    async fn get_unsynced_batch(&self, entity: &EntityType) -> GatewayResult<EntityBatch> {
        self.api.fetch_batch(entity).await
    }

    async fn apply_batch(&self, entity: &EntityType, records: &[Value]) -> GatewayResult<()> {
        self.api.upload_batch(entity, records).await
    }

    async fn health_check(&self) -> GatewayResult<bool> {
        self.api
            .check_health(&format!("{}/health", self.root_url), HEALTH_TIMEOUT)
            .await
    }
}

#[async_trait]
impl RemoteDataGateway for HttpRemoteGateway {
    fn base_url(&self) -> &str {
        &self.root_url
    }

    async fn login(&self, identifier: &str, secret: &str) -> GatewayResult<String> {
        let body = LoginRequest {
            username: identifier,
            password: secret,
        };
        let response = self.api.post_json("/auth/login", &body).await?;
        let login: LoginResponse = response.json().await?;

        if login.access_token.trim().is_empty() {
            return Err(GatewayError::decode("login response has an empty access_token"));
        }
        Ok(login.access_token)
    }

    fn set_token(&self, token: Option<String>) {
        self.api.token().set(token);
    }

    fn has_token(&self) -> bool {
        self.api.token().is_present()
    }
}

/// Builds `HttpRemoteGateway`s
#[derive(Debug, Clone, Default)]
pub struct HttpRemoteConnector;

impl RemoteConnector for HttpRemoteConnector {
    fn connect(&self, base_url: &str) -> Arc<dyn RemoteDataGateway> {
        Arc::new(HttpRemoteGateway::new(base_url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::mock_server::MockServer;
    use serde_json::json;

    /// Cloud API with one known account and a failing `customers` upload
    async fn cloud_server() -> MockServer {
        MockServer::start(|request| match (request.method.as_str(), request.path.as_str()) {
            ("POST", "/api/v1/auth/login") => {
                if request.json()["password"] == "secret" {
                    (200, r#"{"access_token": "cloud-token", "token_type": "bearer"}"#.to_string())
                } else {
                    (401, r#"{"detail": "Invalid credentials"}"#.to_string())
                }
            }
            ("POST", "/api/v1/sync/upload") if request.json()["entity_type"] == "customers" => {
                (500, r#"{"message": "internal server error"}"#.to_string())
            }
            ("POST", "/api/v1/sync/upload") => (200, r#"{"status": "ok"}"#.to_string()),
            ("GET", "/api/v1/sync/data/products") => {
                (200, r#"{"count": 1, "data": [{"id": "p1", "name": "Aspirin"}]}"#.to_string())
            }
            ("GET", "/health") => (200, r#"{"status": "healthy"}"#.to_string()),
            _ => (404, r#"{"detail": "Not Found"}"#.to_string()),
        })
        .await
    }

    #[test]
    fn test_remote_gateway_urls() {
        let gateway = HttpRemoteGateway::new("https://x.test/");
        assert_eq!(gateway.base_url(), "https://x.test");
        assert_eq!(gateway.api.base_url(), "https://x.test/api/v1");
    }

    #[test]
    fn test_token_attach_and_remove() {
        let gateway = HttpRemoteConnector.connect("https://x.test");
        assert!(!gateway.has_token());

        gateway.set_token(Some("remote-token".to_string()));
        assert!(gateway.has_token());

        gateway.set_token(None);
        assert!(!gateway.has_token());
    }

    #[test]
    fn test_login_wire_shapes() {
        let body = LoginRequest {
            username: "admin",
            password: "secret",
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({"username": "admin", "password": "secret"})
        );

        let response: LoginResponse =
            serde_json::from_value(json!({"access_token": "t", "token_type": "bearer"})).unwrap();
        assert_eq!(response.access_token, "t");
    }

    #[tokio::test]
    async fn test_health_check_unreachable() {
        let gateway = HttpRemoteGateway::new("http://127.0.0.1:9");
        assert!(gateway.health_check().await.is_err());
    }

    #[tokio::test]
    async fn test_login_then_sync_against_server() {
        let server = cloud_server().await;
        let gateway = HttpRemoteGateway::new(server.url());

        assert!(gateway.health_check().await.unwrap());
        let token = gateway.login("admin", "secret").await.unwrap();
        assert_eq!(token, "cloud-token");
        gateway.set_token(Some(token));

        let batch = gateway
            .get_unsynced_batch(&EntityType::products())
            .await
            .unwrap();
        assert_eq!(batch.count, 1);
        gateway
            .apply_batch(&EntityType::sales(), &[json!({"id": "s1"})])
            .await
            .unwrap();

        let requests = server.requests();
        assert_eq!(
            server.calls(),
            vec![
                "GET /health",
                "POST /api/v1/auth/login",
                "GET /api/v1/sync/data/products",
                "POST /api/v1/sync/upload",
            ]
        );
        assert_eq!(
            requests[1].json(),
            json!({"username": "admin", "password": "secret"})
        );
        assert_eq!(requests[2].header("authorization"), Some("Bearer cloud-token"));
        assert_eq!(requests[3].header("authorization"), Some("Bearer cloud-token"));
    }

    #[tokio::test]
    async fn test_rejected_login_against_server() {
        let server = cloud_server().await;
        let gateway = HttpRemoteGateway::new(server.url());

        let err = gateway.login("admin", "wrong").await.unwrap_err();
        assert_eq!(err.status, Some(401));
        assert_eq!(err.message, "Invalid credentials");
        assert!(err.is_auth_failure());
    }

    #[tokio::test]
    async fn test_failed_upload_against_server() {
        let server = cloud_server().await;
        let gateway = HttpRemoteGateway::new(server.url());
        gateway.set_token(Some("cloud-token".to_string()));

        let err = gateway
            .apply_batch(&EntityType::customers(), &[json!({"id": "c1"})])
            .await
            .unwrap_err();
        assert_eq!(err.status, Some(500));
        assert_eq!(err.message, "internal server error");
        assert_eq!(err.entity_type, Some(EntityType::customers()));
    }
}
