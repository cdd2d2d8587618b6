//! HTTP plumbing shared by the local and remote gateways

use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::BearerToken;
use crate::entity::{EntityBatch, EntityType};
use crate::error::{GatewayError, GatewayResult};

/// Body of `POST /sync/upload`
#[derive(Debug, Serialize)]
pub(crate) struct UploadRequest<'a> {
    pub entity_type: &'a str,
    pub items: &'a [Value],
}

/// JSON client bound to one API base URL
#[derive(Debug, Clone)]
pub(crate) struct HttpClient {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
    token: BearerToken,
}

impl HttpClient {
    pub fn new(base_url: &str, timeout: Duration, token: BearerToken) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
            token,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn token(&self) -> &BearerToken {
        &self.token
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = self.url(path);
        debug!("{} {}", method, url);

        let mut builder = self
            .client
            .request(method, url)
            .timeout(self.timeout)
            .header(CONTENT_TYPE, "application/json");
        if let Some(token) = self.token.get() {
            builder = builder.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        builder
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> GatewayResult<T> {
        let response = self.request(Method::GET, path).send().await?;
        let response = check_status(response).await?;
        Ok(response.json::<T>().await?)
    }

    pub async fn post_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> GatewayResult<Response> {
        let response = self.request(Method::POST, path).json(body).send().await?;
        check_status(response).await
    }

    /// `GET /sync/data/{entity}`
    pub async fn fetch_batch(&self, entity: &EntityType) -> GatewayResult<EntityBatch> {
        let path = format!("/sync/data/{}", entity.as_str());
        let batch: EntityBatch = self
            .get_json(&path)
            .await
            .map_err(|e| e.for_entity(entity))?;
        Ok(batch.tagged(entity.clone()))
    }

    /// `POST /sync/upload`
    pub async fn upload_batch(&self, entity: &EntityType, records: &[Value]) -> GatewayResult<()> {
        let body = UploadRequest {
            entity_type: entity.as_str(),
            items: records,
        };
        self.post_json("/sync/upload", &body)
            .await
            .map_err(|e| e.for_entity(entity))?;
        Ok(())
    }

    /// Unauthenticated GET against an absolute URL; true on any 2xx
    pub async fn check_health(&self, url: &str, timeout: Duration) -> GatewayResult<bool> {
        debug!("GET {} (health check)", url);
        let response = self.client.get(url).timeout(timeout).send().await?;
        Ok(response.status().is_success())
    }
}

/// Turn a non-2xx response into a `GatewayError` carrying the server message
async fn check_status(response: Response) -> GatewayResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    debug!("API response error ({}): {}", status, body);
    Err(GatewayError::from_response(status.as_u16(), &body))
}

/// Strip a trailing API prefix to get the server root
pub(crate) fn server_root(url: &str) -> String {
    let url = url.trim().trim_end_matches('/');
    url.strip_suffix(super::API_PREFIX).unwrap_or(url).to_string()
}
