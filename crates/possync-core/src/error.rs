//! Sync error taxonomy
//!
//! `full_sync` is the error boundary: everything below it is folded into
//! `SyncResult::errors`. Settings operations (`login`, `save_configuration`)
//! return these errors to their caller for inline display.

use thiserror::Error;

use crate::entity::EntityType;
use crate::storage::StorageError;

/// Maximum number of body characters kept in an error message
const MAX_ERROR_BODY_CHARS: usize = 200;

/// Result type for orchestrator operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Result type for gateway calls
pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

/// Errors surfaced by the sync orchestrator
#[derive(Error, Debug)]
pub enum SyncError {
    /// Sync attempted while disabled or unconfigured, or invalid settings
    #[error("{0}")]
    Configuration(String),

    /// Missing or rejected local/remote session
    #[error("{0}")]
    Authentication(String),

    /// Transport-level failure talking to a gateway
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// A sync cycle is already running
    #[error("sync already in progress")]
    Reentrancy,

    /// Local persistence failure
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl SyncError {
    pub fn not_configured() -> Self {
        Self::Configuration("sync not configured".to_string())
    }

    pub fn not_authenticated() -> Self {
        Self::Authentication("not authenticated".to_string())
    }

    /// Whether the caller should prompt for a new login
    pub fn requires_login(&self) -> bool {
        match self {
            Self::Authentication(_) => true,
            Self::Gateway(e) => e.is_auth_failure(),
            _ => false,
        }
    }

    /// What the user can do about a local persistence failure
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            Self::Storage(e) => e.recovery_suggestion(),
            _ => None,
        }
    }
}

/// A transport-level failure from one gateway call
///
/// Timeouts, non-2xx responses and malformed payloads all land here. The
/// gateway never retries.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct GatewayError {
    pub entity_type: Option<EntityType>,
    pub status: Option<u16>,
    pub message: String,
}

impl GatewayError {
    /// Network failure, timeout or unreachable host
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            entity_type: None,
            status: None,
            message: message.into(),
        }
    }

    /// Non-2xx HTTP response
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self {
            entity_type: None,
            status: Some(status),
            message: message.into(),
        }
    }

    /// Response body that could not be decoded
    pub fn decode(message: impl Into<String>) -> Self {
        Self::transport(format!("malformed response: {}", message.into()))
    }

    /// Scope this error to an entity type
    pub fn for_entity(mut self, entity: &EntityType) -> Self {
        self.entity_type = Some(entity.clone());
        self
    }

    pub fn is_auth_failure(&self) -> bool {
        matches!(self.status, Some(401) | Some(403))
    }

    /// Build a message from an error response body
    ///
    /// Prefers the server-provided `message`/`detail`/`error` field and falls
    /// back to a truncated copy of the raw body.
    pub fn from_response(status: u16, body: &str) -> Self {
        let server_message = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| {
                ["message", "detail", "error"]
                    .iter()
                    .find_map(|key| v.get(*key).and_then(|m| m.as_str()).map(str::to_string))
            });

        let message = match server_message {
            Some(m) => m,
            None if body.trim().is_empty() => format!("request failed with status {}", status),
            None => {
                let mut preview: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
                if body.chars().count() > MAX_ERROR_BODY_CHARS {
                    preview.push_str("...");
                }
                format!("request failed with status {}: {}", status, preview)
            }
        };

        Self::status(status, message)
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            return Self::transport("request timed out");
        }
        if error.is_decode() {
            return Self::decode(error.to_string());
        }
        if error.is_connect() {
            return Self::transport(format!("connection failed: {}", error));
        }
        match error.status() {
            Some(status) => Self::status(status.as_u16(), error.to_string()),
            None => Self::transport(error.to_string()),
        }
    }
}
