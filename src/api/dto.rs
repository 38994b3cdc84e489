//! Data Transfer Objects for the REST API
//!
//! Request bodies, query parameters and the response envelope.

use crate::error::WgManagerError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::error;

// ============================================================================
// Envelope
// ============================================================================

/// `{ success, data?, message?, error? }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            error: None,
        }
    }
}

impl ApiResponse<()> {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: None,
            message: Some(message.into()),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: None,
            error: Some(error.into()),
        }
    }
}

/// Error returned from a handler, rendered as a failure envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(resource: &str, id: &str) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            format!("{} '{}' not found", resource, id),
        )
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl From<WgManagerError> for ApiError {
    fn from(err: WgManagerError) -> Self {
        let status = match &err {
            WgManagerError::InvalidKey(_)
            | WgManagerError::InvalidNetwork(_)
            | WgManagerError::NetworkTooSmall(_)
            | WgManagerError::MissingPeerKey
            | WgManagerError::Validation(_) => StatusCode::BAD_REQUEST,
            WgManagerError::NotFound(_) => StatusCode::NOT_FOUND,
            WgManagerError::AddressesExhausted(_) => StatusCode::CONFLICT,
            WgManagerError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!("Request failed ({}): {}", self.status, self.message);
        }
        (self.status, Json(ApiResponse::failure(self.message))).into_response()
    }
}

// ============================================================================
// Server DTOs
// ============================================================================

/// Request to create (or overwrite) a server
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CreateServerRequest {
    /// Interface name, also the server id
    pub name: String,
    pub listen_port: u16,
    /// Generated when absent
    pub private_key: Option<String>,
    pub network: String,
    pub dns: String,
    pub allowed_ips: String,
    pub endpoint: String,
}

/// Request to update a server; absent fields keep their stored value
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UpdateServerRequest {
    /// Must match the stored name when given
    pub name: Option<String>,
    pub listen_port: Option<u16>,
    pub private_key: Option<String>,
    pub network: Option<String>,
    pub dns: Option<String>,
    pub allowed_ips: Option<String>,
    pub endpoint: Option<String>,
}

// ============================================================================
// Client DTOs
// ============================================================================

/// Request to create a client
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CreateClientRequest {
    pub server_id: String,
    pub name: String,
    pub email: String,
    /// Generated when absent
    pub private_key: Option<String>,
    /// Comma separated addresses; allocated from the server network when empty
    pub allowed_ips: String,
}

/// List clients query parameters
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientsQuery {
    pub server_id: Option<String>,
}
