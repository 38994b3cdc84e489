//! HTTP API
//!
//! # Endpoints
//!
//! ## Server
//! - `GET /api/server` - The configured server
//! - `POST /api/server` - Create a server (interface)
//! - `PUT /api/server/:id` - Update a server
//! - `DELETE /api/server/:id` - Tear down a server and its clients
//!
//! ## Clients
//! - `GET /api/clients` - List clients (`?server_id=` filter)
//! - `POST /api/clients` - Create a client (peer)
//! - `GET /api/clients/:id/config` - Download the client config file
//! - `PUT /api/clients/:id/disable` - Remove the peer, keep the record
//! - `PUT /api/clients/:id/enable` - Re-add the peer
//! - `DELETE /api/clients/:id` - Remove the peer and the record
//!
//! ## Stats & Health
//! - `GET /api/stats` - Client counts
//! - `GET /healthz` - Health check

pub mod dto;
pub mod handlers;

pub use dto::*;

use crate::config::WireGuardConfig;
use crate::manager::WgManager;
use crate::store::Store;
use axum::{
    routing::{delete, get, put},
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Application state shared across handlers
pub struct AppState {
    /// Serialized access to the control surface
    pub manager: Arc<WgManager>,
    /// Server and client records
    pub store: Arc<Store>,
    /// Keepalive and degraded-mode settings
    pub settings: WireGuardConfig,
    /// Held from address allocation until the client record is stored
    pub provisioning: Mutex<()>,
}

impl AppState {
    pub fn new(manager: Arc<WgManager>, store: Arc<Store>, settings: WireGuardConfig) -> Self {
        Self {
            manager,
            store,
            settings,
            provisioning: Mutex::new(()),
        }
    }
}

/// Create the API router with all routes
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/api/server",
            get(handlers::get_server).post(handlers::create_server),
        )
        .route(
            "/api/server/:id",
            put(handlers::update_server).delete(handlers::delete_server),
        )
        .route(
            "/api/clients",
            get(handlers::list_clients).post(handlers::create_client),
        )
        .route("/api/clients/:id", delete(handlers::delete_client))
        .route("/api/clients/:id/config", get(handlers::client_config))
        .route("/api/clients/:id/disable", put(handlers::disable_client))
        .route("/api/clients/:id/enable", put(handlers::enable_client))
        .route("/api/stats", get(handlers::get_stats))
        .route("/healthz", get(handlers::health_check))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Serve the API until `shutdown` resolves
pub async fn serve<F>(state: Arc<AppState>, addr: SocketAddr, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Starting API server on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}
