//! REST API handlers
//!
//! Handlers keep records in the [`Store`](crate::store::Store) and push
//! changes through the [`WgManager`]. Manager calls block on the control
//! surface, so they run on the blocking pool.

use super::dto::*;
use super::AppState;
use crate::config::{validate_endpoint, validate_interface_name};
use crate::error::{Result, WgManagerError};
use crate::manager::WgManager;
use crate::store::{split_list, ClientRecord, ServerRecord, Stats};
use crate::wireguard::{
    allocate_address, parse_allowed_ips, ClientConfig, DeviceConfig, PeerConfig, PrivateKey,
    PublicKey,
};
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use ipnet::IpNet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

type ApiResult<T> = std::result::Result<(StatusCode, Json<ApiResponse<T>>), ApiError>;

/// Run a manager call on the blocking pool
async fn blocking<T, F>(state: &AppState, f: F) -> std::result::Result<Result<T>, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&WgManager) -> Result<T> + Send + 'static,
{
    let manager = state.manager.clone();
    tokio::task::spawn_blocking(move || f(&manager))
        .await
        .map_err(|e| ApiError::internal(format!("reconciliation task failed: {}", e)))
}

/// Run a manager call; `None` means the host has no control surface and the
/// request continues against storage only.
async fn reconcile<T, F>(state: &AppState, action: &str, f: F) -> std::result::Result<Option<T>, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&WgManager) -> Result<T> + Send + 'static,
{
    match blocking(state, f).await? {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_unavailable() && state.settings.storage_only_on_unavailable => {
            warn!("{}: {}; continuing in storage-only mode", action, e);
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

fn keepalive(state: &AppState) -> Duration {
    Duration::from_secs(u64::from(state.settings.persistent_keepalive_secs))
}

fn parse_or_generate(private_key: Option<&str>) -> Result<PrivateKey> {
    match private_key.map(str::trim).filter(|k| !k.is_empty()) {
        Some(key) => PrivateKey::from_base64(key),
        None => PrivateKey::generate(),
    }
}

fn check_network(network: &str) -> Result<()> {
    if network.trim().is_empty() {
        return Ok(());
    }
    network
        .trim()
        .parse::<IpNet>()
        .map(|_| ())
        .map_err(|e| WgManagerError::InvalidNetwork(format!("{}: {}", network, e)))
}

fn check_endpoint(endpoint: &str) -> Result<()> {
    if endpoint.trim().is_empty() {
        return Ok(());
    }
    validate_endpoint(endpoint.trim())
}

fn require_server(state: &AppState, id: &str) -> std::result::Result<ServerRecord, ApiError> {
    state
        .store
        .get_server(id)
        .ok_or_else(|| ApiError::not_found("Server", id))
}

fn require_client(state: &AppState, id: &str) -> std::result::Result<ClientRecord, ApiError> {
    state
        .store
        .get_client(id)
        .ok_or_else(|| ApiError::not_found("Client", id))
}

/// Replace-mode peer request for a stored client
fn client_peer(state: &AppState, client: &ClientRecord) -> Result<PeerConfig> {
    let public_key = PublicKey::from_base64(&client.public_key)?;
    let allowed_ips = parse_allowed_ips(&client.addresses())?;
    Ok(PeerConfig::new(public_key)
        .with_allowed_ips(allowed_ips)
        .with_keepalive(keepalive(state)))
}

// ============================================================================
// Server Handlers
// ============================================================================

/// The configured server, or `null` when there is none
pub async fn get_server(State(state): State<Arc<AppState>>) -> ApiResult<Option<ServerRecord>> {
    Ok((StatusCode::OK, Json(ApiResponse::ok(state.store.first_server()))))
}

/// Create a server: install its key and port and drop any existing peers
pub async fn create_server(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateServerRequest>,
) -> ApiResult<ServerRecord> {
    let name = req.name.trim().to_string();
    validate_interface_name(&name)?;
    check_network(&req.network)?;
    check_endpoint(&req.endpoint)?;
    let private_key = parse_or_generate(req.private_key.as_deref())?;

    let mut server = ServerRecord::new(name.clone());
    server.listen_port = req.listen_port;
    server.private_key = private_key.to_base64();
    server.public_key = private_key.public_key().to_base64();
    server.network = req.network.trim().to_string();
    server.dns = req.dns.trim().to_string();
    server.allowed_ips = req.allowed_ips.trim().to_string();
    server.endpoint = req.endpoint.trim().to_string();

    let config = DeviceConfig::new(name)
        .with_private_key(private_key)
        .with_listen_port(req.listen_port)
        .replacing_peers();
    reconcile(&state, "create server", move |manager| {
        manager.configure_server(&config)
    })
    .await?;

    state.store.add_server(server.clone());
    info!("Created server {}", server.id);
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(server))))
}

/// Update a server in place; renaming is rejected
pub async fn update_server(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateServerRequest>,
) -> ApiResult<ServerRecord> {
    let mut server = require_server(&state, &id)?;

    if let Some(name) = req.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
        if name != server.name {
            return Err(ApiError::bad_request(
                "Renaming an interface is not supported",
            ));
        }
    }

    let private_key = match req.private_key.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
        Some(key) => PrivateKey::from_base64(key)?,
        None => PrivateKey::from_base64(&server.private_key)?,
    };

    if let Some(network) = req.network {
        check_network(&network)?;
        server.network = network.trim().to_string();
    }
    if let Some(endpoint) = req.endpoint {
        check_endpoint(&endpoint)?;
        server.endpoint = endpoint.trim().to_string();
    }
    if let Some(dns) = req.dns {
        server.dns = dns.trim().to_string();
    }
    if let Some(allowed_ips) = req.allowed_ips {
        server.allowed_ips = allowed_ips.trim().to_string();
    }
    if let Some(port) = req.listen_port {
        server.listen_port = port;
    }
    server.private_key = private_key.to_base64();
    server.public_key = private_key.public_key().to_base64();

    let config = DeviceConfig::new(server.id.clone())
        .with_private_key(private_key)
        .with_listen_port(server.listen_port);
    reconcile(&state, "update server", move |manager| {
        manager.configure_server(&config)
    })
    .await?;

    let server = state.store.update_server(server);
    Ok((StatusCode::OK, Json(ApiResponse::ok(server))))
}

/// Tear the device down and remove the server with its clients
pub async fn delete_server(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<()> {
    if let Some(server) = state.store.get_server(&id) {
        let name = server.id.clone();
        reconcile(&state, "delete server", move |manager| {
            manager.teardown_device(&name)
        })
        .await?;
    }

    if state.store.delete_server(&id).is_some() {
        info!("Deleted server {}", id);
    }
    Ok((StatusCode::OK, Json(ApiResponse::message("Server deleted"))))
}

// ============================================================================
// Client Handlers
// ============================================================================

/// List clients, optionally filtered by server
pub async fn list_clients(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ClientsQuery>,
) -> ApiResult<Vec<ClientRecord>> {
    let clients = match query.server_id.as_deref().filter(|id| !id.is_empty()) {
        Some(server_id) => state.store.clients_for_server(server_id),
        None => state.store.clients(),
    };
    Ok((StatusCode::OK, Json(ApiResponse::ok(clients))))
}

/// Create a client and add it as a peer on its server
pub async fn create_client(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateClientRequest>,
) -> ApiResult<ClientRecord> {
    let server = require_server(&state, &req.server_id)?;
    let private_key = parse_or_generate(req.private_key.as_deref())?;

    // Concurrent creates must not pick the same free address
    let _provisioning = state.provisioning.lock().await;

    let mut addresses = split_list(&req.allowed_ips);
    if addresses.is_empty() {
        let mut used = state.store.used_addresses(&server.id);
        let device_name = server.id.clone();
        match blocking(&state, move |manager| manager.get_device(&device_name)).await? {
            Ok(device) => used.extend(device.used_addresses()),
            Err(e) => debug!("Live peers of {} not consulted: {}", server.id, e),
        }
        addresses = vec![allocate_address(&server.network, &used)?.to_string()];
    }
    let allowed_ips = parse_allowed_ips(&addresses)?;

    let mut client = ClientRecord::new(server.id.clone(), req.name.trim());
    client.email = req.email.trim().to_string();
    client.private_key = private_key.to_base64();
    client.public_key = private_key.public_key().to_base64();
    client.allowed_ips = addresses.join(", ");

    let peer = PeerConfig::new(private_key.public_key())
        .with_allowed_ips(allowed_ips)
        .with_keepalive(keepalive(&state));
    let config = DeviceConfig::new(server.id.clone()).with_peer(peer);
    reconcile(&state, "create client", move |manager| {
        manager.configure_server(&config)
    })
    .await?;

    state.store.add_client(client.clone());
    info!("Created client {} on {}", client.id, server.id);
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(client))))
}

/// Render the client config file and mark it downloaded
pub async fn client_config(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> std::result::Result<Response, ApiError> {
    let mut client = require_client(&state, &id)?;
    let server = require_server(&state, &client.server_id)?;

    let private_key = if client.private_key.is_empty() {
        None
    } else {
        Some(PrivateKey::from_base64(&client.private_key)?)
    };
    let config = ClientConfig {
        private_key,
        addresses: client.addresses(),
        dns: Some(server.dns.clone()),
        server_public_key: PublicKey::from_base64(&server.public_key)?,
        endpoint: Some(server.endpoint.clone()),
        allowed_ips: Some(server.allowed_ips.clone()),
    };
    let body = config.render()?;

    client.downloaded = true;
    client.download_at = Some(Utc::now());
    let client = state.store.update_client(client);

    let disposition = format!("attachment; filename={}.conf", file_stem(&client.name));
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}

/// Remove the client's peer but keep the record
pub async fn disable_client(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<()> {
    let mut client = require_client(&state, &id)?;

    let (device, key) = (client.server_id.clone(), client.public_key.clone());
    reconcile(&state, "disable client", move |manager| {
        manager.remove_peer(&device, &key)
    })
    .await?;

    client.is_disabled = true;
    client.is_active = false;
    state.store.update_client(client);
    Ok((StatusCode::OK, Json(ApiResponse::message("Client disabled"))))
}

/// Re-add the client's peer with its stored addresses
pub async fn enable_client(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<()> {
    let mut client = require_client(&state, &id)?;
    let server = require_server(&state, &client.server_id)?;

    let peer = client_peer(&state, &client)?;
    let config = DeviceConfig::new(server.id).with_peer(peer);
    reconcile(&state, "enable client", move |manager| {
        manager.configure_server(&config)
    })
    .await?;

    client.is_disabled = false;
    client.is_active = true;
    state.store.update_client(client);
    Ok((StatusCode::OK, Json(ApiResponse::message("Client enabled"))))
}

/// Remove the client's peer and delete the record
pub async fn delete_client(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<()> {
    if let Some(client) = state.store.get_client(&id) {
        let (device, key) = (client.server_id, client.public_key);
        reconcile(&state, "delete client", move |manager| {
            manager.remove_peer(&device, &key)
        })
        .await?;
    }

    state.store.delete_client(&id);
    Ok((StatusCode::OK, Json(ApiResponse::message("Client deleted"))))
}

// ============================================================================
// Stats & Health
// ============================================================================

pub async fn get_stats(State(state): State<Arc<AppState>>) -> ApiResult<Stats> {
    Ok((StatusCode::OK, Json(ApiResponse::ok(state.store.stats()))))
}

pub async fn health_check() -> &'static str {
    "OK"
}

/// Characters safe to put in a download file name
fn file_stem(name: &str) -> String {
    let stem: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if stem.is_empty() {
        "client".to_string()
    } else {
        stem
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem("laptop-1"), "laptop-1");
        assert_eq!(file_stem("my phone/2"), "my_phone_2");
        assert_eq!(file_stem(""), "client");
    }

    #[test]
    fn test_check_network_and_endpoint() {
        assert!(check_network("").is_ok());
        assert!(check_network("10.0.0.0/24").is_ok());
        assert!(matches!(
            check_network("10.0.0.0"),
            Err(WgManagerError::InvalidNetwork(_))
        ));
        assert!(check_endpoint("").is_ok());
        assert!(check_endpoint("vpn.example.com:51820").is_ok());
        assert!(check_endpoint("vpn.example.com").is_err());
    }

    #[test]
    fn test_parse_or_generate() {
        let key = PrivateKey::generate().unwrap();
        let parsed = parse_or_generate(Some(&key.to_base64())).unwrap();
        assert_eq!(parsed, key);
        assert!(parse_or_generate(Some("  ")).is_ok());
        assert!(parse_or_generate(None).is_ok());
        assert!(parse_or_generate(Some("bogus")).is_err());
    }
}
