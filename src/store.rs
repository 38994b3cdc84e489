//! In-memory record storage
//!
//! Server and client records as the API layer sees them. The store holds
//! plain data only; it never talks to the control surface.

use crate::wireguard::Device;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::info;
use uuid::Uuid;

/// A WireGuard server (one interface)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerRecord {
    /// Same as the interface name
    pub id: String,
    /// Interface name
    pub name: String,
    /// UDP listen port, 0 when unset
    pub listen_port: u16,
    /// Base64 private key; kept in memory, never serialized
    #[serde(skip_serializing, default)]
    pub private_key: String,
    /// Base64 public key
    pub public_key: String,
    /// Client address pool, e.g. `10.0.0.0/24`
    pub network: String,
    /// DNS handed to clients
    pub dns: String,
    /// Networks clients route through the tunnel, e.g. `0.0.0.0/0`
    pub allowed_ips: String,
    /// Public `host:port` of the server
    pub endpoint: String,
    /// Whether the interface is in use
    pub is_active: bool,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

/// A client (one peer on a server)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientRecord {
    /// Random UUID
    pub id: String,
    /// Id of the owning server
    pub server_id: String,
    /// Display name
    pub name: String,
    /// Contact address, may be empty
    pub email: String,
    /// Base64 private key; kept in memory, never serialized
    #[serde(skip_serializing, default)]
    pub private_key: String,
    /// Base64 public key, the peer identity
    pub public_key: String,
    /// Comma separated client addresses
    pub allowed_ips: String,
    /// Whether the peer has handshaken (adopted) or was enabled
    pub is_active: bool,
    /// Peer removed from the interface, record kept
    pub is_disabled: bool,
    /// Whether the client config has been downloaded
    pub downloaded: bool,
    /// When the client config was last downloaded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_at: Option<DateTime<Utc>>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

/// Aggregate client counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    /// All clients
    pub total_clients: usize,
    /// Active and not disabled
    pub active_clients: usize,
    /// Disabled clients
    pub disabled_clients: usize,
    /// Clients whose config was downloaded
    pub downloaded_count: usize,
}

impl ServerRecord {
    /// A fresh active record whose id is the interface name
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let now = Utc::now();
        Self {
            id: name.clone(),
            name,
            listen_port: 0,
            private_key: String::new(),
            public_key: String::new(),
            network: String::new(),
            dns: String::new(),
            allowed_ips: String::new(),
            endpoint: String::new(),
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }
}

impl ClientRecord {
    /// A fresh active record with a random id
    pub fn new(server_id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            server_id: server_id.into(),
            name: name.into(),
            email: String::new(),
            private_key: String::new(),
            public_key: String::new(),
            allowed_ips: String::new(),
            is_active: true,
            is_disabled: false,
            downloaded: false,
            download_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Client addresses, split on commas with blanks dropped
    pub fn addresses(&self) -> Vec<String> {
        split_list(&self.allowed_ips)
    }
}

/// Split a comma separated list, trimming and dropping empty entries
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Default)]
struct Records {
    servers: BTreeMap<String, ServerRecord>,
    clients: HashMap<String, ClientRecord>,
}

/// Thread-safe record store
#[derive(Debug, Default)]
pub struct Store {
    records: RwLock<Records>,
}

impl Store {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Records> {
        self.records.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Records> {
        self.records.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or overwrite a server
    pub fn add_server(&self, server: ServerRecord) {
        self.write().servers.insert(server.id.clone(), server);
    }

    /// Look up a server by id
    pub fn get_server(&self, id: &str) -> Option<ServerRecord> {
        self.read().servers.get(id).cloned()
    }

    /// The server with the lowest id, if any
    pub fn first_server(&self) -> Option<ServerRecord> {
        self.read().servers.values().next().cloned()
    }

    /// Overwrite a server, stamping `updated_at`
    pub fn update_server(&self, mut server: ServerRecord) -> ServerRecord {
        server.updated_at = Utc::now();
        self.write().servers.insert(server.id.clone(), server.clone());
        server
    }

    /// Remove a server together with all of its clients
    pub fn delete_server(&self, id: &str) -> Option<ServerRecord> {
        let mut records = self.write();
        let removed = records.servers.remove(id);
        records.clients.retain(|_, client| client.server_id != id);
        removed
    }

    /// Insert or overwrite a client
    pub fn add_client(&self, client: ClientRecord) {
        self.write().clients.insert(client.id.clone(), client);
    }

    /// Look up a client by id
    pub fn get_client(&self, id: &str) -> Option<ClientRecord> {
        self.read().clients.get(id).cloned()
    }

    /// Overwrite a client, stamping `updated_at`
    pub fn update_client(&self, mut client: ClientRecord) -> ClientRecord {
        client.updated_at = Utc::now();
        self.write().clients.insert(client.id.clone(), client.clone());
        client
    }

    /// Remove a client, returning it if it existed
    pub fn delete_client(&self, id: &str) -> Option<ClientRecord> {
        self.write().clients.remove(id)
    }

    /// All clients, oldest first
    pub fn clients(&self) -> Vec<ClientRecord> {
        let mut clients: Vec<ClientRecord> = self.read().clients.values().cloned().collect();
        clients.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        clients
    }

    /// Clients of one server, oldest first
    pub fn clients_for_server(&self, server_id: &str) -> Vec<ClientRecord> {
        let mut clients = self.clients();
        clients.retain(|client| client.server_id == server_id);
        clients
    }

    /// Client counts across all servers
    pub fn stats(&self) -> Stats {
        let records = self.read();
        let mut stats = Stats::default();
        for client in records.clients.values() {
            stats.total_clients += 1;
            if client.is_active && !client.is_disabled {
                stats.active_clients += 1;
            }
            if client.is_disabled {
                stats.disabled_clients += 1;
            }
            if client.downloaded {
                stats.downloaded_count += 1;
            }
        }
        stats
    }

    /// Client addresses of a server with any mask suffix stripped
    pub fn used_addresses(&self, server_id: &str) -> HashSet<String> {
        self.read()
            .clients
            .values()
            .filter(|client| client.server_id == server_id)
            .flat_map(|client| client.addresses())
            .map(|addr| match addr.split_once('/') {
                Some((host, _)) => host.to_string(),
                None => addr,
            })
            .collect()
    }

    /// Import live devices as server and client records.
    ///
    /// Each device becomes a server keyed by its name; each peer becomes a
    /// client named after its public key, active iff it has handshaken.
    pub fn adopt_devices(&self, devices: &[Device]) {
        let now = Utc::now();
        let mut records = self.write();
        let mut adopted_peers = 0;

        for device in devices {
            let mut server = ServerRecord::new(device.name.clone());
            server.listen_port = device.listen_port;
            server.created_at = now;
            server.updated_at = now;
            if let Some(key) = &device.private_key {
                server.private_key = key.to_base64();
            }
            if let Some(key) = &device.public_key {
                server.public_key = key.to_base64();
            }

            for peer in &device.peers {
                let key = peer.public_key.map(|k| k.to_base64()).unwrap_or_default();
                let mut client = ClientRecord::new(device.name.clone(), key.clone());
                client.public_key = key;
                client.allowed_ips = peer
                    .allowed_ips
                    .iter()
                    .map(|net| net.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                client.is_active = peer.is_active();
                client.created_at = now;
                client.updated_at = now;
                records.clients.insert(client.id.clone(), client);
                adopted_peers += 1;
            }

            records.servers.insert(server.id.clone(), server);
        }

        if !devices.is_empty() {
            info!(
                "Adopted {} device(s) with {} peer(s)",
                devices.len(),
                adopted_peers
            );
        }
    }
}
