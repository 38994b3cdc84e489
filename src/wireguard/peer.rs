//! WireGuard peer management
//!
//! Live peer records (as reported by the interface dump) and the peer
//! configuration requests applied through a control surface.

use crate::error::{Result, WgManagerError};
use crate::wireguard::PublicKey;
use ipnet::IpNet;
use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, SystemTime};

/// A handshake newer than this counts as recent
const RECENT_HANDSHAKE: Duration = Duration::from_secs(180);

/// Peer as reported by the live interface
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Peer {
    /// Peer public key; `None` when the dump carried a malformed key
    pub public_key: Option<PublicKey>,
    /// Last known endpoint
    pub endpoint: Option<SocketAddr>,
    /// Allowed IP networks
    pub allowed_ips: Vec<IpNet>,
    /// Last handshake time, `None` if the peer never completed one
    pub last_handshake: Option<SystemTime>,
}

impl Peer {
    /// Create a peer record for the given key
    pub fn new(public_key: PublicKey) -> Self {
        Self {
            public_key: Some(public_key),
            ..Default::default()
        }
    }

    /// Whether the peer has ever completed a handshake
    pub fn is_active(&self) -> bool {
        self.last_handshake.is_some()
    }

    /// Check if the peer had a recent handshake (within last 3 minutes)
    pub fn has_recent_handshake(&self) -> bool {
        self.last_handshake
            .and_then(|last| last.elapsed().ok())
            .is_some_and(|elapsed| elapsed < RECENT_HANDSHAKE)
    }
}

/// Requested change to a single peer on a device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerConfig {
    /// Target peer
    pub public_key: PublicKey,
    /// Remove the peer instead of adding/updating it
    pub remove: bool,
    /// Replace the peer's allowed IPs instead of merging into them
    pub replace_allowed_ips: bool,
    /// Allowed IP networks
    pub allowed_ips: Vec<IpNet>,
    /// Persistent keepalive interval, `None` leaves it unchanged
    pub persistent_keepalive: Option<Duration>,
}

impl PeerConfig {
    /// Create an add/update request for a peer
    pub fn new(public_key: PublicKey) -> Self {
        Self {
            public_key,
            remove: false,
            replace_allowed_ips: false,
            allowed_ips: Vec::new(),
            persistent_keepalive: None,
        }
    }

    /// Create a removal request for a peer
    pub fn removal(public_key: PublicKey) -> Self {
        Self {
            remove: true,
            ..Self::new(public_key)
        }
    }

    /// Set the full allowed-IP set, replacing whatever the peer has
    pub fn with_allowed_ips(mut self, allowed_ips: Vec<IpNet>) -> Self {
        self.allowed_ips = allowed_ips;
        self.replace_allowed_ips = true;
        self
    }

    /// Add allowed IPs to whatever the peer already has
    pub fn with_additional_ips(mut self, allowed_ips: Vec<IpNet>) -> Self {
        self.allowed_ips = allowed_ips;
        self.replace_allowed_ips = false;
        self
    }

    /// Set persistent keepalive interval
    pub fn with_keepalive(mut self, interval: Duration) -> Self {
        self.persistent_keepalive = Some(interval);
        self
    }

    /// Keepalive rounded to whole seconds and clamped to the wire range
    pub fn keepalive_secs(&self) -> Option<u16> {
        self.persistent_keepalive.map(|interval| {
            let rounded = (interval.as_millis() + 500) / 1000;
            u16::try_from(rounded).unwrap_or(u16::MAX)
        })
    }

    /// Validate the request before it reaches a control surface
    pub fn validate(&self) -> Result<()> {
        if self.public_key.is_zero() {
            return Err(WgManagerError::MissingPeerKey);
        }
        Ok(())
    }
}

/// Parse allowed IPs, treating bare addresses as single-host networks.
///
/// Empty entries are skipped; any other unparseable entry fails the whole list.
pub fn parse_allowed_ips<S: AsRef<str>>(values: &[S]) -> Result<Vec<IpNet>> {
    let mut networks = Vec::with_capacity(values.len());
    for value in values {
        let value = value.as_ref().trim();
        if value.is_empty() {
            continue;
        }

        let network = if value.contains('/') {
            value.parse::<IpNet>().map_err(|e| {
                WgManagerError::InvalidNetwork(format!("parse allowed ip {}: {}", value, e))
            })?
        } else {
            let addr: IpAddr = value.parse().map_err(|e| {
                WgManagerError::InvalidNetwork(format!("parse allowed ip {}: {}", value, e))
            })?;
            IpNet::from(addr)
        };

        networks.push(network.trunc());
    }
    Ok(networks)
}
