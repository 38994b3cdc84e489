//! WireGuard device model
//!
//! `Device` is the live state of one interface as read back from a dump;
//! `DeviceConfig` is the desired state handed to the reconciliation manager.

use crate::wireguard::{Peer, PeerConfig, PrivateKey, PublicKey};
use std::collections::HashSet;

/// Live WireGuard interface
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Device {
    /// Interface name (also the kernel link name)
    pub name: String,
    /// Listen port, 0 when unset
    pub listen_port: u16,
    /// Interface private key, if one is installed
    pub private_key: Option<PrivateKey>,
    /// Interface public key
    pub public_key: Option<PublicKey>,
    /// Peers in dump order
    pub peers: Vec<Peer>,
}

impl Device {
    /// Create an empty device record
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Find a peer by public key
    pub fn peer(&self, public_key: &PublicKey) -> Option<&Peer> {
        self.peers
            .iter()
            .find(|peer| peer.public_key.as_ref() == Some(public_key))
    }

    /// Host addresses already assigned to peers of this device
    pub fn used_addresses(&self) -> HashSet<String> {
        self.peers
            .iter()
            .flat_map(|peer| peer.allowed_ips.iter())
            .map(|net| net.addr().to_string())
            .collect()
    }

    /// Number of peers that have completed a handshake
    pub fn active_peer_count(&self) -> usize {
        self.peers.iter().filter(|peer| peer.is_active()).count()
    }

    /// Whether any peer has completed a handshake
    pub fn is_active(&self) -> bool {
        self.peers.iter().any(Peer::is_active)
    }
}

/// Desired configuration for a server interface
#[derive(Debug, Clone, Default)]
pub struct DeviceConfig {
    /// Interface name
    pub interface: String,
    /// Private key to install, `None` leaves the current key
    pub private_key: Option<PrivateKey>,
    /// Listen port, 0 leaves the current port
    pub listen_port: u16,
    /// Remove every existing peer before applying `peers`
    pub replace_peers: bool,
    /// Peer changes, applied in order
    pub peers: Vec<PeerConfig>,
}

impl DeviceConfig {
    /// Create a configuration that only ensures the interface exists
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            ..Default::default()
        }
    }

    /// Install a private key
    pub fn with_private_key(mut self, key: PrivateKey) -> Self {
        self.private_key = Some(key);
        self
    }

    /// Set the listen port
    pub fn with_listen_port(mut self, port: u16) -> Self {
        self.listen_port = port;
        self
    }

    /// Remove all existing peers first
    pub fn replacing_peers(mut self) -> Self {
        self.replace_peers = true;
        self
    }

    /// Append a peer change
    pub fn with_peer(mut self, peer: PeerConfig) -> Self {
        self.peers.push(peer);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wireguard::parse_allowed_ips;
    use std::time::SystemTime;

    #[test]
    fn test_used_addresses_strip_masks() {
        let mut device = Device::new("wg0");
        let mut first = Peer::new(PrivateKey::generate().unwrap().public_key());
        first.allowed_ips = parse_allowed_ips(&["10.0.0.2/32", "10.0.0.3"]).unwrap();
        let mut second = Peer::new(PrivateKey::generate().unwrap().public_key());
        second.allowed_ips = parse_allowed_ips(&["10.0.0.7/32"]).unwrap();
        device.peers = vec![first, second];

        let used = device.used_addresses();
        assert_eq!(used.len(), 3);
        assert!(used.contains("10.0.0.2"));
        assert!(used.contains("10.0.0.3"));
        assert!(used.contains("10.0.0.7"));
    }

    #[test]
    fn test_peer_lookup_and_activity() {
        let key = PrivateKey::generate().unwrap().public_key();
        let mut device = Device::new("wg0");
        assert!(!device.is_active());
        device.peers.push(Peer::default());
        assert!(!device.is_active());

        let mut peer = Peer::new(key);
        peer.last_handshake = Some(SystemTime::now());
        device.peers.push(peer);

        assert!(device.peer(&key).is_some());
        assert_eq!(device.active_peer_count(), 1);
        assert!(device.is_active());
    }

    #[test]
    fn test_device_config_builder() {
        let key = PrivateKey::generate().unwrap();
        let config = DeviceConfig::new("wg0")
            .with_private_key(key.clone())
            .with_listen_port(51820)
            .replacing_peers()
            .with_peer(PeerConfig::new(key.public_key()));

        assert_eq!(config.interface, "wg0");
        assert_eq!(config.private_key, Some(key));
        assert_eq!(config.listen_port, 51820);
        assert!(config.replace_peers);
        assert_eq!(config.peers.len(), 1);
    }
}
