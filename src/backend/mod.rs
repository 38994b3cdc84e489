//! WireGuard control surfaces
//!
//! The reconciliation manager drives the host through the [`ControlSurface`]
//! capability and never knows which implementation is active:
//!
//! 1. **Command** - shells out to the `wg` and `ip` tools
//! 2. **Memory** - in-process emulation, for development without privileges
//!
//! Implementations are not required to be safe under interleaved mutation;
//! the manager serializes every call.

mod command;
mod memory;

pub use command::{peer_set_args, tag_raw_dump, CommandControl};
pub use memory::MemoryControl;

use crate::config::WireGuardConfig;
use crate::error::{Result, WgManagerError};
use crate::wireguard::{parse_dump_str, PeerConfig, PrivateKey, PublicKey};
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Operations the host's WireGuard control mechanism must offer
#[cfg_attr(test, mockall::automock)]
pub trait ControlSurface: Send + Sync {
    /// Which implementation this is
    fn backend_type(&self) -> BackendType;

    /// Whether the control mechanism is present on this host
    fn is_available(&self) -> bool;

    /// Raw dump text for one device, or for all devices when `device` is `None`.
    ///
    /// A missing device is reported as a command failure with exit status 1.
    fn dump<'a>(&self, device: Option<&'a str>) -> Result<String>;

    /// Create the device as a WireGuard link if absent, then bring it up
    fn ensure_device(&self, name: &str) -> Result<()>;

    /// Install the device private key
    fn set_private_key(&self, name: &str, key: &PrivateKey) -> Result<()>;

    /// Set the listen port; 0 leaves the current port unchanged
    fn set_listen_port(&self, name: &str, port: u16) -> Result<()>;

    /// Add, update or remove one peer
    fn configure_peer(&self, name: &str, peer: &PeerConfig) -> Result<()>;

    /// Remove exactly one peer
    fn remove_peer(&self, name: &str, public_key: &PublicKey) -> Result<()>;

    /// Delete the device link; a missing device is not an error
    fn delete_device(&self, name: &str) -> Result<()>;

    /// Remove every peer with a valid public key, leaving identity and port.
    ///
    /// There is no bulk primitive, so this enumerates the dump and removes
    /// peers one at a time.
    fn clear_all_peers(&self, name: &str) -> Result<()> {
        let text = match self.dump(Some(name)) {
            Ok(text) => text,
            Err(e) if e.is_no_such_device() => {
                debug!("No device {} to clear", name);
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let devices = parse_dump_str(&text);
        let Some(device) = devices.iter().find(|d| d.name == name) else {
            return Ok(());
        };

        let keys: Vec<PublicKey> = device
            .peers
            .iter()
            .filter_map(|peer| peer.public_key)
            .filter(|key| !key.is_zero())
            .collect();
        for key in &keys {
            self.remove_peer(name, key)?;
        }

        if !keys.is_empty() {
            info!("Cleared {} peer(s) from {}", keys.len(), name);
        }
        Ok(())
    }
}

/// Control surface implementation type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// `wg` + `ip` command-line tools
    #[default]
    Command,
    /// In-process emulation
    Memory,
}

impl fmt::Display for BackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendType::Command => write!(f, "command"),
            BackendType::Memory => write!(f, "memory"),
        }
    }
}

/// Build the control surface selected in the configuration
pub fn create_backend(config: &WireGuardConfig) -> Arc<dyn ControlSurface> {
    match config.backend {
        BackendType::Command => Arc::new(CommandControl::with_paths(
            config.wg_path.clone(),
            config.ip_path.clone(),
        )),
        BackendType::Memory => Arc::new(MemoryControl::new()),
    }
}

/// Append `requested` networks the peer does not already have
pub fn merge_allowed_ips(current: &[IpNet], requested: &[IpNet]) -> Vec<IpNet> {
    let mut merged = current.to_vec();
    for net in requested {
        if !merged.contains(net) {
            merged.push(*net);
        }
    }
    merged
}

/// Reject the all-zero key before anything reaches the host
pub(crate) fn require_peer_key(key: &PublicKey) -> Result<()> {
    if key.is_zero() {
        return Err(WgManagerError::MissingPeerKey);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NO_SUCH_DEVICE_STATUS;
    use crate::wireguard::parse_allowed_ips;

    #[test]
    fn test_backend_type_display_and_serde() {
        assert_eq!(BackendType::Command.to_string(), "command");
        assert_eq!(BackendType::Memory.to_string(), "memory");
        let parsed: BackendType = serde_json::from_str("\"memory\"").unwrap();
        assert_eq!(parsed, BackendType::Memory);
        assert_eq!(BackendType::default(), BackendType::Command);
    }

    #[test]
    fn test_create_backend_memory() {
        let config = WireGuardConfig {
            backend: BackendType::Memory,
            ..Default::default()
        };
        let backend = create_backend(&config);
        assert_eq!(backend.backend_type(), BackendType::Memory);
        assert!(backend.is_available());
    }

    #[test]
    fn test_merge_allowed_ips_keeps_order_and_dedupes() {
        let current = parse_allowed_ips(&["10.0.0.2/32", "10.1.0.0/24"]).unwrap();
        let requested = parse_allowed_ips(&["10.1.0.0/24", "10.0.0.9/32"]).unwrap();
        let merged = merge_allowed_ips(&current, &requested);
        assert_eq!(
            merged,
            parse_allowed_ips(&["10.0.0.2/32", "10.1.0.0/24", "10.0.0.9/32"]).unwrap()
        );
    }

    #[test]
    fn test_clear_all_peers_on_memory_backend() {
        let backend = MemoryControl::new();
        backend.ensure_device("wg0").unwrap();
        for _ in 0..3 {
            let key = PrivateKey::generate().unwrap().public_key();
            backend
                .configure_peer("wg0", &PeerConfig::new(key))
                .unwrap();
        }
        backend.set_listen_port("wg0", 51820).unwrap();

        backend.clear_all_peers("wg0").unwrap();

        let devices = parse_dump_str(&backend.dump(Some("wg0")).unwrap());
        assert!(devices[0].peers.is_empty());
        assert_eq!(devices[0].listen_port, 51820);
    }

    #[test]
    fn test_clear_all_peers_missing_device_is_ok() {
        let backend = MemoryControl::new();
        assert!(backend.clear_all_peers("wg7").is_ok());
    }

    #[test]
    fn test_mock_surface_reports_unavailable() {
        let mut mock = MockControlSurface::new();
        mock.expect_dump()
            .withf(|device| *device == Some("wg0"))
            .returning(|_| Err(WgManagerError::Unavailable("wg".to_string())));
        assert!(mock.dump(Some("wg0")).unwrap_err().is_unavailable());

        let mut missing = MockControlSurface::new();
        missing.expect_dump().returning(|_| {
            Err(WgManagerError::CommandFailed {
                command: "wg show wg0 dump".to_string(),
                status: Some(NO_SUCH_DEVICE_STATUS),
                output: "No such device".to_string(),
            })
        });
        assert!(missing.dump(None).unwrap_err().is_no_such_device());
    }
}
