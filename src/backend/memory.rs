//! In-process WireGuard control surface
//!
//! Keeps device and peer state in memory and renders it in the tagged dump
//! format, so the manager and API can run without privileges or kernel
//! support. Missing devices fail the same way the tools do (exit status 1).

use super::{merge_allowed_ips, require_peer_key, BackendType, ControlSurface};
use crate::error::{Result, WgManagerError, NO_SUCH_DEVICE_STATUS};
use crate::wireguard::{PeerConfig, PrivateKey, PublicKey, INTERFACE_TAG, NONE_FIELD, PEER_TAG};
use ipnet::IpNet;
use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

#[derive(Debug, Default)]
struct MemoryDevice {
    private_key: Option<PrivateKey>,
    listen_port: u16,
    up: bool,
    peers: Vec<MemoryPeer>,
}

#[derive(Debug)]
struct MemoryPeer {
    public_key: PublicKey,
    allowed_ips: Vec<IpNet>,
    keepalive: Option<u16>,
}

/// Emulated control surface
#[derive(Debug)]
pub struct MemoryControl {
    devices: Mutex<BTreeMap<String, MemoryDevice>>,
    available: bool,
}

impl MemoryControl {
    /// Create an empty host with no devices
    pub fn new() -> Self {
        Self {
            devices: Mutex::new(BTreeMap::new()),
            available: true,
        }
    }

    /// A host without WireGuard support: every operation reports `Unavailable`
    pub fn offline() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    /// Whether the device exists and is administratively up
    pub fn is_up(&self, name: &str) -> bool {
        self.lock().get(name).is_some_and(|d| d.up)
    }

    /// Names of all devices
    pub fn device_names(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, MemoryDevice>> {
        self.devices.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_available(&self) -> Result<()> {
        if self.available {
            Ok(())
        } else {
            Err(WgManagerError::Unavailable(
                "in-memory control surface is offline".to_string(),
            ))
        }
    }

    fn with_device<T>(
        &self,
        op: &str,
        name: &str,
        f: impl FnOnce(&mut MemoryDevice) -> T,
    ) -> Result<T> {
        self.check_available()?;
        let mut devices = self.lock();
        match devices.get_mut(name) {
            Some(device) => Ok(f(device)),
            None => Err(no_such_device(op, name)),
        }
    }
}

impl Default for MemoryControl {
    fn default() -> Self {
        Self::new()
    }
}

fn no_such_device(op: &str, name: &str) -> WgManagerError {
    WgManagerError::CommandFailed {
        command: format!("{} {}", op, name),
        status: Some(NO_SUCH_DEVICE_STATUS),
        output: format!("Unable to access interface {}: No such device", name),
    }
}

fn render_device(out: &mut String, name: &str, device: &MemoryDevice) {
    let (private, public) = match &device.private_key {
        Some(key) => (key.to_base64(), key.public_key().to_base64()),
        None => (NONE_FIELD.to_string(), NONE_FIELD.to_string()),
    };
    // Writing into a String cannot fail
    let _ = writeln!(
        out,
        "{}\t{}\t{}\t{}\t{}\toff",
        INTERFACE_TAG, name, private, public, device.listen_port
    );

    for peer in &device.peers {
        let allowed = if peer.allowed_ips.is_empty() {
            NONE_FIELD.to_string()
        } else {
            peer.allowed_ips
                .iter()
                .map(|net| net.to_string())
                .collect::<Vec<_>>()
                .join(",")
        };
        let keepalive = match peer.keepalive {
            Some(secs) if secs > 0 => secs.to_string(),
            _ => "off".to_string(),
        };
        let _ = writeln!(
            out,
            "{}\t{}\t{}\t{}\t{}\t0\t0\t0\t{}",
            PEER_TAG,
            peer.public_key.to_base64(),
            NONE_FIELD,
            NONE_FIELD,
            allowed,
            keepalive
        );
    }
}

impl ControlSurface for MemoryControl {
    fn backend_type(&self) -> BackendType {
        BackendType::Memory
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn dump(&self, device: Option<&str>) -> Result<String> {
        self.check_available()?;
        let devices = self.lock();
        let mut out = String::new();
        match device {
            Some(name) => {
                let found = devices
                    .get(name)
                    .ok_or_else(|| no_such_device("show", name))?;
                render_device(&mut out, name, found);
            }
            None => {
                for (name, found) in devices.iter() {
                    render_device(&mut out, name, found);
                }
            }
        }
        Ok(out)
    }

    fn ensure_device(&self, name: &str) -> Result<()> {
        self.check_available()?;
        let mut devices = self.lock();
        let device = devices.entry(name.to_string()).or_insert_with(|| {
            debug!("Creating in-memory interface {}", name);
            MemoryDevice::default()
        });
        device.up = true;
        Ok(())
    }

    fn set_private_key(&self, name: &str, key: &PrivateKey) -> Result<()> {
        self.with_device("set private-key", name, |device| {
            device.private_key = Some(key.clone());
        })
    }

    fn set_listen_port(&self, name: &str, port: u16) -> Result<()> {
        if port == 0 {
            return Ok(());
        }
        self.with_device("set listen-port", name, |device| {
            device.listen_port = port;
        })
    }

    fn configure_peer(&self, name: &str, peer: &PeerConfig) -> Result<()> {
        peer.validate()?;
        if peer.remove {
            return self.remove_peer(name, &peer.public_key);
        }

        self.with_device("set peer", name, |device| {
            let index = match device
                .peers
                .iter()
                .position(|p| p.public_key == peer.public_key)
            {
                Some(index) => index,
                None => {
                    device.peers.push(MemoryPeer {
                        public_key: peer.public_key,
                        allowed_ips: Vec::new(),
                        keepalive: None,
                    });
                    device.peers.len() - 1
                }
            };

            let existing = &mut device.peers[index];
            existing.allowed_ips = if peer.replace_allowed_ips {
                peer.allowed_ips.clone()
            } else {
                merge_allowed_ips(&existing.allowed_ips, &peer.allowed_ips)
            };
            if let Some(secs) = peer.keepalive_secs() {
                existing.keepalive = Some(secs);
            }

            // A prefix belongs to one peer per device; the latest assignment wins
            for (other_index, other) in device.peers.iter_mut().enumerate() {
                if other_index != index {
                    other.allowed_ips.retain(|net| !peer.allowed_ips.contains(net));
                }
            }
        })
    }

    fn remove_peer(&self, name: &str, public_key: &PublicKey) -> Result<()> {
        require_peer_key(public_key)?;
        self.with_device("set peer remove", name, |device| {
            device.peers.retain(|p| p.public_key != *public_key);
        })
    }

    fn delete_device(&self, name: &str) -> Result<()> {
        self.check_available()?;
        if self.lock().remove(name).is_some() {
            debug!("Deleted in-memory interface {}", name);
        }
        Ok(())
    }
}
