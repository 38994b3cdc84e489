//! Reconciliation manager
//!
//! The only entry point to the control surface. Every operation takes one
//! process-wide lock for its whole duration, so multi-step configuration
//! calls never interleave and reads never observe a half-applied change.
//! Failures propagate unchanged; nothing is retried or rolled back.

use crate::backend::{BackendType, ControlSurface};
use crate::config::validate_interface_name;
use crate::error::{Result, WgManagerError};
use crate::wireguard::{parse_dump_str, Device, DeviceConfig, PublicKey};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, instrument};

/// Serialized façade over a [`ControlSurface`]
pub struct WgManager {
    backend: Arc<dyn ControlSurface>,
    lock: Mutex<()>,
}

impl WgManager {
    /// Create a manager owning the given control surface
    pub fn new(backend: Arc<dyn ControlSurface>) -> Self {
        Self {
            backend,
            lock: Mutex::new(()),
        }
    }

    /// Active control surface type
    pub fn backend_type(&self) -> BackendType {
        self.backend.backend_type()
    }

    /// Whether the control surface is present on this host
    pub fn is_available(&self) -> bool {
        self.backend.is_available()
    }

    fn serialize(&self) -> MutexGuard<'_, ()> {
        // The guarded unit carries no state, so a poisoned lock is still usable
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// List every live device. "Nothing to show" yields an empty list.
    pub fn list_devices(&self) -> Result<Vec<Device>> {
        let _guard = self.serialize();
        match self.backend.dump(None) {
            Ok(text) => Ok(parse_dump_str(&text)),
            Err(e) if e.is_no_such_device() => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    /// Fetch one live device by name
    pub fn get_device(&self, name: &str) -> Result<Device> {
        validate_interface_name(name)?;

        let _guard = self.serialize();
        let text = match self.backend.dump(Some(name)) {
            Ok(text) => text,
            Err(e) if e.is_no_such_device() => {
                return Err(WgManagerError::NotFound(format!("device {}", name)))
            }
            Err(e) => return Err(e),
        };

        parse_dump_str(&text)
            .into_iter()
            .find(|device| device.name == name)
            .ok_or_else(|| WgManagerError::NotFound(format!("device {}", name)))
    }

    /// Bring a device to the requested identity, port and peer set.
    ///
    /// Peers are applied in order; the first failure stops the call and
    /// already-applied peers stay in place.
    #[instrument(skip(self, config), fields(interface = %config.interface))]
    pub fn configure_server(&self, config: &DeviceConfig) -> Result<()> {
        validate_interface_name(&config.interface)?;
        for peer in &config.peers {
            peer.validate()?;
        }

        let name = config.interface.as_str();
        let _guard = self.serialize();

        self.backend.ensure_device(name)?;

        if let Some(key) = &config.private_key {
            self.backend.set_private_key(name, key)?;
        }

        if config.listen_port != 0 {
            self.backend.set_listen_port(name, config.listen_port)?;
        }

        if config.replace_peers {
            self.backend.clear_all_peers(name)?;
        }

        for peer in &config.peers {
            debug!(peer = %peer.public_key, remove = peer.remove, "Applying peer");
            self.backend.configure_peer(name, peer)?;
        }

        info!(
            "Configured {} ({} peer change(s){})",
            name,
            config.peers.len(),
            if config.replace_peers { ", replaced" } else { "" }
        );
        Ok(())
    }

    /// Remove a single peer, given its base64 public key
    pub fn remove_peer(&self, device: &str, public_key: &str) -> Result<()> {
        validate_interface_name(device)?;
        let public_key = public_key.trim();
        if public_key.is_empty() {
            return Err(WgManagerError::MissingPeerKey);
        }
        let key = PublicKey::from_base64(public_key)?;
        if key.is_zero() {
            return Err(WgManagerError::MissingPeerKey);
        }

        let _guard = self.serialize();
        self.backend.remove_peer(device, &key)?;
        info!("Removed peer {} from {}", key, device);
        Ok(())
    }

    /// Remove every peer and delete the device link
    #[instrument(skip(self))]
    pub fn teardown_device(&self, name: &str) -> Result<()> {
        validate_interface_name(name)?;

        let _guard = self.serialize();
        self.backend.clear_all_peers(name)?;
        self.backend.delete_device(name)?;
        info!("Tore down {}", name);
        Ok(())
    }
}
