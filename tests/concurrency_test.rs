//! Serialization tests for the reconciliation manager
//!
//! An instrumented control surface records how many calls are in flight at
//! once; the manager must never let two overlap.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use wg_manager::backend::{BackendType, ControlSurface, MemoryControl};
use wg_manager::wireguard::{DeviceConfig, PeerConfig, PrivateKey, PublicKey};
use wg_manager::{Result, WgManager};

/// Wraps the in-memory surface and tracks overlapping calls
struct Instrumented {
    inner: MemoryControl,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    calls: AtomicUsize,
}

impl Instrumented {
    fn new() -> Self {
        Self {
            inner: MemoryControl::new(),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    fn track<T>(&self, f: impl FnOnce() -> T) -> T {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(1));
        let result = f();
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

impl ControlSurface for Instrumented {
    fn backend_type(&self) -> BackendType {
        BackendType::Memory
    }

    fn is_available(&self) -> bool {
        true
    }

    fn dump(&self, device: Option<&str>) -> Result<String> {
        self.track(|| self.inner.dump(device))
    }

    fn ensure_device(&self, name: &str) -> Result<()> {
        self.track(|| self.inner.ensure_device(name))
    }

    fn set_private_key(&self, name: &str, key: &PrivateKey) -> Result<()> {
        self.track(|| self.inner.set_private_key(name, key))
    }

    fn set_listen_port(&self, name: &str, port: u16) -> Result<()> {
        self.track(|| self.inner.set_listen_port(name, port))
    }

    fn configure_peer(&self, name: &str, peer: &PeerConfig) -> Result<()> {
        self.track(|| self.inner.configure_peer(name, peer))
    }

    fn remove_peer(&self, name: &str, public_key: &PublicKey) -> Result<()> {
        self.track(|| self.inner.remove_peer(name, public_key))
    }

    fn delete_device(&self, name: &str) -> Result<()> {
        self.track(|| self.inner.delete_device(name))
    }
}

fn peer() -> PeerConfig {
    PeerConfig::new(PrivateKey::generate().unwrap().public_key())
}

#[test]
fn test_concurrent_configure_calls_never_overlap() {
    let backend = Arc::new(Instrumented::new());
    let manager = Arc::new(WgManager::new(backend.clone()));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let manager = manager.clone();
            thread::spawn(move || {
                let config = DeviceConfig::new("wg0")
                    .with_private_key(PrivateKey::generate().unwrap())
                    .with_listen_port(51820 + i)
                    .with_peer(peer())
                    .with_peer(peer());
                manager.configure_server(&config).unwrap();
                manager.get_device("wg0").unwrap();
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(backend.max_in_flight.load(Ordering::SeqCst), 1);
    assert!(backend.calls.load(Ordering::SeqCst) >= 8 * 6);
    assert_eq!(manager.get_device("wg0").unwrap().peers.len(), 16);
}

#[test]
fn test_replace_never_observes_partial_peer_sets() {
    let backend = Arc::new(Instrumented::new());
    let manager = Arc::new(WgManager::new(backend.clone()));
    manager.configure_server(&DeviceConfig::new("wg0")).unwrap();

    let writers: Vec<_> = (0..4)
        .map(|_| {
            let manager = manager.clone();
            thread::spawn(move || {
                for _ in 0..5 {
                    let config = DeviceConfig::new("wg0")
                        .replacing_peers()
                        .with_peer(peer())
                        .with_peer(peer())
                        .with_peer(peer());
                    manager.configure_server(&config).unwrap();
                }
            })
        })
        .collect();

    let reader = {
        let manager = manager.clone();
        thread::spawn(move || {
            for _ in 0..20 {
                let count = manager.get_device("wg0").unwrap().peers.len();
                assert!(count == 0 || count == 3, "observed {} peers", count);
            }
        })
    };

    for handle in writers {
        handle.join().unwrap();
    }
    reader.join().unwrap();

    assert_eq!(backend.max_in_flight.load(Ordering::SeqCst), 1);
    assert_eq!(manager.get_device("wg0").unwrap().peers.len(), 3);
}

#[test]
fn test_mixed_operations_serialize() {
    let backend = Arc::new(Instrumented::new());
    let manager = Arc::new(WgManager::new(backend.clone()));

    let handles: Vec<_> = (0..6)
        .map(|i| {
            let manager = manager.clone();
            thread::spawn(move || {
                let name = format!("wg{}", i % 2);
                let key = PrivateKey::generate().unwrap().public_key();
                let config = DeviceConfig::new(name.clone()).with_peer(PeerConfig::new(key));
                manager.configure_server(&config).unwrap();
                manager.remove_peer(&name, &key.to_base64()).unwrap();
                manager.list_devices().unwrap();
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(backend.max_in_flight.load(Ordering::SeqCst), 1);
    for device in manager.list_devices().unwrap() {
        assert!(device.peers.is_empty());
    }
}
