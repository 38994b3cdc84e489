//! wg-manager: WireGuard device and peer reconciliation
//!
//! This library keeps a declarative model of a WireGuard server and its
//! clients in line with the live state of the host's WireGuard interfaces.
//!
//! # Architecture
//!
//! All interface mutations go through one [`manager::WgManager`], which
//! serializes calls into a pluggable [`backend::ControlSurface`] (the `wg`
//! and `ip` tools, or an in-process emulation). Live state is read back
//! through the tagged dump format parsed in [`wireguard`].
//!
//! # Modules
//!
//! - `wireguard`: Keys, device/peer models, dump parsing, address allocation
//! - `backend`: Control surfaces that apply changes to the host
//! - `manager`: Serialized reconciliation façade
//! - `store`: In-memory server and client records
//! - `api`: HTTP API over the store and manager
//! - `config`: Configuration parsing and validation
//! - `privileges`: Privilege detection
//! - `error`: Error types and handling

#![warn(clippy::all)]

pub mod api;
pub mod backend;
pub mod config;
pub mod error;
pub mod manager;
pub mod privileges;
pub mod store;
pub mod wireguard;

// Re-export commonly used types
pub use error::{Result, WgManagerError};
pub use manager::WgManager;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
