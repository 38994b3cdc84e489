//! WireGuard data model
//!
//! Key material, device and peer records, the interface dump parser, client
//! address allocation and client config rendering. Nothing in here touches
//! the host; see [`crate::backend`] for that.

mod allocator;
mod conf;
mod device;
mod dump;
mod keys;
mod peer;

pub use allocator::{allocate_address, FIRST_CLIENT_OFFSET};
pub use conf::{ClientConfig, CLIENT_KEEPALIVE_SECS};
pub use device::{Device, DeviceConfig};
pub use dump::{parse_dump, parse_dump_str, INTERFACE_TAG, NONE_FIELD, PEER_TAG};
pub use keys::{parse_key, KeyPair, PrivateKey, PublicKey, KEY_LEN};
pub use peer::{parse_allowed_ips, Peer, PeerConfig};
