//! Interface dump parser
//!
//! Decodes the tab-separated dump produced by the host's WireGuard status
//! query. Two record kinds exist:
//!
//! ```text
//! interface <name> <private-key> <public-key> <listen-port> ...
//! peer <public-key> <preshared-key> <endpoint> <allowed-ips> <latest-handshake> ...
//! ```
//!
//! A `peer` line belongs to the most recently opened interface. The dump is
//! best-effort kernel output, so malformed fields are skipped one at a time
//! and never abort the listing. Only read errors surface.

use crate::wireguard::{Device, Peer, PrivateKey, PublicKey};
use ipnet::IpNet;
use std::io::{self, BufRead};
use std::net::SocketAddr;
use std::time::{Duration, UNIX_EPOCH};
use tracing::debug;

/// Tag opening a device record
pub const INTERFACE_TAG: &str = "interface";

/// Tag for a peer record
pub const PEER_TAG: &str = "peer";

/// Placeholder the tools print for absent values
pub const NONE_FIELD: &str = "(none)";

/// Parse a dump from any buffered reader
///
/// Lines are decoded lossily, so a non-UTF-8 byte only spoils the field it
/// sits in.
pub fn parse_dump<R: BufRead>(mut reader: R) -> io::Result<Vec<Device>> {
    let mut decoder = DumpDecoder::default();
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&buf);
        decoder.decode_line(line.trim_end_matches('\n'));
    }
    Ok(decoder.devices)
}

/// Parse an in-memory dump; cannot fail
pub fn parse_dump_str(text: &str) -> Vec<Device> {
    let mut decoder = DumpDecoder::default();
    for line in text.lines() {
        decoder.decode_line(line);
    }
    decoder.devices
}

/// Line-at-a-time decoder; the last device is the one peers attach to
#[derive(Default)]
struct DumpDecoder {
    devices: Vec<Device>,
}

impl DumpDecoder {
    fn decode_line(&mut self, line: &str) {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            return;
        }

        let fields: Vec<&str> = line.split('\t').collect();
        match fields[0] {
            INTERFACE_TAG => {
                if let Some(device) = parse_interface(&fields) {
                    self.devices.push(device);
                }
            }
            PEER_TAG => match self.devices.last_mut() {
                Some(current) => {
                    if let Some(peer) = parse_peer(&fields) {
                        current.peers.push(peer);
                    }
                }
                None => debug!("Skipping peer line before any interface line"),
            },
            other => debug!("Skipping unknown dump record '{}'", other),
        }
    }
}

/// A field that is present, non-empty and not the `(none)` placeholder
fn field<'a>(fields: &[&'a str], index: usize) -> Option<&'a str> {
    fields
        .get(index)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty() && *value != NONE_FIELD)
}

fn parse_interface(fields: &[&str]) -> Option<Device> {
    let name = fields.get(1)?;
    let mut device = Device::new(*name);

    if let Some(value) = field(fields, 2) {
        match PrivateKey::from_base64(value) {
            Ok(key) => device.private_key = Some(key),
            Err(_) => debug!("Skipping malformed private key on {}", device.name),
        }
    }

    if let Some(value) = field(fields, 3) {
        match PublicKey::from_base64(value) {
            Ok(key) => device.public_key = Some(key),
            Err(e) => debug!("Skipping malformed public key on {}: {}", device.name, e),
        }
    }

    if device.public_key.is_none() {
        device.public_key = device.private_key.as_ref().map(PrivateKey::public_key);
    }

    device.listen_port = field(fields, 4)
        .and_then(|value| value.parse().ok())
        .unwrap_or(0);

    Some(device)
}

fn parse_peer(fields: &[&str]) -> Option<Peer> {
    if fields.len() < 2 {
        return None;
    }

    let mut peer = Peer {
        public_key: field(fields, 1).and_then(|value| PublicKey::from_base64(value).ok()),
        ..Default::default()
    };

    peer.endpoint = field(fields, 3).and_then(|value| value.parse::<SocketAddr>().ok());

    if let Some(value) = field(fields, 4) {
        for cidr in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            match cidr.parse::<IpNet>() {
                Ok(net) => peer.allowed_ips.push(net.trunc()),
                Err(_) => debug!("Skipping malformed allowed ip '{}'", cidr),
            }
        }
    }

    peer.last_handshake = field(fields, 5)
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .map(|secs| UNIX_EPOCH + Duration::from_secs(secs));

    Some(peer)
}
