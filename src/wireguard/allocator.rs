//! IPv4 address allocation inside a server network
//!
//! Offset 0 is the network address, offset 1 belongs to the server's own
//! interface and the last offset is broadcast; clients are handed the lowest
//! free offset from 2 upwards so repeated allocation over the same used set
//! is reproducible.

use crate::error::{Result, WgManagerError};
use ipnet::IpNet;
use std::collections::HashSet;
use std::net::Ipv4Addr;

/// First host offset handed to clients
pub const FIRST_CLIENT_OFFSET: u64 = 2;

/// Pick the lowest unused client address in `cidr`.
///
/// `used` holds dotted-decimal addresses without mask suffix.
pub fn allocate_address(cidr: &str, used: &HashSet<String>) -> Result<Ipv4Addr> {
    let cidr = cidr.trim();
    if cidr.is_empty() {
        return Err(WgManagerError::InvalidNetwork(
            "network is required".to_string(),
        ));
    }

    let network = match cidr.parse::<IpNet>() {
        Ok(IpNet::V4(network)) => network,
        Ok(IpNet::V6(_)) => {
            return Err(WgManagerError::InvalidNetwork(format!(
                "{}: only IPv4 networks are supported",
                cidr
            )))
        }
        Err(e) => {
            return Err(WgManagerError::InvalidNetwork(format!(
                "parse cidr {}: {}",
                cidr, e
            )))
        }
    };

    let host_bits = 32 - u32::from(network.prefix_len());
    if host_bits <= 1 {
        return Err(WgManagerError::NetworkTooSmall(cidr.to_string()));
    }

    let base = u32::from(network.network());
    let total = 1u64 << host_bits;
    for offset in FIRST_CLIENT_OFFSET..total - 1 {
        // offset < 2^32 - 1 and base has the host bits cleared
        let candidate = Ipv4Addr::from(base + offset as u32);
        if !used.contains(&candidate.to_string()) {
            return Ok(candidate);
        }
    }

    Err(WgManagerError::AddressesExhausted(cidr.to_string()))
}
