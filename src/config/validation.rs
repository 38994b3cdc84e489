//! Input validation functions
//!
//! Interface names are also the kernel link names, so they follow the
//! kernel's length limit.

use crate::error::{Result, WgManagerError};
use std::net::IpAddr;

/// Longest interface name the kernel accepts
const MAX_INTERFACE_NAME: usize = 15;

/// Validate interface name (alphanumeric, '_', '-' or '.', max 15 chars)
pub fn validate_interface_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(WgManagerError::Validation(
            "Interface name cannot be empty".to_string(),
        ));
    }

    if name.len() > MAX_INTERFACE_NAME {
        return Err(WgManagerError::Validation(format!(
            "Interface name '{}' exceeds maximum length of {} characters",
            name, MAX_INTERFACE_NAME
        )));
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
    {
        return Err(WgManagerError::Validation(format!(
            "Interface name '{}' contains invalid characters (only alphanumeric, '_', '-' and '.' allowed)",
            name
        )));
    }

    Ok(())
}

/// Validate a listening port for the HTTP server
pub fn validate_port(port: u16) -> Result<()> {
    if port == 0 {
        return Err(WgManagerError::Config("Port number cannot be 0".to_string()));
    }
    Ok(())
}

/// Validate IP address
pub fn validate_ip_address(ip: &str) -> Result<()> {
    ip.parse::<IpAddr>()
        .map_err(|_| WgManagerError::Config(format!("Invalid IP address: {}", ip)))?;
    Ok(())
}

/// Validate endpoint format (host:port)
pub fn validate_endpoint(endpoint: &str) -> Result<()> {
    let Some((host, port)) = endpoint.rsplit_once(':') else {
        return Err(WgManagerError::Validation(format!(
            "Invalid endpoint format: {} (expected format: host:port)",
            endpoint
        )));
    };

    let port: u16 = port.parse().map_err(|_| {
        WgManagerError::Validation(format!("Invalid port in endpoint: {}", endpoint))
    })?;
    if port == 0 {
        return Err(WgManagerError::Validation(
            "Port number cannot be 0".to_string(),
        ));
    }

    // Host may be a name or an address
    if host.is_empty() {
        return Err(WgManagerError::Validation(
            "Host cannot be empty in endpoint".to_string(),
        ));
    }

    Ok(())
}

/// Validate a tool path or command name
pub fn validate_tool_path(path: &str) -> Result<()> {
    if path.trim().is_empty() {
        return Err(WgManagerError::Config(
            "Tool path cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// Validate keepalive interval
pub fn validate_keepalive(secs: u16) -> Result<()> {
    // 0 disables; otherwise 10-300 seconds
    if secs > 0 && secs < 10 {
        return Err(WgManagerError::Config(format!(
            "Keepalive interval {} is too short (minimum 10 seconds or 0 to disable)",
            secs
        )));
    }

    if secs > 300 {
        return Err(WgManagerError::Config(format!(
            "Keepalive interval {} is too long (maximum 300 seconds)",
            secs
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_interface_name() {
        assert!(validate_interface_name("wg0").is_ok());
        assert!(validate_interface_name("wg-test").is_ok());
        assert!(validate_interface_name("wg_test").is_ok());
        assert!(validate_interface_name("wg.10").is_ok());
        assert!(validate_interface_name("").is_err());
        assert!(validate_interface_name("wg@test").is_err());
        assert!(validate_interface_name("wg 0").is_err());
        assert!(validate_interface_name("toolonginterfacename").is_err());
        assert!(matches!(
            validate_interface_name(""),
            Err(WgManagerError::Validation(_))
        ));
    }

    #[test]
    fn test_validate_port() {
        assert!(validate_port(8080).is_ok());
        assert!(validate_port(0).is_err());
    }

    #[test]
    fn test_validate_ip_address() {
        assert!(validate_ip_address("192.168.1.1").is_ok());
        assert!(validate_ip_address("::1").is_ok());
        assert!(validate_ip_address("invalid").is_err());
        assert!(validate_ip_address("256.1.1.1").is_err());
    }

    #[test]
    fn test_validate_endpoint() {
        assert!(validate_endpoint("example.com:51820").is_ok());
        assert!(validate_endpoint("192.168.1.1:51820").is_ok());
        assert!(validate_endpoint("[::1]:51820").is_ok());
        assert!(validate_endpoint("invalid").is_err());
        assert!(validate_endpoint("example.com:0").is_err());
        assert!(validate_endpoint(":51820").is_err());
    }

    #[test]
    fn test_validate_keepalive() {
        assert!(validate_keepalive(0).is_ok());
        assert!(validate_keepalive(25).is_ok());
        assert!(validate_keepalive(300).is_ok());
        assert!(validate_keepalive(5).is_err());
        assert!(validate_keepalive(301).is_err());
    }

    #[test]
    fn test_validate_tool_path() {
        assert!(validate_tool_path("wg").is_ok());
        assert!(validate_tool_path("  ").is_err());
    }
}
