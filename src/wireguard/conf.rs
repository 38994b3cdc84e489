//! Client configuration file rendering

use crate::error::{Result, WgManagerError};
use crate::wireguard::{PrivateKey, PublicKey};
use std::fmt::Write;

/// Keepalive written into every rendered client config
pub const CLIENT_KEEPALIVE_SECS: u16 = 25;

/// Everything needed to render a client's `wg-quick` style config
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Client private key; rendering fails without it
    pub private_key: Option<PrivateKey>,
    /// Client tunnel addresses; bare addresses get a /32 suffix
    pub addresses: Vec<String>,
    /// Resolver for the client, omitted when blank
    pub dns: Option<String>,
    /// Key of the server interface the client peers with
    pub server_public_key: PublicKey,
    /// `host:port` the client dials
    pub endpoint: Option<String>,
    /// Networks routed through the tunnel
    pub allowed_ips: Option<String>,
}

impl ClientConfig {
    /// Render the config as an INI-style document
    pub fn render(&self) -> Result<String> {
        let private_key = self.private_key.as_ref().ok_or_else(|| {
            WgManagerError::Validation("client private key is not available".to_string())
        })?;

        let addresses: Vec<String> = self
            .addresses
            .iter()
            .map(|a| a.trim())
            .filter(|a| !a.is_empty())
            .map(|a| {
                if a.contains('/') {
                    a.to_string()
                } else {
                    format!("{}/32", a)
                }
            })
            .collect();
        if addresses.is_empty() {
            return Err(WgManagerError::Validation(
                "client has no addresses".to_string(),
            ));
        }

        let mut conf = String::new();

        // Writing into a String cannot fail
        let _ = writeln!(conf, "[Interface]");
        let _ = writeln!(conf, "PrivateKey = {}", private_key.to_base64());
        let _ = writeln!(conf, "Address = {}", addresses.join(", "));
        if let Some(dns) = non_empty(&self.dns) {
            let _ = writeln!(conf, "DNS = {}", dns);
        }
        conf.push('\n');

        let _ = writeln!(conf, "[Peer]");
        let _ = writeln!(conf, "PublicKey = {}", self.server_public_key.to_base64());
        if let Some(endpoint) = non_empty(&self.endpoint) {
            let _ = writeln!(conf, "Endpoint = {}", endpoint);
        }
        if let Some(allowed) = non_empty(&self.allowed_ips) {
            let _ = writeln!(conf, "AllowedIPs = {}", allowed);
        }
        let _ = writeln!(conf, "PersistentKeepalive = {}", CLIENT_KEEPALIVE_SECS);

        Ok(conf)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ClientConfig {
        ClientConfig {
            private_key: Some(PrivateKey::generate().unwrap()),
            addresses: vec!["10.0.0.2".to_string()],
            dns: Some("1.1.1.1".to_string()),
            server_public_key: PrivateKey::generate().unwrap().public_key(),
            endpoint: Some("vpn.example.com:51820".to_string()),
            allowed_ips: Some("0.0.0.0/0".to_string()),
        }
    }

    #[test]
    fn test_render_full_config() {
        let config = config();
        let text = config.render().unwrap();
        let expected = format!(
            "[Interface]\n\
             PrivateKey = {}\n\
             Address = 10.0.0.2/32\n\
             DNS = 1.1.1.1\n\
             \n\
             [Peer]\n\
             PublicKey = {}\n\
             Endpoint = vpn.example.com:51820\n\
             AllowedIPs = 0.0.0.0/0\n\
             PersistentKeepalive = 25\n",
            config.private_key.as_ref().unwrap().to_base64(),
            config.server_public_key.to_base64()
        );
        assert_eq!(text, expected);
    }

    #[test]
    fn test_optional_lines_omitted() {
        let mut config = config();
        config.dns = None;
        config.endpoint = Some("  ".to_string());
        config.allowed_ips = None;
        config.addresses = vec!["10.0.0.2/24".to_string(), "fd00::2/128".to_string()];

        let text = config.render().unwrap();
        assert!(text.contains("Address = 10.0.0.2/24, fd00::2/128\n"));
        assert!(!text.contains("DNS"));
        assert!(!text.contains("Endpoint"));
        assert!(!text.contains("AllowedIPs"));
        assert!(text.ends_with("PersistentKeepalive = 25\n"));
    }

    #[test]
    fn test_missing_private_key() {
        let mut config = config();
        config.private_key = None;
        assert!(matches!(
            config.render(),
            Err(WgManagerError::Validation(_))
        ));
    }

    #[test]
    fn test_missing_addresses() {
        let mut config = config();
        config.addresses = vec![String::new()];
        assert!(matches!(
            config.render(),
            Err(WgManagerError::Validation(_))
        ));
    }
}
