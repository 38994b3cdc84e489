//! Configuration management
//!
//! Static TOML configuration for the HTTP listener and the WireGuard control
//! surface. Every field has a default, so an empty file is a valid config.

mod validation;

pub use validation::{
    validate_endpoint, validate_interface_name, validate_ip_address, validate_keepalive,
    validate_port, validate_tool_path,
};

use crate::backend::BackendType;
use crate::error::{Result, WgManagerError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Location used when no `--config` is given
pub const DEFAULT_CONFIG_PATH: &str = "/etc/wg-manager/config.toml";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub wireguard: WireGuardConfig,
}

/// HTTP listener configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Bind address for HTTP server
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Bind port for HTTP server
    #[serde(default = "default_bind_port")]
    pub bind_port: u16,
}

/// WireGuard control surface configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireGuardConfig {
    /// Which control surface drives the host
    #[serde(default)]
    pub backend: BackendType,

    /// Path to the `wg` tool
    #[serde(default = "default_wg_path")]
    pub wg_path: String,

    /// Path to the `ip` tool
    #[serde(default = "default_ip_path")]
    pub ip_path: String,

    /// Keepalive applied to peers created through the API
    #[serde(default = "default_keepalive")]
    pub persistent_keepalive_secs: u16,

    /// Keep serving from storage when the control surface is absent
    #[serde(default = "default_true")]
    pub storage_only_on_unavailable: bool,

    /// Import live devices into storage at startup
    #[serde(default = "default_true")]
    pub adopt_on_startup: bool,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| {
            WgManagerError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;
        Self::parse(&contents)
    }

    /// Parse configuration from a TOML string
    pub fn parse(toml: &str) -> Result<Self> {
        toml::from_str(toml)
            .map_err(|e| WgManagerError::Config(format!("Failed to parse TOML config: {}", e)))
    }

    /// Load an explicit path, or the default path if it exists.
    ///
    /// A missing file is only tolerated at the default location.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => {
                let path = Path::new(DEFAULT_CONFIG_PATH);
                if path.exists() {
                    Self::from_file(path)?
                } else {
                    debug!("No config at {}, using defaults", DEFAULT_CONFIG_PATH);
                    Self::default()
                }
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        self.http
            .validate()
            .map_err(|e| WgManagerError::Config(format!("[http]: {}", e)))?;
        self.wireguard
            .validate()
            .map_err(|e| WgManagerError::Config(format!("[wireguard]: {}", e)))?;
        Ok(())
    }
}

impl HttpConfig {
    /// Validate HTTP configuration
    pub fn validate(&self) -> Result<()> {
        validate_ip_address(&self.bind_address)?;
        validate_port(self.bind_port)?;
        Ok(())
    }
}

impl WireGuardConfig {
    /// Validate WireGuard configuration
    pub fn validate(&self) -> Result<()> {
        if self.backend == BackendType::Command {
            validate_tool_path(&self.wg_path)?;
            validate_tool_path(&self.ip_path)?;
        }
        validate_keepalive(self.persistent_keepalive_secs)?;
        Ok(())
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            bind_port: default_bind_port(),
        }
    }
}

impl Default for WireGuardConfig {
    fn default() -> Self {
        Self {
            backend: BackendType::default(),
            wg_path: default_wg_path(),
            ip_path: default_ip_path(),
            persistent_keepalive_secs: default_keepalive(),
            storage_only_on_unavailable: true,
            adopt_on_startup: true,
        }
    }
}

// Default value functions for serde
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_bind_port() -> u16 {
    8080
}

fn default_wg_path() -> String {
    "wg".to_string()
}

fn default_ip_path() -> String {
    "ip".to_string()
}

fn default_keepalive() -> u16 {
    25
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_empty_file_is_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.http.bind_port, 8080);
        assert_eq!(config.wireguard.backend, BackendType::Command);
        assert_eq!(config.wireguard.persistent_keepalive_secs, 25);
        assert!(config.wireguard.storage_only_on_unavailable);
        assert!(config.wireguard.adopt_on_startup);
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[http]
bind_address = "127.0.0.1"
bind_port = 9090

[wireguard]
backend = "memory"
wg_path = "/usr/bin/wg"
ip_path = "/sbin/ip"
persistent_keepalive_secs = 30
storage_only_on_unavailable = false
adopt_on_startup = false
"#;
        let config = Config::parse(toml).unwrap();
        assert_eq!(config.http.bind_address, "127.0.0.1");
        assert_eq!(config.http.bind_port, 9090);
        assert_eq!(config.wireguard.backend, BackendType::Memory);
        assert_eq!(config.wireguard.wg_path, "/usr/bin/wg");
        assert_eq!(config.wireguard.persistent_keepalive_secs, 30);
        assert!(!config.wireguard.storage_only_on_unavailable);
        assert!(!config.wireguard.adopt_on_startup);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let err = Config::parse("[wireguard]\nbackend = \"netlink\"\n").unwrap_err();
        assert!(matches!(err, WgManagerError::Config(_)));
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[http]\nbind_port = 8181").unwrap();
        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.http.bind_port, 8181);
        assert_eq!(config.http.bind_address, "0.0.0.0");
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        assert!(matches!(
            Config::load(Some(&missing)),
            Err(WgManagerError::Config(_))
        ));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.http.bind_address = "not-an-ip".to_string();
        assert!(matches!(config.validate(), Err(WgManagerError::Config(_))));

        let mut config = Config::default();
        config.wireguard.persistent_keepalive_secs = 5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.wireguard.wg_path = String::new();
        assert!(config.validate().is_err());
        config.wireguard.backend = BackendType::Memory;
        assert!(config.validate().is_ok());
    }
}
