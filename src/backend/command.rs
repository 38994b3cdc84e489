//! Command-line WireGuard control surface
//!
//! Uses the `wg` and `ip` tools. Every invocation is synchronous; the
//! caller is expected to run this on a blocking thread.

use super::{merge_allowed_ips, require_peer_key, BackendType, ControlSurface};
use crate::error::{Result, WgManagerError};
use crate::wireguard::{parse_dump_str, PeerConfig, PrivateKey, PublicKey, INTERFACE_TAG, PEER_TAG};
use ipnet::IpNet;
use std::io::{self, Write};
use std::process::{Command, Stdio};
use tracing::{debug, info, instrument};

/// Control surface backed by the `wg` and `ip` tools
#[derive(Debug, Clone)]
pub struct CommandControl {
    wg_path: String,
    ip_path: String,
}

impl CommandControl {
    /// Use `wg` and `ip` from `PATH`
    pub fn new() -> Self {
        Self::with_paths("wg".to_string(), "ip".to_string())
    }

    /// Use explicit tool paths
    pub fn with_paths(wg_path: String, ip_path: String) -> Self {
        Self { wg_path, ip_path }
    }

    /// Execute a tool and return its stdout.
    ///
    /// A missing binary becomes `Unavailable`; a non-zero exit becomes
    /// `CommandFailed` carrying stderr (or stdout when stderr is empty).
    fn run(&self, program: &str, args: &[&str]) -> Result<String> {
        debug!("Executing command: {} {}", program, args.join(" "));

        let output = Command::new(program).args(args).output().map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                WgManagerError::Unavailable(format!("{}: {}", program, e))
            } else {
                WgManagerError::Io(e)
            }
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let diagnostic = if stderr.is_empty() {
                String::from_utf8_lossy(&output.stdout).trim().to_string()
            } else {
                stderr
            };
            return Err(WgManagerError::CommandFailed {
                command: format!("{} {}", program, args.join(" ")),
                status: output.status.code(),
                output: diagnostic,
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn wg(&self, args: &[&str]) -> Result<String> {
        self.run(&self.wg_path, args)
    }

    fn ip(&self, args: &[&str]) -> Result<String> {
        self.run(&self.ip_path, args)
    }

    fn link_exists(&self, name: &str) -> Result<bool> {
        match self.ip(&["link", "show", "dev", name]) {
            Ok(_) => Ok(true),
            Err(e) if e.is_no_such_device() => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn bring_link_up(&self, name: &str) -> Result<()> {
        self.ip(&["link", "set", "dev", name, "up"])?;
        Ok(())
    }

    fn tool_on_path(tool: &str) -> bool {
        Command::new("which")
            .arg(tool)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Current allowed IPs of one peer, empty when the peer is new
    fn current_allowed_ips(&self, name: &str, key: &PublicKey) -> Result<Vec<IpNet>> {
        let text = self.dump(Some(name))?;
        Ok(parse_dump_str(&text)
            .iter()
            .find(|d| d.name == name)
            .and_then(|d| d.peer(key))
            .map(|p| p.allowed_ips.clone())
            .unwrap_or_default())
    }
}

impl Default for CommandControl {
    fn default() -> Self {
        Self::new()
    }
}

/// Arguments for `wg set` applying one peer add/update.
///
/// `allowed_ips` of `None` leaves the peer's set untouched; `Some` replaces
/// it, and an empty slice clears it.
pub fn peer_set_args(name: &str, peer: &PeerConfig, allowed_ips: Option<&[IpNet]>) -> Vec<String> {
    let mut args = vec![
        "set".to_string(),
        name.to_string(),
        "peer".to_string(),
        peer.public_key.to_base64(),
    ];

    if let Some(allowed) = allowed_ips {
        let joined: Vec<String> = allowed.iter().map(|net| net.to_string()).collect();
        args.push("allowed-ips".to_string());
        args.push(joined.join(","));
    }

    if let Some(secs) = peer.keepalive_secs() {
        args.push("persistent-keepalive".to_string());
        args.push(secs.to_string());
    }

    args
}

/// Convert raw `wg show <dev|all> dump` output into tagged dump records.
///
/// The tool prints an untagged interface line followed by peer lines; in
/// `all` mode every line is prefixed with the interface name. Lines that
/// already carry a record tag pass through unchanged.
pub fn tag_raw_dump(raw: &str, device: Option<&str>) -> String {
    let mut tagged = String::with_capacity(raw.len() + 64);
    let mut current: Option<String> = None;

    for line in raw.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let first = line.split('\t').next().unwrap_or_default();
        if first == INTERFACE_TAG || first == PEER_TAG {
            tagged.push_str(line);
            tagged.push('\n');
            continue;
        }

        match device {
            Some(name) => {
                if current.is_none() {
                    tagged.push_str(&format!("{}\t{}\t{}\n", INTERFACE_TAG, name, line));
                    current = Some(name.to_string());
                } else {
                    tagged.push_str(&format!("{}\t{}\n", PEER_TAG, line));
                }
            }
            None => {
                let Some((ifname, rest)) = line.split_once('\t') else {
                    continue;
                };
                if current.as_deref() != Some(ifname) {
                    tagged.push_str(&format!("{}\t{}\t{}\n", INTERFACE_TAG, ifname, rest));
                    current = Some(ifname.to_string());
                } else {
                    tagged.push_str(&format!("{}\t{}\n", PEER_TAG, rest));
                }
            }
        }
    }

    tagged
}

impl ControlSurface for CommandControl {
    fn backend_type(&self) -> BackendType {
        BackendType::Command
    }

    fn is_available(&self) -> bool {
        Self::tool_on_path(&self.wg_path) && Self::tool_on_path(&self.ip_path)
    }

    fn dump(&self, device: Option<&str>) -> Result<String> {
        let raw = match device {
            Some(name) => self.wg(&["show", name, "dump"])?,
            None => self.wg(&["show", "all", "dump"])?,
        };
        Ok(tag_raw_dump(&raw, device))
    }

    #[instrument(skip(self))]
    fn ensure_device(&self, name: &str) -> Result<()> {
        if !self.link_exists(name)? {
            info!("Creating WireGuard interface {}", name);
            self.ip(&["link", "add", "dev", name, "type", "wireguard"])?;
        }
        self.bring_link_up(name)
    }

    #[instrument(skip(self, key))]
    fn set_private_key(&self, name: &str, key: &PrivateKey) -> Result<()> {
        let mut file = tempfile::Builder::new().prefix("wg-key-").tempfile()?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(file.path(), std::fs::Permissions::from_mode(0o600))?;
        }

        file.write_all(key.to_base64().as_bytes())?;
        file.flush()?;

        let path = file.path().to_string_lossy().into_owned();
        let result = self.wg(&["set", name, "private-key", &path]);
        // NamedTempFile unlinks on drop
        drop(file);
        result.map(|_| ())
    }

    fn set_listen_port(&self, name: &str, port: u16) -> Result<()> {
        if port == 0 {
            return Ok(());
        }
        let port = port.to_string();
        self.wg(&["set", name, "listen-port", &port])?;
        Ok(())
    }

    #[instrument(skip(self, peer), fields(peer = %peer.public_key))]
    fn configure_peer(&self, name: &str, peer: &PeerConfig) -> Result<()> {
        peer.validate()?;

        if peer.remove {
            return self.remove_peer(name, &peer.public_key);
        }

        let merged;
        let allowed_ips = if peer.replace_allowed_ips {
            Some(peer.allowed_ips.as_slice())
        } else if peer.allowed_ips.is_empty() {
            None
        } else {
            let current = self.current_allowed_ips(name, &peer.public_key)?;
            merged = merge_allowed_ips(&current, &peer.allowed_ips);
            Some(merged.as_slice())
        };

        let args = peer_set_args(name, peer, allowed_ips);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.wg(&args)?;
        Ok(())
    }

    fn remove_peer(&self, name: &str, public_key: &PublicKey) -> Result<()> {
        require_peer_key(public_key)?;
        let key = public_key.to_base64();
        self.wg(&["set", name, "peer", &key, "remove"])?;
        Ok(())
    }

    #[instrument(skip(self))]
    fn delete_device(&self, name: &str) -> Result<()> {
        if !self.link_exists(name)? {
            debug!("Interface {} already absent", name);
            return Ok(());
        }
        info!("Deleting WireGuard interface {}", name);
        self.ip(&["link", "delete", "dev", name])?;
        Ok(())
    }
}
