//! Error types for wg-manager
//!
//! This module defines the error types used throughout the application.
//! We use `thiserror` for ergonomic error definitions and `anyhow` for
//! error propagation in the binary.

use thiserror::Error;

/// Exit status the WireGuard tools use when the requested device does not
/// exist or there is nothing to show.
pub const NO_SUCH_DEVICE_STATUS: i32 = 1;

/// Main error type for wg-manager operations
#[derive(Error, Debug)]
pub enum WgManagerError {
    /// Key material that is not 32 bytes of standard base64
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Unparseable or unsupported network / CIDR
    #[error("Invalid network: {0}")]
    InvalidNetwork(String),

    /// Network has no usable host range
    #[error("Network is too small: {0}")]
    NetworkTooSmall(String),

    /// Every allocatable address in the network is in use
    #[error("No available addresses in network {0}")]
    AddressesExhausted(String),

    /// Peer public key absent (all-zero)
    #[error("Peer public key is required")]
    MissingPeerKey,

    /// Device or record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// The WireGuard control surface is not present on this host
    #[error("WireGuard tools are not available: {0}")]
    Unavailable(String),

    /// The control surface rejected an operation
    #[error("Command `{command}` failed ({}): {output}", describe_status(.status))]
    CommandFailed {
        /// Command line that was executed (never contains key material)
        command: String,
        /// Exit status, `None` when terminated by a signal
        status: Option<i32>,
        /// Captured diagnostic output
        output: String,
    },

    /// Random source failure
    #[error("Entropy source failure: {0}")]
    Entropy(String),

    /// Input validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type alias using WgManagerError
pub type Result<T> = std::result::Result<T, WgManagerError>;

impl WgManagerError {
    /// Whether the control surface is absent (storage-only mode is possible)
    pub fn is_unavailable(&self) -> bool {
        matches!(self, WgManagerError::Unavailable(_))
    }

    /// Exit status of a failed command, if this is a command failure
    pub fn exit_status(&self) -> Option<i32> {
        match self {
            WgManagerError::CommandFailed { status, .. } => *status,
            _ => None,
        }
    }

    /// Whether the tool reported that the device does not exist
    pub fn is_no_such_device(&self) -> bool {
        self.exit_status() == Some(NO_SUCH_DEVICE_STATUS)
    }
}

fn describe_status(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("exit status {}", code),
        None => "terminated by signal".to_string(),
    }
}

impl From<serde_json::Error> for WgManagerError {
    fn from(err: serde_json::Error) -> Self {
        WgManagerError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for WgManagerError {
    fn from(err: toml::de::Error) -> Self {
        WgManagerError::Config(err.to_string())
    }
}
