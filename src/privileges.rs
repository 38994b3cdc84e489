//! Process privilege detection
//!
//! Creating links and installing keys through the command-line tools needs
//! root (or CAP_NET_ADMIN); the binary uses this to warn early.

use std::fmt;

/// Privilege level of the current process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrivilegeLevel {
    /// Real or effective uid 0
    Root,
    /// Running as regular user
    User,
    /// Unknown privilege level
    Unknown,
}

impl PrivilegeLevel {
    /// Detect current privilege level
    pub fn detect() -> Self {
        #[cfg(unix)]
        {
            // SAFETY: getuid/geteuid have no preconditions and cannot fail
            let (uid, euid) = unsafe { (libc::getuid(), libc::geteuid()) };
            if uid == 0 || euid == 0 {
                Self::Root
            } else {
                Self::User
            }
        }

        #[cfg(not(unix))]
        {
            Self::Unknown
        }
    }

    /// Check if elevated
    pub fn is_elevated(&self) -> bool {
        matches!(self, Self::Root)
    }
}

impl fmt::Display for PrivilegeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Root => write!(f, "root"),
            Self::User => write!(f, "user"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}
