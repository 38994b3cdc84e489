//! WireGuard key management
//!
//! Generation, parsing and serialization of 32-byte curve25519 key material.
//! Keys travel as canonical standard base64 (padding included, no URL-safe
//! alphabet). Private keys are zeroized on drop and never printed.

use crate::error::{Result, WgManagerError};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::rngs::OsRng;
use rand::RngCore;
use std::fmt;
use std::str::FromStr;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::Zeroizing;

/// Length of every WireGuard key in bytes
pub const KEY_LEN: usize = 32;

/// Decode base64 key material, requiring exactly [`KEY_LEN`] bytes.
pub fn parse_key(value: &str) -> Result<[u8; KEY_LEN]> {
    let value = value.trim();
    if value.is_empty() {
        return Err(WgManagerError::InvalidKey("empty key".to_string()));
    }

    let decoded = Zeroizing::new(
        BASE64
            .decode(value)
            .map_err(|e| WgManagerError::InvalidKey(format!("decode key: {}", e)))?,
    );

    if decoded.len() != KEY_LEN {
        return Err(WgManagerError::InvalidKey(format!(
            "key has invalid size: expected {} bytes, got {}",
            KEY_LEN,
            decoded.len()
        )));
    }

    let mut bytes = [0u8; KEY_LEN];
    bytes.copy_from_slice(&decoded);
    Ok(bytes)
}

/// Apply the curve25519 private key clamping convention
fn clamp(bytes: &mut [u8; KEY_LEN]) {
    bytes[0] &= 248;
    bytes[31] &= 127;
    bytes[31] |= 64;
}

/// WireGuard private key (32 bytes, x25519)
#[derive(Clone)]
pub struct PrivateKey {
    secret: Zeroizing<[u8; KEY_LEN]>,
}

impl PrivateKey {
    /// Generate a new random, clamped private key
    pub fn generate() -> Result<Self> {
        let mut secret = Zeroizing::new([0u8; KEY_LEN]);
        let bytes: &mut [u8; KEY_LEN] = &mut secret;
        OsRng
            .try_fill_bytes(bytes)
            .map_err(|e| WgManagerError::Entropy(e.to_string()))?;
        clamp(bytes);
        Ok(Self { secret })
    }

    /// Create a private key from raw bytes
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self {
            secret: Zeroizing::new(bytes),
        }
    }

    /// Parse a private key from base64-encoded string
    pub fn from_base64(s: &str) -> Result<Self> {
        parse_key(s).map(Self::from_bytes)
    }

    /// Convert to base64-encoded string
    pub fn to_base64(&self) -> String {
        BASE64.encode(*self.secret)
    }

    /// Derive the public key (scalar multiplication with the base point)
    pub fn public_key(&self) -> PublicKey {
        let secret = StaticSecret::from(*self.secret);
        let public = X25519PublicKey::from(&secret);
        PublicKey::from_bytes(public.to_bytes())
    }

    /// Get raw bytes
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.secret
    }
}

impl PartialEq for PrivateKey {
    fn eq(&self, other: &Self) -> bool {
        *self.secret == *other.secret
    }
}

impl Eq for PrivateKey {}

impl FromStr for PrivateKey {
    type Err = WgManagerError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_base64(s)
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey([REDACTED])")
    }
}

// Ensure private keys are never accidentally logged
impl fmt::Display for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// WireGuard public key (32 bytes, x25519)
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey {
    key: [u8; KEY_LEN],
}

impl PublicKey {
    /// Create a public key from raw bytes
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self { key: bytes }
    }

    /// Parse a public key from base64-encoded string
    pub fn from_base64(s: &str) -> Result<Self> {
        parse_key(s).map(Self::from_bytes)
    }

    /// Convert to base64-encoded string
    pub fn to_base64(&self) -> String {
        BASE64.encode(self.key)
    }

    /// The all-zero key stands for "no key"
    pub fn is_zero(&self) -> bool {
        self.key == [0u8; KEY_LEN]
    }

    /// Get raw bytes
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.key
    }
}

impl FromStr for PublicKey {
    type Err = WgManagerError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_base64(s)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_base64())
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_base64())
    }
}

/// WireGuard key pair (private + public)
#[derive(Clone)]
pub struct KeyPair {
    /// Private key
    pub private: PrivateKey,
    /// Public key (derived from private)
    pub public: PublicKey,
}

impl KeyPair {
    /// Generate a new random key pair
    pub fn generate() -> Result<Self> {
        PrivateKey::generate().map(Self::from_private)
    }

    /// Create a key pair from a private key
    pub fn from_private(private: PrivateKey) -> Self {
        let public = private.public_key();
        Self { private, public }
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("private", &"[REDACTED]")
            .field("public", &self.public)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_generate_is_clamped() {
        for _ in 0..16 {
            let private = PrivateKey::generate().unwrap();
            let bytes = private.as_bytes();
            assert_eq!(bytes[0] & 7, 0);
            assert_eq!(bytes[31] & 128, 0);
            assert_eq!(bytes[31] & 64, 64);
        }
    }

    #[test]
    fn test_private_key_to_base64() {
        let private = PrivateKey::generate().unwrap();
        let base64_str = private.to_base64();
        assert_eq!(base64_str.len(), 44); // Base64 of 32 bytes
        assert!(base64_str.ends_with('='));
    }

    #[test]
    fn test_known_public_key() {
        // RFC 7748 section 6.1 (Alice)
        let private = PrivateKey::from_bytes([
            0x77, 0x07, 0x6d, 0x0a, 0x73, 0x18, 0xa5, 0x7d, 0x3c, 0x16, 0xc1, 0x72, 0x51, 0xb2,
            0x66, 0x45, 0xdf, 0x4c, 0x2f, 0x87, 0xeb, 0xc0, 0x99, 0x2a, 0xb1, 0x77, 0xfb, 0xa5,
            0x1d, 0xb9, 0x2c, 0x2a,
        ]);
        let expected = [
            0x85, 0x20, 0xf0, 0x09, 0x89, 0x30, 0xa7, 0x54, 0x74, 0x8b, 0x7d, 0xdc, 0xb4, 0x3e,
            0xf7, 0x5a, 0x0d, 0xbf, 0x3a, 0x0d, 0x26, 0x38, 0x1a, 0xf4, 0xeb, 0xa4, 0xa9, 0x8e,
            0xaa, 0x9b, 0x4e, 0x6a,
        ];
        assert_eq!(private.public_key().as_bytes(), &expected);
    }

    #[test]
    fn test_private_key_not_logged() {
        let private = PrivateKey::generate().unwrap();
        let debug_str = format!("{:?}", private);
        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains(&private.to_base64()));
        assert_eq!(private.to_string(), "[REDACTED]");
    }

    #[test]
    fn test_parse_key_rejects_empty() {
        assert!(matches!(parse_key(""), Err(WgManagerError::InvalidKey(_))));
        assert!(matches!(parse_key("   "), Err(WgManagerError::InvalidKey(_))));
    }

    #[test]
    fn test_invalid_base64() {
        assert!(matches!(
            PublicKey::from_base64("invalid!@#$"),
            Err(WgManagerError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_url_safe_alphabet_rejected() {
        let key = PublicKey::from_bytes([0xfb; KEY_LEN]).to_base64();
        assert!(key.contains('+') || key.contains('/'));
        let url_safe = key.replace('+', "-").replace('/', "_");
        assert!(PublicKey::from_base64(&url_safe).is_err());
    }

    #[test]
    fn test_invalid_length() {
        let short_key = BASE64.encode([0u8; 16]);
        assert!(PrivateKey::from_base64(&short_key).is_err());
        let long_key = BASE64.encode([0u8; 33]);
        assert!(PublicKey::from_base64(&long_key).is_err());
    }

    #[test]
    fn test_zero_key() {
        let zero = PublicKey::from_bytes([0u8; KEY_LEN]);
        assert!(zero.is_zero());
        assert!(!PrivateKey::generate().unwrap().public_key().is_zero());
    }

    #[test]
    fn test_keypair_debug_redacts_private() {
        let pair = KeyPair::generate().unwrap();
        let debug_str = format!("{:?}", pair);
        assert!(debug_str.contains("REDACTED"));
        assert!(debug_str.contains(&pair.public.to_base64()));
    }

    proptest! {
        #[test]
        fn prop_public_key_deterministic_and_roundtrips(seed in any::<[u8; 32]>()) {
            let private = PrivateKey::from_bytes(seed);
            let first = private.public_key();
            let second = private.public_key();
            prop_assert_eq!(first, second);

            let restored: PublicKey = first.to_string().parse().unwrap();
            prop_assert_eq!(restored, first);
        }

        #[test]
        fn prop_private_key_roundtrips(seed in any::<[u8; 32]>()) {
            let private = PrivateKey::from_bytes(seed);
            let restored = PrivateKey::from_base64(&private.to_base64()).unwrap();
            prop_assert_eq!(restored.as_bytes(), private.as_bytes());
        }

        #[test]
        fn prop_wrong_length_rejected(bytes in proptest::collection::vec(any::<u8>(), 0..64usize)) {
            prop_assume!(bytes.len() != KEY_LEN);
            let encoded = BASE64.encode(&bytes);
            prop_assert!(parse_key(&encoded).is_err());
        }
    }
}
