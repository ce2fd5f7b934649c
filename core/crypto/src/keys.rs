//! Key types with secure memory handling.
//!
//! All key types automatically zeroize their memory on drop, so an early
//! return or `?` anywhere in an operation still scrubs the key it acquired.

use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use chacha20poly1305::aead::{rand_core::RngCore, OsRng};
use cloudvault_common::{Error, Result};

/// Length of encryption keys in bytes (256-bit).
pub const KEY_LENGTH: usize = 32;

fn copy_key(bytes: &[u8], what: &str) -> Result<[u8; KEY_LENGTH]> {
    if bytes.len() != KEY_LENGTH {
        return Err(Error::InvalidInput(format!(
            "Invalid {} length: expected {}, got {}",
            what,
            KEY_LENGTH,
            bytes.len()
        )));
    }
    let mut key = [0u8; KEY_LENGTH];
    key.copy_from_slice(bytes);
    Ok(key)
}

/// Plaintext data key protecting exactly one secret.
///
/// Produced by a key-management oracle and discarded after a single
/// seal or open.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DataKey {
    key: [u8; KEY_LENGTH],
}

impl DataKey {
    /// Create a data key from raw bytes.
    pub fn from_bytes(key: [u8; KEY_LENGTH]) -> Self {
        Self { key }
    }

    /// Create a data key from a slice returned by a key service.
    ///
    /// # Errors
    /// - Returns error if the slice is not KEY_LENGTH bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Ok(Self {
            key: copy_key(bytes, "data key")?,
        })
    }

    /// Generate a random data key.
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_LENGTH];
        OsRng.fill_bytes(&mut key);
        Self { key }
    }

    /// Get the key bytes.
    ///
    /// # Security
    /// The returned slice should be used immediately and not stored.
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.key
    }
}

impl fmt::Debug for DataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DataKey([REDACTED])")
    }
}

/// Long-lived key held by a key service. Only ever wraps data keys.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey {
    key: [u8; KEY_LENGTH],
}

impl MasterKey {
    /// Create a master key from raw bytes.
    pub fn from_bytes(key: [u8; KEY_LENGTH]) -> Self {
        Self { key }
    }

    /// Create a master key from a slice.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Ok(Self {
            key: copy_key(bytes, "master key")?,
        })
    }

    /// Generate a random master key.
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_LENGTH];
        OsRng.fill_bytes(&mut key);
        Self { key }
    }

    /// Get the key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.key
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MasterKey([REDACTED])")
    }
}

/// Deployment-wide key used directly as the AEAD key in degraded mode.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct StaticKey {
    key: [u8; KEY_LENGTH],
}

impl StaticKey {
    /// Create a static key from raw bytes.
    pub fn from_bytes(key: [u8; KEY_LENGTH]) -> Self {
        Self { key }
    }

    /// Get the key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.key
    }
}

impl fmt::Debug for StaticKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StaticKey([REDACTED])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_key_generate() {
        let key1 = DataKey::generate();
        let key2 = DataKey::generate();

        // Random keys should be different
        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_data_key_from_invalid_slice() {
        assert!(DataKey::from_slice(&[1u8; 16]).is_err());
        assert!(DataKey::from_slice(&[1u8; KEY_LENGTH]).is_ok());
    }

    #[test]
    fn test_zeroize_clears_key() {
        let mut key = MasterKey::from_bytes([7u8; KEY_LENGTH]);
        key.zeroize();
        assert_eq!(key.as_bytes(), &[0u8; KEY_LENGTH]);
    }

    #[test]
    fn test_debug_redacted() {
        let key = DataKey::from_bytes([0xAB; KEY_LENGTH]);
        let debug = format!("{:?}", key);
        assert!(debug.contains("REDACTED"));
        assert!(!debug.to_lowercase().contains("ab"));
    }
}
