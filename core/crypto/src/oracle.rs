//! Key-management oracle abstraction.
//!
//! The oracle owns the master keys. Callers only ever see a freshly
//! generated data key (plaintext + wrapped form) or the plaintext recovered
//! from a wrapped blob. Both plaintext forms are [`DataKey`]s, which scrub
//! themselves when dropped.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

use crate::aead::{self, NONCE_SIZE, TAG_SIZE};
use crate::keys::{DataKey, MasterKey};
use cloudvault_common::{Error, Result};

/// A data key as returned by `generate_data_key`.
#[derive(Debug)]
pub struct GeneratedDataKey {
    /// Plaintext key. Zeroized on drop.
    pub plaintext: DataKey,
    /// The same key wrapped under the oracle's master key.
    pub wrapped: Vec<u8>,
}

/// Remote master-key service.
///
/// Implementations must never persist or log plaintext key material.
#[async_trait]
pub trait KeyManagementOracle: Send + Sync {
    /// Get the oracle name (e.g., "local", "aws-kms").
    fn name(&self) -> &str;

    /// Generate a fresh 256-bit data key under the given master key.
    ///
    /// # Errors
    /// - `KeyServiceUnavailable` if the service cannot be reached
    /// - `InvalidKeyIdentifier` if `key_id` names no master key
    async fn generate_data_key(&self, key_id: &str) -> Result<GeneratedDataKey>;

    /// Recover the plaintext of a wrapped data key.
    ///
    /// # Errors
    /// - `UnwrapFailure` if the blob is corrupt, its master key was
    ///   revoked, or access was denied
    async fn unwrap_data_key(&self, wrapped: &[u8]) -> Result<DataKey>;
}

#[async_trait]
impl<T: KeyManagementOracle + ?Sized> KeyManagementOracle for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn generate_data_key(&self, key_id: &str) -> Result<GeneratedDataKey> {
        (**self).generate_data_key(key_id).await
    }

    async fn unwrap_data_key(&self, wrapped: &[u8]) -> Result<DataKey> {
        (**self).unwrap_data_key(wrapped).await
    }
}

/// Format version of locally wrapped data keys.
const WRAP_VERSION: u8 = 1;

/// In-process key service holding named master keys.
///
/// Wrapped blob layout:
/// `version(1) || key_id_len(1) || key_id || nonce(12) || ciphertext || tag(16)`.
/// The key id is bound as associated data, so a blob cannot be re-labelled
/// to unwrap under a different master key.
pub struct LocalKeyService {
    keys: RwLock<HashMap<String, MasterKey>>,
}

impl LocalKeyService {
    /// Create a key service with no master keys.
    pub fn new() -> Self {
        Self {
            keys: RwLock::new(HashMap::new()),
        }
    }

    /// Builder-style variant of [`add_master_key`](Self::add_master_key).
    pub fn with_master_key(self, key_id: impl Into<String>, key: MasterKey) -> Result<Self> {
        self.add_master_key(key_id, key)?;
        Ok(self)
    }

    /// Load master keys from base64-encoded configuration values.
    ///
    /// # Errors
    /// - `Configuration` if a value is not base64 or not 32 bytes
    pub fn from_encoded(keys: &HashMap<String, String>) -> Result<Self> {
        let service = Self::new();
        for (key_id, encoded) in keys {
            let raw = zeroize::Zeroizing::new(STANDARD.decode(encoded).map_err(|_| {
                Error::Configuration(format!("Master key '{}' is not valid base64", key_id))
            })?);
            let key = MasterKey::from_slice(&raw).map_err(|_| {
                Error::Configuration(format!("Master key '{}' must be 32 bytes", key_id))
            })?;
            service.add_master_key(key_id.clone(), key)?;
        }
        Ok(service)
    }

    /// Register a master key.
    ///
    /// # Errors
    /// - `InvalidKeyIdentifier` if the id is empty or longer than 255 bytes
    pub fn add_master_key(&self, key_id: impl Into<String>, key: MasterKey) -> Result<()> {
        let key_id = key_id.into();
        if key_id.is_empty() || key_id.len() > u8::MAX as usize {
            return Err(Error::InvalidKeyIdentifier(format!(
                "Key id must be 1-255 bytes, got {}",
                key_id.len()
            )));
        }

        info!(key_id = %key_id, "Master key registered");
        self.write_keys()?.insert(key_id, key);
        Ok(())
    }

    /// Remove a master key. Blobs wrapped under it can no longer be unwrapped.
    pub fn revoke(&self, key_id: &str) -> Result<bool> {
        let removed = self.write_keys()?.remove(key_id).is_some();
        if removed {
            info!(key_id = %key_id, "Master key revoked");
        }
        Ok(removed)
    }

    /// Check if a master key is registered.
    pub fn has_master_key(&self, key_id: &str) -> Result<bool> {
        Ok(self.read_keys()?.contains_key(key_id))
    }

    fn read_keys(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, HashMap<String, MasterKey>>> {
        self.keys
            .read()
            .map_err(|_| Error::KeyServiceUnavailable("Key ring lock poisoned".to_string()))
    }

    fn write_keys(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<String, MasterKey>>> {
        self.keys
            .write()
            .map_err(|_| Error::KeyServiceUnavailable("Key ring lock poisoned".to_string()))
    }
}

impl Default for LocalKeyService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyManagementOracle for LocalKeyService {
    fn name(&self) -> &str {
        "local"
    }

    async fn generate_data_key(&self, key_id: &str) -> Result<GeneratedDataKey> {
        let keys = self.read_keys()?;
        let master = keys
            .get(key_id)
            .ok_or_else(|| Error::InvalidKeyIdentifier(format!("Unknown master key: {}", key_id)))?;

        let plaintext = DataKey::generate();
        let sealed = aead::seal(master.as_bytes(), plaintext.as_bytes(), key_id.as_bytes())?;

        let mut wrapped =
            Vec::with_capacity(2 + key_id.len() + NONCE_SIZE + sealed.ciphertext.len() + TAG_SIZE);
        wrapped.push(WRAP_VERSION);
        wrapped.push(key_id.len() as u8);
        wrapped.extend_from_slice(key_id.as_bytes());
        wrapped.extend_from_slice(&sealed.nonce);
        wrapped.extend_from_slice(&sealed.ciphertext);
        wrapped.extend_from_slice(&sealed.tag);

        debug!(key_id = %key_id, "Data key generated");
        Ok(GeneratedDataKey { plaintext, wrapped })
    }

    async fn unwrap_data_key(&self, wrapped: &[u8]) -> Result<DataKey> {
        let (&version, rest) = wrapped
            .split_first()
            .ok_or_else(|| Error::UnwrapFailure("Wrapped key is empty".to_string()))?;
        if version != WRAP_VERSION {
            return Err(Error::UnwrapFailure(format!(
                "Unsupported wrapped key version: {}",
                version
            )));
        }

        let (&id_len, rest) = rest
            .split_first()
            .ok_or_else(|| Error::UnwrapFailure("Wrapped key is truncated".to_string()))?;
        let id_len = id_len as usize;
        if rest.len() < id_len + NONCE_SIZE + TAG_SIZE {
            return Err(Error::UnwrapFailure("Wrapped key is truncated".to_string()));
        }

        let (id_bytes, rest) = rest.split_at(id_len);
        let (nonce, rest) = rest.split_at(NONCE_SIZE);
        let (ciphertext, tag) = rest.split_at(rest.len() - TAG_SIZE);

        let key_id = std::str::from_utf8(id_bytes)
            .map_err(|_| Error::UnwrapFailure("Wrapped key has malformed key id".to_string()))?;

        let keys = self.read_keys()?;
        let master = keys.get(key_id).ok_or_else(|| {
            Error::UnwrapFailure(format!("Master key '{}' is not available", key_id))
        })?;

        let plaintext = aead::open(master.as_bytes(), nonce, ciphertext, tag, id_bytes)
            .map_err(|_| Error::UnwrapFailure("Wrapped key failed integrity check".to_string()))?;

        debug!(key_id = %key_id, "Data key unwrapped");
        DataKey::from_slice(plaintext.as_bytes())
            .map_err(|_| Error::UnwrapFailure("Unwrapped key has wrong length".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> LocalKeyService {
        LocalKeyService::new()
            .with_master_key("vault-key", MasterKey::generate())
            .unwrap()
    }

    #[tokio::test]
    async fn test_generate_and_unwrap() {
        let oracle = service();

        let generated = oracle.generate_data_key("vault-key").await.unwrap();
        let unwrapped = oracle.unwrap_data_key(&generated.wrapped).await.unwrap();

        assert_eq!(unwrapped.as_bytes(), generated.plaintext.as_bytes());
    }

    #[tokio::test]
    async fn test_each_data_key_is_fresh() {
        let oracle = service();

        let a = oracle.generate_data_key("vault-key").await.unwrap();
        let b = oracle.generate_data_key("vault-key").await.unwrap();

        assert_ne!(a.plaintext.as_bytes(), b.plaintext.as_bytes());
        assert_ne!(a.wrapped, b.wrapped);
    }

    #[tokio::test]
    async fn test_unknown_key_id() {
        let oracle = service();
        let result = oracle.generate_data_key("missing").await;

        assert!(matches!(result, Err(Error::InvalidKeyIdentifier(_))));
    }

    #[tokio::test]
    async fn test_revoked_master_key_fails_unwrap() {
        let oracle = service();
        let generated = oracle.generate_data_key("vault-key").await.unwrap();

        assert!(oracle.revoke("vault-key").unwrap());
        let result = oracle.unwrap_data_key(&generated.wrapped).await;

        assert!(matches!(result, Err(Error::UnwrapFailure(_))));
    }

    #[tokio::test]
    async fn test_corrupted_wrapped_key_fails() {
        let oracle = service();
        let mut wrapped = oracle.generate_data_key("vault-key").await.unwrap().wrapped;
        let last = wrapped.len() - 1;
        wrapped[last] ^= 0x01;

        let result = oracle.unwrap_data_key(&wrapped).await;
        assert!(matches!(result, Err(Error::UnwrapFailure(_))));

        let result = oracle.unwrap_data_key(&wrapped[..5]).await;
        assert!(matches!(result, Err(Error::UnwrapFailure(_))));

        let result = oracle.unwrap_data_key(&[]).await;
        assert!(matches!(result, Err(Error::UnwrapFailure(_))));
    }

    #[tokio::test]
    async fn test_relabelled_blob_fails() {
        let oracle = service();
        oracle
            .add_master_key("vault-kez", MasterKey::generate())
            .unwrap();

        let mut wrapped = oracle.generate_data_key("vault-key").await.unwrap().wrapped;
        // Point the blob at the other master key without touching the sealed bytes
        let id_end = 2 + "vault-key".len();
        wrapped[id_end - 1] = b'z';

        let result = oracle.unwrap_data_key(&wrapped).await;
        assert!(matches!(result, Err(Error::UnwrapFailure(_))));
    }

    #[test]
    fn test_from_encoded_rejects_bad_keys() {
        let mut keys = HashMap::new();
        keys.insert("short".to_string(), STANDARD.encode([1u8; 16]));
        assert!(matches!(
            LocalKeyService::from_encoded(&keys),
            Err(Error::Configuration(_))
        ));

        let mut keys = HashMap::new();
        keys.insert("good".to_string(), STANDARD.encode([1u8; 32]));
        let service = LocalKeyService::from_encoded(&keys).unwrap();
        assert!(service.has_master_key("good").unwrap());
    }
}
