//! Secret operations: create, fetch, list.
//!
//! Each call is an independent unit of work over an injected cipher and
//! storage backend. The service holds no per-request state.

use chrono::Utc;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info};

use cloudvault_common::{
    EntryId, EntryMetadata, Error, OwnerId, Result, RevealedSecret, VaultEntry,
};
use cloudvault_crypto::PayloadCipher;
use cloudvault_storage::StorageBackend;

use crate::config::DEFAULT_STORAGE_TIMEOUT_MS;

/// Longest accepted entry name, in bytes.
pub const MAX_NAME_LEN: usize = 256;

/// Largest accepted secret, in bytes.
pub const MAX_SECRET_LEN: usize = 64 * 1024;

/// Vault service over a cipher and a storage backend.
pub struct VaultService<C, S> {
    cipher: C,
    storage: S,
    storage_timeout: Duration,
}

impl<C: PayloadCipher, S: StorageBackend> VaultService<C, S> {
    pub fn new(cipher: C, storage: S) -> Self {
        Self {
            cipher,
            storage,
            storage_timeout: Duration::from_millis(DEFAULT_STORAGE_TIMEOUT_MS),
        }
    }

    /// Bound every storage call by `timeout`.
    pub fn with_storage_timeout(mut self, timeout: Duration) -> Self {
        self.storage_timeout = timeout;
        self
    }

    pub fn cipher(&self) -> &C {
        &self.cipher
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    async fn bounded<T>(&self, op: &str, call: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.storage_timeout, call)
            .await
            .map_err(|_| {
                Error::Timeout(format!(
                    "Storage {} did not finish within {:?}",
                    op, self.storage_timeout
                ))
            })?
    }

    /// Encrypt and store a new secret.
    ///
    /// # Postconditions
    /// - A fresh entry id is assigned
    /// - `created_at == updated_at`
    /// - Only metadata is returned, never the ciphertext
    ///
    /// # Errors
    /// - `InvalidInput` for an empty or oversized name or secret
    /// - Cipher errors (`KeyServiceUnavailable`, `InvalidKeyIdentifier`, `Timeout`)
    /// - Storage errors
    pub async fn create(
        &self,
        owner: &OwnerId,
        name: &str,
        secret: &[u8],
    ) -> Result<EntryMetadata> {
        validate_name(name)?;
        validate_secret(secret)?;

        let payload = self.cipher.encrypt(secret).await?;
        let now = Utc::now();
        let entry = VaultEntry {
            owner_id: owner.clone(),
            entry_id: EntryId::generate(),
            name: name.to_string(),
            payload,
            created_at: now,
            updated_at: now,
        };

        let saved = self.bounded("save", self.storage.save(entry)).await?;

        info!(
            owner = %owner,
            entry = %saved.entry_id,
            secret_len = secret.len(),
            backend = self.storage.name(),
            "Secret created"
        );
        Ok(saved.metadata())
    }

    /// Load and decrypt one secret.
    ///
    /// # Errors
    /// - `NotFound` if the owner has no such entry
    /// - `AuthenticationFailure` if the stored payload was altered
    /// - `UnwrapFailure`, `ModeMismatch`, `KeyServiceUnavailable`, `Timeout`
    pub async fn fetch(&self, owner: &OwnerId, entry_id: &EntryId) -> Result<RevealedSecret> {
        let entry = self
            .bounded("get", self.storage.get(owner, entry_id))
            .await?;
        let secret = self.cipher.decrypt(&entry.payload).await?;

        debug!(owner = %owner, entry = %entry_id, secret_len = secret.len(), "Secret fetched");
        Ok(RevealedSecret {
            metadata: entry.metadata(),
            secret,
        })
    }

    /// List an owner's entries. No payload is read or decrypted.
    pub async fn list(&self, owner: &OwnerId) -> Result<Vec<EntryMetadata>> {
        let entries = self.bounded("list", self.storage.list(owner)).await?;
        debug!(owner = %owner, count = entries.len(), "Entries listed");
        Ok(entries)
    }

    /// Rebuild the owner's index from stored entries.
    ///
    /// Returns the number of entries the index holds afterwards.
    pub async fn reindex(&self, owner: &OwnerId) -> Result<usize> {
        let count = self
            .bounded("reindex", self.storage.rebuild_index(owner))
            .await?;
        info!(owner = %owner, count, backend = self.storage.name(), "Index rebuilt");
        Ok(count)
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::InvalidInput("Entry name cannot be empty".to_string()));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(Error::InvalidInput(format!(
            "Entry name exceeds {} bytes",
            MAX_NAME_LEN
        )));
    }
    Ok(())
}

fn validate_secret(secret: &[u8]) -> Result<()> {
    if secret.is_empty() {
        return Err(Error::InvalidInput("Secret cannot be empty".to_string()));
    }
    if secret.len() > MAX_SECRET_LEN {
        return Err(Error::InvalidInput(format!(
            "Secret exceeds {} bytes",
            MAX_SECRET_LEN
        )));
    }
    Ok(())
}
