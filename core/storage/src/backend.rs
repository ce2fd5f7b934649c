//! Storage backend trait definition.

use async_trait::async_trait;
use std::sync::Arc;

use cloudvault_common::{EntryId, EntryMetadata, OwnerId, Result, VaultEntry};

/// Persistence for encrypted vault entries.
///
/// Implementations never interpret the payload; they store and return it
/// byte for byte.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Get the backend name (e.g., "memory", "sqlite", "local-blob").
    fn name(&self) -> &str;

    /// Upsert an entry keyed by `(owner_id, entry_id)`.
    ///
    /// # Postconditions
    /// - The entry is retrievable with `get`
    /// - Its id appears exactly once in the owner's index, unless a
    ///   backend documents otherwise for concurrent saves
    ///
    /// # Errors
    /// - Storage I/O errors
    async fn save(&self, entry: VaultEntry) -> Result<VaultEntry>;

    /// Fetch one entry.
    ///
    /// # Errors
    /// - `NotFound` if the owner has no such entry
    async fn get(&self, owner: &OwnerId, entry_id: &EntryId) -> Result<VaultEntry>;

    /// List metadata of every entry of an owner, in no particular order.
    ///
    /// Never returns ciphertext.
    async fn list(&self, owner: &OwnerId) -> Result<Vec<EntryMetadata>>;

    /// Rebuild the owner's index from the stored entries.
    ///
    /// Returns the number of entries indexed afterwards. Backends whose
    /// index is the key structure itself have nothing to repair.
    async fn rebuild_index(&self, owner: &OwnerId) -> Result<usize> {
        Ok(self.list(owner).await?.len())
    }
}

#[async_trait]
impl<T: StorageBackend + ?Sized> StorageBackend for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn save(&self, entry: VaultEntry) -> Result<VaultEntry> {
        (**self).save(entry).await
    }

    async fn get(&self, owner: &OwnerId, entry_id: &EntryId) -> Result<VaultEntry> {
        (**self).get(owner, entry_id).await
    }

    async fn list(&self, owner: &OwnerId) -> Result<Vec<EntryMetadata>> {
        (**self).list(owner).await
    }

    async fn rebuild_index(&self, owner: &OwnerId) -> Result<usize> {
        (**self).rebuild_index(owner).await
    }
}

/// Error for an entry an owner does not have.
pub(crate) fn entry_not_found(owner: &OwnerId, entry_id: &EntryId) -> cloudvault_common::Error {
    cloudvault_common::Error::NotFound(format!("Entry {} not found for owner {}", entry_id, owner))
}

#[cfg(test)]
pub(crate) mod testing {
    use chrono::{Duration, Utc};
    use cloudvault_common::{EncryptedPayload, EntryId, OwnerId, VaultEntry};

    /// Build an entry with a recognisable payload.
    pub fn entry(owner: &str, name: &str) -> VaultEntry {
        let created = Utc::now() - Duration::seconds(5);
        VaultEntry {
            owner_id: OwnerId::new(owner).unwrap(),
            entry_id: EntryId::generate(),
            name: name.to_string(),
            payload: EncryptedPayload {
                ciphertext: name.as_bytes().to_vec(),
                nonce: vec![1u8; 12],
                auth_tag: vec![2u8; 16],
                wrapped_data_key: Some(vec![3u8; 40]),
            },
            created_at: created,
            updated_at: created,
        }
    }
}
