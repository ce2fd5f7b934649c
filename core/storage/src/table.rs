//! In-memory partitioned table store.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::RwLock;
use tracing::debug;

use crate::backend::{entry_not_found, StorageBackend};
use cloudvault_common::{EntryId, EntryMetadata, Error, OwnerId, Result, VaultEntry};

/// Table store keyed by `(owner_id, entry_id)`.
///
/// Entries sort by owner first, so an owner's entries form one contiguous
/// key range and `list` is a range scan. There is no separate index to
/// drift out of sync.
pub struct MemoryTableStore {
    rows: RwLock<BTreeMap<(String, String), VaultEntry>>,
}

impl MemoryTableStore {
    /// Create a new empty table.
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(BTreeMap::new()),
        }
    }

    fn poisoned() -> Error {
        Error::Storage("Table lock poisoned".to_string())
    }
}

impl Default for MemoryTableStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageBackend for MemoryTableStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn save(&self, entry: VaultEntry) -> Result<VaultEntry> {
        let key = (
            entry.owner_id.as_str().to_string(),
            entry.entry_id.as_str().to_string(),
        );
        debug!(owner = %entry.owner_id, entry = %entry.entry_id, "Upserting row");

        self.rows
            .write()
            .map_err(|_| Self::poisoned())?
            .insert(key, entry.clone());
        Ok(entry)
    }

    async fn get(&self, owner: &OwnerId, entry_id: &EntryId) -> Result<VaultEntry> {
        let key = (owner.as_str().to_string(), entry_id.as_str().to_string());
        self.rows
            .read()
            .map_err(|_| Self::poisoned())?
            .get(&key)
            .cloned()
            .ok_or_else(|| entry_not_found(owner, entry_id))
    }

    async fn list(&self, owner: &OwnerId) -> Result<Vec<EntryMetadata>> {
        let rows = self.rows.read().map_err(|_| Self::poisoned())?;
        let start = (owner.as_str().to_string(), String::new());

        Ok(rows
            .range(start..)
            .take_while(|((row_owner, _), _)| row_owner == owner.as_str())
            .map(|(_, entry)| entry.metadata())
            .collect())
    }
}
