//! SQLite-backed partitioned table store.
//!
//! One table with a composite primary key `(owner_id, entry_id)`. The
//! primary-key index doubles as the per-owner index, so `list` is a range
//! over the owner's partition and always agrees with the stored rows.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use crate::backend::{entry_not_found, StorageBackend};
use cloudvault_common::{
    EncryptedPayload, EntryId, EntryMetadata, Error, OwnerId, Result, VaultEntry,
};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS vault_entries (
    owner_id         TEXT NOT NULL,
    entry_id         TEXT NOT NULL,
    name             TEXT NOT NULL,
    ciphertext       TEXT NOT NULL,
    nonce            TEXT NOT NULL,
    auth_tag         TEXT NOT NULL,
    wrapped_data_key TEXT,
    created_at       TEXT NOT NULL,
    updated_at       TEXT NOT NULL,
    PRIMARY KEY (owner_id, entry_id)
) WITHOUT ROWID;
"#;

/// Raw row as stored: byte fields are base64 text, timestamps RFC 3339.
struct Row {
    owner_id: String,
    entry_id: String,
    name: String,
    ciphertext: String,
    nonce: String,
    auth_tag: String,
    wrapped_data_key: Option<String>,
    created_at: String,
    updated_at: String,
}

impl Row {
    fn from_entry(entry: &VaultEntry) -> Self {
        Self {
            owner_id: entry.owner_id.as_str().to_string(),
            entry_id: entry.entry_id.as_str().to_string(),
            name: entry.name.clone(),
            ciphertext: STANDARD.encode(&entry.payload.ciphertext),
            nonce: STANDARD.encode(&entry.payload.nonce),
            auth_tag: STANDARD.encode(&entry.payload.auth_tag),
            wrapped_data_key: entry
                .payload
                .wrapped_data_key
                .as_ref()
                .map(|k| STANDARD.encode(k)),
            created_at: format_time(&entry.created_at),
            updated_at: format_time(&entry.updated_at),
        }
    }

    fn into_entry(self) -> Result<VaultEntry> {
        Ok(VaultEntry {
            owner_id: OwnerId::new(self.owner_id)?,
            entry_id: EntryId::new(self.entry_id)?,
            name: self.name,
            payload: EncryptedPayload {
                ciphertext: decode_column("ciphertext", &self.ciphertext)?,
                nonce: decode_column("nonce", &self.nonce)?,
                auth_tag: decode_column("auth_tag", &self.auth_tag)?,
                wrapped_data_key: self
                    .wrapped_data_key
                    .as_deref()
                    .map(|k| decode_column("wrapped_data_key", k))
                    .transpose()?,
            },
            created_at: parse_time(&self.created_at)?,
            updated_at: parse_time(&self.updated_at)?,
        })
    }
}

fn format_time(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_time(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::Serialization(format!("Invalid timestamp '{}': {}", s, e)))
}

fn decode_column(column: &str, value: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(value)
        .map_err(|e| Error::Serialization(format!("Column {} is not base64: {}", column, e)))
}

fn db_err(e: rusqlite::Error) -> Error {
    Error::Storage(format!("SQLite: {}", e))
}

/// Partitioned table store on SQLite.
///
/// The connection is shared behind a mutex; each call runs on the blocking
/// pool so the async runtime never waits on disk.
pub struct SqliteTableStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteTableStore {
    /// Create or open a store at `db_path`.
    ///
    /// # Errors
    /// - Database creation or schema failure
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(db_path.as_ref()).map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;

        info!(path = %db_path.as_ref().display(), "SQLite table store opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory() -> Result<Self> {
        Self::open(":memory:")
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| Error::Storage("SQLite connection lock poisoned".to_string()))?;
            f(&conn)
        })
        .await
        .map_err(|e| Error::Storage(format!("SQLite task failed: {}", e)))?
    }
}

#[async_trait]
impl StorageBackend for SqliteTableStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn save(&self, entry: VaultEntry) -> Result<VaultEntry> {
        debug!(owner = %entry.owner_id, entry = %entry.entry_id, "Upserting row");
        let row = Row::from_entry(&entry);

        self.with_conn(move |conn| {
            conn.execute(
                r#"
                INSERT INTO vault_entries
                (owner_id, entry_id, name, ciphertext, nonce, auth_tag,
                 wrapped_data_key, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                ON CONFLICT (owner_id, entry_id) DO UPDATE SET
                    name = excluded.name,
                    ciphertext = excluded.ciphertext,
                    nonce = excluded.nonce,
                    auth_tag = excluded.auth_tag,
                    wrapped_data_key = excluded.wrapped_data_key,
                    created_at = excluded.created_at,
                    updated_at = excluded.updated_at
                "#,
                params![
                    row.owner_id,
                    row.entry_id,
                    row.name,
                    row.ciphertext,
                    row.nonce,
                    row.auth_tag,
                    row.wrapped_data_key,
                    row.created_at,
                    row.updated_at,
                ],
            )
            .map_err(db_err)?;
            Ok(())
        })
        .await?;

        Ok(entry)
    }

    async fn get(&self, owner: &OwnerId, entry_id: &EntryId) -> Result<VaultEntry> {
        let (owner_key, entry_key) = (owner.as_str().to_string(), entry_id.as_str().to_string());

        let row = self
            .with_conn(move |conn| {
                conn.query_row(
                    r#"
                    SELECT owner_id, entry_id, name, ciphertext, nonce, auth_tag,
                           wrapped_data_key, created_at, updated_at
                    FROM vault_entries WHERE owner_id = ?1 AND entry_id = ?2
                    "#,
                    params![owner_key, entry_key],
                    |r| {
                        Ok(Row {
                            owner_id: r.get(0)?,
                            entry_id: r.get(1)?,
                            name: r.get(2)?,
                            ciphertext: r.get(3)?,
                            nonce: r.get(4)?,
                            auth_tag: r.get(5)?,
                            wrapped_data_key: r.get(6)?,
                            created_at: r.get(7)?,
                            updated_at: r.get(8)?,
                        })
                    },
                )
                .optional()
                .map_err(db_err)
            })
            .await?;

        row.ok_or_else(|| entry_not_found(owner, entry_id))?
            .into_entry()
    }

    async fn list(&self, owner: &OwnerId) -> Result<Vec<EntryMetadata>> {
        let owner_key = owner.as_str().to_string();

        let rows = self
            .with_conn(move |conn| {
                let mut stmt = conn
                    .prepare(
                        r#"
                        SELECT entry_id, name, created_at, updated_at
                        FROM vault_entries WHERE owner_id = ?1
                        "#,
                    )
                    .map_err(db_err)?;

                let rows = stmt
                    .query_map([owner_key], |r| {
                        Ok((
                            r.get::<_, String>(0)?,
                            r.get::<_, String>(1)?,
                            r.get::<_, String>(2)?,
                            r.get::<_, String>(3)?,
                        ))
                    })
                    .map_err(db_err)?
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(db_err)?;
                Ok(rows)
            })
            .await?;

        rows.into_iter()
            .map(|(entry_id, name, created_at, updated_at)| {
                Ok(EntryMetadata {
                    entry_id: EntryId::new(entry_id)?,
                    name,
                    created_at: parse_time(&created_at)?,
                    updated_at: parse_time(&updated_at)?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::entry;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_save_get_roundtrip() {
        let store = SqliteTableStore::in_memory().unwrap();
        let saved = store.save(entry("u1", "email")).await.unwrap();

        let fetched = store.get(&saved.owner_id, &saved.entry_id).await.unwrap();
        assert_eq!(fetched, saved);
    }

    #[tokio::test]
    async fn test_static_mode_payload_roundtrip() {
        let store = SqliteTableStore::in_memory().unwrap();
        let mut e = entry("u1", "pin");
        e.payload.wrapped_data_key = None;
        let saved = store.save(e).await.unwrap();

        let fetched = store.get(&saved.owner_id, &saved.entry_id).await.unwrap();
        assert!(fetched.payload.wrapped_data_key.is_none());
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let store = SqliteTableStore::in_memory().unwrap();
        let owner = OwnerId::new("u1").unwrap();

        let result = store.get(&owner, &EntryId::generate()).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_upsert_keeps_one_row() {
        let store = SqliteTableStore::in_memory().unwrap();
        let mut e = entry("u1", "email");
        store.save(e.clone()).await.unwrap();

        e.name = "renamed".to_string();
        store.save(e.clone()).await.unwrap();

        let listed = store.list(&e.owner_id).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "renamed");
    }

    #[tokio::test]
    async fn test_list_partition_only() {
        let store = SqliteTableStore::in_memory().unwrap();
        store.save(entry("u1", "a")).await.unwrap();
        store.save(entry("u1", "b")).await.unwrap();
        store.save(entry("u2", "c")).await.unwrap();

        let owner = OwnerId::new("u1").unwrap();
        let listed = store.list(&owner).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|m| m.name == "a" || m.name == "b"));
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let temp = TempDir::new().unwrap();
        let db_path = temp.path().join("vault.db");

        let saved = {
            let store = SqliteTableStore::open(&db_path).unwrap();
            store.save(entry("u1", "email")).await.unwrap()
        };

        let reopened = SqliteTableStore::open(&db_path).unwrap();
        let fetched = reopened.get(&saved.owner_id, &saved.entry_id).await.unwrap();
        assert_eq!(fetched, saved);
    }
}
