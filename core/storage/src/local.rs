//! Local filesystem blob provider.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::provider::{BlobPath, BlobProvider};
use cloudvault_common::{Error, Result};

/// Marker in the names of in-flight writes.
const TEMP_MARKER: &str = ".tmp-";

/// Local filesystem blob provider.
///
/// Each blob is one file under the root directory. Writes land in a
/// sibling temp file, are synced to disk, and are then renamed into place.
pub struct LocalBlobs {
    root: PathBuf,
}

impl LocalBlobs {
    /// Create a new local provider with the given root directory.
    ///
    /// # Postconditions
    /// - Root directory is created if it doesn't exist
    ///
    /// # Errors
    /// - Permission denied
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        // Create root if it doesn't exist (sync for constructor)
        if !root.exists() {
            std::fs::create_dir_all(&root)?;
        }

        Ok(Self { root })
    }

    /// Get the root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Convert a BlobPath to a filesystem path.
    fn to_fs_path(&self, path: &BlobPath) -> PathBuf {
        let mut fs_path = self.root.clone();
        for component in path.components() {
            fs_path.push(component);
        }
        fs_path
    }
}

/// Write a file and flush it to disk before returning.
async fn write_synced(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(data).await?;
    file.sync_all().await
}

#[async_trait]
impl BlobProvider for LocalBlobs {
    fn name(&self) -> &str {
        "local"
    }

    async fn put(&self, path: &BlobPath, data: Vec<u8>) -> Result<()> {
        let name = path
            .name()
            .ok_or_else(|| Error::InvalidInput("Cannot write to root".to_string()))?;
        let fs_path = self.to_fs_path(path);

        if let Some(parent) = fs_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let temp_path = fs_path.with_file_name(format!("{}{}{}", name, TEMP_MARKER, Uuid::new_v4()));
        if let Err(e) = write_synced(&temp_path, &data).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&temp_path, &fs_path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn get(&self, path: &BlobPath) -> Result<Vec<u8>> {
        let fs_path = self.to_fs_path(path);

        match fs::read(&fs_path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(Error::NotFound(format!("Blob not found: {}", path)))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, dir: &BlobPath) -> Result<Vec<String>> {
        let fs_path = self.to_fs_path(dir);

        let mut entries = match fs::read_dir(&fs_path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut results = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if !name.contains(TEMP_MARKER) {
                    results.push(name.to_string());
                }
            }
        }

        Ok(results)
    }
}
