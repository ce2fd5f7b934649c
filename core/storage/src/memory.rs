//! In-memory blob provider for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::provider::{BlobPath, BlobProvider};
use cloudvault_common::{Error, Result};

/// In-memory blob provider.
///
/// Useful for testing and development. All data is stored in memory
/// and lost on drop.
pub struct MemoryBlobs {
    storage: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobs {
    /// Create a new empty memory provider.
    pub fn new() -> Self {
        Self {
            storage: RwLock::new(HashMap::new()),
        }
    }

    fn poisoned() -> Error {
        Error::Storage("Blob map lock poisoned".to_string())
    }
}

impl Default for MemoryBlobs {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlobProvider for MemoryBlobs {
    fn name(&self) -> &str {
        "memory"
    }

    async fn put(&self, path: &BlobPath, data: Vec<u8>) -> Result<()> {
        if path.is_root() {
            return Err(Error::InvalidInput("Cannot write to root".to_string()));
        }
        self.storage
            .write()
            .map_err(|_| Self::poisoned())?
            .insert(path.to_string_path(), data);
        Ok(())
    }

    async fn get(&self, path: &BlobPath) -> Result<Vec<u8>> {
        self.storage
            .read()
            .map_err(|_| Self::poisoned())?
            .get(&path.to_string_path())
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Blob not found: {}", path)))
    }

    async fn list(&self, dir: &BlobPath) -> Result<Vec<String>> {
        let prefix = if dir.is_root() {
            "/".to_string()
        } else {
            format!("{}/", dir.to_string_path())
        };

        let storage = self.storage.read().map_err(|_| Self::poisoned())?;
        Ok(storage
            .keys()
            .filter_map(|key| key.strip_prefix(&prefix))
            // Only direct children (no more slashes)
            .filter(|relative| !relative.contains('/'))
            .map(String::from)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get() {
        let provider = MemoryBlobs::new();
        let path = BlobPath::parse("/test.json").unwrap();
        let data = b"Hello, World!".to_vec();

        provider.put(&path, data.clone()).await.unwrap();
        assert_eq!(provider.get(&path).await.unwrap(), data);
    }

    #[tokio::test]
    async fn test_get_missing() {
        let provider = MemoryBlobs::new();
        let path = BlobPath::parse("/missing.json").unwrap();

        assert!(matches!(provider.get(&path).await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_put_replaces() {
        let provider = MemoryBlobs::new();
        let path = BlobPath::parse("/index/u1.json").unwrap();

        provider.put(&path, vec![1]).await.unwrap();
        provider.put(&path, vec![2]).await.unwrap();
        assert_eq!(provider.get(&path).await.unwrap(), vec![2]);
    }

    #[tokio::test]
    async fn test_list_direct_children() {
        let provider = MemoryBlobs::new();
        provider.put(&BlobPath::parse("/dir/file1").unwrap(), vec![1]).await.unwrap();
        provider.put(&BlobPath::parse("/dir/file2").unwrap(), vec![2]).await.unwrap();
        provider.put(&BlobPath::parse("/dir/sub/file3").unwrap(), vec![3]).await.unwrap();
        provider.put(&BlobPath::parse("/dirx/file4").unwrap(), vec![4]).await.unwrap();

        let mut names = provider.list(&BlobPath::parse("/dir").unwrap()).await.unwrap();
        names.sort();
        assert_eq!(names, vec!["file1", "file2"]);

        let empty = provider.list(&BlobPath::parse("/nothing").unwrap()).await.unwrap();
        assert!(empty.is_empty());
    }
}
