//! Blob provider trait definition.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

use cloudvault_common::{Error, Result};

/// Location of a blob, independent of the underlying provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlobPath {
    components: Vec<String>,
}

impl BlobPath {
    /// Create a root path.
    pub fn root() -> Self {
        Self {
            components: Vec::new(),
        }
    }

    /// Parse a path string into BlobPath.
    ///
    /// Uses '/' as separator.
    pub fn parse(path: &str) -> Result<Self> {
        let path = path.trim_start_matches('/').trim_end_matches('/');
        if path.is_empty() {
            return Ok(Self::root());
        }

        let mut parsed = Self::root();
        for component in path.split('/') {
            parsed = parsed.join(component)?;
        }
        Ok(parsed)
    }

    /// Join this path with a child component.
    ///
    /// # Errors
    /// - Component is empty, `.`/`..`, or contains a separator
    pub fn join(&self, child: &str) -> Result<Self> {
        if child.is_empty() || child == "." || child == ".." {
            return Err(Error::InvalidInput(format!(
                "Invalid path component: '{}'",
                child
            )));
        }
        if child.contains('/') || child.contains('\\') {
            return Err(Error::InvalidInput(
                "Path component cannot contain separators".to_string(),
            ));
        }
        let mut components = self.components.clone();
        components.push(child.to_string());
        Ok(Self { components })
    }

    /// Check if this is the root path.
    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }

    /// Get the last component.
    pub fn name(&self) -> Option<&str> {
        self.components.last().map(|s| s.as_str())
    }

    /// Get the path components.
    pub fn components(&self) -> &[String] {
        &self.components
    }

    /// Convert to a string representation.
    pub fn to_string_path(&self) -> String {
        format!("/{}", self.components.join("/"))
    }
}

impl fmt::Display for BlobPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_string_path())
    }
}

/// Store of independently addressed blobs.
///
/// Providers offer whole-object reads and writes only. Nothing here is
/// transactional across blobs.
#[async_trait]
pub trait BlobProvider: Send + Sync {
    /// Get the provider name (e.g., "memory", "local").
    fn name(&self) -> &str;

    /// Write a blob, replacing any previous content.
    ///
    /// # Postconditions
    /// - Missing parent locations are created
    /// - Readers see either the old or the new content, never a mix
    async fn put(&self, path: &BlobPath, data: Vec<u8>) -> Result<()>;

    /// Read a whole blob.
    ///
    /// # Errors
    /// - `NotFound` if no blob exists at path
    async fn get(&self, path: &BlobPath) -> Result<Vec<u8>>;

    /// List the names of blobs directly under `dir`.
    ///
    /// A location that was never written lists as empty.
    async fn list(&self, dir: &BlobPath) -> Result<Vec<String>>;
}

#[async_trait]
impl<T: BlobProvider + ?Sized> BlobProvider for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn put(&self, path: &BlobPath, data: Vec<u8>) -> Result<()> {
        (**self).put(path, data).await
    }

    async fn get(&self, path: &BlobPath) -> Result<Vec<u8>> {
        (**self).get(path).await
    }

    async fn list(&self, dir: &BlobPath) -> Result<Vec<String>> {
        (**self).list(dir).await
    }
}
