//! Backend registry for resolving a storage backend from configuration.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::backend::StorageBackend;
use crate::indexed::IndexedBlobStore;
use crate::local::LocalBlobs;
use crate::memory::MemoryBlobs;
use crate::sqlite::SqliteTableStore;
use crate::table::MemoryTableStore;
use cloudvault_common::{Error, Result};

/// Factory function type for creating backends.
pub type BackendFactory =
    Box<dyn Fn(Value) -> Result<Arc<dyn StorageBackend>> + Send + Sync>;

/// Registry for storage backend factories.
///
/// Backends are registered by name and built from a JSON options object.
pub struct BackendRegistry {
    factories: HashMap<String, BackendFactory>,
}

impl BackendRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a backend factory.
    ///
    /// # Errors
    /// - `InvalidInput` if name is already registered
    pub fn register(&mut self, name: impl Into<String>, factory: BackendFactory) -> Result<()> {
        let name = name.into();
        if self.factories.contains_key(&name) {
            return Err(Error::InvalidInput(format!(
                "Backend '{}' is already registered",
                name
            )));
        }
        self.factories.insert(name, factory);
        Ok(())
    }

    /// Build a backend by name from its options.
    ///
    /// # Errors
    /// - `Configuration` if the backend is unknown or its options are invalid
    /// - Whatever the backend constructor returns
    pub fn resolve(&self, name: &str, options: Value) -> Result<Arc<dyn StorageBackend>> {
        let factory = self.factories.get(name).ok_or_else(|| {
            Error::Configuration(format!(
                "Storage backend '{}' is not registered (known: {})",
                name,
                self.backends().join(", ")
            ))
        })?;
        factory(options)
    }

    /// Get registered backend names, sorted.
    pub fn backends(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check if a backend is registered.
    pub fn has_backend(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn required_str<'a>(options: &'a Value, backend: &str, key: &str) -> Result<&'a str> {
    options
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| {
            Error::Configuration(format!("Backend '{}' requires option '{}'", backend, key))
        })
}

/// Create a registry with the built-in backends.
///
/// - `memory`: partitioned table in memory
/// - `sqlite`: partitioned table in SQLite, `{"path": ...}`
/// - `memory-blob`: indexed blobs in memory
/// - `local-blob`: indexed blobs on the filesystem, `{"root": ...}`
pub fn create_default_registry() -> BackendRegistry {
    let mut registry = BackendRegistry::new();

    registry.factories.insert(
        "memory".to_string(),
        Box::new(|_options| Ok(Arc::new(MemoryTableStore::new()))),
    );

    registry.factories.insert(
        "sqlite".to_string(),
        Box::new(|options| {
            let path = required_str(&options, "sqlite", "path")?;
            Ok(Arc::new(SqliteTableStore::open(path)?))
        }),
    );

    registry.factories.insert(
        "memory-blob".to_string(),
        Box::new(|_options| Ok(Arc::new(IndexedBlobStore::new(MemoryBlobs::new())))),
    );

    registry.factories.insert(
        "local-blob".to_string(),
        Box::new(|options| {
            let root = required_str(&options, "local-blob", "root")?;
            Ok(Arc::new(IndexedBlobStore::new(LocalBlobs::new(root)?)))
        }),
    );

    registry
}
