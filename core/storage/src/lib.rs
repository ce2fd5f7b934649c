//! Storage backends for CloudVault entries.
//!
//! Two interchangeable variants implement [`StorageBackend`]:
//! - Partitioned table stores ([`MemoryTableStore`], [`SqliteTableStore`]),
//!   keyed by `(owner, entry)`. The per-owner index is the key range itself.
//! - [`IndexedBlobStore`], which keeps every entry as an independent blob on
//!   a [`BlobProvider`] plus an explicit per-owner index blob.
//!
//! # Design Principles
//! - Backend isolation: no backend-specific logic in vault or crypto crates
//! - Async operations: all I/O is async; blocking drivers run off the runtime
//! - Unified error semantics: a missing entry is always `Error::NotFound`

pub mod backend;
pub mod indexed;
pub mod local;
pub mod memory;
pub mod provider;
pub mod registry;
pub mod sqlite;
pub mod table;

pub use backend::StorageBackend;
pub use indexed::IndexedBlobStore;
pub use local::LocalBlobs;
pub use memory::MemoryBlobs;
pub use provider::{BlobPath, BlobProvider};
pub use registry::{create_default_registry, BackendFactory, BackendRegistry};
pub use sqlite::SqliteTableStore;
pub use table::MemoryTableStore;
