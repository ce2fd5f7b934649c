//! Vault service for CloudVault.
//!
//! This module provides:
//! - Secret creation, retrieval, and listing over a pluggable cipher and
//!   storage backend
//! - Deployment settings with environment overrides
//! - Construction of a ready service from settings
//!
//! # Architecture
//! The service sits between the caller (which has already authenticated
//! the owner) and the storage backends. Plaintext exists only inside
//! `create` and in the [`RevealedSecret`](cloudvault_common::RevealedSecret)
//! returned by `fetch`.

pub mod bootstrap;
pub mod config;
pub mod service;

pub use bootstrap::{open_service, open_service_with_registry, DynVaultService};
pub use config::{CipherSettings, StorageSettings, VaultSettings};
pub use service::{VaultService, MAX_NAME_LEN, MAX_SECRET_LEN};
