//! Common utilities and types shared across CloudVault crates.
//!
//! This crate holds the error taxonomy and the persisted data model, so the
//! crypto, storage and vault layers agree on one shape for an entry.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{
    EncryptedPayload, EntryId, EntryMetadata, OwnerId, RevealedSecret, SensitiveBytes, VaultEntry,
    MAX_ID_LEN,
};
