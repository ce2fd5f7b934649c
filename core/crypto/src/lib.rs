//! Cryptographic primitives for CloudVault.
//!
//! This module provides:
//! - Authenticated encryption using ChaCha20-Poly1305 with detached tags
//! - Data-key and master-key types with automatic zeroization
//! - The key-management oracle abstraction and an in-process implementation
//! - Envelope encryption (one data key per secret) and the degraded
//!   static-key cipher
//!
//! # Security Guarantees
//! - All key material is automatically zeroized on drop
//! - No plaintext or key material is ever logged
//! - Decryption verifies the tag before any plaintext leaves this crate

pub mod aead;
pub mod envelope;
pub mod kdf;
pub mod keys;
pub mod oracle;

pub use aead::{open, seal, Sealed, NONCE_SIZE, TAG_SIZE};
pub use envelope::{
    CipherMode, EnvelopeCipher, PayloadCipher, StaticKeyCipher, DEFAULT_ORACLE_TIMEOUT,
};
pub use kdf::derive_static_key;
pub use keys::{DataKey, MasterKey, StaticKey, KEY_LENGTH};
pub use oracle::{GeneratedDataKey, KeyManagementOracle, LocalKeyService};
