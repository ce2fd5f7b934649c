//! Payload ciphers: envelope encryption and the degraded static-key mode.
//!
//! A deployment picks exactly one [`PayloadCipher`] at startup. The shape of
//! a payload records which one sealed it: envelope payloads carry a wrapped
//! data key, static-key payloads do not. Each cipher refuses the other shape.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::aead;
use crate::kdf::derive_static_key;
use crate::keys::StaticKey;
use crate::oracle::KeyManagementOracle;
use cloudvault_common::{EncryptedPayload, Error, Result, SensitiveBytes};

/// Default bound on a single key-service call.
pub const DEFAULT_ORACLE_TIMEOUT: Duration = Duration::from_secs(5);

/// Which protection scheme a cipher applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CipherMode {
    /// One oracle-wrapped data key per secret.
    Envelope,
    /// One deployment-wide key for every secret.
    Static,
}

/// Seals and opens secret payloads.
#[async_trait]
pub trait PayloadCipher: Send + Sync {
    /// Mode this cipher implements.
    fn mode(&self) -> CipherMode;

    /// Encrypt a secret.
    async fn encrypt(&self, plaintext: &[u8]) -> Result<EncryptedPayload>;

    /// Decrypt a payload produced by a cipher of the same mode.
    ///
    /// # Errors
    /// - `AuthenticationFailure` if the ciphertext, nonce or tag was altered
    /// - `ModeMismatch` if the payload was sealed by the other mode
    async fn decrypt(&self, payload: &EncryptedPayload) -> Result<SensitiveBytes>;
}

#[async_trait]
impl<T: PayloadCipher + ?Sized> PayloadCipher for Arc<T> {
    fn mode(&self) -> CipherMode {
        (**self).mode()
    }

    async fn encrypt(&self, plaintext: &[u8]) -> Result<EncryptedPayload> {
        (**self).encrypt(plaintext).await
    }

    async fn decrypt(&self, payload: &EncryptedPayload) -> Result<SensitiveBytes> {
        (**self).decrypt(payload).await
    }
}

/// Envelope cipher backed by a key-management oracle.
pub struct EnvelopeCipher<O> {
    oracle: O,
    master_key_id: String,
    timeout: Duration,
}

impl<O: KeyManagementOracle> EnvelopeCipher<O> {
    /// Create an envelope cipher that generates data keys under `master_key_id`.
    ///
    /// # Errors
    /// - `Configuration` if `master_key_id` is empty
    pub fn new(oracle: O, master_key_id: impl Into<String>) -> Result<Self> {
        let master_key_id = master_key_id.into();
        if master_key_id.is_empty() {
            return Err(Error::Configuration(
                "Master key identifier is not set".to_string(),
            ));
        }
        Ok(Self {
            oracle,
            master_key_id,
            timeout: DEFAULT_ORACLE_TIMEOUT,
        })
    }

    /// Set the bound on each oracle call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Get the master key identifier.
    pub fn master_key_id(&self) -> &str {
        &self.master_key_id
    }

    /// Run an oracle call under the configured timeout.
    ///
    /// On expiry the call's future is dropped, which drops any key it held.
    async fn bounded<T>(&self, op: &str, call: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| {
                Error::Timeout(format!(
                    "{} on key service '{}' exceeded {:?}",
                    op,
                    self.oracle.name(),
                    self.timeout
                ))
            })?
    }
}

#[async_trait]
impl<O: KeyManagementOracle> PayloadCipher for EnvelopeCipher<O> {
    fn mode(&self) -> CipherMode {
        CipherMode::Envelope
    }

    async fn encrypt(&self, plaintext: &[u8]) -> Result<EncryptedPayload> {
        let data_key = self
            .bounded(
                "generate_data_key",
                self.oracle.generate_data_key(&self.master_key_id),
            )
            .await?;

        // The plaintext key is scrubbed when data_key drops, on every path out of here
        let sealed = aead::seal(data_key.plaintext.as_bytes(), plaintext, &[])?;

        debug!(size = plaintext.len(), "Payload sealed under fresh data key");
        Ok(EncryptedPayload {
            ciphertext: sealed.ciphertext,
            nonce: sealed.nonce.to_vec(),
            auth_tag: sealed.tag.to_vec(),
            wrapped_data_key: Some(data_key.wrapped),
        })
    }

    async fn decrypt(&self, payload: &EncryptedPayload) -> Result<SensitiveBytes> {
        let wrapped = payload.wrapped_data_key.as_deref().ok_or_else(|| {
            Error::ModeMismatch(
                "Payload has no wrapped data key; it was sealed by the static-key cipher"
                    .to_string(),
            )
        })?;

        let data_key = self
            .bounded("unwrap_data_key", self.oracle.unwrap_data_key(wrapped))
            .await?;

        let plaintext = aead::open(
            data_key.as_bytes(),
            &payload.nonce,
            &payload.ciphertext,
            &payload.auth_tag,
            &[],
        )?;

        debug!(size = plaintext.len(), "Payload opened");
        Ok(plaintext)
    }
}

/// Degraded-mode cipher: one static key protects every secret.
///
/// This is weaker than envelope encryption: compromise of the configured
/// secret exposes every entry in the deployment, and all nonces are drawn
/// under the same key.
pub struct StaticKeyCipher {
    key: StaticKey,
}

impl StaticKeyCipher {
    /// Derive the static key from the configured secret.
    ///
    /// # Errors
    /// - `Configuration` if the secret is empty
    pub fn new(secret: &[u8]) -> Result<Self> {
        let key = derive_static_key(secret)?;
        warn!("Static-key cipher active: all secrets share one key (degraded mode)");
        Ok(Self { key })
    }
}

#[async_trait]
impl PayloadCipher for StaticKeyCipher {
    fn mode(&self) -> CipherMode {
        CipherMode::Static
    }

    async fn encrypt(&self, plaintext: &[u8]) -> Result<EncryptedPayload> {
        let sealed = aead::seal(self.key.as_bytes(), plaintext, &[])?;

        Ok(EncryptedPayload {
            ciphertext: sealed.ciphertext,
            nonce: sealed.nonce.to_vec(),
            auth_tag: sealed.tag.to_vec(),
            wrapped_data_key: None,
        })
    }

    async fn decrypt(&self, payload: &EncryptedPayload) -> Result<SensitiveBytes> {
        if payload.is_envelope() {
            return Err(Error::ModeMismatch(
                "Payload carries a wrapped data key; it was sealed by the envelope cipher"
                    .to_string(),
            ));
        }

        aead::open(
            self.key.as_bytes(),
            &payload.nonce,
            &payload.ciphertext,
            &payload.auth_tag,
            &[],
        )
    }
}
