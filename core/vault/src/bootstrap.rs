//! One-shot construction of a service from settings.

use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use cloudvault_common::{Error, Result};
use cloudvault_crypto::{CipherMode, EnvelopeCipher, LocalKeyService, PayloadCipher, StaticKeyCipher};
use cloudvault_storage::{create_default_registry, BackendRegistry, StorageBackend};

use crate::config::{CipherSettings, VaultSettings};
use crate::service::VaultService;

/// Service with the cipher and backend chosen at runtime.
pub type DynVaultService = VaultService<Arc<dyn PayloadCipher>, Arc<dyn StorageBackend>>;

/// Build the service described by `settings` with the built-in backends.
///
/// # Errors
/// - `Configuration` if the settings are invalid or name an unknown backend
/// - Backend construction errors
pub fn open_service(settings: &VaultSettings) -> Result<DynVaultService> {
    open_service_with_registry(settings, &create_default_registry())
}

/// Build the service described by `settings`, resolving storage in `registry`.
pub fn open_service_with_registry(
    settings: &VaultSettings,
    registry: &BackendRegistry,
) -> Result<DynVaultService> {
    settings.validate()?;

    let cipher = build_cipher(&settings.cipher)?;
    let storage = registry.resolve(&settings.storage.backend, settings.storage.options.clone())?;

    info!(
        mode = ?cipher.mode(),
        backend = %settings.storage.backend,
        "Vault service ready"
    );
    Ok(VaultService::new(cipher, storage)
        .with_storage_timeout(Duration::from_millis(settings.storage.timeout_ms)))
}

fn build_cipher(settings: &CipherSettings) -> Result<Arc<dyn PayloadCipher>> {
    match settings.mode {
        CipherMode::Envelope => {
            let key_id = settings.master_key_id.clone().ok_or_else(|| {
                Error::Configuration("Envelope mode requires a master key id".to_string())
            })?;
            let oracle = LocalKeyService::from_encoded(&settings.master_keys)?;
            let cipher = EnvelopeCipher::new(Arc::new(oracle), key_id)?
                .with_timeout(Duration::from_millis(settings.oracle_timeout_ms));
            Ok(Arc::new(cipher))
        }
        CipherMode::Static => {
            let secret = settings.static_secret.as_deref().ok_or_else(|| {
                Error::Configuration("Static mode requires a secret".to_string())
            })?;
            Ok(Arc::new(StaticKeyCipher::new(secret.as_bytes())?))
        }
    }
}
