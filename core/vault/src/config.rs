//! Deployment settings.
//!
//! Settings come from a JSON file, then environment overrides, then
//! [`VaultSettings::validate`]. Missing key material is fatal at startup.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use zeroize::Zeroize;

use cloudvault_common::{Error, Result};
use cloudvault_crypto::{CipherMode, DEFAULT_ORACLE_TIMEOUT};

/// Environment variable naming the master key id.
pub const ENV_MASTER_KEY_ID: &str = "CLOUDVAULT_MASTER_KEY_ID";
/// Environment variable holding the static-mode secret.
pub const ENV_STATIC_KEY: &str = "CLOUDVAULT_STATIC_KEY";
/// Environment variable selecting the storage backend.
pub const ENV_STORAGE: &str = "CLOUDVAULT_STORAGE";
/// Environment variable setting the storage location.
pub const ENV_STORAGE_PATH: &str = "CLOUDVAULT_STORAGE_PATH";

/// Default bound on a single storage call.
pub const DEFAULT_STORAGE_TIMEOUT_MS: u64 = 10_000;

fn default_oracle_timeout_ms() -> u64 {
    DEFAULT_ORACLE_TIMEOUT.as_millis() as u64
}

fn default_storage_timeout_ms() -> u64 {
    DEFAULT_STORAGE_TIMEOUT_MS
}

fn default_backend() -> String {
    "memory".to_string()
}

fn default_options() -> Value {
    Value::Object(Default::default())
}

/// Cipher selection and key material.
#[derive(Clone, Serialize, Deserialize)]
pub struct CipherSettings {
    pub mode: CipherMode,
    /// Master key used to wrap new data keys (envelope mode).
    #[serde(default)]
    pub master_key_id: Option<String>,
    /// Key ring of the local key service: id to base64 32-byte key.
    #[serde(default)]
    pub master_keys: HashMap<String, String>,
    /// Deployment secret (static mode).
    #[serde(default)]
    pub static_secret: Option<String>,
    #[serde(default = "default_oracle_timeout_ms")]
    pub oracle_timeout_ms: u64,
}

impl Default for CipherSettings {
    fn default() -> Self {
        Self {
            mode: CipherMode::Envelope,
            master_key_id: None,
            master_keys: HashMap::new(),
            static_secret: None,
            oracle_timeout_ms: default_oracle_timeout_ms(),
        }
    }
}

impl CipherSettings {
    /// Whether a master key id or key ring is configured.
    pub fn has_envelope_keys(&self) -> bool {
        self.master_key_id.as_deref().is_some_and(|id| !id.is_empty())
            || !self.master_keys.is_empty()
    }
}

impl fmt::Debug for CipherSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut key_ids: Vec<&String> = self.master_keys.keys().collect();
        key_ids.sort();
        f.debug_struct("CipherSettings")
            .field("mode", &self.mode)
            .field("master_key_id", &self.master_key_id)
            .field("master_keys", &key_ids)
            .field(
                "static_secret",
                &self.static_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("oracle_timeout_ms", &self.oracle_timeout_ms)
            .finish()
    }
}

impl Drop for CipherSettings {
    fn drop(&mut self) {
        self.static_secret.zeroize();
        for encoded in self.master_keys.values_mut() {
            encoded.zeroize();
        }
    }
}

/// Storage backend selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Registry name of the backend.
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Backend-specific options, passed to its factory.
    #[serde(default = "default_options")]
    pub options: Value,
    #[serde(default = "default_storage_timeout_ms")]
    pub timeout_ms: u64,
}

impl StorageSettings {
    /// Whether the backend keeps entries only for the life of the process.
    pub fn is_ephemeral(&self) -> bool {
        matches!(self.backend.as_str(), "memory" | "memory-blob")
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            options: default_options(),
            timeout_ms: default_storage_timeout_ms(),
        }
    }
}

/// Complete settings of one deployment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VaultSettings {
    #[serde(default)]
    pub cipher: CipherSettings,
    #[serde(default)]
    pub storage: StorageSettings,
}

impl VaultSettings {
    /// Parse settings from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::Configuration(format!("Invalid settings: {}", e)))
    }

    /// Read settings from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&json)
    }

    /// Default settings file: `<config dir>/cloudvault/config.json`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("cloudvault").join("config.json"))
    }

    /// Load the deployment settings.
    ///
    /// Reads `path` if given, else the default file if it exists, else
    /// starts from defaults. Environment overrides are applied, then the
    /// result is validated.
    ///
    /// # Errors
    /// - `Configuration` for unreadable files or invalid settings
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(path) => Self::from_file(path)?,
                None => Self::default(),
            },
        };
        settings.apply_env()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from a variable lookup.
    ///
    /// Setting a static key switches the mode to static, but only while no
    /// envelope key material is configured. The storage path lands in the
    /// option the selected backend reads.
    ///
    /// # Errors
    /// - `Configuration` if a static key is supplied alongside an envelope
    ///   master key id or key ring
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(key_id) = lookup(ENV_MASTER_KEY_ID) {
            self.cipher.master_key_id = Some(key_id);
        }
        if let Some(secret) = lookup(ENV_STATIC_KEY) {
            if self.cipher.has_envelope_keys() {
                return Err(Error::Configuration(format!(
                    "{} is set but envelope key material is configured; refusing to switch to static mode",
                    ENV_STATIC_KEY
                )));
            }
            self.cipher.mode = CipherMode::Static;
            self.cipher.static_secret = Some(secret);
        }
        if let Some(backend) = lookup(ENV_STORAGE) {
            self.storage.backend = backend;
        }
        if let Some(path) = lookup(ENV_STORAGE_PATH) {
            let option = match self.storage.backend.as_str() {
                "local-blob" => "root",
                _ => "path",
            };
            if !self.storage.options.is_object() {
                self.storage.options = default_options();
            }
            if let Some(options) = self.storage.options.as_object_mut() {
                options.insert(option.to_string(), Value::String(path));
            }
        }
        Ok(())
    }

    /// Check that the selected mode has its key material.
    ///
    /// # Errors
    /// - `Configuration` naming the first problem found
    pub fn validate(&self) -> Result<()> {
        let cipher = &self.cipher;
        match cipher.mode {
            CipherMode::Envelope => {
                let key_id = cipher
                    .master_key_id
                    .as_deref()
                    .filter(|id| !id.is_empty())
                    .ok_or_else(|| {
                        Error::Configuration(format!(
                            "Envelope mode requires a master key id ({})",
                            ENV_MASTER_KEY_ID
                        ))
                    })?;
                if !cipher.master_keys.contains_key(key_id) {
                    return Err(Error::Configuration(format!(
                        "Master key '{}' is not in the key ring",
                        key_id
                    )));
                }
            }
            CipherMode::Static => {
                if cipher.static_secret.as_deref().map_or(true, str::is_empty) {
                    return Err(Error::Configuration(format!(
                        "Static mode requires a secret ({})",
                        ENV_STATIC_KEY
                    )));
                }
            }
        }

        if cipher.oracle_timeout_ms == 0 || self.storage.timeout_ms == 0 {
            return Err(Error::Configuration(
                "Timeouts must be greater than zero".to_string(),
            ));
        }
        if self.storage.backend.is_empty() {
            return Err(Error::Configuration(
                "Storage backend must be named".to_string(),
            ));
        }
        Ok(())
    }
}
