//! Data model shared by the cipher, the storage backends and the vault service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;
use zeroize::Zeroize;

/// Longest accepted owner or entry id, in bytes.
///
/// Blob backends encode ids into single path segments, and the encoded
/// form must fit a 255-byte file name.
pub const MAX_ID_LEN: usize = 128;

/// Identifier of the authenticated owner of a set of entries.
///
/// The surrounding service verifies the caller; this type only guarantees
/// the identifier is non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    /// Create a new OwnerId from a string.
    ///
    /// # Errors
    /// - Returns error if id is empty or longer than [`MAX_ID_LEN`]
    pub fn new(id: impl Into<String>) -> crate::Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(crate::Error::InvalidInput(
                "OwnerId cannot be empty".to_string(),
            ));
        }
        if id.len() > MAX_ID_LEN {
            return Err(crate::Error::InvalidInput(format!(
                "OwnerId exceeds {} bytes",
                MAX_ID_LEN
            )));
        }
        Ok(Self(id))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of one entry, unique within its owner.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(String);

impl EntryId {
    /// Generate a fresh random entry id (UUID v4).
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wrap an existing id, e.g. one supplied by a caller for lookup.
    ///
    /// # Errors
    /// - Returns error if id is empty or longer than [`MAX_ID_LEN`]
    pub fn new(id: impl Into<String>) -> crate::Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(crate::Error::InvalidInput(
                "EntryId cannot be empty".to_string(),
            ));
        }
        if id.len() > MAX_ID_LEN {
            return Err(crate::Error::InvalidInput(format!(
                "EntryId exceeds {} bytes",
                MAX_ID_LEN
            )));
        }
        Ok(Self(id))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Encrypted form of one secret.
///
/// `wrapped_data_key` is present only for envelope-mode payloads; its
/// absence marks a payload sealed under the static deployment key.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedPayload {
    #[serde(with = "b64")]
    pub ciphertext: Vec<u8>,
    #[serde(with = "b64")]
    pub nonce: Vec<u8>,
    #[serde(with = "b64")]
    pub auth_tag: Vec<u8>,
    #[serde(
        default,
        with = "b64_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub wrapped_data_key: Option<Vec<u8>>,
}

impl EncryptedPayload {
    /// Whether this payload carries its own wrapped data key.
    pub fn is_envelope(&self) -> bool {
        self.wrapped_data_key.is_some()
    }
}

impl fmt::Debug for EncryptedPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptedPayload")
            .field("ciphertext_len", &self.ciphertext.len())
            .field("nonce_len", &self.nonce.len())
            .field("auth_tag_len", &self.auth_tag.len())
            .field("envelope", &self.is_envelope())
            .finish()
    }
}

/// A persisted vault entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultEntry {
    pub owner_id: OwnerId,
    pub entry_id: EntryId,
    pub name: String,
    #[serde(flatten)]
    pub payload: EncryptedPayload,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VaultEntry {
    /// Project the non-secret metadata of this entry.
    pub fn metadata(&self) -> EntryMetadata {
        EntryMetadata {
            entry_id: self.entry_id.clone(),
            name: self.name.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Metadata of an entry. Never carries ciphertext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryMetadata {
    pub entry_id: EntryId,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Sensitive data wrapper that zeroizes on drop.
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct SensitiveBytes(Vec<u8>);

impl SensitiveBytes {
    /// Create new sensitive bytes.
    pub fn new(data: Vec<u8>) -> Self {
        Self(data)
    }

    /// Get a reference to the inner bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Get the length.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SensitiveBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SensitiveBytes([REDACTED; {} bytes])", self.0.len())
    }
}

/// A decrypted secret together with its metadata.
#[derive(Debug)]
pub struct RevealedSecret {
    pub metadata: EntryMetadata,
    pub secret: SensitiveBytes,
}

mod b64 {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(d)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

mod b64_opt {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(b) => s.serialize_str(&STANDARD.encode(b)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        let encoded: Option<String> = Option::deserialize(d)?;
        encoded
            .map(|e| STANDARD.decode(e).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entry(wrapped: Option<Vec<u8>>) -> VaultEntry {
        let now = Utc::now();
        VaultEntry {
            owner_id: OwnerId::new("u1").unwrap(),
            entry_id: EntryId::generate(),
            name: "email".to_string(),
            payload: EncryptedPayload {
                ciphertext: vec![1, 2, 3, 4],
                nonce: vec![7u8; 12],
                auth_tag: vec![9u8; 16],
                wrapped_data_key: wrapped,
            },
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_id_length_is_capped() {
        let longest = "o".repeat(MAX_ID_LEN);
        assert!(OwnerId::new(longest.clone()).is_ok());
        assert!(EntryId::new(longest).is_ok());

        let too_long = "o".repeat(MAX_ID_LEN + 1);
        assert!(matches!(
            OwnerId::new(too_long.clone()),
            Err(crate::Error::InvalidInput(_))
        ));
        assert!(matches!(
            EntryId::new(too_long),
            Err(crate::Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_owner_id_empty_fails() {
        assert!(OwnerId::new("").is_err());
        assert_eq!(OwnerId::new("u1").unwrap().as_str(), "u1");
    }

    #[test]
    fn test_entry_id_generate_unique() {
        assert_ne!(EntryId::generate(), EntryId::generate());
        assert!(EntryId::new("").is_err());
    }

    #[test]
    fn test_entry_wire_schema_envelope() {
        let entry = sample_entry(Some(vec![5u8; 8]));
        let json: serde_json::Value = serde_json::to_value(&entry).unwrap();

        assert_eq!(json["ownerId"], "u1");
        assert_eq!(json["name"], "email");
        assert_eq!(json["ciphertext"], "AQIDBA==");
        assert!(json["nonce"].is_string());
        assert!(json["authTag"].is_string());
        assert!(json["wrappedDataKey"].is_string());
        assert!(json["createdAt"].is_string());

        let restored: VaultEntry = serde_json::from_value(json).unwrap();
        assert_eq!(restored, entry);
    }

    #[test]
    fn test_entry_wire_schema_static_omits_wrapped_key() {
        let entry = sample_entry(None);
        let json: serde_json::Value = serde_json::to_value(&entry).unwrap();

        assert!(json.get("wrappedDataKey").is_none());

        let restored: VaultEntry = serde_json::from_value(json).unwrap();
        assert!(!restored.payload.is_envelope());
    }

    #[test]
    fn test_metadata_projection() {
        let entry = sample_entry(None);
        let meta = entry.metadata();
        assert_eq!(meta.entry_id, entry.entry_id);
        assert_eq!(meta.name, "email");

        let json = serde_json::to_string(&meta).unwrap();
        assert!(!json.contains("ciphertext"));
    }

    #[test]
    fn test_sensitive_bytes_debug_redacted() {
        let secret = SensitiveBytes::new(b"hunter2".to_vec());
        let debug = format!("{:?}", secret);
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("hunter2"));
    }
}
