//! Common error types for CloudVault.

use thiserror::Error;

/// Top-level error type for CloudVault operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid deployment configuration. Fatal at startup.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The key-management service could not be reached or refused access.
    #[error("Key service unavailable: {0}")]
    KeyServiceUnavailable(String),

    /// The requested master key does not exist in the key service.
    #[error("Invalid key identifier: {0}")]
    InvalidKeyIdentifier(String),

    /// A wrapped data key could not be unwrapped.
    #[error("Failed to unwrap data key: {0}")]
    UnwrapFailure(String),

    /// AEAD tag verification failed; the payload is corrupt or tampered.
    #[error("Authentication failed: payload is corrupted or has been tampered with")]
    AuthenticationFailure,

    /// Payload shape does not match the cipher mode of this deployment.
    #[error("Cipher mode mismatch: {0}")]
    ModeMismatch(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Storage backend fault.
    #[error("Storage error: {0}")]
    Storage(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A remote call did not complete in time.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Whether the caller may retry the same operation unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::KeyServiceUnavailable(_) | Error::Storage(_) | Error::Io(_) | Error::Timeout(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(Error::KeyServiceUnavailable("down".into()).is_retryable());
        assert!(Error::Timeout("oracle".into()).is_retryable());
        assert!(Error::Storage("disk".into()).is_retryable());

        assert!(!Error::AuthenticationFailure.is_retryable());
        assert!(!Error::NotFound("entry".into()).is_retryable());
        assert!(!Error::Configuration("missing key id".into()).is_retryable());
    }

    #[test]
    fn test_auth_failure_message_has_no_detail() {
        let msg = Error::AuthenticationFailure.to_string();
        assert!(msg.contains("tampered"));
    }
}
