//! Derivation of the degraded-mode static key.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use zeroize::{Zeroize, Zeroizing};

use crate::keys::{StaticKey, KEY_LENGTH};
use cloudvault_common::{Error, Result};

const STATIC_KEY_LABEL: &[u8] = b"cloudvault/static-key/v1";

/// Derive the deployment-wide static key from a configured secret.
///
/// # Postconditions
/// - The same secret always yields the same key
///
/// # Errors
/// - `Configuration` if the secret is empty
pub fn derive_static_key(secret: &[u8]) -> Result<StaticKey> {
    if secret.is_empty() {
        return Err(Error::Configuration(
            "Static key material is empty".to_string(),
        ));
    }

    let mut hasher = Blake2b::<U32>::new();
    hasher.update(STATIC_KEY_LABEL);
    hasher.update(secret);

    let mut result = hasher.finalize();
    let mut derived = Zeroizing::new([0u8; KEY_LENGTH]);
    derived.copy_from_slice(&result);
    result.as_mut_slice().zeroize();
    Ok(StaticKey::from_bytes(*derived))
}
