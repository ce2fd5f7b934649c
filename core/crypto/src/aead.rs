//! Authenticated encryption using ChaCha20-Poly1305.
//!
//! The IETF variant uses a 96-bit nonce and a 128-bit tag. Tags are kept
//! detached from the ciphertext and persisted as their own field.

use chacha20poly1305::{
    aead::{AeadCore, AeadInPlace, KeyInit, OsRng},
    ChaCha20Poly1305, Key, Nonce, Tag,
};
use zeroize::Zeroizing;

use crate::keys::KEY_LENGTH;
use cloudvault_common::{Error, Result, SensitiveBytes};

/// Nonce size for ChaCha20-Poly1305 (12 bytes).
pub const NONCE_SIZE: usize = 12;

/// Authentication tag size (16 bytes).
pub const TAG_SIZE: usize = 16;

/// Output of a seal: ciphertext with its nonce and detached tag.
#[derive(Debug, Clone)]
pub struct Sealed {
    pub ciphertext: Vec<u8>,
    pub nonce: [u8; NONCE_SIZE],
    pub tag: [u8; TAG_SIZE],
}

/// Encrypt plaintext under `key` with a fresh random nonce.
///
/// # Postconditions
/// - The ciphertext length equals the plaintext length
/// - The nonce is drawn from the OS RNG
///
/// # Errors
/// - Returns error if the plaintext exceeds the cipher's message limit
pub fn seal(key: &[u8; KEY_LENGTH], plaintext: &[u8], aad: &[u8]) -> Result<Sealed> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);

    // The buffer holds plaintext until sealing succeeds.
    let mut buffer = Zeroizing::new(plaintext.to_vec());
    let tag = cipher
        .encrypt_in_place_detached(&nonce, aad, buffer.as_mut_slice())
        .map_err(|e| Error::InvalidInput(format!("Encryption failed: {}", e)))?;

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    nonce_bytes.copy_from_slice(&nonce);
    let mut tag_bytes = [0u8; TAG_SIZE];
    tag_bytes.copy_from_slice(&tag);

    Ok(Sealed {
        ciphertext: std::mem::take(&mut *buffer),
        nonce: nonce_bytes,
        tag: tag_bytes,
    })
}

/// Decrypt and authenticate a detached-tag ciphertext.
///
/// Malformed nonces or tags are reported the same way as a failed tag
/// check: the stored bytes are not what was sealed.
///
/// # Errors
/// - `AuthenticationFailure` if the nonce or tag has the wrong length, or
///   the tag does not verify. No plaintext bytes are returned in that case.
pub fn open(
    key: &[u8; KEY_LENGTH],
    nonce: &[u8],
    ciphertext: &[u8],
    tag: &[u8],
    aad: &[u8],
) -> Result<SensitiveBytes> {
    if nonce.len() != NONCE_SIZE || tag.len() != TAG_SIZE {
        return Err(Error::AuthenticationFailure);
    }

    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    let mut buffer = Zeroizing::new(ciphertext.to_vec());

    cipher
        .decrypt_in_place_detached(
            Nonce::from_slice(nonce),
            aad,
            buffer.as_mut_slice(),
            Tag::from_slice(tag),
        )
        .map_err(|_| Error::AuthenticationFailure)?;

    Ok(SensitiveBytes::new(std::mem::take(&mut *buffer)))
}
