//! AES-256-GCM seal/open.
//!
//! Nonces are caller-supplied: the secure channel runs a 96-bit big-endian
//! packet counter per direction, so random nonces would break
//! wire-compatibility. Tag: 16 bytes, appended to the ciphertext.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use zeroize::Zeroizing;

use crate::error::CryptoError;

pub const GCM_NONCE_LEN: usize = 12;
pub const GCM_TAG_LEN: usize = 16;

/// Encrypt `plaintext`, returning ciphertext with the 16-byte tag appended.
/// No associated data.
pub fn gcm_seal(
    key: &[u8; 32],
    nonce: &[u8; GCM_NONCE_LEN],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::AeadEncrypt)?;
    cipher
        .encrypt(Nonce::from_slice(nonce), Payload { msg: plaintext, aad: &[] })
        .map_err(|_| CryptoError::AeadEncrypt)
}

/// Decrypt `data` (ciphertext || tag). Tag mismatch surfaces as
/// [`CryptoError::AeadDecrypt`].
pub fn gcm_open(
    key: &[u8; 32],
    nonce: &[u8; GCM_NONCE_LEN],
    data: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    if data.len() < GCM_TAG_LEN {
        return Err(CryptoError::AeadDecrypt);
    }
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::AeadDecrypt)?;
    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce), Payload { msg: data, aad: &[] })
        .map_err(|_| CryptoError::AeadDecrypt)?;
    Ok(Zeroizing::new(plaintext))
}
