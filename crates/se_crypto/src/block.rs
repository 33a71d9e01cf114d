//! AES-128-CBC encrypt/decrypt and CBC-MAC.
//!
//! The secure channel's legacy modes run classic CBC with chained IVs across
//! packets, so every call here takes an explicit IV and works on whole
//! blocks; padding policy belongs to the caller.

use aes::cipher::{BlockEncrypt, KeyInit};
use aes::Aes128;
use cbc::cipher::{block_padding::NoPadding, BlockDecryptMut, BlockEncryptMut, KeyIvInit};

use crate::error::CryptoError;

pub const BLOCK_LEN: usize = 16;

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;

fn check_blocks(data: &[u8]) -> Result<(), CryptoError> {
    if data.is_empty() || data.len() % BLOCK_LEN != 0 {
        return Err(CryptoError::InvalidLength(format!(
            "CBC input must be a positive multiple of {BLOCK_LEN} bytes, got {}",
            data.len()
        )));
    }
    Ok(())
}

/// In-place AES-128-CBC encryption. `data` must be whole blocks.
pub fn cbc_encrypt(key: &[u8; 16], iv: &[u8; 16], data: &mut [u8]) -> Result<(), CryptoError> {
    check_blocks(data)?;
    let len = data.len();
    Aes128CbcEnc::new(key.into(), iv.into())
        .encrypt_padded_mut::<NoPadding>(data, len)
        .map_err(|_| CryptoError::InvalidLength("CBC encrypt buffer".into()))?;
    Ok(())
}

/// In-place AES-128-CBC decryption. `data` must be whole blocks.
pub fn cbc_decrypt(key: &[u8; 16], iv: &[u8; 16], data: &mut [u8]) -> Result<(), CryptoError> {
    check_blocks(data)?;
    Aes128CbcDec::new(key.into(), iv.into())
        .decrypt_padded_mut::<NoPadding>(data)
        .map_err(|_| CryptoError::InvalidLength("CBC decrypt buffer".into()))?;
    Ok(())
}

/// AES-128-CBC-MAC: run CBC over `data` starting from `iv`, return the final
/// block. The returned value is both the tag and the next chained MAC IV.
pub fn cbc_mac(key: &[u8; 16], iv: &[u8; 16], data: &[u8]) -> Result<[u8; 16], CryptoError> {
    check_blocks(data)?;
    let cipher = Aes128::new(key.into());
    let mut state = *iv;
    for block in data.chunks_exact(BLOCK_LEN) {
        for (s, b) in state.iter_mut().zip(block) {
            *s ^= b;
        }
        cipher.encrypt_block((&mut state).into());
    }
    Ok(state)
}
