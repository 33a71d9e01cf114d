//! HKDF-SHA256 (extract-then-expand, RFC 5869).

use hkdf::Hkdf;
use sha2::Sha256;

use crate::error::CryptoError;

/// Fill `okm` with HKDF-SHA256 output keyed by `ikm`.
///
/// `salt` may be empty (HKDF then uses a zeroed salt block), as may `info`.
pub fn hkdf_sha256(
    ikm: &[u8],
    salt: &[u8],
    info: &[u8],
    okm: &mut [u8],
) -> Result<(), CryptoError> {
    let hk = Hkdf::<Sha256>::new(Some(salt), ikm);
    hk.expand(info, okm)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc5869_case_1() {
        let ikm = [0x0bu8; 22];
        let salt: Vec<u8> = (0x00..=0x0c).collect();
        let info: Vec<u8> = (0xf0..=0xf9).collect();
        let mut okm = [0u8; 42];
        hkdf_sha256(&ikm, &salt, &info, &mut okm).unwrap();
        assert_eq!(
            hex::encode(okm),
            "3cb25f25faacd57a90434f64d0362f2a2d2d0a90cf1a5a4c5db02d56ecc4c5bf34007208d5b887185865"
        );
    }

    #[test]
    fn oversized_request_rejected() {
        let mut okm = vec![0u8; 255 * 32 + 1];
        assert!(hkdf_sha256(b"ikm", b"salt", b"", &mut okm).is_err());
    }
}
