//! P-256 (secp256r1) ECDH key agreement and ECDSA signing.
//!
//! Public keys travel in uncompressed SEC 1 form (0x04 || x || y, 65 bytes).
//! The ECDH shared secret is the raw x-coordinate, which the secure channel
//! feeds into its own KDF — no hashing happens here.

use p256::ecdh::diffie_hellman;
use p256::ecdsa::signature::hazmat::PrehashSigner;
use p256::ecdsa::{Signature, SigningKey};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::{PublicKey, SecretKey};
use rand::rngs::OsRng;
use zeroize::Zeroizing;

use crate::error::CryptoError;

pub const PUBLIC_KEY_LEN: usize = 65;
pub const SHARED_SECRET_LEN: usize = 32;
pub const SIGNATURE_LEN: usize = 64;

/// Ephemeral P-256 keypair. The secret key is zeroed on drop.
pub struct EcdheKeyPair {
    secret_key: SecretKey,
    /// Uncompressed SEC 1 encoding, cached at generation time.
    public_key_bytes: [u8; PUBLIC_KEY_LEN],
}

impl EcdheKeyPair {
    pub fn generate() -> Self {
        let secret_key = SecretKey::random(&mut OsRng);
        Self::from_secret(secret_key)
    }

    /// Build a keypair from a raw 32-byte scalar (e.g. a provisioned host key).
    pub fn from_secret_bytes(bytes: &[u8; 32]) -> Result<Self, CryptoError> {
        let secret_key = SecretKey::from_slice(bytes)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        Ok(Self::from_secret(secret_key))
    }

    fn from_secret(secret_key: SecretKey) -> Self {
        let point = secret_key.public_key().to_encoded_point(false);
        let mut public_key_bytes = [0u8; PUBLIC_KEY_LEN];
        public_key_bytes.copy_from_slice(point.as_bytes());
        Self { secret_key, public_key_bytes }
    }

    /// Uncompressed public key (0x04 || x || y).
    pub fn public_key(&self) -> &[u8; PUBLIC_KEY_LEN] {
        &self.public_key_bytes
    }

    /// ECDH against a peer public key in SEC 1 form (compressed or not).
    /// Returns the raw 32-byte x-coordinate, zeroed on drop.
    pub fn shared_secret(
        &self,
        peer_public: &[u8],
    ) -> Result<Zeroizing<[u8; SHARED_SECRET_LEN]>, CryptoError> {
        let peer = PublicKey::from_sec1_bytes(peer_public)
            .map_err(|e| CryptoError::KeyAgreement(e.to_string()))?;
        let shared = diffie_hellman(self.secret_key.to_nonzero_scalar(), peer.as_affine());
        let mut out = Zeroizing::new([0u8; SHARED_SECRET_LEN]);
        out.copy_from_slice(shared.raw_secret_bytes());
        Ok(out)
    }
}

/// ECDSA-sign a precomputed SHA-256 digest with a raw P-256 scalar.
/// Returns the fixed-size (r || s) signature the device expects.
pub fn ecdsa_sign_prehash(
    secret: &[u8; 32],
    digest: &[u8; 32],
) -> Result<[u8; SIGNATURE_LEN], CryptoError> {
    let key = SigningKey::from_slice(secret).map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
    let signature: Signature = key
        .sign_prehash(digest)
        .map_err(|e| CryptoError::Signing(e.to_string()))?;
    let mut out = [0u8; SIGNATURE_LEN];
    out.copy_from_slice(&signature.to_bytes());
    Ok(out)
}
