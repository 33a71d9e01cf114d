//! Session establishment: derive one mode's key material from a peer
//! challenge plus caller-supplied secrets.
//!
//! # Derivations (wire-compatible with the device)
//!
//! - `PlainInit` / `CbcInit`: AES-128-CBC-encrypt 80 challenge bytes under
//!   the shared key (IV = first challenge block); the ciphertext IS the
//!   session material, sliced as IV_dec ‖ IV_enc ‖ IV_mac ‖ K_enc ‖ K_mac.
//!   `CbcInit` encrypts the challenge shifted by one block.
//! - `GcmInit`: AES-256-GCM seal of `challenge[16..96]` with the challenge
//!   head as nonce; the authenticated ciphertext is the "Z value".
//! - `Ecdhe` / `AuthEcdhe`: P-256 ECDH x-coordinate is the Z value.
//!   `AuthEcdhe` layers an ECDSA proof on top (see [`sign_session_params`]);
//!   key derivation is identical.
//! - Z-value modes then derive
//!   `K_dec = SHA256(0x00*8 ‖ Z ‖ "SECURECHANNEL")` and
//!   `K_enc = SHA256(0x00*7‖0x01 ‖ Z ‖ "SECURECHANNEL")`, with zero IVs.
//! - Ratchet modes store the challenge as `random_seed` and the pre-shared
//!   key (or ECDH Z) as HKDF input key material; per-packet derivation
//!   happens in [`crate::ratchet`].
//!
//! Establishment never fetches secrets itself, and never leaves a
//! partially-derived key behind: the context reaches `Active` only after
//! the whole derivation succeeded.

use tracing::debug;
use zeroize::Zeroizing;

use se_crypto::ecc::{ecdsa_sign_prehash, EcdheKeyPair, SIGNATURE_LEN};
use se_crypto::{aead, block, hash};

use crate::context::{
    ChannelRole, KeyMaterial, SecureChannelContext, SecureChannelMode, RATCHET_SEED_LEN,
};
use crate::error::ChannelError;

/// Sliced CBC session secret: 5 fields × 16 bytes.
const CBC_SECRET_LEN: usize = 80;
/// Challenge bytes sealed during GCM establishment.
const GCM_WRAP_DATA_LEN: usize = 80;
/// Domain-separation label of the Z-value KDF.
const KDF_LABEL: &[u8] = b"SECURECHANNEL";

/// Mode-specific secret material, supplied by the caller.
pub enum SessionSecret<'a> {
    /// Shared AES-128 key for `PlainInit` / `CbcInit`.
    CbcKey(&'a [u8; 16]),
    /// Shared AES-256 key for `GcmInit`.
    GcmKey(&'a [u8; 32]),
    /// Pre-shared key for `PreSharedKeyRatchet`.
    PreSharedKey(&'a [u8; 32]),
    /// Local ephemeral keypair + peer public key (SEC 1) for the ECDHE modes.
    Ecdhe {
        local: &'a EcdheKeyPair,
        peer_public: &'a [u8],
    },
}

/// Derive the session keys for `ctx.mode()` and activate the channel.
///
/// Re-establishment over an old context starts fresh: any previous key
/// material is zeroized first. On any failure the context stays `Closed`.
pub fn establish(
    ctx: &mut SecureChannelContext,
    role: ChannelRole,
    challenge: &[u8],
    secret: &SessionSecret<'_>,
) -> Result<(), ChannelError> {
    ctx.close();

    let mode = ctx.mode();
    if challenge.len() < mode.min_challenge_len() {
        return Err(ChannelError::WrongParameter(format!(
            "challenge too short for {mode:?}: {} < {}",
            challenge.len(),
            mode.min_challenge_len()
        )));
    }

    let material = match (mode, secret) {
        (SecureChannelMode::PlainInit, SessionSecret::CbcKey(key)) => {
            derive_cbc(key, challenge, 0, role)?
        }
        (SecureChannelMode::CbcInit, SessionSecret::CbcKey(key)) => {
            derive_cbc(key, challenge, 16, role)?
        }
        (SecureChannelMode::GcmInit, SessionSecret::GcmKey(key)) => {
            let mut nonce = [0u8; 12];
            nonce.copy_from_slice(&challenge[..12]);
            let wrapped = &challenge[16..16 + GCM_WRAP_DATA_LEN];
            let z = Zeroizing::new(aead::gcm_seal(key, &nonce, wrapped)?);
            derive_gcm_keys(&z, role)
        }
        (SecureChannelMode::Ecdhe | SecureChannelMode::AuthEcdhe, SessionSecret::Ecdhe { local, peer_public }) => {
            let z = local.shared_secret(peer_public)?;
            derive_gcm_keys(z.as_slice(), role)
        }
        (SecureChannelMode::PreSharedKeyRatchet, SessionSecret::PreSharedKey(psk)) => {
            derive_ratchet(challenge, psk)
        }
        (SecureChannelMode::EcdheRatchet1065, SessionSecret::Ecdhe { local, peer_public }) => {
            let z = local.shared_secret(peer_public)?;
            derive_ratchet(challenge, &z)
        }
        _ => {
            return Err(ChannelError::WrongParameter(format!(
                "secret kind does not match mode {mode:?}"
            )))
        }
    };

    ctx.activate(material);
    debug!(mode = ?mode, role = ?role, "secure channel established");
    Ok(())
}

/// ECDSA proof required by `AuthEcdhe` before the device will proceed:
/// sign `SHA256(challenge ‖ x ‖ y)` with the host's static P-256 key.
/// The device hashes the raw 64-byte point, so a SEC 1 uncompressed key's
/// `0x04` tag is stripped before hashing. Authentication only; key
/// derivation is untouched.
pub fn sign_session_params(
    static_secret: &[u8; 32],
    challenge: &[u8],
    ephemeral_public: &[u8],
) -> Result<[u8; SIGNATURE_LEN], ChannelError> {
    let point = match ephemeral_public {
        [0x04, coords @ ..] if coords.len() == 64 => coords,
        raw if raw.len() == 64 => raw,
        other => {
            return Err(ChannelError::WrongParameter(format!(
                "ephemeral public key must be a 65-byte SEC 1 uncompressed \
                 point or its 64 raw coordinate bytes, got {}",
                other.len()
            )))
        }
    };
    let digest = hash::sha256(&[challenge, point]);
    Ok(ecdsa_sign_prehash(static_secret, &digest)?)
}

fn derive_cbc(
    key: &[u8; 16],
    challenge: &[u8],
    offset: usize,
    role: ChannelRole,
) -> Result<KeyMaterial, ChannelError> {
    let mut iv = [0u8; 16];
    iv.copy_from_slice(&challenge[..16]);
    let mut blocks = Zeroizing::new([0u8; CBC_SECRET_LEN]);
    blocks.copy_from_slice(&challenge[offset..offset + CBC_SECRET_LEN]);
    block::cbc_encrypt(key, &iv, blocks.as_mut_slice())?;

    let field = |i: usize| -> [u8; 16] {
        let mut out = [0u8; 16];
        out.copy_from_slice(&blocks[i * 16..(i + 1) * 16]);
        out
    };
    // Host order: IV_dec, IV_enc, IV_mac, K_enc, K_mac. The device end
    // decrypts what the host encrypts, so its IVs are swapped.
    let (iv_decrypt, iv_encrypt) = match role {
        ChannelRole::Host => (field(0), field(1)),
        ChannelRole::Device => (field(1), field(0)),
    };
    Ok(KeyMaterial::Cbc {
        iv_decrypt,
        iv_encrypt,
        iv_mac: field(2),
        key_encrypt: field(3),
        key_mac: field(4),
    })
}

fn derive_gcm_keys(z: &[u8], role: ChannelRole) -> KeyMaterial {
    // Domain separation: an 8-byte prefix whose last byte selects the key.
    let mut key_decrypt = hash::sha256(&[&[0u8; 8], z, KDF_LABEL]);
    let mut key_encrypt = hash::sha256(&[&[0, 0, 0, 0, 0, 0, 0, 1], z, KDF_LABEL]);
    if role == ChannelRole::Device {
        core::mem::swap(&mut key_decrypt, &mut key_encrypt);
    }
    KeyMaterial::Gcm {
        iv_decrypt: [0u8; 12],
        iv_encrypt: [0u8; 12],
        key_encrypt,
        key_decrypt,
    }
}

fn derive_ratchet(challenge: &[u8], ikm: &[u8; 32]) -> KeyMaterial {
    let mut random_seed = [0u8; RATCHET_SEED_LEN];
    random_seed.copy_from_slice(&challenge[..RATCHET_SEED_LEN]);
    KeyMaterial::Ratchet {
        random_seed,
        input_key_material: *ikm,
        packet_counter: 0,
        previous_mac: [0u8; 8],
    }
}
