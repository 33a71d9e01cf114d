//! HKDF ratchet: per-packet keystream + MAC key derivation.
//!
//! Salt = packet counter (4 bytes LE) ‖ 32-byte session random seed.
//! HKDF-SHA256(salt, ikm) expands to `len + 32` bytes: the first `len`
//! are a one-time XOR keystream, the trailing 32 key the packet's
//! truncated HMAC. Each counter value yields independent material, so one
//! packet's keys expose nothing about any other's, and folding the
//! previous MAC into every new MAC catches deletion, insertion, and
//! reordering.

use zeroize::Zeroizing;

use se_crypto::{hash, kdf, CryptoError};

use crate::context::{RATCHET_MAC_LEN, RATCHET_SEED_LEN};

const MAC_KEY_LEN: usize = 32;

/// One packet's worth of derived material.
pub struct RatchetStep {
    keystream: Zeroizing<Vec<u8>>,
    mac_key: Zeroizing<Vec<u8>>,
}

impl RatchetStep {
    /// Derive keystream + MAC key for one (counter, payload length) pair.
    pub fn derive(
        counter: u32,
        random_seed: &[u8; RATCHET_SEED_LEN],
        input_key_material: &[u8; 32],
        payload_len: usize,
    ) -> Result<Self, CryptoError> {
        let mut salt = [0u8; 4 + RATCHET_SEED_LEN];
        salt[..4].copy_from_slice(&counter.to_le_bytes());
        salt[4..].copy_from_slice(random_seed);

        let mut okm = Zeroizing::new(vec![0u8; payload_len + MAC_KEY_LEN]);
        kdf::hkdf_sha256(input_key_material, &salt, &[], &mut okm)?;

        let mac_key = Zeroizing::new(okm[payload_len..].to_vec());
        okm.truncate(payload_len);
        Ok(Self { keystream: okm, mac_key })
    }

    /// XOR `data` with the keystream in place. `data` must be exactly the
    /// payload length the step was derived for.
    pub fn apply_keystream(&self, data: &mut [u8]) {
        debug_assert_eq!(data.len(), self.keystream.len());
        for (byte, key) in data.iter_mut().zip(self.keystream.iter()) {
            *byte ^= key;
        }
    }

    /// Chained packet MAC: `HMAC-SHA256(mac_key, ciphertext ‖ previous_mac)`
    /// truncated to 8 bytes.
    pub fn packet_mac(
        &self,
        ciphertext: &[u8],
        previous_mac: &[u8; RATCHET_MAC_LEN],
    ) -> Result<[u8; RATCHET_MAC_LEN], CryptoError> {
        let full = hash::hmac_sha256(&self.mac_key, &[ciphertext, previous_mac])?;
        let mut out = [0u8; RATCHET_MAC_LEN];
        out.copy_from_slice(&full[..RATCHET_MAC_LEN]);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEED: [u8; 32] = [0x5Au8; 32];
    const IKM: [u8; 32] = [0xC3u8; 32];

    #[test]
    fn counters_yield_independent_keystreams() {
        let a = RatchetStep::derive(1, &SEED, &IKM, 24).unwrap();
        let b = RatchetStep::derive(2, &SEED, &IKM, 24).unwrap();

        let mut xa = [0u8; 24];
        let mut xb = [0u8; 24];
        a.apply_keystream(&mut xa);
        b.apply_keystream(&mut xb);
        assert_ne!(xa, xb);
    }

    #[test]
    fn same_counter_is_deterministic() {
        let a = RatchetStep::derive(9, &SEED, &IKM, 16).unwrap();
        let b = RatchetStep::derive(9, &SEED, &IKM, 16).unwrap();
        let mut xa = [0u8; 16];
        let mut xb = [0u8; 16];
        a.apply_keystream(&mut xa);
        b.apply_keystream(&mut xb);
        assert_eq!(xa, xb);
    }

    #[test]
    fn xor_is_an_involution() {
        let step = RatchetStep::derive(3, &SEED, &IKM, 11).unwrap();
        let plain = *b"hello world";
        let mut buf = plain;
        step.apply_keystream(&mut buf);
        assert_ne!(buf, plain);
        step.apply_keystream(&mut buf);
        assert_eq!(buf, plain);
    }

    #[test]
    fn mac_chains_on_previous_value() {
        let step = RatchetStep::derive(4, &SEED, &IKM, 8).unwrap();
        let ct = [0x11u8; 8];
        let m1 = step.packet_mac(&ct, &[0u8; 8]).unwrap();
        let m2 = step.packet_mac(&ct, &m1).unwrap();
        assert_ne!(m1, m2);
    }
}
