//! Secure channel context: mode, state machine, and per-mode key material.
//!
//! State separation (non-negotiable):
//!   Closed — initial state, and the terminal state of every failure
//!   Active — entered only by successful establishment
//!
//! The context is an exclusively-owned value threaded through every call;
//! there is no process-wide channel state. Key material lives in a tagged
//! enum so the active mode and its key shapes are statically matched — a
//! CBC packet can never read ratchet state. Every transition to `Closed`
//! overwrites the key bytes with zeros; that zeroization is a security
//! invariant, not an optimization.

use core::fmt;

use tracing::debug;
use zeroize::Zeroize;

use crate::error::ChannelError;

/// 8-byte truncated MAC carried by ratchet-mode packets.
pub const RATCHET_MAC_LEN: usize = 8;
/// Random seed retained for the life of a ratchet session.
pub const RATCHET_SEED_LEN: usize = 32;

/// The seven secure channel establishment modes.
///
/// Selected once per session before establishment; immutable thereafter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecureChannelMode {
    /// AES-128-CBC session keys derived by encrypting the challenge head.
    PlainInit,
    /// As `PlainInit`, but derives from the second half of the challenge.
    CbcInit,
    /// AES-256-GCM keys derived from a GCM-wrapped challenge ("Z value").
    GcmInit,
    /// AES-256-GCM keys derived from a P-256 ECDH shared secret.
    Ecdhe,
    /// `Ecdhe` plus an ECDSA proof over (challenge ‖ ephemeral public key).
    AuthEcdhe,
    /// Per-packet HKDF keystream seeded by a pre-shared key.
    PreSharedKeyRatchet,
    /// Per-packet HKDF keystream seeded by an ECDH shared secret.
    EcdheRatchet1065,
}

impl SecureChannelMode {
    /// Mode discriminant as the device protocol defines it.
    pub fn wire_id(self) -> u8 {
        match self {
            Self::PlainInit => 0x01,
            Self::CbcInit => 0x02,
            Self::GcmInit => 0x04,
            Self::PreSharedKeyRatchet => 0x05,
            Self::Ecdhe => 0x10,
            Self::AuthEcdhe => 0x13,
            Self::EcdheRatchet1065 => 0x15,
        }
    }

    pub fn is_cbc(self) -> bool {
        matches!(self, Self::PlainInit | Self::CbcInit)
    }

    pub fn is_gcm(self) -> bool {
        matches!(self, Self::GcmInit | Self::Ecdhe | Self::AuthEcdhe)
    }

    pub fn is_ratchet(self) -> bool {
        matches!(self, Self::PreSharedKeyRatchet | Self::EcdheRatchet1065)
    }

    /// Minimum challenge length the mode's derivation consumes.
    pub fn min_challenge_len(self) -> usize {
        match self {
            Self::PlainInit => 80,
            // These two consume challenge bytes past the first block.
            Self::CbcInit | Self::GcmInit => 96,
            Self::Ecdhe | Self::AuthEcdhe => 16,
            Self::PreSharedKeyRatchet | Self::EcdheRatchet1065 => RATCHET_SEED_LEN,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecureChannelState {
    Closed,
    Active,
}

/// Which end of the link this context drives.
///
/// Both ends derive the same session material; the device end swaps the
/// encrypt/decrypt halves so that one side's send chain is the other's
/// receive chain. `Device` exists for emulated peers and test fixtures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelRole {
    Host,
    Device,
}

/// Mode-tagged session key material. Exactly one arm is ever populated,
/// chosen by the mode at establishment time.
pub enum KeyMaterial {
    Cbc {
        iv_decrypt: [u8; 16],
        iv_encrypt: [u8; 16],
        iv_mac: [u8; 16],
        key_encrypt: [u8; 16],
        key_mac: [u8; 16],
    },
    Gcm {
        iv_decrypt: [u8; 12],
        iv_encrypt: [u8; 12],
        key_encrypt: [u8; 32],
        key_decrypt: [u8; 32],
    },
    Ratchet {
        random_seed: [u8; RATCHET_SEED_LEN],
        input_key_material: [u8; 32],
        packet_counter: u32,
        previous_mac: [u8; RATCHET_MAC_LEN],
    },
}

/// Key bytes never reach logs or panic messages; only the arm name prints.
impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let arm = match self {
            KeyMaterial::Cbc { .. } => "Cbc",
            KeyMaterial::Gcm { .. } => "Gcm",
            KeyMaterial::Ratchet { .. } => "Ratchet",
        };
        write!(f, "KeyMaterial::{arm}([redacted])")
    }
}

impl Zeroize for KeyMaterial {
    fn zeroize(&mut self) {
        match self {
            KeyMaterial::Cbc {
                iv_decrypt,
                iv_encrypt,
                iv_mac,
                key_encrypt,
                key_mac,
            } => {
                iv_decrypt.zeroize();
                iv_encrypt.zeroize();
                iv_mac.zeroize();
                key_encrypt.zeroize();
                key_mac.zeroize();
            }
            KeyMaterial::Gcm {
                iv_decrypt,
                iv_encrypt,
                key_encrypt,
                key_decrypt,
            } => {
                iv_decrypt.zeroize();
                iv_encrypt.zeroize();
                key_encrypt.zeroize();
                key_decrypt.zeroize();
            }
            KeyMaterial::Ratchet {
                random_seed,
                input_key_material,
                packet_counter,
                previous_mac,
            } => {
                random_seed.zeroize();
                input_key_material.zeroize();
                *packet_counter = 0;
                previous_mac.zeroize();
            }
        }
    }
}

/// One secure channel session: mode, state, and exclusively-owned keys.
pub struct SecureChannelContext {
    mode: SecureChannelMode,
    state: SecureChannelState,
    key_material: Option<KeyMaterial>,
}

impl SecureChannelContext {
    /// A fresh, closed context for the given mode.
    pub fn new(mode: SecureChannelMode) -> Self {
        Self {
            mode,
            state: SecureChannelState::Closed,
            key_material: None,
        }
    }

    pub fn mode(&self) -> SecureChannelMode {
        self.mode
    }

    pub fn state(&self) -> SecureChannelState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == SecureChannelState::Active
    }

    /// Tear the channel down: zeroize all key material and go `Closed`.
    ///
    /// Called explicitly by the user, and internally on every integrity or
    /// crypto failure. The zeroed material stays in place until the next
    /// establishment so nothing secret survives in freed memory.
    pub fn close(&mut self) {
        if let Some(material) = self.key_material.as_mut() {
            material.zeroize();
        }
        if self.state == SecureChannelState::Active {
            debug!(mode = ?self.mode, "secure channel closed");
        }
        self.state = SecureChannelState::Closed;
    }

    /// Install freshly derived material and go `Active`. Establishment only.
    pub(crate) fn activate(&mut self, material: KeyMaterial) {
        // Drop any zeroed remnant of a previous session first.
        if let Some(old) = self.key_material.as_mut() {
            old.zeroize();
        }
        self.key_material = Some(material);
        self.state = SecureChannelState::Active;
    }

    /// Mutable key material, only while `Active`.
    pub(crate) fn material_mut(&mut self) -> Result<&mut KeyMaterial, ChannelError> {
        if self.state != SecureChannelState::Active {
            return Err(ChannelError::ChannelClosed);
        }
        self.key_material.as_mut().ok_or(ChannelError::ChannelClosed)
    }

    #[cfg(test)]
    pub(crate) fn material_for_inspection(&self) -> Option<&KeyMaterial> {
        self.key_material.as_ref()
    }
}

impl Drop for SecureChannelContext {
    fn drop(&mut self) {
        if let Some(material) = self.key_material.as_mut() {
            material.zeroize();
        }
    }
}
