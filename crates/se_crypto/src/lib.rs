//! se_crypto — Secure-element host SDK cryptographic primitives
//!
//! # Design principles
//! - NO custom crypto; all primitives come from audited Rust crates.
//! - Zeroize all secret material on drop.
//! - The secure-channel layer consumes these as black boxes; nothing here
//!   knows about framing, sessions, or channel modes.
//!
//! # Module layout
//! - `block` — AES-128-CBC encrypt/decrypt and CBC-MAC
//! - `aead`  — AES-256-GCM seal/open with caller-supplied nonces
//! - `hash`  — SHA-256 / HMAC-SHA256 helpers
//! - `kdf`   — HKDF-SHA256 (extract-then-expand)
//! - `ecc`   — P-256 ECDH key agreement + ECDSA signing
//! - `crc`   — CRC-16 frame checksum
//! - `error` — unified error type

pub mod aead;
pub mod block;
pub mod crc;
pub mod ecc;
pub mod error;
pub mod hash;
pub mod kdf;

pub use error::CryptoError;
