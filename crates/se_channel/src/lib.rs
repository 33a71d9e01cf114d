//! se_channel — secure channel protocol for MAXQ10xx-class secure elements
//!
//! # Protocol overview
//!
//! Every host↔device exchange is one command frame and one response frame
//! over a reliable byte transport:
//!
//! ```text
//!   sync (0xAA) | status u16 BE | length u16 BE | payload | crc16 LE
//! ```
//!
//! When a secure channel is active the plaintext frame (including its own
//! CRC) becomes the payload of an outer frame carrying status `0xECEC`,
//! after passing through the mode's secure envelope:
//!
//! - CBC modes: AES-128-CBC with chained IVs + chained AES-CBC-MAC tag
//! - GCM modes: AES-256-GCM with a 96-bit big-endian counter nonce
//! - Ratchet modes: per-packet HKDF keystream + chained truncated HMAC
//!
//! Session keys come from one of seven establishment modes (shared-key CBC
//! derivation, GCM-wrapped challenge, ECDHE, authenticated ECDHE, pre-shared
//! key ratchet, ECDHE-seeded ratchet). Any integrity or crypto failure tears
//! the channel down and zeroizes its key material; recovery is a fresh
//! establishment.
//!
//! # Module layout
//! - `frame`     — command/response frame codec (sync, lengths, CRC-16)
//! - `context`   — channel mode/state machine and per-mode key material
//! - `establish` — session establishment (per-mode key derivation)
//! - `ratchet`   — HKDF keystream + chained-MAC derivation
//! - `envelope`  — packet secure (outbound) and verify (inbound)
//! - `transport` — byte transport trait (external collaborator)
//! - `command`   — send-command / await-response orchestration
//! - `error`     — unified error type

pub mod command;
pub mod context;
pub mod envelope;
pub mod error;
pub mod establish;
pub mod frame;
pub mod ratchet;
pub mod transport;

pub use command::{CommandPort, CommandResponse};
pub use context::{ChannelRole, KeyMaterial, SecureChannelContext, SecureChannelMode, SecureChannelState};
pub use error::ChannelError;
pub use transport::Transport;
