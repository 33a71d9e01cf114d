//! Packet secure envelope (outbound) and verification (inbound).
//!
//! Chaining discipline per mode:
//! - CBC: the last ciphertext block becomes the next packet's encrypt (or
//!   decrypt) IV, and each CBC-MAC output becomes the next MAC IV. Packets
//!   must therefore be processed strictly in order.
//! - GCM: the 96-bit nonce is a big-endian counter, incremented after every
//!   seal/open. Nonce reuse under one key is fatal; the increment is the
//!   whole point of this bookkeeping.
//! - Ratchet: a shared packet counter advances on every secured packet in
//!   either direction, and each packet's MAC folds in the previous one.
//!
//! Verification is always MAC-check-then-decrypt, never the reverse.
//!
//! Failure policy: framing-shape rejects leave the channel alone; any
//! integrity or primitive failure closes it. A ratchet counter consumed by
//! an attempt that failed is rolled back inside the failing operation, so
//! a packet that never validly advanced the chain does not desynchronize
//! the next one.

use subtle::ConstantTimeEq;
use tracing::warn;

use se_crypto::{aead, block, CryptoError};

use crate::context::{KeyMaterial, SecureChannelContext, RATCHET_MAC_LEN};
use crate::error::ChannelError;
use crate::ratchet::RatchetStep;

const CBC_TAG_LEN: usize = 16;
const GCM_TAG_LEN: usize = aead::GCM_TAG_LEN;

/// Encrypt and authenticate `plaintext` for transmission, advancing the
/// context's chaining state. The context must be `Active`.
pub fn secure_packet(
    ctx: &mut SecureChannelContext,
    plaintext: &[u8],
) -> Result<Vec<u8>, ChannelError> {
    let result = secure_inner(ctx, plaintext);
    close_on_crypto_failure(ctx, &result);
    result
}

/// Check and decrypt a received secured payload (everything between the
/// outer header and outer CRC), advancing the context's chaining state.
///
/// CBC-mode output keeps its zero block padding; the inner frame's length
/// field delimits the real content.
pub fn verify_packet(
    ctx: &mut SecureChannelContext,
    body: &[u8],
) -> Result<Vec<u8>, ChannelError> {
    precheck_shape(ctx, body)?;
    let result = verify_inner(ctx, body);
    close_on_crypto_failure(ctx, &result);
    result
}

/// Shape checks that reject before any crypto touches the buffer. These are
/// transport-layer faults and leave the channel state untouched.
fn precheck_shape(ctx: &SecureChannelContext, body: &[u8]) -> Result<(), ChannelError> {
    let mode = ctx.mode();
    if mode.is_cbc() {
        if body.len() % block::BLOCK_LEN != 0 || body.len() < 2 * block::BLOCK_LEN {
            return Err(ChannelError::Framing(format!(
                "bad CBC secured payload size {}",
                body.len()
            )));
        }
    } else if mode.is_gcm() {
        if body.len() <= GCM_TAG_LEN {
            return Err(ChannelError::Framing(format!(
                "bad GCM secured payload size {}",
                body.len()
            )));
        }
    } else if body.len() <= RATCHET_MAC_LEN {
        return Err(ChannelError::Framing(format!(
            "bad ratchet secured payload size {}",
            body.len()
        )));
    }
    Ok(())
}

fn close_on_crypto_failure<T>(ctx: &mut SecureChannelContext, result: &Result<T, ChannelError>) {
    match result {
        Err(ChannelError::Integrity) | Err(ChannelError::Crypto(_)) => {
            warn!(mode = ?ctx.mode(), "secure channel failure, tearing down");
            ctx.close();
        }
        _ => {}
    }
}

fn secure_inner(
    ctx: &mut SecureChannelContext,
    plaintext: &[u8],
) -> Result<Vec<u8>, ChannelError> {
    match ctx.material_mut()? {
        KeyMaterial::Cbc { iv_encrypt, iv_mac, key_encrypt, key_mac, .. } => {
            let mut buf = plaintext.to_vec();
            let rem = buf.len() % block::BLOCK_LEN;
            if rem != 0 {
                buf.resize(buf.len() + block::BLOCK_LEN - rem, 0);
            }
            block::cbc_encrypt(key_encrypt, iv_encrypt, &mut buf)?;
            iv_encrypt.copy_from_slice(&buf[buf.len() - block::BLOCK_LEN..]);

            let mac = block::cbc_mac(key_mac, iv_mac, &buf)?;
            *iv_mac = mac;
            buf.extend_from_slice(&mac);
            Ok(buf)
        }
        KeyMaterial::Gcm { iv_encrypt, key_encrypt, .. } => {
            let out = aead::gcm_seal(key_encrypt, iv_encrypt, plaintext)?;
            increment_nonce(iv_encrypt);
            Ok(out)
        }
        KeyMaterial::Ratchet {
            random_seed,
            input_key_material,
            packet_counter,
            previous_mac,
        } => {
            *packet_counter = packet_counter.wrapping_add(1);
            let sealed = (|| -> Result<Vec<u8>, CryptoError> {
                let step = RatchetStep::derive(
                    *packet_counter,
                    random_seed,
                    input_key_material,
                    plaintext.len(),
                )?;
                let mut buf = plaintext.to_vec();
                step.apply_keystream(&mut buf);
                let mac = step.packet_mac(&buf, previous_mac)?;
                *previous_mac = mac;
                buf.extend_from_slice(&mac);
                Ok(buf)
            })();
            match sealed {
                Ok(buf) => Ok(buf),
                Err(e) => {
                    // This packet never reached the wire; give its counter back.
                    *packet_counter = packet_counter.wrapping_sub(1);
                    Err(e.into())
                }
            }
        }
    }
}

fn verify_inner(ctx: &mut SecureChannelContext, body: &[u8]) -> Result<Vec<u8>, ChannelError> {
    match ctx.material_mut()? {
        KeyMaterial::Cbc { iv_decrypt, iv_mac, key_encrypt, key_mac, .. } => {
            let (ciphertext, tag) = body.split_at(body.len() - CBC_TAG_LEN);

            // MAC first; decrypting unauthenticated ciphertext is forbidden.
            let mac = block::cbc_mac(key_mac, iv_mac, ciphertext)?;
            *iv_mac = mac;
            if !bool::from(mac[..].ct_eq(tag)) {
                return Err(ChannelError::Integrity);
            }

            let mut next_iv = [0u8; block::BLOCK_LEN];
            next_iv.copy_from_slice(&ciphertext[ciphertext.len() - block::BLOCK_LEN..]);
            let mut buf = ciphertext.to_vec();
            block::cbc_decrypt(key_encrypt, iv_decrypt, &mut buf)?;
            *iv_decrypt = next_iv;
            Ok(buf)
        }
        KeyMaterial::Gcm { iv_decrypt, key_decrypt, .. } => {
            let plaintext = aead::gcm_open(key_decrypt, iv_decrypt, body).map_err(|e| match e {
                CryptoError::AeadDecrypt => ChannelError::Integrity,
                other => ChannelError::Crypto(other),
            })?;
            increment_nonce(iv_decrypt);
            Ok(plaintext.to_vec())
        }
        KeyMaterial::Ratchet {
            random_seed,
            input_key_material,
            packet_counter,
            previous_mac,
        } => {
            let (ciphertext, tag) = body.split_at(body.len() - RATCHET_MAC_LEN);

            *packet_counter = packet_counter.wrapping_add(1);
            let step = match RatchetStep::derive(
                *packet_counter,
                random_seed,
                input_key_material,
                ciphertext.len(),
            ) {
                Ok(step) => step,
                Err(e) => {
                    *packet_counter = packet_counter.wrapping_sub(1);
                    return Err(e.into());
                }
            };
            let mac = match step.packet_mac(ciphertext, previous_mac) {
                Ok(mac) => mac,
                Err(e) => {
                    *packet_counter = packet_counter.wrapping_sub(1);
                    return Err(e.into());
                }
            };
            if !bool::from(mac[..].ct_eq(tag)) {
                // The packet never validly advanced the ratchet.
                *packet_counter = packet_counter.wrapping_sub(1);
                return Err(ChannelError::Integrity);
            }

            let mut buf = ciphertext.to_vec();
            step.apply_keystream(&mut buf);
            previous_mac.copy_from_slice(tag);
            Ok(buf)
        }
    }
}

/// Big-endian increment of a 96-bit GCM counter nonce.
fn increment_nonce(nonce: &mut [u8; 12]) {
    for byte in nonce.iter_mut().rev() {
        *byte = byte.wrapping_add(1);
        if *byte != 0 {
            break;
        }
    }
}
