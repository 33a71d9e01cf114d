//! Command/response frame codec.
//!
//! Wire layout (header fields big-endian):
//!
//! ```text
//!   offset 0: sync        u8  = 0xAA
//!   offset 1: status      u16 (command id outbound, signed code inbound)
//!   offset 3: length      u16 (payload byte count)
//!   offset 5: payload     [length]
//!   ........: crc16       u16 little-endian, over the preceding 5+length bytes
//! ```
//!
//! The codec is independent of encryption: a secured exchange nests one
//! complete frame (CRC included) inside another.

use se_crypto::crc::crc16;

use crate::error::ChannelError;

pub const SYNC: u8 = 0xAA;
pub const HEADER_LEN: usize = 5;
pub const CRC_LEN: usize = 2;
/// Upper bound on a frame payload, enforced on both encode and parse;
/// inbound lengths beyond it are rejected before any buffer is touched.
pub const MAX_PAYLOAD: usize = 2048;
/// Largest command payload that still fits after securing: the nested
/// frame's header and CRC, worst-case CBC block padding, and a 16-byte tag
/// all count against `MAX_PAYLOAD` in the outer frame.
pub const MAX_COMMAND_PAYLOAD: usize = MAX_PAYLOAD - HEADER_LEN - CRC_LEN - 15 - 16;
/// Status carried by the outer frame of a secured exchange.
pub const SECURED_STATUS: u16 = 0xECEC;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFrame {
    pub status: u16,
    pub payload: Vec<u8>,
}

impl CommandFrame {
    pub fn new(status: u16, payload: Vec<u8>) -> Self {
        Self { status, payload }
    }

    /// Total encoded size: header + payload + CRC.
    pub fn wire_len(&self) -> usize {
        HEADER_LEN + self.payload.len() + CRC_LEN
    }

    /// Encode the frame, rejecting payloads the length field cannot carry.
    /// The `u16` cast below is lossless once the bound holds.
    pub fn encode(&self) -> Result<Vec<u8>, ChannelError> {
        if self.payload.len() > MAX_PAYLOAD {
            return Err(ChannelError::Framing(format!(
                "payload length {} exceeds {MAX_PAYLOAD}",
                self.payload.len()
            )));
        }
        let mut out = Vec::with_capacity(self.wire_len());
        out.push(SYNC);
        out.extend_from_slice(&self.status.to_be_bytes());
        out.extend_from_slice(&(self.payload.len() as u16).to_be_bytes());
        out.extend_from_slice(&self.payload);
        let crc = crc16(&out);
        out.extend_from_slice(&crc.to_le_bytes());
        Ok(out)
    }

    /// Parse a frame from the start of `bytes`.
    ///
    /// Trailing bytes after the CRC are ignored: a CBC-secured inner frame
    /// arrives inside a zero-padded block buffer.
    pub fn decode(bytes: &[u8]) -> Result<Self, ChannelError> {
        let (status, length) = parse_header(bytes)?;
        let total = HEADER_LEN + length + CRC_LEN;
        if bytes.len() < total {
            return Err(ChannelError::Framing(format!(
                "truncated frame: need {total} bytes, have {}",
                bytes.len()
            )));
        }
        let crc_offset = HEADER_LEN + length;
        let received = u16::from_le_bytes([bytes[crc_offset], bytes[crc_offset + 1]]);
        if received != crc16(&bytes[..crc_offset]) {
            return Err(ChannelError::CrcMismatch);
        }
        Ok(Self {
            status,
            payload: bytes[HEADER_LEN..crc_offset].to_vec(),
        })
    }
}

/// Validate a 5-byte header, returning (status, payload length).
pub fn parse_header(bytes: &[u8]) -> Result<(u16, usize), ChannelError> {
    if bytes.len() < HEADER_LEN {
        return Err(ChannelError::Framing("short header".into()));
    }
    if bytes[0] != SYNC {
        return Err(ChannelError::Framing(format!(
            "bad sync byte 0x{:02X}",
            bytes[0]
        )));
    }
    let status = u16::from_be_bytes([bytes[1], bytes[2]]);
    let length = u16::from_be_bytes([bytes[3], bytes[4]]) as usize;
    if length > MAX_PAYLOAD {
        return Err(ChannelError::Framing(format!(
            "payload length {length} exceeds {MAX_PAYLOAD}"
        )));
    }
    Ok((status, length))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_roundtrip() {
        let frame = CommandFrame::new(0x0002, vec![0xDE, 0xAD, 0xBE, 0xEF]);
        let bytes = frame.encode().unwrap();
        assert_eq!(bytes[0], SYNC);
        assert_eq!(bytes.len(), frame.wire_len());
        assert_eq!(CommandFrame::decode(&bytes).unwrap(), frame);
    }

    #[test]
    fn decode_ignores_trailing_padding() {
        let frame = CommandFrame::new(0x0001, vec![0x42; 3]);
        let mut bytes = frame.encode().unwrap();
        bytes.extend_from_slice(&[0u8; 6]); // CBC block padding
        assert_eq!(CommandFrame::decode(&bytes).unwrap(), frame);
    }

    #[test]
    fn bad_sync_rejected() {
        let mut bytes = CommandFrame::new(0, vec![]).encode().unwrap();
        bytes[0] = 0x55;
        assert!(matches!(
            CommandFrame::decode(&bytes),
            Err(ChannelError::Framing(_))
        ));
    }

    #[test]
    fn corrupted_payload_fails_crc() {
        let mut bytes = CommandFrame::new(7, vec![1, 2, 3]).encode().unwrap();
        bytes[6] ^= 0x80;
        assert!(matches!(
            CommandFrame::decode(&bytes),
            Err(ChannelError::CrcMismatch)
        ));
    }

    #[test]
    fn oversized_payload_rejected_on_encode() {
        // A payload past the u16 length field would silently wrap; both it
        // and anything past the frame bound must fail loudly instead.
        for len in [MAX_PAYLOAD + 1, 70_000] {
            assert!(matches!(
                CommandFrame::new(1, vec![0u8; len]).encode(),
                Err(ChannelError::Framing(_))
            ));
        }
        assert!(CommandFrame::new(1, vec![0u8; MAX_PAYLOAD]).encode().is_ok());
    }

    #[test]
    fn command_bound_leaves_room_for_securing() {
        // Worst case growth: nested header + CRC, CBC padding, 16-byte tag.
        let padded = (MAX_COMMAND_PAYLOAD + HEADER_LEN + CRC_LEN).div_ceil(16) * 16;
        assert!(padded + 16 <= MAX_PAYLOAD);
    }

    #[test]
    fn oversized_length_rejected_before_read() {
        let mut bytes = vec![SYNC, 0, 0];
        bytes.extend_from_slice(&(MAX_PAYLOAD as u16 + 1).to_be_bytes());
        assert!(matches!(
            parse_header(&bytes),
            Err(ChannelError::Framing(_))
        ));
    }
}
