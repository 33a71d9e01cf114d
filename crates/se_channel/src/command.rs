//! Command orchestration: frame → (secure) → transport → verify → parse.
//!
//! One blocking request/response per call. When the channel is active the
//! plaintext frame — CRC included — is secured whole and nested inside an
//! outer frame carrying status `0xECEC`, so the wire always shows the same
//! header shape whether or not encryption is on.

use tracing::{debug, trace};

use crate::context::SecureChannelContext;
use crate::envelope::{secure_packet, verify_packet};
use crate::error::ChannelError;
use crate::frame::{
    parse_header, CommandFrame, CRC_LEN, HEADER_LEN, MAX_COMMAND_PAYLOAD, SECURED_STATUS,
};
use crate::transport::{receive_exact, Transport};

/// Parsed device response: payload plus the signed status code from the
/// inner header (device status words are negated into host error codes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResponse {
    pub status: i32,
    pub data: Vec<u8>,
}

/// The host end of the command link.
pub struct CommandPort<T: Transport> {
    transport: T,
}

impl<T: Transport> CommandPort<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn into_inner(self) -> T {
        self.transport
    }

    /// Send one command and await its response.
    ///
    /// With an active context the outbound frame is secured and the inbound
    /// one verified; integrity or crypto failures close the channel and the
    /// caller must re-establish. Framing and CRC faults only abort this
    /// exchange.
    pub fn send_command(
        &mut self,
        ctx: &mut SecureChannelContext,
        cmd_id: u16,
        payload: &[u8],
    ) -> Result<CommandResponse, ChannelError> {
        if payload.len() > MAX_COMMAND_PAYLOAD {
            return Err(ChannelError::Framing(format!(
                "command payload length {} exceeds {MAX_COMMAND_PAYLOAD}",
                payload.len()
            )));
        }
        let inner = CommandFrame::new(cmd_id, payload.to_vec()).encode()?;

        let outbound = if ctx.is_active() {
            let secured = secure_packet(ctx, &inner)?;
            CommandFrame::new(SECURED_STATUS, secured).encode()?
        } else {
            inner
        };
        debug!(cmd_id, tx_len = outbound.len(), secured = ctx.is_active(), "host->device");
        trace!(frame = %hex::encode(&outbound), "host->device bytes");
        self.transport.send(&outbound)?;

        let received = self.receive_frame()?;
        trace!(frame = %hex::encode(&received), "device->host bytes");

        let inner_bytes = if ctx.is_active() {
            let (status, length) = parse_header(&received)?;
            if status != SECURED_STATUS {
                return Err(ChannelError::Framing(format!(
                    "expected secured response, got status 0x{status:04X}"
                )));
            }
            verify_packet(ctx, &received[HEADER_LEN..HEADER_LEN + length])?
        } else {
            received
        };

        let frame = CommandFrame::decode(&inner_bytes)?;
        debug!(status = frame.status, rx_len = frame.payload.len(), "device->host");
        Ok(CommandResponse {
            status: -(frame.status as i32),
            data: frame.payload,
        })
    }

    /// Fire-and-forget: frame and send, never secure, never wait.
    pub fn send_raw_command(&mut self, cmd_id: u16, payload: &[u8]) -> Result<(), ChannelError> {
        let bytes = CommandFrame::new(cmd_id, payload.to_vec()).encode()?;
        self.transport.send(&bytes)
    }

    /// Send a prebuilt frame past the secure channel and return the
    /// CRC-checked response frame unverified. Used for link-level probes.
    pub fn send_bypass(&mut self, frame: &CommandFrame) -> Result<CommandFrame, ChannelError> {
        self.transport.send(&frame.encode()?)?;
        let received = self.receive_frame()?;
        CommandFrame::decode(&received)
    }

    /// Read header, then payload + CRC, validating sync, length bound, and
    /// the outer CRC. Returns the complete frame bytes.
    fn receive_frame(&mut self) -> Result<Vec<u8>, ChannelError> {
        let mut header = [0u8; HEADER_LEN];
        receive_exact(&mut self.transport, &mut header)?;
        let (_, length) = parse_header(&header)?;

        let mut bytes = vec![0u8; HEADER_LEN + length + CRC_LEN];
        bytes[..HEADER_LEN].copy_from_slice(&header);
        receive_exact(&mut self.transport, &mut bytes[HEADER_LEN..])?;

        // Validates the outer CRC (and re-checks sync, which is harmless).
        CommandFrame::decode(&bytes)?;
        Ok(bytes)
    }
}
