//! Byte transport seam.
//!
//! The physical link (SPI, I2C, a PC bridge) is an external collaborator:
//! a reliable, blocking, duplex byte pipe. Timeouts live below this trait
//! and surface as ordinary transport errors; this layer never retries.

use crate::error::ChannelError;

pub trait Transport {
    /// Send all of `bytes`, blocking until accepted.
    fn send(&mut self, bytes: &[u8]) -> Result<(), ChannelError>;

    /// Receive up to `buf.len()` bytes, blocking; returns the count read.
    /// The orchestrator treats a short read as a transport fault.
    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, ChannelError>;
}

/// Read exactly `buf.len()` bytes or fail.
pub(crate) fn receive_exact<T: Transport>(
    transport: &mut T,
    buf: &mut [u8],
) -> Result<(), ChannelError> {
    let got = transport.receive(buf)?;
    if got != buf.len() {
        return Err(ChannelError::Transport(format!(
            "short read: expected {} bytes, got {got}",
            buf.len()
        )));
    }
    Ok(())
}
