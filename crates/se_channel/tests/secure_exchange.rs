//! End-to-end command exchanges against an emulated device.
//!
//! The device end runs the same protocol code with `ChannelRole::Device`,
//! which mirrors the encrypt/decrypt halves of the session material.

use std::collections::VecDeque;

use se_channel::command::{CommandPort, CommandResponse};
use se_channel::context::{ChannelRole, SecureChannelContext, SecureChannelMode};
use se_channel::envelope::{secure_packet, verify_packet};
use se_channel::error::ChannelError;
use se_channel::establish::{establish, SessionSecret};
use se_channel::frame::{
    parse_header, CommandFrame, HEADER_LEN, MAX_COMMAND_PAYLOAD, SECURED_STATUS,
};
use se_channel::transport::Transport;
use se_crypto::ecc::EcdheKeyPair;

/// In-memory device: answers every command with status 0x0000 and the
/// payload echoed back reversed.
struct EmulatedDevice {
    ctx: SecureChannelContext,
    /// Bytes queued for the host to read.
    outbox: VecDeque<u8>,
    /// When set, the device corrupts the tag of its next secured response.
    corrupt_next_tag: bool,
}

impl EmulatedDevice {
    fn new(ctx: SecureChannelContext) -> Self {
        Self { ctx, outbox: VecDeque::new(), corrupt_next_tag: false }
    }

    fn handle(&mut self, bytes: &[u8]) -> Result<Vec<u8>, ChannelError> {
        let inner_bytes = if self.ctx.is_active() {
            let (status, length) = parse_header(bytes)?;
            if status != SECURED_STATUS {
                return Err(ChannelError::Framing(
                    "unsecured traffic on an active device channel".into(),
                ));
            }
            verify_packet(&mut self.ctx, &bytes[HEADER_LEN..HEADER_LEN + length])?
        } else {
            bytes.to_vec()
        };
        let request = CommandFrame::decode(&inner_bytes)?;

        let mut echoed = request.payload;
        echoed.reverse();
        let inner = CommandFrame::new(0x0000, echoed).encode()?;

        if self.ctx.is_active() {
            let mut secured = secure_packet(&mut self.ctx, &inner)?;
            if self.corrupt_next_tag {
                self.corrupt_next_tag = false;
                let last = secured.len() - 1;
                secured[last] ^= 0x01;
            }
            CommandFrame::new(SECURED_STATUS, secured).encode()
        } else {
            Ok(inner)
        }
    }
}

impl Transport for EmulatedDevice {
    fn send(&mut self, bytes: &[u8]) -> Result<(), ChannelError> {
        let response = self.handle(bytes)?;
        self.outbox.extend(response);
        Ok(())
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, ChannelError> {
        for (i, slot) in buf.iter_mut().enumerate() {
            match self.outbox.pop_front() {
                Some(byte) => *slot = byte,
                None => return Ok(i),
            }
        }
        Ok(buf.len())
    }
}

fn challenge(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(101).wrapping_add(3)).collect()
}

fn paired(
    mode: SecureChannelMode,
    setup: impl Fn(&mut SecureChannelContext, ChannelRole),
) -> (SecureChannelContext, CommandPort<EmulatedDevice>) {
    let mut host = SecureChannelContext::new(mode);
    let mut device = SecureChannelContext::new(mode);
    setup(&mut host, ChannelRole::Host);
    setup(&mut device, ChannelRole::Device);
    (host, CommandPort::new(EmulatedDevice::new(device)))
}

#[test]
fn plaintext_exchange_without_channel() {
    let (mut host, mut port) =
        paired(SecureChannelMode::PlainInit, |_, _| {});
    assert!(!host.is_active());

    let response = port.send_command(&mut host, 0x00B2, b"abc").unwrap();
    assert_eq!(response, CommandResponse { status: 0, data: b"cba".to_vec() });
}

#[test]
fn secured_exchange_cbc() {
    let key = [0x6Fu8; 16];
    let ch = challenge(112);
    let (mut host, mut port) = paired(SecureChannelMode::CbcInit, |ctx, role| {
        establish(ctx, role, &ch, &SessionSecret::CbcKey(&key)).unwrap();
    });

    for round in 0..3u8 {
        let payload = vec![round; 5 + round as usize];
        let mut expected = payload.clone();
        expected.reverse();
        let response = port.send_command(&mut host, 0x0001, &payload).unwrap();
        assert_eq!(response.status, 0);
        assert_eq!(response.data, expected);
    }
}

#[test]
fn secured_exchange_gcm() {
    let key = [0x12u8; 32];
    let ch = challenge(96);
    let (mut host, mut port) = paired(SecureChannelMode::GcmInit, |ctx, role| {
        establish(ctx, role, &ch, &SessionSecret::GcmKey(&key)).unwrap();
    });

    let response = port.send_command(&mut host, 0x0042, b"gcm payload").unwrap();
    assert_eq!(response.data, b"daolyap mcg".to_vec());
}

#[test]
fn secured_exchange_ecdhe() {
    let host_kp = EcdheKeyPair::generate();
    let device_kp = EcdheKeyPair::generate();
    let ch = challenge(16);
    let (mut host, mut port) = paired(SecureChannelMode::Ecdhe, |ctx, role| {
        let (local, peer) = match role {
            ChannelRole::Host => (&host_kp, device_kp.public_key()),
            ChannelRole::Device => (&device_kp, host_kp.public_key()),
        };
        establish(ctx, role, &ch, &SessionSecret::Ecdhe { local, peer_public: peer }).unwrap();
    });

    let response = port.send_command(&mut host, 0x0007, &[0xAB; 40]).unwrap();
    assert_eq!(response.data, vec![0xAB; 40]);
}

#[test]
fn secured_exchange_ratchet_many_rounds() {
    let psk = [0x99u8; 32];
    let ch = challenge(32);
    let (mut host, mut port) =
        paired(SecureChannelMode::PreSharedKeyRatchet, |ctx, role| {
            establish(ctx, role, &ch, &SessionSecret::PreSharedKey(&psk)).unwrap();
        });

    for round in 0..8u8 {
        let payload = vec![round ^ 0x5A; 9];
        let response = port.send_command(&mut host, round as u16, &payload).unwrap();
        assert_eq!(response.data, payload);
    }
}

#[test]
fn oversized_command_payload_rejected_before_send() {
    let key = [0x6Fu8; 16];
    let ch = challenge(112);
    let (mut host, mut port) = paired(SecureChannelMode::CbcInit, |ctx, role| {
        establish(ctx, role, &ch, &SessionSecret::CbcKey(&key)).unwrap();
    });

    let too_big = vec![0u8; MAX_COMMAND_PAYLOAD + 1];
    let err = port.send_command(&mut host, 0x0001, &too_big).unwrap_err();
    assert!(matches!(err, ChannelError::Framing(_)));
    // Nothing reached the wire, so the channel and its chains are intact.
    assert!(host.is_active());
    let response = port.send_command(&mut host, 0x0002, b"still ok").unwrap();
    assert_eq!(response.data, b"ko llits".to_vec());

    // The bound itself goes through and survives securing.
    let at_bound = vec![0x7Eu8; MAX_COMMAND_PAYLOAD];
    let response = port.send_command(&mut host, 0x0003, &at_bound).unwrap();
    assert_eq!(response.data.len(), at_bound.len());
}

#[test]
fn tampered_device_response_closes_host_channel() {
    let psk = [0x44u8; 32];
    let ch = challenge(32);
    let (mut host, mut port) =
        paired(SecureChannelMode::PreSharedKeyRatchet, |ctx, role| {
            establish(ctx, role, &ch, &SessionSecret::PreSharedKey(&psk)).unwrap();
        });

    // First exchange is clean.
    port.send_command(&mut host, 1, b"ok").unwrap();

    let device = port.into_inner();
    let mut port = CommandPort::new(EmulatedDevice { corrupt_next_tag: true, ..device });
    let err = port.send_command(&mut host, 2, b"tampered").unwrap_err();
    assert!(matches!(err, ChannelError::Integrity));
    assert!(!host.is_active());

    // Channel must be re-established before further secured traffic.
    let err = port.send_command(&mut host, 3, b"after close");
    // With a closed host context the command goes out in plaintext, which
    // the still-active device end refuses as unsecured traffic.
    assert!(err.is_err());
}

#[test]
fn reestablishment_after_failure_recovers() {
    let key = [0x21u8; 32];
    let ch = challenge(96);
    let (mut host, mut port) = paired(SecureChannelMode::GcmInit, |ctx, role| {
        establish(ctx, role, &ch, &SessionSecret::GcmKey(&key)).unwrap();
    });

    port.send_command(&mut host, 1, b"first").unwrap();
    host.close();

    // Fresh establishment on both ends with a new challenge.
    let ch2 = challenge(96 + 1);
    establish(&mut host, ChannelRole::Host, &ch2[1..], &SessionSecret::GcmKey(&key)).unwrap();
    let mut device = port.into_inner();
    establish(&mut device.ctx, ChannelRole::Device, &ch2[1..], &SessionSecret::GcmKey(&key))
        .unwrap();
    let mut port = CommandPort::new(device);

    let response = port.send_command(&mut host, 2, b"second").unwrap();
    assert_eq!(response.data, b"dnoces".to_vec());
}
