//! CRC-16 frame checksum.
//!
//! CRC-16/ARC (polynomial 0x8005 reflected, init 0x0000), stored on the wire
//! low byte first by the frame codec.

const CRC16_ARC: crc::Crc<u16> = crc::Crc::<u16>::new(&crc::CRC_16_ARC);

pub fn crc16(data: &[u8]) -> u16 {
    CRC16_ARC.checksum(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_value() {
        // Standard CRC-16/ARC check input
        assert_eq!(crc16(b"123456789"), 0xBB3D);
    }

    #[test]
    fn empty_input() {
        assert_eq!(crc16(&[]), 0x0000);
    }
}
