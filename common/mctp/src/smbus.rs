// Licensed under the Apache-2.0 license

//! MCTP over SMBus/I2C binding.
//!
//! A frame is `[0x0F, byte_count, src_addr8 | 1, packet..., pec]`. The
//! destination address is the I2C address itself and is not part of the
//! buffer, but it is covered by the PEC.

use crate::error::{MctpError, Result};
use crc::{Crc, CRC_8_SMBUS};

pub const MCTP_SMBUS_CMD_CODE: u8 = 0x0F;
/// Command code, byte count and source address.
pub const SMBUS_FRAME_HDR_LEN: usize = 3;
pub const SMBUS_PEC_LEN: usize = 1;

const SMBUS_PEC: Crc<u8> = Crc::<u8>::new(&CRC_8_SMBUS);

/// PEC over the write address followed by `data`.
pub fn pec(addr8: u8, data: &[u8]) -> u8 {
    let mut digest = SMBUS_PEC.digest();
    digest.update(&[addr8]);
    digest.update(data);
    digest.finalize()
}

/// Builds an SMBus frame for `pkt` into `buf` and returns its length.
pub fn encode_frame(dest_addr: u8, own_addr: u8, pkt: &[u8], buf: &mut [u8]) -> Result<usize> {
    if pkt.is_empty() || pkt.len() > u8::MAX as usize - 1 {
        return Err(MctpError::InvalidLength);
    }
    let body_end = SMBUS_FRAME_HDR_LEN + pkt.len();
    let len = body_end + SMBUS_PEC_LEN;
    if buf.len() < len {
        return Err(MctpError::BufferTooShort);
    }

    buf[0] = MCTP_SMBUS_CMD_CODE;
    buf[1] = (pkt.len() + 1) as u8;
    buf[2] = (own_addr << 1) | 1;
    buf[SMBUS_FRAME_HDR_LEN..body_end].copy_from_slice(pkt);
    buf[body_end] = pec(dest_addr << 1, &buf[..body_end]);
    Ok(len)
}

/// Parses a frame received at `own_addr`, returning the sender's 7-bit
/// address and the MCTP packet.
pub fn decode_frame(own_addr: u8, frame: &[u8]) -> Result<(u8, &[u8])> {
    if frame.len() < SMBUS_FRAME_HDR_LEN {
        return Err(MctpError::InvalidLength);
    }
    if frame[0] != MCTP_SMBUS_CMD_CODE {
        return Err(MctpError::InvalidCommand(frame[0]));
    }

    let byte_count = frame[1] as usize;
    if byte_count < 1 {
        return Err(MctpError::InvalidLength);
    }
    let body_end = byte_count + 2;
    if frame.len() == body_end + SMBUS_PEC_LEN {
        let expected = pec(own_addr << 1, &frame[..body_end]);
        let actual = frame[body_end];
        if expected != actual {
            return Err(MctpError::PecMismatch { expected, actual });
        }
    } else if frame.len() != body_end {
        return Err(MctpError::InvalidLength);
    }

    Ok((frame[2] >> 1, &frame[SMBUS_FRAME_HDR_LEN..body_end]))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_pec_check_value() {
        assert_eq!(pec(b'1', b"23456789"), 0xF4);
    }

    #[test]
    fn test_frame_layout() {
        let pkt = [0x01, 0x08, 0x0A, 0xC8, 0x00, 0x80, 0x02];
        let mut buf = [0u8; 32];
        let len = encode_frame(0x10, 0x20, &pkt, &mut buf).unwrap();
        assert_eq!(len, pkt.len() + 4);
        assert_eq!(&buf[..3], &[0x0F, 8, 0x41]);
        assert_eq!(buf[len - 1], pec(0x20, &buf[..len - 1]));

        let (src, body) = decode_frame(0x10, &buf[..len]).unwrap();
        assert_eq!(src, 0x20);
        assert_eq!(body, &pkt);
    }

    #[test]
    fn test_frame_without_pec() {
        let frame = [0x0F, 5, 0x21, 0x01, 0x0A, 0x08, 0xC0];
        let (src, body) = decode_frame(0x10, &frame).unwrap();
        assert_eq!(src, 0x10);
        assert_eq!(body.len(), 4);
    }

    #[test]
    fn test_bad_frames() {
        let mut buf = [0u8; 16];
        let len = encode_frame(0x10, 0x20, &[1, 2, 3, 4], &mut buf).unwrap();

        // Addressed to someone else, so the PEC does not match ours.
        assert!(matches!(
            decode_frame(0x11, &buf[..len]),
            Err(MctpError::PecMismatch { .. })
        ));

        buf[0] = 0x0E;
        assert_eq!(decode_frame(0x10, &buf[..len]), Err(MctpError::InvalidCommand(0x0E)));
        assert_eq!(decode_frame(0x10, &[0x0F, 9, 0x21, 1]), Err(MctpError::InvalidLength));
    }
}
