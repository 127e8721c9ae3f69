// Licensed under the Apache-2.0 license

//! IPMB frame codec.
//!
//! Request frame:
//! `[rs_sa, netfn << 2 | rs_lun, hdr_chk, rq_sa, seq << 2 | rq_lun, cmd, data.., msg_chk]`.
//! A response carries the completion code right after `cmd`. Both checksums
//! are two's complement: `hdr_chk` covers bytes 0-1 and `msg_chk` covers
//! everything from byte 3 up to the checksum itself.

use crate::error::{IpmbError, Result};
use crate::protocol::{
    IpmiMsg, IPMB_LUN_MASK, IPMB_REQ_HEADER_LENGTH, IPMB_RESP_HEADER_LENGTH, IPMB_SEQ_MASK,
    IPMI_DATA_MAX_LENGTH,
};

const HDR_CHECKSUM_POS: usize = 2;
const MSG_BODY_START: usize = 3;

pub const IPMB_FRAME_MAX: usize = IPMI_DATA_MAX_LENGTH + IPMB_RESP_HEADER_LENGTH;

pub fn checksum(bytes: &[u8]) -> u8 {
    bytes
        .iter()
        .fold(0u8, |acc, b| acc.wrapping_add(*b))
        .wrapping_neg()
}

/// Length of the frame `encode` produces for `msg`.
pub fn frame_len(msg: &IpmiMsg) -> usize {
    let hdr = if msg.is_response() {
        IPMB_RESP_HEADER_LENGTH
    } else {
        IPMB_REQ_HEADER_LENGTH
    };
    hdr + msg.data.len() + 1
}

/// Serializes `msg` into `buf`, including the leading destination address.
pub fn encode(msg: &IpmiMsg, buf: &mut [u8]) -> Result<usize> {
    let len = frame_len(msg);
    if buf.len() < len {
        return Err(IpmbError::Failure);
    }
    buf[0] = msg.dest_addr;
    buf[1] = (msg.netfn << 2) | (msg.dest_lun & IPMB_LUN_MASK);
    buf[HDR_CHECKSUM_POS] = checksum(&buf[..HDR_CHECKSUM_POS]);
    buf[3] = msg.src_addr;
    buf[4] = ((msg.seq & IPMB_SEQ_MASK) << 2) | (msg.src_lun & IPMB_LUN_MASK);
    buf[5] = msg.cmd;
    let mut pos = IPMB_REQ_HEADER_LENGTH;
    if msg.is_response() {
        buf[pos] = msg.completion_code;
        pos += 1;
    }
    buf[pos..pos + msg.data.len()].copy_from_slice(&msg.data);
    pos += msg.data.len();
    buf[pos] = checksum(&buf[MSG_BODY_START..pos]);
    Ok(pos + 1)
}

/// Parses a received frame whose first byte is our own 8-bit address.
pub fn decode(frame: &[u8]) -> Result<IpmiMsg> {
    if frame.len() < IPMB_REQ_HEADER_LENGTH + 1 {
        return Err(IpmbError::InvalidRequest);
    }
    if checksum(&frame[..HDR_CHECKSUM_POS]) != frame[HDR_CHECKSUM_POS] {
        return Err(IpmbError::HeaderChecksum);
    }
    let last = frame.len() - 1;
    if checksum(&frame[MSG_BODY_START..last]) != frame[last] {
        return Err(IpmbError::MessageChecksum);
    }

    let mut msg = IpmiMsg {
        dest_addr: frame[0],
        netfn: frame[1] >> 2,
        dest_lun: frame[1] & IPMB_LUN_MASK,
        src_addr: frame[3],
        seq: frame[4] >> 2,
        src_lun: frame[4] & IPMB_LUN_MASK,
        cmd: frame[5],
        ..Default::default()
    };
    let mut pos = IPMB_REQ_HEADER_LENGTH;
    if msg.is_response() {
        if frame.len() < IPMB_RESP_HEADER_LENGTH + 1 {
            return Err(IpmbError::InvalidRequest);
        }
        msg.completion_code = frame[pos];
        pos += 1;
    }
    msg.data
        .extend_from_slice(&frame[pos..last])
        .map_err(|_| IpmbError::InvalidRequest)?;
    Ok(msg)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::protocol::{NETFN_APP_REQ, NETFN_STORAGE_REQ};

    #[test]
    fn test_get_device_id_request_frame() {
        let msg = IpmiMsg {
            dest_addr: 0x40,
            src_addr: 0x20,
            seq: 1,
            ..IpmiMsg::request(NETFN_APP_REQ, 0x01, &[])
        };
        let mut buf = [0u8; 16];
        let len = encode(&msg, &mut buf).unwrap();
        assert_eq!(len, 7);
        assert_eq!(&buf[..len], &[0x40, 0x18, 0xA8, 0x20, 0x04, 0x01, 0xDB]);
        assert_eq!(decode(&buf[..len]).unwrap(), msg);
    }

    #[test]
    fn test_response_carries_completion_code() {
        let mut msg = IpmiMsg {
            dest_addr: 0x20,
            src_addr: 0x40,
            seq: 0x3F,
            dest_lun: 1,
            ..IpmiMsg::request(NETFN_STORAGE_REQ + 1, 0x11, &[0x02, 0xAA, 0xBB])
        };
        msg.completion_code = 0xC7;
        let mut buf = [0u8; 32];
        let len = encode(&msg, &mut buf).unwrap();
        assert_eq!(len, IPMB_RESP_HEADER_LENGTH + 3 + 1);
        assert_eq!(buf[6], 0xC7);
        let sum = buf[3..len].iter().fold(0u8, |a, b| a.wrapping_add(*b));
        assert_eq!(sum, 0);
        let decoded = decode(&buf[..len]).unwrap();
        assert_eq!(decoded.completion_code, 0xC7);
        assert_eq!(decoded.data.as_slice(), &[0x02, 0xAA, 0xBB]);
        assert_eq!(decoded.seq, 0x3F);
        assert_eq!(decoded.dest_lun, 1);
    }

    #[test]
    fn test_checksum_errors() {
        let msg = IpmiMsg {
            dest_addr: 0x40,
            src_addr: 0x20,
            ..IpmiMsg::request(NETFN_APP_REQ, 0x04, &[0x10])
        };
        let mut buf = [0u8; 16];
        let len = encode(&msg, &mut buf).unwrap();

        let mut bad_hdr = buf;
        bad_hdr[2] ^= 0xFF;
        assert_eq!(decode(&bad_hdr[..len]), Err(IpmbError::HeaderChecksum));

        let mut bad_body = buf;
        bad_body[6] ^= 0x01;
        assert_eq!(decode(&bad_body[..len]), Err(IpmbError::MessageChecksum));

        assert_eq!(decode(&buf[..4]), Err(IpmbError::InvalidRequest));
        assert_eq!(encode(&msg, &mut [0u8; 4]), Err(IpmbError::Failure));
    }
}
