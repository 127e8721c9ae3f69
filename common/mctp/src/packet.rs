// Licensed under the Apache-2.0 license

use crate::error::{MctpError, Result};
use crate::protocol::{
    ExtParams, MctpHeader, MCTP_HDR_SIZE, MCTP_MSG_ASSEMBLY_MAX, MCTP_SEQ_MASK, MCTP_TAG_MASK,
};
use heapless::Vec;
use log::warn;

pub type AssemblyBuf = Vec<u8, MCTP_MSG_ASSEMBLY_MAX>;

/// One outgoing packet: a transport header plus a borrowed slice of the
/// message body.
#[derive(Debug)]
pub struct Packet<'a> {
    pub hdr: MctpHeader<[u8; MCTP_HDR_SIZE]>,
    pub payload: &'a [u8],
}

impl Packet<'_> {
    pub fn len(&self) -> usize {
        MCTP_HDR_SIZE + self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn write_to(&self, buf: &mut [u8]) -> Result<usize> {
        let len = self.len();
        if buf.len() < len {
            return Err(MctpError::BufferTooShort);
        }
        buf[..MCTP_HDR_SIZE].copy_from_slice(&self.hdr.0);
        buf[MCTP_HDR_SIZE..len].copy_from_slice(self.payload);
        Ok(len)
    }
}

/// Splits a message into packets of at most `max_payload` bytes each.
pub struct Packetizer<'a> {
    msg: &'a [u8],
    max_payload: usize,
    dest_eid: u8,
    src_eid: u8,
    tag_owner: bool,
    tag: u8,
    index: usize,
    count: usize,
}

impl<'a> Packetizer<'a> {
    pub fn new(
        msg: &'a [u8],
        max_payload: usize,
        src_eid: u8,
        ext: &ExtParams,
        tag: u8,
    ) -> Result<Self> {
        if msg.is_empty() {
            return Err(MctpError::EmptyMessage);
        }
        if max_payload == 0 {
            return Err(MctpError::InvalidLength);
        }
        Ok(Packetizer {
            msg,
            max_payload,
            dest_eid: ext.ep,
            src_eid,
            tag_owner: ext.tag_owner,
            tag,
            index: 0,
            count: msg.len().div_ceil(max_payload),
        })
    }

    pub fn packet_count(&self) -> usize {
        self.count
    }
}

impl<'a> Iterator for Packetizer<'a> {
    type Item = Packet<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.count {
            return None;
        }
        let start = self.index * self.max_payload;
        let end = core::cmp::min(start + self.max_payload, self.msg.len());

        let mut hdr = MctpHeader::new();
        hdr.prepare_header(
            self.dest_eid,
            self.src_eid,
            self.index == 0,
            self.index == self.count - 1,
            (self.index as u8) & MCTP_SEQ_MASK,
            self.tag_owner,
            self.tag,
        );
        self.index += 1;

        Some(Packet {
            hdr,
            payload: &self.msg[start..end],
        })
    }
}

/// Hands out message tags for outgoing messages.
///
/// Requests (tag owner set) get a fresh tag from a rolling counter, responses
/// reuse the tag of the request they answer.
#[derive(Debug, Default)]
pub struct TagAllocator {
    counter: u8,
}

impl TagAllocator {
    pub fn next_tag(&mut self, ext: &ExtParams) -> u8 {
        if ext.tag_owner {
            let tag = self.counter & MCTP_TAG_MASK;
            self.counter = self.counter.wrapping_add(1);
            tag
        } else {
            ext.msg_tag & MCTP_TAG_MASK
        }
    }
}

/// Rebuilds multi-packet messages, one buffer per (tag, tag owner) pair.
pub struct Reassembler {
    slots: [[Option<AssemblyBuf>; 2]; 8],
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new()
    }
}

impl Reassembler {
    pub fn new() -> Self {
        Reassembler {
            slots: core::array::from_fn(|_| [None, None]),
        }
    }

    /// Feeds one received packet. Returns the complete message once the
    /// packet carrying EOM has been appended.
    pub fn push<T: AsRef<[u8]>>(
        &mut self,
        hdr: &MctpHeader<T>,
        payload: &[u8],
    ) -> Result<Option<AssemblyBuf>> {
        let tag = (hdr.msg_tag() & MCTP_TAG_MASK) as usize;
        let slot = &mut self.slots[tag][hdr.tag_owner() as usize];

        if hdr.is_som() {
            if slot.take().is_some() {
                warn!("Unexpected SOM received, dropping stale message for tag {}", hdr.msg_tag());
            }
            if hdr.is_eom() {
                let mut msg = AssemblyBuf::new();
                msg.extend_from_slice(payload)
                    .map_err(|_| MctpError::MessageTooLarge)?;
                return Ok(Some(msg));
            }
            *slot = Some(AssemblyBuf::new());
        }

        let Some(buf) = slot.as_mut() else {
            return Err(MctpError::MissingSom);
        };

        if buf.extend_from_slice(payload).is_err() {
            *slot = None;
            return Err(MctpError::MessageTooLarge);
        }

        if hdr.is_eom() {
            return Ok(slot.take());
        }
        Ok(None)
    }

    pub fn pending(&self) -> usize {
        self.slots.iter().flatten().filter(|s| s.is_some()).count()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::protocol::MCTP_TX_UNIT;

    fn request_ext() -> ExtParams {
        ExtParams {
            tag_owner: true,
            ..ExtParams::smbus(0x08, 0x10)
        }
    }

    #[test]
    fn test_single_packet_sets_som_and_eom() {
        let msg = [0x01u8, 0x80, 0x02, 0x11];
        let mut pkts = Packetizer::new(&msg, MCTP_TX_UNIT, 0x0A, &request_ext(), 3).unwrap();
        let pkt = pkts.next().unwrap();
        assert!(pkt.hdr.is_som() && pkt.hdr.is_eom());
        assert_eq!(pkt.hdr.msg_tag(), 3);
        assert_eq!(pkt.hdr.dest_eid(), 0x08);
        assert_eq!(pkt.hdr.src_eid(), 0x0A);
        assert_eq!(pkt.payload, &msg);
        assert!(pkts.next().is_none());
    }

    #[test]
    fn test_split_and_reassemble() {
        let msg: std::vec::Vec<u8> = (0..300u16).map(|v| v as u8).collect();
        let pkts = Packetizer::new(&msg, MCTP_TX_UNIT, 0x0A, &request_ext(), 6).unwrap();
        assert_eq!(pkts.packet_count(), 5);

        let mut reasm = Reassembler::new();
        let mut out = None;
        for (i, pkt) in pkts.enumerate() {
            assert_eq!(pkt.hdr.pkt_seq() as usize, i & 3);
            assert_eq!(pkt.hdr.is_som(), i == 0);
            assert_eq!(pkt.hdr.is_eom(), i == 4);
            out = reasm.push(&pkt.hdr, pkt.payload).unwrap();
            if i < 4 {
                assert!(out.is_none());
                assert_eq!(reasm.pending(), 1);
            }
        }
        assert_eq!(out.unwrap().as_slice(), msg.as_slice());
        assert_eq!(reasm.pending(), 0);
    }

    #[test]
    fn test_middle_packet_without_som() {
        let mut hdr = MctpHeader::new();
        hdr.prepare_header(0x0A, 0x08, false, true, 1, false, 2);
        let mut reasm = Reassembler::new();
        assert_eq!(reasm.push(&hdr, &[1, 2, 3]), Err(MctpError::MissingSom));
    }

    #[test]
    fn test_overflow_drops_buffer() {
        let chunk = [0u8; MCTP_TX_UNIT];
        let mut reasm = Reassembler::new();
        let mut hdr = MctpHeader::new();
        hdr.prepare_header(0x0A, 0x08, true, false, 0, true, 1);
        reasm.push(&hdr, &chunk).unwrap();
        hdr.set_som(0);
        let mut result = Ok(None);
        for _ in 0..(MCTP_MSG_ASSEMBLY_MAX / MCTP_TX_UNIT) {
            result = reasm.push(&hdr, &chunk);
            if result.is_err() {
                break;
            }
        }
        assert_eq!(result, Err(MctpError::MessageTooLarge));
        assert_eq!(reasm.pending(), 0);
    }

    #[test]
    fn test_tag_allocation() {
        let mut tags = TagAllocator::default();
        let req = request_ext();
        let seq: std::vec::Vec<u8> = (0..9).map(|_| tags.next_tag(&req)).collect();
        assert_eq!(seq, [0, 1, 2, 3, 4, 5, 6, 7, 0]);

        let resp = ExtParams {
            msg_tag: 5,
            ..ExtParams::smbus(0x08, 0x10)
        };
        assert_eq!(tags.next_tag(&resp), 5);
        assert_eq!(tags.next_tag(&req), 1);
    }
}
