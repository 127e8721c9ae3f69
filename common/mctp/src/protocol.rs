// Licensed under the Apache-2.0 license

use bitfield::bitfield;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use zerocopy::{FromBytes, Immutable, IntoBytes};

pub const MCTP_HDR_SIZE: usize = 4;
pub const MCTP_HDR_VERSION: u8 = 0x01;
pub const MCTP_HDR_VERSION_MASK: u8 = 0x0F;

pub const MCTP_TAG_MASK: u8 = 0x07;
pub const MCTP_TAG_OWNER: u8 = 0x08;
pub const MCTP_SEQ_MASK: u8 = 0x03;

pub const MCTP_NULL_EID: u8 = 0;
pub const MCTP_BROADCAST_EID: u8 = 0xFF;
pub const MCTP_DEFAULT_EID: u8 = 0x0A;

/// Largest payload carried by a single packet.
pub const MCTP_TX_UNIT: usize = 64;
/// Largest message the reassembler accepts.
pub const MCTP_MSG_ASSEMBLY_MAX: usize = 1024;

bitfield! {
    #[repr(C)]
    #[derive(Clone, FromBytes, IntoBytes, Immutable, PartialEq)]
    pub struct MctpHeader([u8]);
    impl Debug;
    u8;
    pub hdr_version, set_hdr_version: 3, 0;
    rsvd, _: 7, 4;
    pub dest_eid, set_dest_eid: 15, 8;
    pub src_eid, set_src_eid: 23, 16;
    pub msg_tag, set_msg_tag: 26, 24;
    pub tag_owner, set_tag_owner: 27, 27;
    pub pkt_seq, set_pkt_seq: 29, 28;
    pub eom, set_eom: 30, 30;
    pub som, set_som: 31, 31;
}

impl MctpHeader<[u8; MCTP_HDR_SIZE]> {
    pub fn new() -> Self {
        let mut hdr = MctpHeader([0; MCTP_HDR_SIZE]);
        hdr.set_hdr_version(MCTP_HDR_VERSION);
        hdr
    }

    #[allow(clippy::too_many_arguments)]
    pub fn prepare_header(
        &mut self,
        dest_eid: u8,
        src_eid: u8,
        som: bool,
        eom: bool,
        seq: u8,
        tag_owner: bool,
        tag: u8,
    ) {
        self.set_dest_eid(dest_eid);
        self.set_src_eid(src_eid);
        self.set_som(som as u8);
        self.set_eom(eom as u8);
        self.set_pkt_seq(seq & MCTP_SEQ_MASK);
        self.set_tag_owner(tag_owner as u8);
        self.set_msg_tag(tag & MCTP_TAG_MASK);
    }
}

impl Default for MctpHeader<[u8; MCTP_HDR_SIZE]> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: AsRef<[u8]>> MctpHeader<T> {
    pub fn is_som(&self) -> bool {
        self.som() == 1
    }

    pub fn is_eom(&self) -> bool {
        self.eom() == 1
    }

    pub fn is_tag_owner(&self) -> bool {
        self.tag_owner() == 1
    }
}

bitfield! {
    #[repr(C)]
    #[derive(Clone, FromBytes, IntoBytes, Immutable, PartialEq)]
    pub struct MctpCommonHeader(u8);
    impl Debug;
    u8;
    pub msg_type, set_msg_type: 6, 0;
    pub ic, set_ic: 7, 7;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum MessageType {
    Control = 0x00,
    Pldm = 0x01,
    NcSi = 0x02,
    Ethernet = 0x03,
    NvmeMi = 0x04,
    Spdm = 0x05,
    SecuredMsg = 0x06,
    Cxl = 0x07,
    VendorPci = 0x7E,
    VendorIana = 0x7F,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MediumType {
    #[default]
    Unknown,
    Smbus,
    I3cController,
    I3cTarget,
}

/// Transport parameters that travel with a message through the stack.
///
/// On receive they describe where the message came from; on transmit they
/// describe where it goes. `addr` is the 7-bit SMBus address of the peer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtParams {
    pub msg_tag: u8,
    pub tag_owner: bool,
    pub ep: u8,
    pub medium: MediumType,
    pub addr: u8,
}

impl ExtParams {
    pub fn smbus(ep: u8, addr: u8) -> Self {
        ExtParams {
            ep,
            medium: MediumType::Smbus,
            addr,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_header_flag_layout() {
        let mut hdr = MctpHeader::new();
        hdr.prepare_header(0x08, 0x0A, true, true, 2, true, 5);
        assert_eq!(hdr.0, [0x01, 0x08, 0x0A, 0b1110_1101]);
        assert!(hdr.is_som() && hdr.is_eom() && hdr.is_tag_owner());

        let parsed = MctpHeader([0x01, 0x0A, 0x08, 0x13]);
        assert_eq!(parsed.msg_tag(), 3);
        assert!(!parsed.is_tag_owner());
        assert_eq!(parsed.pkt_seq(), 1);
        assert!(!parsed.is_som());
    }

    #[test]
    fn test_common_header() {
        let hdr = MctpCommonHeader(0x81);
        assert_eq!(hdr.msg_type(), MessageType::Pldm as u8);
        assert_eq!(hdr.ic(), 1);
        assert!(MessageType::try_from(0x10u8).is_err());
    }
}
