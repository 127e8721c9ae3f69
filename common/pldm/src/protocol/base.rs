// Licensed under the Apache-2.0 license

use crate::error::PldmError;
use bitfield::bitfield;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use zerocopy::{FromBytes, Immutable, IntoBytes};

pub const PLDM_MSG_HEADER_LEN: usize = 3;
/// MCTP message type byte carried in front of the PLDM header.
pub const PLDM_MCTP_MSG_TYPE: u8 = 0x01;
pub const PLDM_HEADER_VERSION: u8 = 0x00;
pub const PLDM_INSTANCE_ID_MASK: u8 = 0x1F;

pub type InstanceId = u8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PldmMsgType {
    Request,
    Response,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum PldmSupportedType {
    Base = 0x00,
    Smbios = 0x01,
    Platform = 0x02,
    FwUpdate = 0x05,
    Oem = 0x3F,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum PldmControlCmd {
    SetTid = 0x01,
    GetTid = 0x02,
    GetPldmVersion = 0x03,
    GetPldmTypes = 0x04,
    GetPldmCommands = 0x05,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum PldmBaseCompletionCode {
    Success = 0x00,
    Error = 0x01,
    InvalidData = 0x02,
    InvalidLength = 0x03,
    NotReady = 0x04,
    UnsupportedPldmCmd = 0x05,
    InvalidPldmType = 0x20,
    InvalidTransferOpFlag = 0x21,
}

/// GetPLDMVersion specific completion codes.
pub const PLDM_CC_INVALID_DATA_TRANSFER_HANDLE: u8 = 0x80;
pub const PLDM_CC_INVALID_TRANSFER_OPERATION_FLAG: u8 = 0x81;
pub const PLDM_CC_INVALID_PLDM_TYPE_IN_REQUEST_DATA: u8 = 0x83;

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum TransferOperationFlag {
    GetNextPart = 0,
    GetFirstPart = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum TransferRespFlag {
    Start = 0x01,
    Middle = 0x02,
    End = 0x04,
    StartAndEnd = 0x05,
}

bitfield! {
    #[repr(C)]
    #[derive(Copy, Clone, FromBytes, IntoBytes, Immutable, PartialEq)]
    pub struct PldmMsgHeader([u8]);
    impl Debug;
    u8;
    pub instance_id, set_instance_id: 4, 0;
    rsvd, _: 5, 5;
    pub datagram, set_datagram: 6, 6;
    pub rq, set_rq: 7, 7;
    pub pldm_type, set_pldm_type: 13, 8;
    pub hdr_ver, set_hdr_ver: 15, 14;
    pub cmd_code, set_cmd_code: 23, 16;
}

impl PldmMsgHeader<[u8; PLDM_MSG_HEADER_LEN]> {
    pub fn new(
        instance_id: InstanceId,
        msg_type: PldmMsgType,
        pldm_type: PldmSupportedType,
        cmd_code: u8,
    ) -> Self {
        let mut hdr = PldmMsgHeader([0; PLDM_MSG_HEADER_LEN]);
        hdr.set_instance_id(instance_id & PLDM_INSTANCE_ID_MASK);
        hdr.set_rq((msg_type == PldmMsgType::Request) as u8);
        hdr.set_datagram(0);
        hdr.set_pldm_type(pldm_type as u8);
        hdr.set_hdr_ver(PLDM_HEADER_VERSION);
        hdr.set_cmd_code(cmd_code);
        hdr
    }

    pub fn decode(buffer: &[u8]) -> Result<Self, PldmError> {
        if buffer.len() < PLDM_MSG_HEADER_LEN {
            return Err(PldmError::InvalidLength);
        }
        let hdr = PldmMsgHeader([buffer[0], buffer[1], buffer[2]]);
        if hdr.hdr_ver() != PLDM_HEADER_VERSION {
            return Err(PldmError::InvalidHeaderVersion);
        }
        Ok(hdr)
    }

    /// Header of the response answering this request: same instance, type and
    /// command with the request bit cleared.
    pub fn into_response(&self) -> Self {
        let mut hdr = *self;
        hdr.set_rq(0);
        hdr.set_datagram(0);
        hdr
    }
}

impl<T: AsRef<[u8]>> PldmMsgHeader<T> {
    pub fn is_request(&self) -> bool {
        self.rq() == 1
    }

    pub fn msg_type(&self) -> PldmMsgType {
        if self.is_request() {
            PldmMsgType::Request
        } else {
            PldmMsgType::Response
        }
    }

    pub fn supported_type(&self) -> Result<PldmSupportedType, PldmError> {
        PldmSupportedType::try_from(self.pldm_type())
            .map_err(|_| PldmError::InvalidPldmType(self.pldm_type()))
    }
}

/// A PLDM version in the packed BCD form used by GetPLDMVersion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PldmVersion {
    pub major: u8,
    pub minor: u8,
    pub update: Option<u8>,
    pub alpha: u8,
}

impl PldmVersion {
    pub const fn new(major: u8, minor: u8, update: Option<u8>) -> Self {
        PldmVersion {
            major,
            minor,
            update,
            alpha: 0,
        }
    }

    const fn bcd(v: u8) -> u8 {
        0xF0 | (v & 0x0F)
    }

    /// Encodes as the 32-bit `ver32` value (major in the most significant byte).
    pub const fn bcd_encode_to_ver32(&self) -> u32 {
        let update = match self.update {
            Some(v) => Self::bcd(v),
            None => 0xFF,
        };
        u32::from_be_bytes([Self::bcd(self.major), Self::bcd(self.minor), update, self.alpha])
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_header_layout() {
        let hdr = PldmMsgHeader::new(0x1A, PldmMsgType::Request, PldmSupportedType::Platform, 0x11);
        assert_eq!(hdr.0, [0x9A, 0x02, 0x11]);

        let resp = hdr.into_response();
        assert_eq!(resp.0, [0x1A, 0x02, 0x11]);
        assert_eq!(resp.msg_type(), PldmMsgType::Response);
        assert_eq!(resp.supported_type().unwrap(), PldmSupportedType::Platform);
    }

    #[test]
    fn test_header_in_packed_message() {
        #[repr(C, packed)]
        #[derive(Debug, Clone, Copy, PartialEq)]
        struct Wrapped {
            hdr: PldmMsgHeader<[u8; PLDM_MSG_HEADER_LEN]>,
            completion_code: u8,
        }

        let msg = Wrapped {
            hdr: PldmMsgHeader::new(3, PldmMsgType::Response, PldmSupportedType::Base, 0x02),
            completion_code: 0,
        };
        let copy = msg;
        assert_eq!(msg, copy);
        assert_eq!({ copy.hdr }.instance_id(), 3);
        assert!(format!("{:?}", msg).contains("completion_code"));
    }

    #[test]
    fn test_header_decode() {
        assert!(PldmMsgHeader::decode(&[0x80, 0x3F, 0x01]).unwrap().is_request());
        assert_eq!(
            PldmMsgHeader::decode(&[0x80, 0x40, 0x01]),
            Err(PldmError::InvalidHeaderVersion)
        );
        assert_eq!(PldmMsgHeader::decode(&[0x80]), Err(PldmError::InvalidLength));
        assert_eq!(
            PldmMsgHeader::decode(&[0x80, 0x07, 0x01]).unwrap().supported_type(),
            Err(PldmError::InvalidPldmType(0x07))
        );
    }

    #[test]
    fn test_version_bcd() {
        assert_eq!(PldmVersion::new(1, 1, Some(0)).bcd_encode_to_ver32(), 0xF1F1_F000);
        assert_eq!(PldmVersion::new(1, 2, None).bcd_encode_to_ver32(), 0xF1F2_FF00);
    }
}
