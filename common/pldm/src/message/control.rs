// Licensed under the Apache-2.0 license

use crate::codec::impl_fixed_size_codec;
use crate::protocol::base::{
    InstanceId, PldmControlCmd, PldmMsgHeader, PldmMsgType, PldmSupportedType,
    TransferOperationFlag, TransferRespFlag, PLDM_MSG_HEADER_LEN,
};
use crc::{Crc, CRC_32_ISO_HDLC};
use zerocopy::{FromBytes, Immutable, IntoBytes};

pub const PLDM_TYPES_BITMAP_LEN: usize = 8;
pub const PLDM_CMDS_BITMAP_LEN: usize = 32;

const PLDM_VERSION_CRC: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

fn control_header(
    instance_id: InstanceId,
    msg_type: PldmMsgType,
    cmd: PldmControlCmd,
) -> PldmMsgHeader<[u8; PLDM_MSG_HEADER_LEN]> {
    PldmMsgHeader::new(instance_id, msg_type, PldmSupportedType::Base, cmd as u8)
}

#[derive(Debug, Clone, FromBytes, IntoBytes, Immutable, PartialEq)]
#[repr(C, packed)]
pub struct GetTidRequest {
    pub hdr: PldmMsgHeader<[u8; PLDM_MSG_HEADER_LEN]>,
}

impl GetTidRequest {
    pub fn new(instance_id: InstanceId) -> Self {
        GetTidRequest {
            hdr: control_header(instance_id, PldmMsgType::Request, PldmControlCmd::GetTid),
        }
    }
}

#[derive(Debug, Clone, FromBytes, IntoBytes, Immutable, PartialEq)]
#[repr(C, packed)]
pub struct GetTidResponse {
    pub hdr: PldmMsgHeader<[u8; PLDM_MSG_HEADER_LEN]>,
    pub completion_code: u8,
    pub tid: u8,
}

impl GetTidResponse {
    pub fn new(instance_id: InstanceId, completion_code: u8, tid: u8) -> Self {
        GetTidResponse {
            hdr: control_header(instance_id, PldmMsgType::Response, PldmControlCmd::GetTid),
            completion_code,
            tid,
        }
    }
}

#[derive(Debug, Clone, FromBytes, IntoBytes, Immutable, PartialEq)]
#[repr(C, packed)]
pub struct SetTidRequest {
    pub hdr: PldmMsgHeader<[u8; PLDM_MSG_HEADER_LEN]>,
    pub tid: u8,
}

impl SetTidRequest {
    pub fn new(instance_id: InstanceId, tid: u8) -> Self {
        SetTidRequest {
            hdr: control_header(instance_id, PldmMsgType::Request, PldmControlCmd::SetTid),
            tid,
        }
    }
}

#[derive(Debug, Clone, FromBytes, IntoBytes, Immutable, PartialEq)]
#[repr(C, packed)]
pub struct GetPldmVersionRequest {
    pub hdr: PldmMsgHeader<[u8; PLDM_MSG_HEADER_LEN]>,
    pub data_transfer_handle: u32,
    pub transfer_op_flag: u8,
    pub pldm_type: u8,
}

impl GetPldmVersionRequest {
    pub fn new(
        instance_id: InstanceId,
        data_transfer_handle: u32,
        transfer_op_flag: TransferOperationFlag,
        pldm_type: PldmSupportedType,
    ) -> Self {
        GetPldmVersionRequest {
            hdr: control_header(instance_id, PldmMsgType::Request, PldmControlCmd::GetPldmVersion),
            data_transfer_handle,
            transfer_op_flag: transfer_op_flag as u8,
            pldm_type: pldm_type as u8,
        }
    }
}

/// Single-part version response: one `ver32` followed by its CRC-32.
#[derive(Debug, Clone, FromBytes, IntoBytes, Immutable, PartialEq)]
#[repr(C, packed)]
pub struct GetPldmVersionResponse {
    pub hdr: PldmMsgHeader<[u8; PLDM_MSG_HEADER_LEN]>,
    pub completion_code: u8,
    pub next_transfer_handle: u32,
    pub transfer_flag: u8,
    pub version_data: u32,
    pub version_crc: u32,
}

impl GetPldmVersionResponse {
    pub fn new(instance_id: InstanceId, completion_code: u8, ver32: u32) -> Self {
        GetPldmVersionResponse {
            hdr: control_header(instance_id, PldmMsgType::Response, PldmControlCmd::GetPldmVersion),
            completion_code,
            next_transfer_handle: 0,
            transfer_flag: TransferRespFlag::StartAndEnd as u8,
            version_data: ver32,
            version_crc: PLDM_VERSION_CRC.checksum(&ver32.to_le_bytes()),
        }
    }

    pub fn crc_valid(&self) -> bool {
        let version = self.version_data;
        let crc = self.version_crc;
        PLDM_VERSION_CRC.checksum(&version.to_le_bytes()) == crc
    }
}

#[derive(Debug, Clone, FromBytes, IntoBytes, Immutable, PartialEq)]
#[repr(C, packed)]
pub struct GetPldmTypesRequest {
    pub hdr: PldmMsgHeader<[u8; PLDM_MSG_HEADER_LEN]>,
}

impl GetPldmTypesRequest {
    pub fn new(instance_id: InstanceId) -> Self {
        GetPldmTypesRequest {
            hdr: control_header(instance_id, PldmMsgType::Request, PldmControlCmd::GetPldmTypes),
        }
    }
}

#[derive(Debug, Clone, FromBytes, IntoBytes, Immutable, PartialEq)]
#[repr(C, packed)]
pub struct GetPldmTypesResponse {
    pub hdr: PldmMsgHeader<[u8; PLDM_MSG_HEADER_LEN]>,
    pub completion_code: u8,
    pub pldm_types: [u8; PLDM_TYPES_BITMAP_LEN],
}

impl GetPldmTypesResponse {
    pub fn new(
        instance_id: InstanceId,
        completion_code: u8,
        pldm_types: [u8; PLDM_TYPES_BITMAP_LEN],
    ) -> Self {
        GetPldmTypesResponse {
            hdr: control_header(instance_id, PldmMsgType::Response, PldmControlCmd::GetPldmTypes),
            completion_code,
            pldm_types,
        }
    }

    pub fn supports(&self, pldm_type: PldmSupportedType) -> bool {
        bitmap_has(&self.pldm_types, pldm_type as u8)
    }
}

#[derive(Debug, Clone, FromBytes, IntoBytes, Immutable, PartialEq)]
#[repr(C, packed)]
pub struct GetPldmCommandsRequest {
    pub hdr: PldmMsgHeader<[u8; PLDM_MSG_HEADER_LEN]>,
    pub pldm_type: u8,
    pub version: u32,
}

impl GetPldmCommandsRequest {
    pub fn new(instance_id: InstanceId, pldm_type: u8, version: u32) -> Self {
        GetPldmCommandsRequest {
            hdr: control_header(instance_id, PldmMsgType::Request, PldmControlCmd::GetPldmCommands),
            pldm_type,
            version,
        }
    }
}

#[derive(Debug, Clone, FromBytes, IntoBytes, Immutable, PartialEq)]
#[repr(C, packed)]
pub struct GetPldmCommandsResponse {
    pub hdr: PldmMsgHeader<[u8; PLDM_MSG_HEADER_LEN]>,
    pub completion_code: u8,
    pub supported_cmds: [u8; PLDM_CMDS_BITMAP_LEN],
}

impl GetPldmCommandsResponse {
    pub fn new(
        instance_id: InstanceId,
        completion_code: u8,
        supported_cmds: [u8; PLDM_CMDS_BITMAP_LEN],
    ) -> Self {
        GetPldmCommandsResponse {
            hdr: control_header(
                instance_id,
                PldmMsgType::Response,
                PldmControlCmd::GetPldmCommands,
            ),
            completion_code,
            supported_cmds,
        }
    }

    pub fn supports(&self, cmd: u8) -> bool {
        bitmap_has(&self.supported_cmds, cmd)
    }
}

/// Sets bit `index` in a little-endian byte bitmap.
pub fn bitmap_set(bitmap: &mut [u8], index: u8) {
    if let Some(byte) = bitmap.get_mut(index as usize / 8) {
        *byte |= 1 << (index % 8);
    }
}

pub fn bitmap_has(bitmap: &[u8], index: u8) -> bool {
    bitmap
        .get(index as usize / 8)
        .is_some_and(|byte| byte & (1 << (index % 8)) != 0)
}

impl_fixed_size_codec!(
    GetTidRequest,
    GetTidResponse,
    SetTidRequest,
    GetPldmVersionRequest,
    GetPldmVersionResponse,
    GetPldmTypesRequest,
    GetPldmTypesResponse,
    GetPldmCommandsRequest,
    GetPldmCommandsResponse,
);
