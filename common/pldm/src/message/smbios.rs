// Licensed under the Apache-2.0 license

use crate::codec::{impl_fixed_size_codec, PldmCodecError};
use crate::error::PldmError;
use crate::protocol::base::{
    InstanceId, PldmMsgHeader, PldmMsgType, PldmSupportedType, TransferOperationFlag,
    TransferRespFlag, PLDM_MSG_HEADER_LEN,
};
use crate::protocol::smbios::{SmbiosCmd, SmbiosStructureType, SMBIOS_BIOS_INFORMATION_LEN};
use zerocopy::{FromBytes, FromZeros, Immutable, IntoBytes};

#[derive(Debug, Clone, FromBytes, IntoBytes, Immutable, PartialEq)]
#[repr(C, packed)]
pub struct GetSmbiosStructureByTypeRequest {
    pub hdr: PldmMsgHeader<[u8; PLDM_MSG_HEADER_LEN]>,
    pub data_transfer_handle: u32,
    pub transfer_operation_flag: u8,
    pub structure_type: u8,
    pub structure_instance_id: u16,
}

impl GetSmbiosStructureByTypeRequest {
    pub fn new(
        instance_id: InstanceId,
        data_transfer_handle: u32,
        transfer_operation_flag: TransferOperationFlag,
        structure_type: u8,
        structure_instance_id: u16,
    ) -> Self {
        GetSmbiosStructureByTypeRequest {
            hdr: PldmMsgHeader::new(
                instance_id,
                PldmMsgType::Request,
                PldmSupportedType::Smbios,
                SmbiosCmd::GetSmbiosStructureByType as u8,
            ),
            data_transfer_handle,
            transfer_operation_flag: transfer_operation_flag as u8,
            structure_type,
            structure_instance_id,
        }
    }
}

impl_fixed_size_codec!(GetSmbiosStructureByTypeRequest);

/// Completion code, next transfer handle and transfer flag.
pub const SMBIOS_BY_TYPE_RESP_FIXED_LEN: usize = PLDM_MSG_HEADER_LEN + 6;

/// Response to [`GetSmbiosStructureByTypeRequest`]. `data` holds whole
/// structures back to back, each formatted area followed by its strings.
#[derive(Debug, Clone, PartialEq)]
pub struct GetSmbiosStructureByTypeResponse<'a> {
    pub hdr: PldmMsgHeader<[u8; PLDM_MSG_HEADER_LEN]>,
    pub completion_code: u8,
    pub next_data_transfer_handle: u32,
    pub transfer_flag: u8,
    pub data: &'a [u8],
}

impl<'a> GetSmbiosStructureByTypeResponse<'a> {
    pub fn new(
        req_hdr: &PldmMsgHeader<[u8; PLDM_MSG_HEADER_LEN]>,
        next_data_transfer_handle: u32,
        transfer_flag: TransferRespFlag,
        data: &'a [u8],
    ) -> Self {
        GetSmbiosStructureByTypeResponse {
            hdr: req_hdr.into_response(),
            completion_code: 0,
            next_data_transfer_handle,
            transfer_flag: transfer_flag as u8,
            data,
        }
    }

    pub fn encode(&self, buffer: &mut [u8]) -> Result<usize, PldmCodecError> {
        let len = SMBIOS_BY_TYPE_RESP_FIXED_LEN + self.data.len();
        if buffer.len() < len {
            return Err(PldmCodecError::BufferTooShort);
        }
        buffer[..PLDM_MSG_HEADER_LEN].copy_from_slice(&self.hdr.0);
        buffer[PLDM_MSG_HEADER_LEN] = self.completion_code;
        buffer[PLDM_MSG_HEADER_LEN + 1..PLDM_MSG_HEADER_LEN + 5]
            .copy_from_slice(&self.next_data_transfer_handle.to_le_bytes());
        buffer[PLDM_MSG_HEADER_LEN + 5] = self.transfer_flag;
        buffer[SMBIOS_BY_TYPE_RESP_FIXED_LEN..len].copy_from_slice(self.data);
        Ok(len)
    }

    pub fn decode(msg: &'a [u8]) -> Result<Self, PldmError> {
        let hdr = PldmMsgHeader::decode(msg)?;
        if msg.len() < SMBIOS_BY_TYPE_RESP_FIXED_LEN {
            return Err(PldmError::InvalidLength);
        }
        let mut handle = [0u8; 4];
        handle.copy_from_slice(&msg[PLDM_MSG_HEADER_LEN + 1..PLDM_MSG_HEADER_LEN + 5]);
        Ok(GetSmbiosStructureByTypeResponse {
            hdr,
            completion_code: msg[PLDM_MSG_HEADER_LEN],
            next_data_transfer_handle: u32::from_le_bytes(handle),
            transfer_flag: msg[PLDM_MSG_HEADER_LEN + 5],
            data: &msg[SMBIOS_BY_TYPE_RESP_FIXED_LEN..],
        })
    }
}

/// Formatted area of an SMBIOS BIOS Information (type 0) structure. The
/// string fields are 1-based indexes into the text strings that follow it,
/// 0 meaning no string.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, PartialEq)]
#[repr(C, packed)]
pub struct BiosInformation {
    pub structure_type: u8,
    pub length: u8,
    pub handle: u16,
    pub vendor: u8,
    pub bios_version: u8,
    pub bios_starting_segment: u16,
    pub bios_release_date: u8,
    pub bios_rom_size: u8,
    pub bios_characteristics: u64,
    pub characteristics_ext: [u8; 2],
    pub system_bios_major: u8,
    pub system_bios_minor: u8,
    pub ec_firmware_major: u8,
    pub ec_firmware_minor: u8,
    pub extended_rom_size: u16,
}

impl BiosInformation {
    pub fn new(handle: u16) -> Self {
        let mut info = BiosInformation::new_zeroed();
        info.structure_type = SmbiosStructureType::BiosInformation as u8;
        info.length = SMBIOS_BIOS_INFORMATION_LEN;
        info.handle = handle;
        info
    }
}
