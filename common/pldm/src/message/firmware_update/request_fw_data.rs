// Licensed under the Apache-2.0 license

use crate::codec::{impl_fixed_size_codec, PldmCodecError};
use crate::protocol::base::{
    InstanceId, PldmMsgHeader, PldmMsgType, PldmSupportedType, PLDM_MSG_HEADER_LEN,
};
use crate::protocol::firmware_update::FwUpdateCmd;
use zerocopy::{FromBytes, Immutable, IntoBytes};

#[derive(Debug, Clone, FromBytes, IntoBytes, Immutable, PartialEq)]
#[repr(C, packed)]
pub struct RequestFirmwareDataRequest {
    pub hdr: PldmMsgHeader<[u8; PLDM_MSG_HEADER_LEN]>,
    pub offset: u32,
    pub length: u32,
}

impl RequestFirmwareDataRequest {
    pub fn new(instance_id: InstanceId, offset: u32, length: u32) -> Self {
        RequestFirmwareDataRequest {
            hdr: PldmMsgHeader::new(
                instance_id,
                PldmMsgType::Request,
                PldmSupportedType::FwUpdate,
                FwUpdateCmd::RequestFirmwareData as u8,
            ),
            offset,
            length,
        }
    }
}

impl_fixed_size_codec!(RequestFirmwareDataRequest);

/// Writes a RequestFirmwareData response: completion code then the image
/// chunk.
pub fn encode_fw_data_response(
    req_hdr: &PldmMsgHeader<[u8; PLDM_MSG_HEADER_LEN]>,
    completion_code: u8,
    data: &[u8],
    buffer: &mut [u8],
) -> Result<usize, PldmCodecError> {
    let bytes = PLDM_MSG_HEADER_LEN + 1 + data.len();
    if buffer.len() < bytes {
        return Err(PldmCodecError::BufferTooShort);
    }
    buffer[..PLDM_MSG_HEADER_LEN].copy_from_slice(&req_hdr.into_response().0);
    buffer[PLDM_MSG_HEADER_LEN] = completion_code;
    buffer[PLDM_MSG_HEADER_LEN + 1..bytes].copy_from_slice(data);
    Ok(bytes)
}
