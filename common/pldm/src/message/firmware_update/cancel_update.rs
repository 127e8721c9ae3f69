// Licensed under the Apache-2.0 license

use crate::codec::impl_fixed_size_codec;
use crate::protocol::base::{
    InstanceId, PldmMsgHeader, PldmMsgType, PldmSupportedType, PLDM_MSG_HEADER_LEN,
};
use crate::protocol::firmware_update::FwUpdateCmd;
use zerocopy::{FromBytes, Immutable, IntoBytes};

#[derive(Debug, Clone, FromBytes, IntoBytes, Immutable, PartialEq)]
#[repr(C, packed)]
pub struct CancelUpdateRequest {
    pub hdr: PldmMsgHeader<[u8; PLDM_MSG_HEADER_LEN]>,
}

impl CancelUpdateRequest {
    pub fn new(instance_id: InstanceId) -> Self {
        CancelUpdateRequest {
            hdr: PldmMsgHeader::new(
                instance_id,
                PldmMsgType::Request,
                PldmSupportedType::FwUpdate,
                FwUpdateCmd::CancelUpdate as u8,
            ),
        }
    }
}

#[derive(Debug, Clone, FromBytes, IntoBytes, Immutable, PartialEq)]
#[repr(C, packed)]
pub struct CancelUpdateResponse {
    pub hdr: PldmMsgHeader<[u8; PLDM_MSG_HEADER_LEN]>,
    pub completion_code: u8,
    pub non_functioning_component_indication: u8,
    pub non_functioning_component_bitmap: u64,
}

impl CancelUpdateResponse {
    pub fn new(instance_id: InstanceId, completion_code: u8) -> Self {
        CancelUpdateResponse {
            hdr: PldmMsgHeader::new(
                instance_id,
                PldmMsgType::Response,
                PldmSupportedType::FwUpdate,
                FwUpdateCmd::CancelUpdate as u8,
            ),
            completion_code,
            non_functioning_component_indication: 0,
            non_functioning_component_bitmap: 0,
        }
    }
}

impl_fixed_size_codec!(CancelUpdateRequest, CancelUpdateResponse);
