// Licensed under the Apache-2.0 license

use crate::codec::impl_fixed_size_codec;
use crate::protocol::base::{
    InstanceId, PldmMsgHeader, PldmMsgType, PldmSupportedType, PLDM_MSG_HEADER_LEN,
};
use crate::protocol::firmware_update::FwUpdateCmd;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use zerocopy::{FromBytes, Immutable, IntoBytes};

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum ApplyResult {
    ApplySuccess = 0x00,
    ApplySuccessWithActivationMethod = 0x01,
    ApplyFailureMemoryIssue = 0x02,
    ApplyGenericError = 0x0A,
}

#[derive(Debug, Clone, FromBytes, IntoBytes, Immutable, PartialEq)]
#[repr(C, packed)]
pub struct ApplyCompleteRequest {
    pub hdr: PldmMsgHeader<[u8; PLDM_MSG_HEADER_LEN]>,
    pub apply_result: u8,
    pub comp_activation_methods_modification: u16,
}

impl ApplyCompleteRequest {
    pub fn new(
        instance_id: InstanceId,
        apply_result: ApplyResult,
        comp_activation_methods_modification: u16,
    ) -> Self {
        ApplyCompleteRequest {
            hdr: PldmMsgHeader::new(
                instance_id,
                PldmMsgType::Request,
                PldmSupportedType::FwUpdate,
                FwUpdateCmd::ApplyComplete as u8,
            ),
            apply_result: apply_result as u8,
            comp_activation_methods_modification,
        }
    }
}

#[derive(Debug, Clone, FromBytes, IntoBytes, Immutable, PartialEq)]
#[repr(C, packed)]
pub struct ApplyCompleteResponse {
    pub hdr: PldmMsgHeader<[u8; PLDM_MSG_HEADER_LEN]>,
    pub completion_code: u8,
}

impl ApplyCompleteResponse {
    pub fn new(instance_id: InstanceId, completion_code: u8) -> Self {
        ApplyCompleteResponse {
            hdr: PldmMsgHeader::new(
                instance_id,
                PldmMsgType::Response,
                PldmSupportedType::FwUpdate,
                FwUpdateCmd::ApplyComplete as u8,
            ),
            completion_code,
        }
    }
}

impl_fixed_size_codec!(ApplyCompleteRequest, ApplyCompleteResponse);
