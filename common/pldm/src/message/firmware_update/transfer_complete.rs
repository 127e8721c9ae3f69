// Licensed under the Apache-2.0 license

use crate::codec::impl_fixed_size_codec;
use crate::protocol::base::{
    InstanceId, PldmMsgHeader, PldmMsgType, PldmSupportedType, PLDM_MSG_HEADER_LEN,
};
use crate::protocol::firmware_update::FwUpdateCmd;
use zerocopy::{FromBytes, Immutable, IntoBytes};

#[derive(Debug, Clone, FromBytes, IntoBytes, Immutable, PartialEq)]
#[repr(C, packed)]
pub struct TransferCompleteRequest {
    pub hdr: PldmMsgHeader<[u8; PLDM_MSG_HEADER_LEN]>,
    pub transfer_result: u8,
}

impl TransferCompleteRequest {
    /// `transfer_result` is a `TransferResult` code or the generic error.
    pub fn new(instance_id: InstanceId, transfer_result: u8) -> Self {
        TransferCompleteRequest {
            hdr: PldmMsgHeader::new(
                instance_id,
                PldmMsgType::Request,
                PldmSupportedType::FwUpdate,
                FwUpdateCmd::TransferComplete as u8,
            ),
            transfer_result,
        }
    }
}

#[derive(Debug, Clone, FromBytes, IntoBytes, Immutable, PartialEq)]
#[repr(C, packed)]
pub struct TransferCompleteResponse {
    pub hdr: PldmMsgHeader<[u8; PLDM_MSG_HEADER_LEN]>,
    pub completion_code: u8,
}

impl TransferCompleteResponse {
    pub fn new(instance_id: InstanceId, completion_code: u8) -> Self {
        TransferCompleteResponse {
            hdr: PldmMsgHeader::new(
                instance_id,
                PldmMsgType::Response,
                PldmSupportedType::FwUpdate,
                FwUpdateCmd::TransferComplete as u8,
            ),
            completion_code,
        }
    }
}

impl_fixed_size_codec!(TransferCompleteRequest, TransferCompleteResponse);
