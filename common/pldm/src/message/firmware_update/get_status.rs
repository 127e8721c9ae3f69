// Licensed under the Apache-2.0 license

use crate::codec::impl_fixed_size_codec;
use crate::protocol::base::{
    InstanceId, PldmMsgHeader, PldmMsgType, PldmSupportedType, PLDM_MSG_HEADER_LEN,
};
use crate::protocol::firmware_update::{
    AuxState, FirmwareDeviceState, FwUpdateCmd, GetStatusReasonCode,
};
use zerocopy::{FromBytes, Immutable, IntoBytes};

#[derive(Debug, Clone, FromBytes, IntoBytes, Immutable, PartialEq)]
#[repr(C, packed)]
pub struct GetStatusRequest {
    pub hdr: PldmMsgHeader<[u8; PLDM_MSG_HEADER_LEN]>,
}

impl GetStatusRequest {
    pub fn new(instance_id: InstanceId) -> Self {
        GetStatusRequest {
            hdr: PldmMsgHeader::new(
                instance_id,
                PldmMsgType::Request,
                PldmSupportedType::FwUpdate,
                FwUpdateCmd::GetStatus as u8,
            ),
        }
    }
}

#[derive(Debug, Clone, FromBytes, IntoBytes, Immutable, PartialEq)]
#[repr(C, packed)]
pub struct GetStatusResponse {
    pub hdr: PldmMsgHeader<[u8; PLDM_MSG_HEADER_LEN]>,
    pub completion_code: u8,
    pub current_state: u8,
    pub previous_state: u8,
    pub aux_state: u8,
    pub aux_state_status: u8,
    pub progress_percent: u8,
    pub reason_code: u8,
    pub update_option_flags_enabled: u32,
}

/// Progress is reported as unknown when no transfer is under way.
pub const PROGRESS_PERCENT_NOT_SUPPORTED: u8 = 101;

impl GetStatusResponse {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        instance_id: InstanceId,
        completion_code: u8,
        current_state: FirmwareDeviceState,
        previous_state: FirmwareDeviceState,
        aux_state: AuxState,
        progress_percent: u8,
        reason_code: GetStatusReasonCode,
        update_option_flags_enabled: u32,
    ) -> Self {
        GetStatusResponse {
            hdr: PldmMsgHeader::new(
                instance_id,
                PldmMsgType::Response,
                PldmSupportedType::FwUpdate,
                FwUpdateCmd::GetStatus as u8,
            ),
            completion_code,
            current_state: current_state as u8,
            previous_state: previous_state as u8,
            aux_state: aux_state as u8,
            aux_state_status: 0,
            progress_percent,
            reason_code: reason_code as u8,
            update_option_flags_enabled,
        }
    }
}

impl_fixed_size_codec!(GetStatusRequest, GetStatusResponse);
