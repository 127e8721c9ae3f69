// Licensed under the Apache-2.0 license

use crate::codec::{impl_fixed_size_codec, PldmCodecError};
use crate::message::firmware_update::{encode_with_version, trailing_version};
use crate::protocol::base::{
    InstanceId, PldmMsgHeader, PldmMsgType, PldmSupportedType, PLDM_MSG_HEADER_LEN,
};
use crate::protocol::firmware_update::{ComponentClassification, FwUpdateCmd, VersionStringType};
use zerocopy::{FromBytes, Immutable, IntoBytes};

#[derive(Debug, Clone, FromBytes, IntoBytes, Immutable, PartialEq)]
#[repr(C, packed)]
pub struct UpdateComponentRequest {
    pub hdr: PldmMsgHeader<[u8; PLDM_MSG_HEADER_LEN]>,
    pub comp_classification: u16,
    pub comp_identifier: u16,
    pub comp_classification_index: u8,
    pub comp_comparison_stamp: u32,
    pub comp_image_size: u32,
    pub update_option_flags: u32,
    pub comp_ver_str_type: u8,
    pub comp_ver_str_len: u8,
}

impl UpdateComponentRequest {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        instance_id: InstanceId,
        comp_classification: ComponentClassification,
        comp_identifier: u16,
        comp_classification_index: u8,
        comp_comparison_stamp: u32,
        comp_image_size: u32,
        update_option_flags: u32,
        ver_str_type: VersionStringType,
        version: &[u8],
    ) -> Self {
        UpdateComponentRequest {
            hdr: PldmMsgHeader::new(
                instance_id,
                PldmMsgType::Request,
                PldmSupportedType::FwUpdate,
                FwUpdateCmd::UpdateComponent as u8,
            ),
            comp_classification: comp_classification as u16,
            comp_identifier,
            comp_classification_index,
            comp_comparison_stamp,
            comp_image_size,
            update_option_flags,
            comp_ver_str_type: ver_str_type as u8,
            comp_ver_str_len: version.len() as u8,
        }
    }

    pub fn encode_with_version(
        &self,
        version: &[u8],
        buffer: &mut [u8],
    ) -> Result<usize, PldmCodecError> {
        encode_with_version(self, version, buffer)
    }

    pub fn version<'a>(&self, msg: &'a [u8]) -> Option<&'a [u8]> {
        trailing_version(msg, core::mem::size_of::<Self>(), self.comp_ver_str_len)
    }
}

#[derive(Debug, Clone, FromBytes, IntoBytes, Immutable, PartialEq)]
#[repr(C, packed)]
pub struct UpdateComponentResponse {
    pub hdr: PldmMsgHeader<[u8; PLDM_MSG_HEADER_LEN]>,
    pub completion_code: u8,
    pub comp_compatibility_resp: u8,
    pub comp_compatibility_resp_code: u8,
    pub update_option_flags_enabled: u32,
    pub time_before_req_fw_data: u16,
}

impl UpdateComponentResponse {
    pub fn new(
        instance_id: InstanceId,
        completion_code: u8,
        update_option_flags_enabled: u32,
        time_before_req_fw_data: u16,
    ) -> Self {
        UpdateComponentResponse {
            hdr: PldmMsgHeader::new(
                instance_id,
                PldmMsgType::Response,
                PldmSupportedType::FwUpdate,
                FwUpdateCmd::UpdateComponent as u8,
            ),
            completion_code,
            comp_compatibility_resp: 0,
            comp_compatibility_resp_code: 0,
            update_option_flags_enabled,
            time_before_req_fw_data,
        }
    }
}

impl_fixed_size_codec!(UpdateComponentRequest, UpdateComponentResponse);
