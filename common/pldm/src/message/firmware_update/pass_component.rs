// Licensed under the Apache-2.0 license

use crate::codec::{impl_fixed_size_codec, PldmCodecError};
use crate::message::firmware_update::{encode_with_version, trailing_version};
use crate::protocol::base::{
    InstanceId, PldmMsgHeader, PldmMsgType, PldmSupportedType, TransferRespFlag,
    PLDM_MSG_HEADER_LEN,
};
use crate::protocol::firmware_update::{ComponentClassification, FwUpdateCmd, VersionStringType};
use zerocopy::{FromBytes, Immutable, IntoBytes};

#[derive(Debug, Clone, FromBytes, IntoBytes, Immutable, PartialEq)]
#[repr(C, packed)]
pub struct PassComponentTableRequest {
    pub hdr: PldmMsgHeader<[u8; PLDM_MSG_HEADER_LEN]>,
    pub transfer_flag: u8,
    pub comp_classification: u16,
    pub comp_identifier: u16,
    pub comp_classification_index: u8,
    pub comp_comparison_stamp: u32,
    pub comp_ver_str_type: u8,
    pub comp_ver_str_len: u8,
}

impl PassComponentTableRequest {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        instance_id: InstanceId,
        transfer_flag: TransferRespFlag,
        comp_classification: ComponentClassification,
        comp_identifier: u16,
        comp_classification_index: u8,
        comp_comparison_stamp: u32,
        ver_str_type: VersionStringType,
        version: &[u8],
    ) -> Self {
        PassComponentTableRequest {
            hdr: PldmMsgHeader::new(
                instance_id,
                PldmMsgType::Request,
                PldmSupportedType::FwUpdate,
                FwUpdateCmd::PassComponentTable as u8,
            ),
            transfer_flag: transfer_flag as u8,
            comp_classification: comp_classification as u16,
            comp_identifier,
            comp_classification_index,
            comp_comparison_stamp,
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
pub struct PassComponentTableResponse {
    pub hdr: PldmMsgHeader<[u8; PLDM_MSG_HEADER_LEN]>,
    pub completion_code: u8,
    pub comp_resp: u8,
    pub comp_resp_code: u8,
}

impl PassComponentTableResponse {
    pub fn new(
        instance_id: InstanceId,
        completion_code: u8,
        comp_resp: u8,
        comp_resp_code: u8,
    ) -> Self {
        PassComponentTableResponse {
            hdr: PldmMsgHeader::new(
                instance_id,
                PldmMsgType::Response,
                PldmSupportedType::FwUpdate,
                FwUpdateCmd::PassComponentTable as u8,
            ),
            completion_code,
            comp_resp,
            comp_resp_code,
        }
    }
}

impl_fixed_size_codec!(PassComponentTableRequest, PassComponentTableResponse);
