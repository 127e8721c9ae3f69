// Licensed under the Apache-2.0 license

pub mod control;
pub mod firmware_update;
pub mod oem;
pub mod platform;
pub mod smbios;

use crate::codec::impl_fixed_size_codec;
use crate::protocol::base::{PldmMsgHeader, PLDM_MSG_HEADER_LEN};
use zerocopy::{FromBytes, Immutable, IntoBytes};

/// A response that carries nothing but a completion code. Every command
/// answers this way when it rejects a request.
#[derive(Debug, Clone, FromBytes, IntoBytes, Immutable, PartialEq)]
#[repr(C, packed)]
pub struct CompletionCodeResponse {
    pub hdr: PldmMsgHeader<[u8; PLDM_MSG_HEADER_LEN]>,
    pub completion_code: u8,
}

impl CompletionCodeResponse {
    pub fn new(req_hdr: &PldmMsgHeader<[u8; PLDM_MSG_HEADER_LEN]>, completion_code: u8) -> Self {
        CompletionCodeResponse {
            hdr: req_hdr.into_response(),
            completion_code,
        }
    }
}

impl_fixed_size_codec!(CompletionCodeResponse);
