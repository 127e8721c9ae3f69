// Licensed under the Apache-2.0 license

use crate::codec::impl_fixed_size_codec;
use crate::error::PldmError;
use crate::protocol::base::{
    InstanceId, PldmMsgHeader, PldmMsgType, PldmSupportedType, PLDM_MSG_HEADER_LEN,
};
use crate::protocol::firmware_update::{FwUpdateCmd, PLDM_FW_UPDATE_GENERIC_ERROR};
use zerocopy::{FromBytes, Immutable, IntoBytes};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyResult {
    VerifySuccess,
    VerifyErrorVerificationFailure,
    VerifyErrorVersionMismatch,
    VerifyFailedFdSecurityChecks,
    VerifyErrorImageIncomplete,
    GenericError,
    VendorDefined(u8),
}

impl From<VerifyResult> for u8 {
    fn from(value: VerifyResult) -> u8 {
        match value {
            VerifyResult::VerifySuccess => 0x00,
            VerifyResult::VerifyErrorVerificationFailure => 0x01,
            VerifyResult::VerifyErrorVersionMismatch => 0x02,
            VerifyResult::VerifyFailedFdSecurityChecks => 0x03,
            VerifyResult::VerifyErrorImageIncomplete => 0x04,
            VerifyResult::GenericError => PLDM_FW_UPDATE_GENERIC_ERROR,
            VerifyResult::VendorDefined(v) => v,
        }
    }
}

impl TryFrom<u8> for VerifyResult {
    type Error = PldmError;

    fn try_from(value: u8) -> Result<Self, PldmError> {
        match value {
            0x00 => Ok(VerifyResult::VerifySuccess),
            0x01 => Ok(VerifyResult::VerifyErrorVerificationFailure),
            0x02 => Ok(VerifyResult::VerifyErrorVersionMismatch),
            0x03 => Ok(VerifyResult::VerifyFailedFdSecurityChecks),
            0x04 => Ok(VerifyResult::VerifyErrorImageIncomplete),
            PLDM_FW_UPDATE_GENERIC_ERROR => Ok(VerifyResult::GenericError),
            0x90..=0xaf => Ok(VerifyResult::VendorDefined(value)),
            _ => Err(PldmError::InvalidVerifyResult),
        }
    }
}

#[derive(Debug, Clone, FromBytes, IntoBytes, Immutable, PartialEq)]
#[repr(C, packed)]
pub struct VerifyCompleteRequest {
    pub hdr: PldmMsgHeader<[u8; PLDM_MSG_HEADER_LEN]>,
    pub verify_result: u8,
}

impl VerifyCompleteRequest {
    pub fn new(instance_id: InstanceId, verify_result: VerifyResult) -> Self {
        VerifyCompleteRequest {
            hdr: PldmMsgHeader::new(
                instance_id,
                PldmMsgType::Request,
                PldmSupportedType::FwUpdate,
                FwUpdateCmd::VerifyComplete as u8,
            ),
            verify_result: verify_result.into(),
        }
    }
}

#[derive(Debug, Clone, FromBytes, IntoBytes, Immutable, PartialEq)]
#[repr(C, packed)]
pub struct VerifyCompleteResponse {
    pub hdr: PldmMsgHeader<[u8; PLDM_MSG_HEADER_LEN]>,
    pub completion_code: u8,
}

impl VerifyCompleteResponse {
    pub fn new(instance_id: InstanceId, completion_code: u8) -> VerifyCompleteResponse {
        VerifyCompleteResponse {
            hdr: PldmMsgHeader::new(
                instance_id,
                PldmMsgType::Response,
                PldmSupportedType::FwUpdate,
                FwUpdateCmd::VerifyComplete as u8,
            ),
            completion_code,
        }
    }
}

impl_fixed_size_codec!(VerifyCompleteRequest, VerifyCompleteResponse);

#[cfg(test)]
mod test {
    use super::*;
    use crate::codec::PldmCodec;

    #[test]
    fn test_verify_complete_failure_report() {
        let request = VerifyCompleteRequest::new(0x02, VerifyResult::GenericError);
        let mut buffer = [0u8; core::mem::size_of::<VerifyCompleteRequest>()];
        request.encode(&mut buffer).unwrap();
        assert_eq!(buffer, [0x82, 0x05, 0x17, 0x0A]);

        let decoded = VerifyCompleteRequest::decode(&buffer).unwrap();
        assert_eq!(
            VerifyResult::try_from(decoded.verify_result),
            Ok(VerifyResult::GenericError)
        );
    }

    #[test]
    fn test_verify_result_ranges() {
        assert_eq!(VerifyResult::try_from(0x95), Ok(VerifyResult::VendorDefined(0x95)));
        assert_eq!(VerifyResult::try_from(0x20), Err(PldmError::InvalidVerifyResult));
    }
}
