// Licensed under the Apache-2.0 license

use crate::codec::impl_fixed_size_codec;
use crate::protocol::base::{
    InstanceId, PldmMsgHeader, PldmMsgType, PldmSupportedType, PLDM_MSG_HEADER_LEN,
};
use crate::protocol::firmware_update::FwUpdateCmd;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use zerocopy::{FromBytes, Immutable, IntoBytes};

#[derive(Debug, Copy, Clone, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum SelfContainedActivationRequest {
    NotActivateSelfContainedComponents = 0,
    ActivateSelfContainedComponents = 1,
}

#[derive(Debug, Clone, FromBytes, IntoBytes, Immutable, PartialEq)]
#[repr(C, packed)]
pub struct ActivateFirmwareRequest {
    pub hdr: PldmMsgHeader<[u8; PLDM_MSG_HEADER_LEN]>,
    pub self_contained_activation_req: u8,
}

impl ActivateFirmwareRequest {
    pub fn new(
        instance_id: InstanceId,
        self_contained_activation_req: SelfContainedActivationRequest,
    ) -> ActivateFirmwareRequest {
        ActivateFirmwareRequest {
            hdr: PldmMsgHeader::new(
                instance_id,
                PldmMsgType::Request,
                PldmSupportedType::FwUpdate,
                FwUpdateCmd::ActivateFirmware as u8,
            ),
            self_contained_activation_req: self_contained_activation_req as u8,
        }
    }
}

#[derive(Debug, Clone, FromBytes, IntoBytes, Immutable, PartialEq)]
#[repr(C, packed)]
pub struct ActivateFirmwareResponse {
    pub hdr: PldmMsgHeader<[u8; PLDM_MSG_HEADER_LEN]>,
    pub completion_code: u8,
    pub estimated_time_activation: u16,
}

impl ActivateFirmwareResponse {
    pub fn new(
        instance_id: InstanceId,
        completion_code: u8,
        estimated_time_activation: u16,
    ) -> ActivateFirmwareResponse {
        ActivateFirmwareResponse {
            hdr: PldmMsgHeader::new(
                instance_id,
                PldmMsgType::Response,
                PldmSupportedType::FwUpdate,
                FwUpdateCmd::ActivateFirmware as u8,
            ),
            completion_code,
            estimated_time_activation,
        }
    }
}

impl_fixed_size_codec!(ActivateFirmwareRequest, ActivateFirmwareResponse);

#[cfg(test)]
mod test {
    use super::*;
    use crate::codec::PldmCodec;

    #[test]
    fn test_activate_firmware_request() {
        let request = ActivateFirmwareRequest::new(
            1,
            SelfContainedActivationRequest::NotActivateSelfContainedComponents,
        );

        let mut buffer = [0u8; core::mem::size_of::<ActivateFirmwareRequest>()];
        request.encode(&mut buffer).unwrap();
        assert_eq!(buffer, [0x81, 0x05, 0x1A, 0x00]);
        assert_eq!(
            SelfContainedActivationRequest::try_from(buffer[3]).unwrap(),
            SelfContainedActivationRequest::NotActivateSelfContainedComponents
        );
    }

    #[test]
    fn test_activate_firmware_response_short_buffer() {
        let response = ActivateFirmwareResponse::new(1, 0, 0);
        let mut buffer = [0u8; 5];
        assert!(response.encode(&mut buffer).is_err());
        assert!(ActivateFirmwareResponse::decode(&buffer[..4]).is_err());
    }
}
