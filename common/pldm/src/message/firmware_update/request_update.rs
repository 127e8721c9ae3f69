// Licensed under the Apache-2.0 license

use crate::codec::{impl_fixed_size_codec, PldmCodecError};
use crate::message::firmware_update::{encode_with_version, trailing_version};
use crate::protocol::base::{
    InstanceId, PldmMsgHeader, PldmMsgType, PldmSupportedType, PLDM_MSG_HEADER_LEN,
};
use crate::protocol::firmware_update::{FwUpdateCmd, VersionStringType};
use zerocopy::{FromBytes, Immutable, IntoBytes};

/// Fixed part of RequestUpdate. The component image set version string
/// follows it on the wire.
#[derive(Debug, Clone, FromBytes, IntoBytes, Immutable, PartialEq)]
#[repr(C, packed)]
pub struct RequestUpdateRequest {
    pub hdr: PldmMsgHeader<[u8; PLDM_MSG_HEADER_LEN]>,
    pub max_transfer_size: u32,
    pub num_of_comp: u16,
    pub max_outstanding_transfer_req: u8,
    pub pkg_data_len: u16,
    pub comp_image_set_ver_str_type: u8,
    pub comp_image_set_ver_str_len: u8,
}

impl RequestUpdateRequest {
    pub fn new(
        instance_id: InstanceId,
        max_transfer_size: u32,
        num_of_comp: u16,
        max_outstanding_transfer_req: u8,
        pkg_data_len: u16,
        ver_str_type: VersionStringType,
        version: &[u8],
    ) -> Self {
        RequestUpdateRequest {
            hdr: PldmMsgHeader::new(
                instance_id,
                PldmMsgType::Request,
                PldmSupportedType::FwUpdate,
                FwUpdateCmd::RequestUpdate as u8,
            ),
            max_transfer_size,
            num_of_comp,
            max_outstanding_transfer_req,
            pkg_data_len,
            comp_image_set_ver_str_type: ver_str_type as u8,
            comp_image_set_ver_str_len: version.len() as u8,
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
        trailing_version(msg, core::mem::size_of::<Self>(), self.comp_image_set_ver_str_len)
    }
}

#[derive(Debug, Clone, FromBytes, IntoBytes, Immutable, PartialEq)]
#[repr(C, packed)]
pub struct RequestUpdateResponse {
    pub hdr: PldmMsgHeader<[u8; PLDM_MSG_HEADER_LEN]>,
    pub completion_code: u8,
    pub fd_meta_data_len: u16,
    pub fd_will_send_pkg_data: u8,
}

impl RequestUpdateResponse {
    pub fn new(
        instance_id: InstanceId,
        completion_code: u8,
        fd_meta_data_len: u16,
        fd_will_send_pkg_data: bool,
    ) -> Self {
        RequestUpdateResponse {
            hdr: PldmMsgHeader::new(
                instance_id,
                PldmMsgType::Response,
                PldmSupportedType::FwUpdate,
                FwUpdateCmd::RequestUpdate as u8,
            ),
            completion_code,
            fd_meta_data_len,
            fd_will_send_pkg_data: fd_will_send_pkg_data as u8,
        }
    }
}

impl_fixed_size_codec!(RequestUpdateRequest, RequestUpdateResponse);

#[cfg(test)]
mod test {
    use super::*;
    use crate::codec::PldmCodec;

    #[test]
    fn test_request_update_with_version() {
        let version = b"bic-1.2";
        let request = RequestUpdateRequest::new(0, 512, 1, 1, 0, VersionStringType::Ascii, version);
        let mut buffer = [0u8; 64];
        let len = request.encode_with_version(version, &mut buffer).unwrap();
        assert_eq!(len, core::mem::size_of::<RequestUpdateRequest>() + version.len());

        let decoded = RequestUpdateRequest::decode(&buffer[..len]).unwrap();
        assert_eq!(decoded.version(&buffer[..len]), Some(&version[..]));
        assert_eq!(decoded.version(&buffer[..len - 1]), None);
        assert_eq!({ decoded.max_transfer_size }, 512);
    }
}
