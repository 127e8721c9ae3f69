// Licensed under the Apache-2.0 license

//! OEM messages. Both commands are prefixed with the 3-byte IANA number; the
//! IPMI bridge carries a complete IPMI request or response after it.

use crate::codec::PldmCodecError;
use crate::error::PldmError;
use crate::protocol::base::{
    InstanceId, PldmMsgHeader, PldmMsgType, PldmSupportedType, PLDM_MSG_HEADER_LEN,
};
use crate::protocol::oem::{iana_bytes, iana_matches, OemCmd, OEM_IANA_LEN};

/// IANA, netfn/lun and command.
pub const IPMI_BRIDGE_REQ_MIN_LEN: usize = OEM_IANA_LEN + 2;
/// Completion code, IANA, netfn/lun, command and IPMI completion code.
pub const IPMI_BRIDGE_RESP_MIN_LEN: usize = 1 + OEM_IANA_LEN + 3;

fn oem_header(
    instance_id: InstanceId,
    msg_type: PldmMsgType,
    cmd: OemCmd,
) -> PldmMsgHeader<[u8; PLDM_MSG_HEADER_LEN]> {
    PldmMsgHeader::new(instance_id, msg_type, PldmSupportedType::Oem, cmd as u8)
}

fn put(buffer: &mut [u8], parts: &[&[u8]]) -> Result<usize, PldmCodecError> {
    let bytes: usize = parts.iter().map(|p| p.len()).sum();
    if buffer.len() < bytes {
        return Err(PldmCodecError::BufferTooShort);
    }
    let mut offset = 0;
    for part in parts {
        buffer[offset..offset + part.len()].copy_from_slice(part);
        offset += part.len();
    }
    Ok(bytes)
}

/// An IPMI request carried over PLDM. `data` borrows from the message it
/// was decoded from.
#[derive(Debug, Clone, PartialEq)]
pub struct IpmiBridgeRequest<'a> {
    pub hdr: PldmMsgHeader<[u8; PLDM_MSG_HEADER_LEN]>,
    pub netfn: u8,
    pub cmd: u8,
    pub data: &'a [u8],
}

impl<'a> IpmiBridgeRequest<'a> {
    pub fn new(instance_id: InstanceId, netfn: u8, cmd: u8, data: &'a [u8]) -> Self {
        IpmiBridgeRequest {
            hdr: oem_header(instance_id, PldmMsgType::Request, OemCmd::IpmiBridge),
            netfn,
            cmd,
            data,
        }
    }

    pub fn encode(&self, buffer: &mut [u8]) -> Result<usize, PldmCodecError> {
        put(
            buffer,
            &[&self.hdr.0, &iana_bytes(), &[self.netfn << 2, self.cmd], self.data],
        )
    }

    /// Decodes a full PLDM message. Short payloads give `InvalidLength`, a
    /// foreign IANA gives `InvalidData`.
    pub fn decode(msg: &'a [u8]) -> Result<Self, PldmError> {
        let hdr = PldmMsgHeader::decode(msg)?;
        let payload = &msg[PLDM_MSG_HEADER_LEN..];
        if payload.len() < IPMI_BRIDGE_REQ_MIN_LEN {
            return Err(PldmError::InvalidLength);
        }
        if !iana_matches(payload) {
            return Err(PldmError::InvalidData);
        }
        Ok(IpmiBridgeRequest {
            hdr,
            netfn: payload[OEM_IANA_LEN] >> 2,
            cmd: payload[OEM_IANA_LEN + 1],
            data: &payload[IPMI_BRIDGE_REQ_MIN_LEN..],
        })
    }
}

/// The response to an [`IpmiBridgeRequest`].
#[derive(Debug, Clone, PartialEq)]
pub struct IpmiBridgeResponse<'a> {
    pub hdr: PldmMsgHeader<[u8; PLDM_MSG_HEADER_LEN]>,
    pub completion_code: u8,
    /// Response netfn, i.e. the request netfn plus one.
    pub netfn: u8,
    pub cmd: u8,
    pub ipmi_completion_code: u8,
    pub data: &'a [u8],
}

impl<'a> IpmiBridgeResponse<'a> {
    pub fn new(
        instance_id: InstanceId,
        req_netfn: u8,
        cmd: u8,
        ipmi_completion_code: u8,
        data: &'a [u8],
    ) -> Self {
        IpmiBridgeResponse {
            hdr: oem_header(instance_id, PldmMsgType::Response, OemCmd::IpmiBridge),
            completion_code: 0,
            netfn: req_netfn | 0x01,
            cmd,
            ipmi_completion_code,
            data,
        }
    }

    pub fn encode(&self, buffer: &mut [u8]) -> Result<usize, PldmCodecError> {
        put(
            buffer,
            &[
                &self.hdr.0,
                &[self.completion_code],
                &iana_bytes(),
                &[self.netfn << 2, self.cmd, self.ipmi_completion_code],
                self.data,
            ],
        )
    }

    pub fn decode(msg: &'a [u8]) -> Result<Self, PldmError> {
        let hdr = PldmMsgHeader::decode(msg)?;
        let payload = &msg[PLDM_MSG_HEADER_LEN..];
        let completion_code = *payload.first().ok_or(PldmError::InvalidLength)?;
        if payload.len() < IPMI_BRIDGE_RESP_MIN_LEN {
            // Rejections carry only the completion code and the IANA.
            return Ok(IpmiBridgeResponse {
                hdr,
                completion_code,
                netfn: 0,
                cmd: 0,
                ipmi_completion_code: 0,
                data: &[],
            });
        }
        let body = &payload[1 + OEM_IANA_LEN..];
        Ok(IpmiBridgeResponse {
            hdr,
            completion_code,
            netfn: body[0] >> 2,
            cmd: body[1],
            ipmi_completion_code: body[2],
            data: &body[3..],
        })
    }
}

/// Encodes the response to an OEM command that only reports a completion
/// code. The IANA is echoed after it.
pub fn encode_oem_cc_response(
    req_hdr: &PldmMsgHeader<[u8; PLDM_MSG_HEADER_LEN]>,
    completion_code: u8,
    buffer: &mut [u8],
) -> Result<usize, PldmCodecError> {
    put(buffer, &[&req_hdr.into_response().0, &[completion_code], &iana_bytes()])
}

/// Echo: the response repeats the request data after the IANA.
pub fn encode_echo_response(
    req_hdr: &PldmMsgHeader<[u8; PLDM_MSG_HEADER_LEN]>,
    data: &[u8],
    buffer: &mut [u8],
) -> Result<usize, PldmCodecError> {
    put(buffer, &[&req_hdr.into_response().0, &[0], &iana_bytes(), data])
}

pub fn encode_echo_request(
    instance_id: InstanceId,
    data: &[u8],
    buffer: &mut [u8],
) -> Result<usize, PldmCodecError> {
    let hdr = oem_header(instance_id, PldmMsgType::Request, OemCmd::Echo);
    put(buffer, &[&hdr.0, &iana_bytes(), data])
}
