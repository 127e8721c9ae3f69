// Licensed under the Apache-2.0 license

use crate::codec::{impl_fixed_size_codec, PldmCodec, PldmCodecError};
use crate::protocol::base::{
    InstanceId, PldmMsgHeader, PldmMsgType, PldmSupportedType, PLDM_MSG_HEADER_LEN,
};
use crate::protocol::platform::{PlatformCmd, PLDM_STATE_EFFECTER_MAX_COMPOSITE};
use zerocopy::{FromBytes, Immutable, IntoBytes};

const MAX_FIELDS: usize = PLDM_STATE_EFFECTER_MAX_COMPOSITE as usize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetEffecterStateField {
    pub set_request: u8,
    pub effecter_state: u8,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GetEffecterStateField {
    pub effecter_op_state: u8,
    pub pending_state: u8,
    pub present_state: u8,
}

/// SetStateEffecterStates carries one (set request, state) pair per
/// composite effecter. `comp_effecter_count` is kept as received so the
/// responder can validate it against the payload length.
#[derive(Debug, Clone, PartialEq)]
pub struct SetStateEffecterStatesRequest {
    pub hdr: PldmMsgHeader<[u8; PLDM_MSG_HEADER_LEN]>,
    pub effecter_id: u16,
    pub comp_effecter_count: u8,
    pub fields: [SetEffecterStateField; MAX_FIELDS],
}

impl SetStateEffecterStatesRequest {
    pub const FIXED_LEN: usize = PLDM_MSG_HEADER_LEN + 3;

    pub fn new(
        instance_id: InstanceId,
        effecter_id: u16,
        fields: &[SetEffecterStateField],
    ) -> Self {
        let count = fields.len().min(MAX_FIELDS);
        let mut req = SetStateEffecterStatesRequest {
            hdr: PldmMsgHeader::new(
                instance_id,
                PldmMsgType::Request,
                PldmSupportedType::Platform,
                PlatformCmd::SetStateEffecterStates as u8,
            ),
            effecter_id,
            comp_effecter_count: count as u8,
            fields: [SetEffecterStateField::default(); MAX_FIELDS],
        };
        req.fields[..count].copy_from_slice(&fields[..count]);
        req
    }

    pub fn fields(&self) -> &[SetEffecterStateField] {
        let count = (self.comp_effecter_count as usize).min(MAX_FIELDS);
        &self.fields[..count]
    }
}

impl PldmCodec for SetStateEffecterStatesRequest {
    fn encode(&self, buffer: &mut [u8]) -> Result<usize, PldmCodecError> {
        let fields = self.fields();
        let bytes = Self::FIXED_LEN + fields.len() * 2;
        if buffer.len() < bytes {
            return Err(PldmCodecError::BufferTooShort);
        }
        buffer[..PLDM_MSG_HEADER_LEN].copy_from_slice(&self.hdr.0);
        buffer[PLDM_MSG_HEADER_LEN..PLDM_MSG_HEADER_LEN + 2]
            .copy_from_slice(&self.effecter_id.to_le_bytes());
        buffer[PLDM_MSG_HEADER_LEN + 2] = self.comp_effecter_count;
        for (chunk, field) in buffer[Self::FIXED_LEN..bytes].chunks_exact_mut(2).zip(fields) {
            chunk[0] = field.set_request;
            chunk[1] = field.effecter_state;
        }
        Ok(bytes)
    }

    /// Decodes as many fields as the buffer holds, up to eight. The count
    /// byte is not checked against them.
    fn decode(buffer: &[u8]) -> Result<Self, PldmCodecError> {
        if buffer.len() < Self::FIXED_LEN {
            return Err(PldmCodecError::BufferTooShort);
        }
        let mut fields = [SetEffecterStateField::default(); MAX_FIELDS];
        for (field, chunk) in fields.iter_mut().zip(buffer[Self::FIXED_LEN..].chunks_exact(2)) {
            field.set_request = chunk[0];
            field.effecter_state = chunk[1];
        }
        Ok(SetStateEffecterStatesRequest {
            hdr: PldmMsgHeader([buffer[0], buffer[1], buffer[2]]),
            effecter_id: u16::from_le_bytes([buffer[3], buffer[4]]),
            comp_effecter_count: buffer[5],
            fields,
        })
    }
}

#[derive(Debug, Clone, FromBytes, IntoBytes, Immutable, PartialEq)]
#[repr(C, packed)]
pub struct GetStateEffecterStatesRequest {
    pub hdr: PldmMsgHeader<[u8; PLDM_MSG_HEADER_LEN]>,
    pub effecter_id: u16,
}

impl GetStateEffecterStatesRequest {
    pub fn new(instance_id: InstanceId, effecter_id: u16) -> Self {
        GetStateEffecterStatesRequest {
            hdr: PldmMsgHeader::new(
                instance_id,
                PldmMsgType::Request,
                PldmSupportedType::Platform,
                PlatformCmd::GetStateEffecterStates as u8,
            ),
            effecter_id,
        }
    }
}

impl_fixed_size_codec!(GetStateEffecterStatesRequest);

#[derive(Debug, Clone, PartialEq)]
pub struct GetStateEffecterStatesResponse {
    pub hdr: PldmMsgHeader<[u8; PLDM_MSG_HEADER_LEN]>,
    pub completion_code: u8,
    pub comp_effecter_count: u8,
    pub fields: [GetEffecterStateField; MAX_FIELDS],
}

impl GetStateEffecterStatesResponse {
    const FIXED_LEN: usize = PLDM_MSG_HEADER_LEN + 2;

    pub fn new(
        req_hdr: &PldmMsgHeader<[u8; PLDM_MSG_HEADER_LEN]>,
        completion_code: u8,
        fields: &[GetEffecterStateField],
    ) -> Self {
        let count = fields.len().min(MAX_FIELDS);
        let mut resp = GetStateEffecterStatesResponse {
            hdr: req_hdr.into_response(),
            completion_code,
            comp_effecter_count: count as u8,
            fields: [GetEffecterStateField::default(); MAX_FIELDS],
        };
        resp.fields[..count].copy_from_slice(&fields[..count]);
        resp
    }

    pub fn fields(&self) -> &[GetEffecterStateField] {
        &self.fields[..(self.comp_effecter_count as usize).min(MAX_FIELDS)]
    }
}

impl PldmCodec for GetStateEffecterStatesResponse {
    fn encode(&self, buffer: &mut [u8]) -> Result<usize, PldmCodecError> {
        let fields = self.fields();
        let bytes = Self::FIXED_LEN + fields.len() * 3;
        if buffer.len() < bytes {
            return Err(PldmCodecError::BufferTooShort);
        }
        buffer[..PLDM_MSG_HEADER_LEN].copy_from_slice(&self.hdr.0);
        buffer[PLDM_MSG_HEADER_LEN] = self.completion_code;
        buffer[PLDM_MSG_HEADER_LEN + 1] = self.comp_effecter_count;
        for (chunk, field) in buffer[Self::FIXED_LEN..bytes].chunks_exact_mut(3).zip(fields) {
            chunk.copy_from_slice(&[
                field.effecter_op_state,
                field.pending_state,
                field.present_state,
            ]);
        }
        Ok(bytes)
    }

    fn decode(buffer: &[u8]) -> Result<Self, PldmCodecError> {
        if buffer.len() < Self::FIXED_LEN {
            return Err(PldmCodecError::BufferTooShort);
        }
        let count = buffer[PLDM_MSG_HEADER_LEN + 1];
        if count as usize > MAX_FIELDS || buffer.len() < Self::FIXED_LEN + count as usize * 3 {
            return Err(PldmCodecError::BufferTooShort);
        }
        let mut fields = [GetEffecterStateField::default(); MAX_FIELDS];
        for (field, chunk) in fields
            .iter_mut()
            .zip(buffer[Self::FIXED_LEN..].chunks_exact(3))
            .take(count as usize)
        {
            *field = GetEffecterStateField {
                effecter_op_state: chunk[0],
                pending_state: chunk[1],
                present_state: chunk[2],
            };
        }
        Ok(GetStateEffecterStatesResponse {
            hdr: PldmMsgHeader([buffer[0], buffer[1], buffer[2]]),
            completion_code: buffer[PLDM_MSG_HEADER_LEN],
            comp_effecter_count: count,
            fields,
        })
    }
}
