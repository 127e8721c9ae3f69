// Licensed under the Apache-2.0 license

use crate::error::{MctpError, Result};
use crate::protocol::{MessageType, MCTP_BROADCAST_EID, MCTP_NULL_EID};
use bitfield::bitfield;
use zerocopy::{FromBytes, Immutable, IntoBytes};

pub const MCTP_CTRL_MSG_HEADER_LEN: usize = 3;

/// Response code of GetVersionSupport for a message type we don't implement.
pub const MCTP_CTRL_CC_UNSUPPORTED_MSG_TYPE: u8 = 0x80;

bitfield! {
    #[repr(C)]
    #[derive(Clone, FromBytes, IntoBytes, Immutable)]
    pub struct MctpCtrlMsgHdr([u8]);
    impl Debug;
    u8;
    pub msg_type, set_msg_type: 6, 0;
    pub ic, _: 7, 7;
    pub instance_id, set_instance_id: 12, 8;
    rsvd, _: 13, 13;
    pub datagram, set_datagram: 14, 14;
    pub rq, set_rq: 15, 15;
    pub cmd, set_cmd: 23, 16;
}

impl MctpCtrlMsgHdr<[u8; MCTP_CTRL_MSG_HEADER_LEN]> {
    pub fn new() -> Self {
        MctpCtrlMsgHdr([0; MCTP_CTRL_MSG_HEADER_LEN])
    }

    pub fn prepare_header(&mut self, rq: u8, datagram: u8, instance_id: u8, cmd: u8) {
        self.set_msg_type(MessageType::Control as u8);
        self.set_rq(rq);
        self.set_datagram(datagram);
        self.set_instance_id(instance_id);
        self.set_cmd(cmd);
    }
}

impl Default for MctpCtrlMsgHdr<[u8; MCTP_CTRL_MSG_HEADER_LEN]> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MctpCtrlCmd {
    SetEid,
    GetEid,
    GetVersionSupport,
    GetMsgTypeSupport,
    Unsupported,
}

impl From<u8> for MctpCtrlCmd {
    fn from(val: u8) -> MctpCtrlCmd {
        match val {
            1 => MctpCtrlCmd::SetEid,
            2 => MctpCtrlCmd::GetEid,
            4 => MctpCtrlCmd::GetVersionSupport,
            5 => MctpCtrlCmd::GetMsgTypeSupport,
            _ => MctpCtrlCmd::Unsupported,
        }
    }
}

impl MctpCtrlCmd {
    pub fn to_u8(&self) -> u8 {
        match self {
            MctpCtrlCmd::SetEid => 1,
            MctpCtrlCmd::GetEid => 2,
            MctpCtrlCmd::GetVersionSupport => 4,
            MctpCtrlCmd::GetMsgTypeSupport => 5,
            MctpCtrlCmd::Unsupported => 0xFF,
        }
    }

    pub fn req_data_len(&self) -> usize {
        match self {
            MctpCtrlCmd::SetEid => 2,
            MctpCtrlCmd::GetEid => 0,
            MctpCtrlCmd::GetVersionSupport => 1,
            MctpCtrlCmd::GetMsgTypeSupport => 0,
            MctpCtrlCmd::Unsupported => 0,
        }
    }

    /// Fixed part of the response, completion code included.
    pub fn resp_data_len(&self) -> usize {
        match self {
            MctpCtrlCmd::SetEid => 4,
            MctpCtrlCmd::GetEid => 4,
            MctpCtrlCmd::GetVersionSupport => 2,
            MctpCtrlCmd::GetMsgTypeSupport => 2,
            MctpCtrlCmd::Unsupported => 1,
        }
    }

    fn check_resp_buf(&self, rsp_buf: &[u8], extra: usize) -> Result<()> {
        if rsp_buf.len() < self.resp_data_len() + extra {
            return Err(MctpError::BufferTooShort);
        }
        Ok(())
    }

    /// Handles a SetEID request. Returns the response length and the EID to
    /// adopt when the assignment was accepted.
    pub fn process_set_eid(&self, req: &[u8], rsp_buf: &mut [u8]) -> Result<(usize, Option<u8>)> {
        self.check_resp_buf(rsp_buf, 0)?;

        if req.len() < self.req_data_len() {
            rsp_buf[0] = CmdCompletionCode::ErrorInvalidLength as u8;
            return Ok((1, None));
        }

        let req = SetEidReq([req[0], req[1]]);
        let eid = req.eid();
        let completion_code = match SetEidOp::from(req.op()) {
            SetEidOp::SetEid | SetEidOp::ForceEid => {
                if eid == MCTP_NULL_EID || eid == MCTP_BROADCAST_EID {
                    CmdCompletionCode::ErrorInvalidData
                } else {
                    CmdCompletionCode::Success
                }
            }
            SetEidOp::ResetEid | SetEidOp::SetDiscoveredFlag => CmdCompletionCode::ErrorInvalidData,
        };

        if completion_code != CmdCompletionCode::Success {
            rsp_buf[0] = completion_code as u8;
            return Ok((1, None));
        }

        let mut resp = SetEidResp::new();
        resp.set_completion_code(completion_code as u8);
        resp.set_eid_assign_status(SetEidStatus::Accepted as u8);
        resp.set_eid_alloc_status(SetEidAllocStatus::NoEidPool as u8);
        resp.set_assigned_eid(eid);
        resp.set_eid_pool_size(0);

        resp.write_to(&mut rsp_buf[..self.resp_data_len()])
            .map_err(|_| MctpError::BufferTooShort)?;

        Ok((self.resp_data_len(), Some(eid)))
    }

    pub fn process_get_eid(&self, req: &[u8], local_eid: u8, rsp_buf: &mut [u8]) -> Result<usize> {
        self.check_resp_buf(rsp_buf, 0)?;

        if req.len() != self.req_data_len() {
            rsp_buf[0] = CmdCompletionCode::ErrorInvalidLength as u8;
            return Ok(1);
        }

        let mut resp = GetEidResp::new();
        resp.set_completion_code(CmdCompletionCode::Success as u8);
        resp.set_eid(local_eid);
        resp.set_eid_type(EidType::Static as u8);
        resp.set_endpoint_type(EndpointType::BusOwnerBridge as u8);
        // Fairness arbitration is not supported.
        resp.set_medium_spec_info(0);

        resp.write_to(&mut rsp_buf[..self.resp_data_len()])
            .map_err(|_| MctpError::BufferTooShort)?;
        Ok(self.resp_data_len())
    }

    pub fn process_get_msg_type_support(
        &self,
        types: &[MessageType],
        rsp_buf: &mut [u8],
    ) -> Result<usize> {
        self.check_resp_buf(rsp_buf, types.len())?;

        rsp_buf[0] = CmdCompletionCode::Success as u8;
        rsp_buf[1] = types.len() as u8;
        for (dst, ty) in rsp_buf[2..].iter_mut().zip(types) {
            *dst = *ty as u8;
        }
        Ok(self.resp_data_len() + types.len())
    }

    pub fn process_get_version_support(&self, req: &[u8], rsp_buf: &mut [u8]) -> Result<usize> {
        self.check_resp_buf(rsp_buf, 4)?;

        if req.len() != self.req_data_len() {
            rsp_buf[0] = CmdCompletionCode::ErrorInvalidLength as u8;
            return Ok(1);
        }

        let version = match MessageType::try_from(req[0]) {
            Ok(MessageType::Control) => MCTP_CTRL_VERSION,
            Ok(MessageType::Pldm) => MCTP_PLDM_VERSION,
            _ => {
                rsp_buf[0] = MCTP_CTRL_CC_UNSUPPORTED_MSG_TYPE;
                return Ok(1);
            }
        };

        rsp_buf[0] = CmdCompletionCode::Success as u8;
        rsp_buf[1] = 1;
        rsp_buf[2..6].copy_from_slice(&version.to_be_bytes());
        Ok(self.resp_data_len() + 4)
    }
}

/// DSP0236 version 1.3.1.
pub const MCTP_CTRL_VERSION: u32 = 0xF1F3_F100;
/// PLDM over MCTP binding 1.0.0.
pub const MCTP_PLDM_VERSION: u32 = 0xF1F0_F000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmdCompletionCode {
    Success,
    Error,
    ErrorInvalidData,
    ErrorInvalidLength,
    ErrorNotReady,
    ErrorNotSupportedCmd,
}

impl From<u8> for CmdCompletionCode {
    fn from(val: u8) -> CmdCompletionCode {
        match val {
            0 => CmdCompletionCode::Success,
            1 => CmdCompletionCode::Error,
            2 => CmdCompletionCode::ErrorInvalidData,
            3 => CmdCompletionCode::ErrorInvalidLength,
            4 => CmdCompletionCode::ErrorNotReady,
            5 => CmdCompletionCode::ErrorNotSupportedCmd,
            _ => CmdCompletionCode::Error,
        }
    }
}

// Set EID Request
bitfield! {
    #[derive(Clone, FromBytes)]
    pub struct SetEidReq([u8]);
    impl Debug;
    u8;
    pub op, _: 1, 0;
    rsvd, _: 7, 2;
    pub eid, _: 15, 8;
}

#[derive(Debug, PartialEq)]
pub enum SetEidOp {
    SetEid,
    ForceEid,
    ResetEid,
    SetDiscoveredFlag,
}

impl From<u8> for SetEidOp {
    fn from(val: u8) -> SetEidOp {
        match val & 0x03 {
            0 => SetEidOp::SetEid,
            1 => SetEidOp::ForceEid,
            2 => SetEidOp::ResetEid,
            _ => SetEidOp::SetDiscoveredFlag,
        }
    }
}

// Set EID Response
bitfield! {
    #[repr(C)]
    #[derive(Clone, IntoBytes, Immutable)]
    pub struct SetEidResp([u8]);
    impl Debug;
    u8;
    pub completion_code, set_completion_code: 7, 0;
    pub eid_alloc_status, set_eid_alloc_status: 9, 8;
    rsvd1, _: 11, 10;
    pub eid_assign_status, set_eid_assign_status: 13, 12;
    rsvd2, _: 15, 14;
    pub assigned_eid, set_assigned_eid: 23, 16;
    pub eid_pool_size, set_eid_pool_size: 31, 24;
}

impl SetEidResp<[u8; 4]> {
    pub fn new() -> Self {
        SetEidResp([0; 4])
    }
}

pub enum SetEidStatus {
    Accepted = 0,
    Rejected = 1,
}

pub enum SetEidAllocStatus {
    NoEidPool,
}

// Get EID Request has no fields
// Get EID Response
bitfield! {
    #[repr(C)]
    #[derive(Clone, IntoBytes, Immutable)]
    pub struct GetEidResp([u8]);
    impl Debug;
    u8;
    pub completion_code, set_completion_code: 7, 0;
    pub eid, set_eid: 15, 8;
    pub eid_type, set_eid_type: 17, 16;
    rsvd1, _: 19, 18;
    pub endpoint_type, set_endpoint_type: 21, 20;
    rsvd2, _: 23, 22;
    pub medium_spec_info, set_medium_spec_info: 31, 24;
}

impl GetEidResp<[u8; 4]> {
    pub fn new() -> Self {
        GetEidResp([0; 4])
    }
}

pub enum EndpointType {
    Simple,
    BusOwnerBridge,
}

pub enum EidType {
    DynamicOnly,
    Static,
    StaticMatching,
    StaticNonMatching,
}
