// Licensed under the Apache-2.0 license

//! PLDM base (type 0) discovery commands.

use log::info;
use pldm_common::codec::PldmCodec;
use pldm_common::message::control::{
    GetPldmCommandsRequest, GetPldmCommandsResponse, GetPldmTypesResponse,
    GetPldmVersionRequest, GetPldmVersionResponse, GetTidResponse, SetTidRequest,
};
use pldm_common::protocol::base::{
    PldmBaseCompletionCode, PldmControlCmd, PldmSupportedType, PldmVersion,
    PLDM_CC_INVALID_PLDM_TYPE_IN_REQUEST_DATA,
};

use crate::error::Result;
use crate::pldm::service::{respond, respond_cc, HandlerResult, PldmContext, PldmResponder};

pub const PLDM_BASE_VERSION: PldmVersion = PldmVersion::new(1, 1, Some(0));

pub struct BaseResponder;

impl PldmResponder for BaseResponder {
    fn pldm_type(&self) -> PldmSupportedType {
        PldmSupportedType::Base
    }

    fn supports(&self, cmd: u8) -> bool {
        PldmControlCmd::try_from(cmd).is_ok()
    }

    fn version(&self) -> Option<PldmVersion> {
        Some(PLDM_BASE_VERSION)
    }

    fn handle(&self, ctx: &PldmContext, req: &[u8], resp: &mut [u8]) -> Result<HandlerResult> {
        let hdr = &ctx.hdr;
        let inst = hdr.instance_id();
        let service = &ctx.service;
        let Ok(cmd) = PldmControlCmd::try_from(hdr.cmd_code()) else {
            return respond_cc(hdr, PldmBaseCompletionCode::UnsupportedPldmCmd as u8, resp);
        };

        match cmd {
            PldmControlCmd::GetTid => respond(
                GetTidResponse::new(inst, PldmBaseCompletionCode::Success as u8, service.tid()),
                resp,
            ),
            PldmControlCmd::SetTid => {
                let Ok(set) = SetTidRequest::decode(req) else {
                    return respond_cc(hdr, PldmBaseCompletionCode::InvalidLength as u8, resp);
                };
                info!("TID set to {:#04x} by {:#04x}", set.tid, ctx.ext.ep);
                service.set_tid(set.tid);
                respond_cc(hdr, PldmBaseCompletionCode::Success as u8, resp)
            }
            PldmControlCmd::GetPldmTypes => respond(
                GetPldmTypesResponse::new(
                    inst,
                    PldmBaseCompletionCode::Success as u8,
                    service.supported_types(),
                ),
                resp,
            ),
            PldmControlCmd::GetPldmCommands => {
                let Ok(get) = GetPldmCommandsRequest::decode(req) else {
                    return respond_cc(hdr, PldmBaseCompletionCode::InvalidLength as u8, resp);
                };
                match service.supported_commands(get.pldm_type) {
                    Some(cmds) => respond(
                        GetPldmCommandsResponse::new(
                            inst,
                            PldmBaseCompletionCode::Success as u8,
                            cmds,
                        ),
                        resp,
                    ),
                    None => respond_cc(hdr, PldmBaseCompletionCode::InvalidPldmType as u8, resp),
                }
            }
            PldmControlCmd::GetPldmVersion => {
                let Ok(get) = GetPldmVersionRequest::decode(req) else {
                    return respond_cc(hdr, PldmBaseCompletionCode::InvalidLength as u8, resp);
                };
                match service.version(get.pldm_type) {
                    Some(ver) => respond(
                        GetPldmVersionResponse::new(
                            inst,
                            PldmBaseCompletionCode::Success as u8,
                            ver.bcd_encode_to_ver32(),
                        ),
                        resp,
                    ),
                    None => respond_cc(hdr, PLDM_CC_INVALID_PLDM_TYPE_IN_REQUEST_DATA, resp),
                }
            }
        }
    }
}
