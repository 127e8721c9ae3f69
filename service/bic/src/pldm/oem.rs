// Licensed under the Apache-2.0 license

//! OEM PLDM type: echo and IPMI-over-PLDM bridging.
//!
//! A bridged IPMI request is handed to the IPMI dispatcher together with
//! its [`PldmContext`]. The dispatcher answers it later through
//! [`send_ipmi_bridge_response`].

use ipmi_common::protocol::{Channel, CompletionCode, IpmiMsg};
use log::{debug, warn};
use pldm_common::error::PldmError;
use pldm_common::message::oem::{
    encode_echo_response, encode_oem_cc_response, IpmiBridgeRequest, IpmiBridgeResponse,
};
use pldm_common::protocol::base::{
    PldmBaseCompletionCode, PldmSupportedType, PldmVersion, PLDM_MSG_HEADER_LEN,
};
use pldm_common::protocol::oem::{iana_matches, OemCmd, OEM_IANA_LEN};

use crate::error::Result;
use crate::event_queue::EventQueue;
use crate::ipmi::{IpmiEvent, ReplyRoute};
use crate::pldm::service::{
    HandlerResult, PldmContext, PldmResponder, PldmService, PLDM_RESP_MAX,
};

pub const PLDM_OEM_VERSION: PldmVersion = PldmVersion::new(1, 0, Some(0));

/// Offset of netfn/lun in a bridge response, counted from the PLDM
/// completion code.
const BRIDGE_RESP_NETFN_OFFSET: usize = 1 + OEM_IANA_LEN;

pub struct OemResponder {
    ipmi: EventQueue<IpmiEvent>,
}

impl OemResponder {
    /// `ipmi` posts bridged requests to the IPMI dispatcher.
    pub fn new(ipmi: EventQueue<IpmiEvent>) -> Self {
        OemResponder { ipmi }
    }

    fn ipmi_bridge(&self, ctx: &PldmContext, req: &[u8], resp: &mut [u8]) -> Result<HandlerResult> {
        let bridged = match IpmiBridgeRequest::decode(req) {
            Ok(bridged) => bridged,
            Err(e) => {
                let cc = match e {
                    PldmError::InvalidData => PldmBaseCompletionCode::InvalidData,
                    _ => PldmBaseCompletionCode::InvalidLength,
                };
                debug!("Rejecting IPMI bridge request from {:#04x}: {}", ctx.ext.ep, e);
                let len = encode_oem_cc_response(&ctx.hdr, cc as u8, resp)?;
                return Ok(HandlerResult::Respond(len));
            }
        };

        let mut msg = IpmiMsg::request(bridged.netfn, bridged.cmd, bridged.data);
        msg.inf_source = Channel::Pldm.into();
        debug!(
            "Bridging IPMI netfn {:#04x} cmd {:#04x} from EID {:#04x}",
            msg.netfn, msg.cmd, ctx.ext.ep
        );
        self.ipmi
            .enqueue(IpmiEvent::Request(msg, ReplyRoute::Pldm(ctx.clone())))?;
        Ok(HandlerResult::Later)
    }
}

impl PldmResponder for OemResponder {
    fn pldm_type(&self) -> PldmSupportedType {
        PldmSupportedType::Oem
    }

    fn supports(&self, cmd: u8) -> bool {
        OemCmd::try_from(cmd).is_ok()
    }

    fn version(&self) -> Option<PldmVersion> {
        Some(PLDM_OEM_VERSION)
    }

    fn handle(&self, ctx: &PldmContext, req: &[u8], resp: &mut [u8]) -> Result<HandlerResult> {
        let Ok(cmd) = OemCmd::try_from(ctx.hdr.cmd_code()) else {
            let len = encode_oem_cc_response(
                &ctx.hdr,
                PldmBaseCompletionCode::UnsupportedPldmCmd as u8,
                resp,
            )?;
            return Ok(HandlerResult::Respond(len));
        };
        match cmd {
            OemCmd::Echo => {
                let payload = &req[PLDM_MSG_HEADER_LEN.min(req.len())..];
                let len = if iana_matches(payload) {
                    encode_echo_response(&ctx.hdr, &payload[OEM_IANA_LEN..], resp)?
                } else {
                    encode_oem_cc_response(
                        &ctx.hdr,
                        PldmBaseCompletionCode::InvalidData as u8,
                        resp,
                    )?
                };
                Ok(HandlerResult::Respond(len))
            }
            OemCmd::IpmiBridge => self.ipmi_bridge(ctx, req, resp),
        }
    }
}

/// Answers the bridge request behind `ctx` with the handled IPMI message,
/// which still carries the request netfn.
pub fn send_ipmi_bridge_response(ctx: &PldmContext, msg: &IpmiMsg) -> Result<()> {
    let resp = IpmiBridgeResponse::new(
        ctx.hdr.instance_id(),
        msg.netfn,
        msg.cmd,
        msg.completion_code,
        &msg.data,
    );
    let mut buf = [0u8; PLDM_RESP_MAX];
    let len = resp.encode(&mut buf)?;
    ctx.service.send_response(ctx, &buf[..len])
}

/// Sends `msg` to endpoint `eid` as an OEM IPMI bridge request and returns
/// the IPMI response it carries back.
pub fn pldm_send_ipmi_request(service: &PldmService, eid: u8, msg: &IpmiMsg) -> Result<IpmiMsg> {
    let mut req = vec![0u8; PLDM_MSG_HEADER_LEN + OEM_IANA_LEN + 2 + msg.data.len()];
    let len = IpmiBridgeRequest::new(0, msg.netfn, msg.cmd, &msg.data).encode(&mut req)?;
    let reply = service.read(eid, &req[..len])?;

    let mut resp = msg.clone();
    resp.data.clear();
    match reply.as_slice() {
        [cc, ..] if *cc != PldmBaseCompletionCode::Success as u8 => {
            warn!("IPMI over PLDM to {:#04x} failed with cc {:#04x}", eid, cc);
            resp.set_cc(CompletionCode::UnspecifiedError);
        }
        r if r.len() > BRIDGE_RESP_NETFN_OFFSET + 2 => {
            let body = &r[BRIDGE_RESP_NETFN_OFFSET..];
            resp.netfn = body[0] >> 2;
            resp.cmd = body[1];
            resp.completion_code = body[2];
            resp.set_data(&body[3..]);
        }
        _ => return Err(PldmError::InvalidLength.into()),
    }
    Ok(resp)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::pldm::service::PldmHeader;
    use crate::pldm::test_util::context;
    use pldm_common::message::oem::encode_echo_request;

    fn call(responder: &OemResponder, req: &[u8]) -> HandlerResult {
        let mut ctx = context();
        ctx.hdr = PldmHeader::decode(req).unwrap();
        let mut resp = [0u8; 64];
        responder.handle(&ctx, req, &mut resp).unwrap()
    }

    fn respond(responder: &OemResponder, req: &[u8]) -> Vec<u8> {
        let mut ctx = context();
        ctx.hdr = PldmHeader::decode(req).unwrap();
        let mut resp = [0u8; 64];
        match responder.handle(&ctx, req, &mut resp).unwrap() {
            HandlerResult::Respond(len) => resp[..len].to_vec(),
            HandlerResult::Later => panic!("no immediate response"),
        }
    }

    #[test]
    fn test_echo() {
        let responder = OemResponder::new(EventQueue::new());
        let mut buf = [0u8; 32];
        let len = encode_echo_request(4, &[0xAA, 0x55], &mut buf).unwrap();
        let resp = respond(&responder, &buf[..len]);
        assert_eq!(&resp[..3], &[0x04, 0x3F, 0x00]);
        assert_eq!(&resp[3..], &[0x00, 0x15, 0xA0, 0x00, 0xAA, 0x55]);

        // Foreign IANA.
        buf[3] = 0x16;
        let resp = respond(&responder, &buf[..len]);
        assert_eq!(&resp[3..], &[0x02, 0x15, 0xA0, 0x00]);
    }

    #[test]
    fn test_ipmi_bridge_is_forwarded() {
        let queue = EventQueue::new();
        let responder = OemResponder::new(queue.clone());
        let mut buf = [0u8; 32];
        let len = IpmiBridgeRequest::new(9, 0x06, 0x01, &[0x42])
            .encode(&mut buf)
            .unwrap();
        assert_eq!(call(&responder, &buf[..len]), HandlerResult::Later);

        match queue.dequeue() {
            Some(IpmiEvent::Request(msg, ReplyRoute::Pldm(ctx))) => {
                assert_eq!(msg.netfn, 0x06);
                assert_eq!(msg.cmd, 0x01);
                assert_eq!(msg.data.as_slice(), &[0x42]);
                assert_eq!(msg.source(), Some(Channel::Pldm));
                assert_eq!(ctx.hdr.instance_id(), 9);
            }
            _ => panic!("bridged request not queued"),
        }
    }

    #[test]
    fn test_ipmi_bridge_rejections() {
        let responder = OemResponder::new(EventQueue::new());
        let mut buf = [0u8; 32];
        let len = IpmiBridgeRequest::new(1, 0x06, 0x01, &[])
            .encode(&mut buf)
            .unwrap();

        let resp = respond(&responder, &buf[..len - 1]);
        assert_eq!(resp[3], PldmBaseCompletionCode::InvalidLength as u8);

        buf[4] = 0xA1;
        let resp = respond(&responder, &buf[..len]);
        assert_eq!(resp[3], PldmBaseCompletionCode::InvalidData as u8);
    }

    #[test]
    fn test_bridge_response_needs_running_instance() {
        let ctx = context();
        let mut msg = IpmiMsg::request(0x06, 0x01, &[]);
        msg.completion_code = 0;
        // The test context's MCTP instance was never started.
        assert!(send_ipmi_bridge_response(&ctx, &msg).is_err());
    }
}
