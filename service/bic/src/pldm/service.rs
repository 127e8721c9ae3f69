// Licensed under the Apache-2.0 license

use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::{Duration, Instant};

use bic_sensor::lock;
use log::{debug, error, warn};
use mctp_common::protocol::ExtParams;
use pldm_common::codec::PldmCodec;
use pldm_common::message::control::{bitmap_set, PLDM_CMDS_BITMAP_LEN, PLDM_TYPES_BITMAP_LEN};
use pldm_common::message::CompletionCodeResponse;
use pldm_common::protocol::base::{
    PldmBaseCompletionCode, PldmMsgHeader, PldmSupportedType, PldmVersion,
    PLDM_INSTANCE_ID_MASK, PLDM_MCTP_MSG_TYPE, PLDM_MSG_HEADER_LEN,
};

use crate::config::PldmConfig;
use crate::error::{Result, ServiceError};
use crate::mctp::{EndpointResolver, MctpInstance, RxHandler};
use crate::pending::PendingRequests;
use crate::ticker::Ticker;

pub const PLDM_MONITOR_INTERVAL: Duration = Duration::from_millis(1000);
/// Largest PLDM message the responders build.
pub const PLDM_RESP_MAX: usize = 1024;

pub type PldmHeader = PldmMsgHeader<[u8; PLDM_MSG_HEADER_LEN]>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PldmKey {
    inst_id: u8,
    pldm_type: u8,
    cmd: u8,
    mctp: usize,
}

/// What a responder did with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerResult {
    /// The response occupies this many bytes of the response buffer.
    Respond(usize),
    /// The responder answers on its own later through
    /// [`PldmService::send_response`].
    Later,
}

/// Everything needed to answer a request after the handler returns.
#[derive(Clone)]
pub struct PldmContext {
    pub service: Arc<PldmService>,
    pub inst: MctpInstance,
    pub ext: ExtParams,
    pub hdr: PldmHeader,
}

pub trait PldmResponder: Send + Sync {
    fn pldm_type(&self) -> PldmSupportedType;

    fn supports(&self, cmd: u8) -> bool;

    /// Version reported by GetPLDMVersion, `None` when the type has no
    /// commands to version.
    fn version(&self) -> Option<PldmVersion>;

    /// Handles the request in `req` (PLDM header included) and encodes the
    /// response into `resp`.
    fn handle(&self, ctx: &PldmContext, req: &[u8], resp: &mut [u8]) -> Result<HandlerResult>;
}

/// Encodes `msg` into `resp` as the immediate response.
pub fn respond<T: PldmCodec>(msg: T, resp: &mut [u8]) -> Result<HandlerResult> {
    Ok(HandlerResult::Respond(msg.encode(resp)?))
}

/// Responds with nothing but `cc`.
pub fn respond_cc(hdr: &PldmHeader, cc: u8, resp: &mut [u8]) -> Result<HandlerResult> {
    respond(CompletionCodeResponse::new(hdr, cc), resp)
}

#[derive(Default)]
struct InstIdTable {
    used: HashMap<usize, u32>,
    cursor: u8,
}

pub struct PldmService {
    me: Weak<PldmService>,
    tid: AtomicU8,
    timeout: Duration,
    retries: u8,
    resolver: Arc<EndpointResolver>,
    responders: RwLock<Vec<Arc<dyn PldmResponder>>>,
    instids: Mutex<InstIdTable>,
    pending: PendingRequests<PldmKey>,
    monitor: Mutex<Option<Ticker>>,
}

impl PldmService {
    pub fn new(config: &PldmConfig, resolver: Arc<EndpointResolver>) -> Arc<Self> {
        Arc::new_cyclic(|me| PldmService {
            me: me.clone(),
            tid: AtomicU8::new(config.tid),
            timeout: Duration::from_millis(config.response_timeout_ms),
            retries: config.retries.max(1),
            resolver,
            responders: RwLock::new(Vec::new()),
            instids: Mutex::new(InstIdTable::default()),
            pending: PendingRequests::new(),
            monitor: Mutex::new(None),
        })
    }

    pub fn register(&self, responder: Arc<dyn PldmResponder>) {
        let mut responders = self.responders.write().unwrap_or_else(|e| e.into_inner());
        responders.retain(|r| r.pldm_type() != responder.pldm_type());
        responders.push(responder);
    }

    pub fn start(&self) {
        let weak = self.me.clone();
        let ticker = Ticker::spawn("pldm-monitor", PLDM_MONITOR_INTERVAL, move || {
            if let Some(service) = weak.upgrade() {
                service.expire(Instant::now());
            }
        });
        *lock(&self.monitor) = Some(ticker);
    }

    pub fn stop(&self) {
        if let Some(mut ticker) = lock(&self.monitor).take() {
            ticker.stop();
        }
    }

    pub fn tid(&self) -> u8 {
        self.tid.load(Ordering::SeqCst)
    }

    pub fn set_tid(&self, tid: u8) {
        self.tid.store(tid, Ordering::SeqCst);
    }

    fn responder(&self, pldm_type: u8) -> Option<Arc<dyn PldmResponder>> {
        self.responders
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|r| r.pldm_type() as u8 == pldm_type)
            .cloned()
    }

    pub fn supported_types(&self) -> [u8; PLDM_TYPES_BITMAP_LEN] {
        let mut bitmap = [0u8; PLDM_TYPES_BITMAP_LEN];
        for r in self.responders.read().unwrap_or_else(|e| e.into_inner()).iter() {
            bitmap_set(&mut bitmap, r.pldm_type() as u8);
        }
        bitmap
    }

    /// Command bitmap of `pldm_type`, `None` for a type nobody answers.
    pub fn supported_commands(&self, pldm_type: u8) -> Option<[u8; PLDM_CMDS_BITMAP_LEN]> {
        let responder = self.responder(pldm_type)?;
        let mut bitmap = [0u8; PLDM_CMDS_BITMAP_LEN];
        for cmd in 0..=u8::MAX {
            if responder.supports(cmd) {
                bitmap_set(&mut bitmap, cmd);
            }
        }
        Some(bitmap)
    }

    pub fn version(&self, pldm_type: u8) -> Option<PldmVersion> {
        self.responder(pldm_type)?.version()
    }

    /// Takes a free instance id on `inst`. `None` when all 32 are in flight.
    pub fn register_instid(&self, inst: &MctpInstance) -> Option<u8> {
        let mut guard = lock(&self.instids);
        let table = &mut *guard;
        let start = table.cursor;
        let used = table.used.entry(inst.id()).or_default();
        for i in 0..=PLDM_INSTANCE_ID_MASK {
            let id = start.wrapping_add(i) & PLDM_INSTANCE_ID_MASK;
            if *used & (1 << id) == 0 {
                *used |= 1 << id;
                table.cursor = (id + 1) & PLDM_INSTANCE_ID_MASK;
                return Some(id);
            }
        }
        None
    }

    pub fn unregister_instid(&self, inst: &MctpInstance, id: u8) {
        self.release_instid(inst.id(), id);
    }

    fn release_instid(&self, mctp: usize, id: u8) {
        if let Some(used) = lock(&self.instids).used.get_mut(&mctp) {
            *used &= !(1 << (id & PLDM_INSTANCE_ID_MASK));
        }
    }

    fn expire(&self, now: Instant) {
        for key in self.pending.expire(now) {
            debug!("PLDM request {:?} timed out", key);
            self.release_instid(key.mctp, key.inst_id);
        }
    }

    /// Sends the request `req` (PLDM header first, instance id filled in
    /// here) to the endpoint `eid` and waits for its response. Returns the
    /// response after the PLDM header, completion code first.
    pub fn read(&self, eid: u8, req: &[u8]) -> Result<Vec<u8>> {
        let (inst, addr) = self
            .resolver
            .resolve(eid)
            .ok_or(ServiceError::UnknownEndpoint(eid))?;
        self.read_via(&inst, ExtParams::smbus(eid, addr), req)
    }

    /// Like [`read`](Self::read) with an explicit port and peer.
    pub fn read_via(&self, inst: &MctpInstance, ext: ExtParams, req: &[u8]) -> Result<Vec<u8>> {
        for attempt in 1..=self.retries {
            match self.request_once(inst, ext, req) {
                Err(ServiceError::Timeout) => {
                    warn!(
                        "PLDM request to {:#04x} timed out ({}/{})",
                        ext.ep, attempt, self.retries
                    );
                }
                other => return other,
            }
        }
        Err(ServiceError::Timeout)
    }

    fn request_once(&self, inst: &MctpInstance, ext: ExtParams, req: &[u8]) -> Result<Vec<u8>> {
        let mut hdr = PldmMsgHeader::decode(req)?;
        let inst_id = self
            .register_instid(inst)
            .ok_or(ServiceError::NoInstanceId)?;
        hdr.set_instance_id(inst_id);
        hdr.set_rq(1);

        let mut msg = Vec::with_capacity(1 + req.len());
        msg.push(PLDM_MCTP_MSG_TYPE);
        msg.extend_from_slice(&hdr.0);
        msg.extend_from_slice(&req[PLDM_MSG_HEADER_LEN..]);

        let key = PldmKey {
            inst_id,
            pldm_type: hdr.pldm_type(),
            cmd: hdr.cmd_code(),
            mctp: inst.id(),
        };
        let rx = self.pending.register(key, self.timeout);
        let ext = ExtParams {
            tag_owner: true,
            ..ext
        };
        if let Err(e) = inst.send_msg(&msg, ext) {
            self.pending.remove(&key);
            self.unregister_instid(inst, inst_id);
            return Err(e);
        }

        match rx.recv_timeout(self.timeout + 2 * PLDM_MONITOR_INTERVAL) {
            Ok(Some(resp)) => Ok(resp),
            Ok(None) => Err(ServiceError::Timeout),
            Err(_) => {
                self.pending.remove(&key);
                self.unregister_instid(inst, inst_id);
                Err(ServiceError::Timeout)
            }
        }
    }

    /// Sends a response built outside the request handler.
    pub fn send_response(&self, ctx: &PldmContext, resp: &[u8]) -> Result<()> {
        let mut msg = Vec::with_capacity(1 + resp.len());
        msg.push(PLDM_MCTP_MSG_TYPE);
        msg.extend_from_slice(resp);
        ctx.inst.send_msg(
            &msg,
            ExtParams {
                tag_owner: false,
                ..ctx.ext
            },
        )
    }

    fn handle_request(&self, ctx: PldmContext, req: &[u8]) {
        let hdr = ctx.hdr.clone();
        let mut resp = vec![0u8; PLDM_RESP_MAX];
        let cmd = hdr.cmd_code();
        let res = match self.responder(hdr.pldm_type()) {
            Some(r) if r.supports(cmd) => r.handle(&ctx, req, &mut resp),
            _ => {
                debug!(
                    "Unsupported PLDM type {:#04x} cmd {:#04x}",
                    hdr.pldm_type(),
                    cmd
                );
                respond_cc(&hdr, PldmBaseCompletionCode::UnsupportedPldmCmd as u8, &mut resp)
            }
        };
        let len = match res {
            Ok(HandlerResult::Respond(len)) => len,
            Ok(HandlerResult::Later) => return,
            Err(e) => {
                error!(
                    "PLDM type {:#04x} cmd {:#04x} failed: {}",
                    hdr.pldm_type(),
                    cmd,
                    e
                );
                match respond_cc(&hdr, PldmBaseCompletionCode::Error as u8, &mut resp) {
                    Ok(HandlerResult::Respond(len)) => len,
                    _ => return,
                }
            }
        };
        if let Err(e) = self.send_response(&ctx, &resp[..len]) {
            warn!("PLDM response dropped: {}", e);
        }
    }
}

impl RxHandler for PldmService {
    fn on_message(&self, inst: &MctpInstance, msg: &[u8], ext: ExtParams) {
        let Some(pldm) = msg.get(1..) else {
            return;
        };
        let hdr = match PldmMsgHeader::decode(pldm) {
            Ok(hdr) => hdr,
            Err(e) => {
                warn!("Bad PLDM message from {:#04x}: {}", ext.ep, e);
                return;
            }
        };

        if hdr.is_request() {
            let Some(service) = self.me.upgrade() else {
                return;
            };
            let ctx = PldmContext {
                service,
                inst: inst.clone(),
                ext,
                hdr,
            };
            self.handle_request(ctx, pldm);
            return;
        }

        let key = PldmKey {
            inst_id: hdr.instance_id(),
            pldm_type: hdr.pldm_type(),
            cmd: hdr.cmd_code(),
            mctp: inst.id(),
        };
        if self.pending.complete(&key, pldm[PLDM_MSG_HEADER_LEN..].to_vec()) {
            self.release_instid(key.mctp, key.inst_id);
        } else {
            debug!("Unexpected PLDM response {:?}", key);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::transport::MockSmbusBus;

    fn service() -> Arc<PldmService> {
        PldmService::new(&PldmConfig::default(), Arc::new(EndpointResolver::new()))
    }

    #[test]
    fn test_instance_id_allocation() {
        let service = service();
        let bus = MockSmbusBus::new();
        let a = MctpInstance::new("a", Arc::new(bus.attach(0x20)), 0x20, 0x0A);
        let b = MctpInstance::new("b", Arc::new(bus.attach(0x21)), 0x21, 0x0A);

        let ids: Vec<u8> = (0..32).filter_map(|_| service.register_instid(&a)).collect();
        assert_eq!(ids.len(), 32);
        assert_eq!(service.register_instid(&a), None);
        // Separate bitmap per instance.
        assert!(service.register_instid(&b).is_some());

        service.unregister_instid(&a, 7);
        assert_eq!(service.register_instid(&a), Some(7));
    }

    #[test]
    fn test_unknown_endpoint() {
        let service = service();
        let req = pldm_common::message::control::GetTidRequest::new(0);
        let mut buf = [0u8; 8];
        let len = req.encode(&mut buf).unwrap();
        assert!(matches!(
            service.read(0x55, &buf[..len]),
            Err(ServiceError::UnknownEndpoint(0x55))
        ));
    }
}
