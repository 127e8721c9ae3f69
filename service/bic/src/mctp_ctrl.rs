// Licensed under the Apache-2.0 license

//! MCTP control protocol: responder for the commands every endpoint must
//! answer, and a requester for talking to other endpoints.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use bic_sensor::lock;
use log::{debug, info, warn};
use mctp_common::control::{
    CmdCompletionCode, MctpCtrlCmd, MctpCtrlMsgHdr, MCTP_CTRL_MSG_HEADER_LEN,
};
use mctp_common::protocol::{ExtParams, MessageType};

use crate::error::{Result, ServiceError};
use crate::mctp::{MctpInstance, RxHandler};
use crate::pending::PendingRequests;
use crate::ticker::Ticker;

pub const MCTP_CTRL_INSTANCE_MASK: u8 = 0x1F;
pub const MCTP_CTRL_MONITOR_INTERVAL: Duration = Duration::from_millis(1000);
pub const MCTP_CTRL_DEFAULT_TIMEOUT: Duration = Duration::from_millis(3000);

const MCTP_CTRL_RESP_MAX: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CtrlKey {
    inst_id: u8,
    cmd: u8,
    mctp: usize,
}

pub struct MctpCtrlService {
    msg_types: Vec<MessageType>,
    instances: RwLock<Vec<MctpInstance>>,
    pending: PendingRequests<CtrlKey>,
    inst_id: AtomicU8,
    monitor: Mutex<Option<Ticker>>,
}

impl MctpCtrlService {
    /// `msg_types` is what GetMsgTypeSupport reports.
    pub fn new(msg_types: Vec<MessageType>) -> Arc<Self> {
        Arc::new(MctpCtrlService {
            msg_types,
            instances: RwLock::new(Vec::new()),
            pending: PendingRequests::new(),
            inst_id: AtomicU8::new(0),
            monitor: Mutex::new(None),
        })
    }

    /// Adds an instance whose EID follows SetEID requests.
    pub fn add_instance(&self, inst: &MctpInstance) {
        self.instances
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(inst.clone());
    }

    /// Starts the timeout monitor.
    pub fn start(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let ticker = Ticker::spawn("mctp-ctrl-monitor", MCTP_CTRL_MONITOR_INTERVAL, move || {
            if let Some(service) = weak.upgrade() {
                for key in service.pending.expire(Instant::now()) {
                    debug!("MCTP control request {:?} timed out", key);
                }
            }
        });
        *lock(&self.monitor) = Some(ticker);
    }

    pub fn stop(&self) {
        if let Some(mut ticker) = lock(&self.monitor).take() {
            ticker.stop();
        }
    }

    fn next_inst_id(&self) -> u8 {
        let prev = self
            .inst_id
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |id| {
                Some((id + 1) & MCTP_CTRL_INSTANCE_MASK)
            })
            .unwrap_or_default();
        (prev + 1) & MCTP_CTRL_INSTANCE_MASK
    }

    /// Sends a control request and blocks for the response. Returns the
    /// response body after the control header, completion code first.
    pub fn send_request(
        &self,
        inst: &MctpInstance,
        cmd: MctpCtrlCmd,
        payload: &[u8],
        ext: ExtParams,
        timeout: Duration,
    ) -> Result<Vec<u8>> {
        let inst_id = self.next_inst_id();
        let key = CtrlKey {
            inst_id,
            cmd: cmd.to_u8(),
            mctp: inst.id(),
        };

        let mut hdr = MctpCtrlMsgHdr::new();
        hdr.prepare_header(1, 0, inst_id, cmd.to_u8());
        let mut msg = Vec::with_capacity(MCTP_CTRL_MSG_HEADER_LEN + payload.len());
        msg.extend_from_slice(&hdr.0);
        msg.extend_from_slice(payload);

        let rx = self.pending.register(key, timeout);
        let ext = ExtParams {
            tag_owner: true,
            ..ext
        };
        if let Err(e) = inst.send_msg(&msg, ext) {
            self.pending.remove(&key);
            return Err(e);
        }

        // The monitor fires the timeout; the local bound only covers a
        // service that was never started.
        let resp = match rx.recv_timeout(timeout + 2 * MCTP_CTRL_MONITOR_INTERVAL) {
            Ok(Some(resp)) => resp,
            Ok(None) => return Err(ServiceError::Timeout),
            Err(_) => {
                self.pending.remove(&key);
                return Err(ServiceError::Timeout);
            }
        };
        match resp.first() {
            Some(0) => Ok(resp),
            Some(cc) => Err(ServiceError::CompletionCode(*cc)),
            None => Err(mctp_common::MctpError::InvalidLength.into()),
        }
    }

    fn set_eid_all(&self, eid: u8) {
        for inst in self.instances.read().unwrap_or_else(|e| e.into_inner()).iter() {
            inst.set_endpoint(eid);
        }
    }

    fn handle_request(&self, inst: &MctpInstance, msg: &[u8], ext: ExtParams) {
        let mut resp = [0u8; MCTP_CTRL_MSG_HEADER_LEN + MCTP_CTRL_RESP_MAX];
        let mut hdr = MctpCtrlMsgHdr([msg[0], msg[1], msg[2]]);
        hdr.set_rq(0);
        hdr.set_datagram(0);
        resp[..MCTP_CTRL_MSG_HEADER_LEN].copy_from_slice(&hdr.0);

        let cmd = MctpCtrlCmd::from(hdr.cmd());
        let req = &msg[MCTP_CTRL_MSG_HEADER_LEN..];
        let body = &mut resp[MCTP_CTRL_MSG_HEADER_LEN..];
        let res = match cmd {
            MctpCtrlCmd::SetEid => cmd.process_set_eid(req, body).map(|(len, eid)| {
                if let Some(eid) = eid {
                    info!("SetEID from {:#04x}: {:#04x}", ext.ep, eid);
                    self.set_eid_all(eid);
                }
                len
            }),
            MctpCtrlCmd::GetEid => cmd.process_get_eid(req, inst.eid(), body),
            MctpCtrlCmd::GetVersionSupport => cmd.process_get_version_support(req, body),
            MctpCtrlCmd::GetMsgTypeSupport => {
                cmd.process_get_msg_type_support(&self.msg_types, body)
            }
            MctpCtrlCmd::Unsupported => {
                body[0] = CmdCompletionCode::ErrorNotSupportedCmd as u8;
                Ok(1)
            }
        };
        let len = match res {
            Ok(len) => len,
            Err(e) => {
                warn!("MCTP control command {:#04x} failed: {}", hdr.cmd(), e);
                body[0] = CmdCompletionCode::Error as u8;
                1
            }
        };

        let reply = ExtParams {
            tag_owner: false,
            ..ext
        };
        if let Err(e) = inst.send_msg(&resp[..MCTP_CTRL_MSG_HEADER_LEN + len], reply) {
            warn!("MCTP control response dropped: {}", e);
        }
    }
}

impl RxHandler for MctpCtrlService {
    fn on_message(&self, inst: &MctpInstance, msg: &[u8], ext: ExtParams) {
        if msg.len() < MCTP_CTRL_MSG_HEADER_LEN {
            warn!("Short MCTP control message from {:#04x}", ext.ep);
            return;
        }
        let hdr = MctpCtrlMsgHdr(&msg[..MCTP_CTRL_MSG_HEADER_LEN]);
        if hdr.rq() != 0 {
            self.handle_request(inst, msg, ext);
            return;
        }
        let key = CtrlKey {
            inst_id: hdr.instance_id(),
            cmd: hdr.cmd(),
            mctp: inst.id(),
        };
        if !self.pending.complete(&key, msg[MCTP_CTRL_MSG_HEADER_LEN..].to_vec()) {
            debug!("Unexpected MCTP control response {:?}", key);
        }
    }
}
