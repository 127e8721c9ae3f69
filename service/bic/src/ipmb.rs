// Licensed under the Apache-2.0 license

//! IPMB channels.
//!
//! Each channel owns one SMBus port and talks to a single device at the
//! other end (the BMC, the ME, a peer BIC). Outgoing requests get a
//! sequence number and wait in a pending table until the matching response
//! arrives or the expiry tick drops them. Incoming requests go to the IPMI
//! dispatcher with a route back out of the same channel.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, Weak};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use bic_sensor::lock;
use ipmi_common::ipmb::{self, IPMB_FRAME_MAX};
use ipmi_common::protocol::{
    iana_bytes, CompletionCode, IpmiMsg, Oem1sCmd, IPMB_MAX_PENDING, IPMB_SEQ_MASK,
    NETFN_OEM_1S_REQ,
};
use log::{debug, error, info, warn};

use crate::config::{IpmbChannelConfig, IpmbConfig};
use crate::error::{Result, ServiceError};
use crate::event_queue::EventQueue;
use crate::ipmi::{IpmiEvent, ReplyRoute};
use crate::ticker::Ticker;
use crate::transport::SmbusTransport;

const IPMB_RX_POLL: Duration = Duration::from_millis(50);

/// What happens to the response of a request we sent.
#[derive(Clone)]
pub enum PendingReply {
    /// Handed to a thread blocked in [`IpmbChannel::ipmb_read`].
    Waiter(Sender<IpmiMsg>),
    /// Wrapped in an OEM MSG_OUT response for whoever asked us to bridge.
    Bridge(ReplyRoute),
    /// Passed back unchanged to the interface the request came from.
    Relay(ReplyRoute),
}

struct PendingEntry {
    netfn: u8,
    cmd: u8,
    seq_target: u8,
    seq_source: u8,
    inf_source: u8,
    inf_target: u8,
    sent: Instant,
    reply: PendingReply,
}

pub struct IpmbChannel {
    me: Weak<IpmbChannel>,
    config: IpmbChannelConfig,
    self_addr: u8,
    retries: u8,
    retry_delay: Duration,
    seq_timeout: Duration,
    transport: Arc<dyn SmbusTransport>,
    last_seq: Mutex<u8>,
    pending: Mutex<VecDeque<PendingEntry>>,
    running: AtomicBool,
    threads: Mutex<Vec<JoinHandle<()>>>,
    expiry: Mutex<Option<Ticker>>,
}

impl IpmbChannel {
    pub fn new(
        ipmb: &IpmbConfig,
        config: IpmbChannelConfig,
        transport: Arc<dyn SmbusTransport>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| IpmbChannel {
            me: me.clone(),
            config,
            self_addr: ipmb.self_addr,
            retries: ipmb.retries.max(1),
            retry_delay: Duration::from_millis(ipmb.retry_delay_ms),
            seq_timeout: Duration::from_millis(ipmb.seq_timeout_ms),
            transport,
            last_seq: Mutex::new(0),
            pending: Mutex::new(VecDeque::new()),
            running: AtomicBool::new(false),
            threads: Mutex::new(Vec::new()),
            expiry: Mutex::new(None),
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Interface number of this channel as used in bridging requests.
    pub fn channel(&self) -> u8 {
        self.config.channel
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn pending_len(&self) -> usize {
        lock(&self.pending).len()
    }

    /// Starts the rx thread, posting received requests to `ipmi`, and the
    /// tick that expires unanswered requests.
    pub fn start(&self, ipmi: EventQueue<IpmiEvent>) {
        let Some(this) = self.me.upgrade() else {
            return;
        };
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("{}: already running", self.name());
            return;
        }
        let rx_handle = std::thread::spawn(move || this.rx_loop(ipmi));
        lock(&self.threads).push(rx_handle);

        let weak = self.me.clone();
        let ticker = Ticker::spawn(
            &format!("ipmb-{}", self.name()),
            self.seq_timeout,
            move || {
                if let Some(channel) = weak.upgrade() {
                    channel.expire(Instant::now());
                }
            },
        );
        *lock(&self.expiry) = Some(ticker);
        info!(
            "{}: IPMB channel {:#04x} running on bus {}, target {:#04x}",
            self.name(),
            self.config.channel,
            self.config.bus,
            self.config.target_addr
        );
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(mut ticker) = lock(&self.expiry).take() {
            ticker.stop();
        }
        let handles: Vec<JoinHandle<()>> = lock(&self.threads).drain(..).collect();
        let me = std::thread::current().id();
        for handle in handles {
            if handle.thread().id() == me {
                continue;
            }
            if handle.join().is_err() {
                error!("{}: IPMB rx thread panicked", self.name());
            }
        }
        lock(&self.pending).clear();
    }

    /// Sends `msg` as a request to the channel's target and parks `reply`
    /// until the response arrives. Returns the sequence number used.
    pub fn send_request(&self, mut msg: IpmiMsg, reply: PendingReply) -> Result<u8> {
        if !self.is_running() {
            return Err(ServiceError::ChannelClosed);
        }
        let seq = {
            let mut pending = lock(&self.pending);
            let seq = self.next_seq(&pending);
            if pending.len() >= IPMB_MAX_PENDING {
                if let Some(old) = pending.pop_front() {
                    warn!(
                        "{}: pending table full, dropping netfn {:#04x} cmd {:#04x} seq {}",
                        self.name(),
                        old.netfn,
                        old.cmd,
                        old.seq_target
                    );
                }
            }
            pending.push_back(PendingEntry {
                netfn: msg.netfn,
                cmd: msg.cmd,
                seq_target: seq,
                seq_source: msg.seq_source,
                inf_source: msg.inf_source,
                inf_target: msg.inf_target,
                sent: Instant::now(),
                reply,
            });
            seq
        };

        msg.seq = seq;
        msg.seq_target = seq;
        msg.dest_addr = self.config.target_addr << 1;
        msg.src_addr = self.self_addr << 1;
        msg.dest_lun = 0;
        msg.src_lun = 0;
        if let Err(e) = self.write_msg(&msg) {
            self.remove_pending(seq);
            return Err(e);
        }
        Ok(seq)
    }

    /// Sends a request and waits for its response.
    pub fn ipmb_read(&self, msg: IpmiMsg) -> Result<IpmiMsg> {
        let (tx, rx) = mpsc::channel();
        let seq = self.send_request(msg, PendingReply::Waiter(tx))?;
        // The expiry tick drops the sender; the margin covers its period.
        match rx.recv_timeout(self.seq_timeout * 2) {
            Ok(resp) => Ok(resp),
            Err(_) => {
                self.remove_pending(seq);
                Err(ServiceError::Timeout)
            }
        }
    }

    /// Answers the request `req` from the channel's target. `req` still
    /// carries the request netfn, the completion code and response data.
    pub fn send_response(&self, req: &IpmiMsg) -> Result<()> {
        let mut resp = IpmiMsg {
            dest_addr: self.config.target_addr << 1,
            netfn: req.netfn + 1,
            dest_lun: req.src_lun,
            src_addr: self.self_addr << 1,
            seq: req.seq,
            src_lun: req.dest_lun,
            cmd: req.cmd,
            completion_code: req.completion_code,
            ..Default::default()
        };
        resp.set_data(&req.data);
        self.write_msg(&resp)
    }

    fn next_seq(&self, pending: &VecDeque<PendingEntry>) -> u8 {
        let mut last = lock(&self.last_seq);
        let mut seq = *last;
        for _ in 0..=IPMB_SEQ_MASK {
            seq = (seq + 1) & IPMB_SEQ_MASK;
            if !pending.iter().any(|p| p.seq_target == seq) {
                break;
            }
        }
        *last = seq;
        seq
    }

    fn remove_pending(&self, seq: u8) {
        lock(&self.pending).retain(|p| p.seq_target != seq);
    }

    fn write_msg(&self, msg: &IpmiMsg) -> Result<()> {
        let mut frame = [0u8; IPMB_FRAME_MAX];
        let len = ipmb::encode(msg, &mut frame)?;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.transport.write(self.config.target_addr, &frame[..len]) {
                Ok(()) => return Ok(()),
                Err(e) if attempt >= self.retries => {
                    warn!(
                        "{}: IPMB write of netfn {:#04x} cmd {:#04x} failed after {} tries: {}",
                        self.name(),
                        msg.netfn,
                        msg.cmd,
                        attempt,
                        e
                    );
                    return Err(e);
                }
                Err(e) => {
                    debug!("{}: IPMB write retry {}: {}", self.name(), attempt, e);
                    std::thread::sleep(self.retry_delay);
                }
            }
        }
    }

    /// Drops requests that have waited longer than the sequence timeout.
    pub fn expire(&self, now: Instant) -> usize {
        let mut pending = lock(&self.pending);
        let before = pending.len();
        pending.retain(|p| {
            let alive = now.duration_since(p.sent) < self.seq_timeout;
            if !alive {
                debug!(
                    "{}: request netfn {:#04x} cmd {:#04x} seq {} timed out",
                    self.name(),
                    p.netfn,
                    p.cmd,
                    p.seq_target
                );
            }
            alive
        });
        before - pending.len()
    }

    fn rx_loop(self: Arc<Self>, ipmi: EventQueue<IpmiEvent>) {
        while self.is_running() {
            let frame = match self.transport.read(IPMB_RX_POLL) {
                Ok(Some(frame)) => frame,
                Ok(None) => continue,
                Err(e) => {
                    error!("{}: SMBus read failed: {}", self.name(), e);
                    break;
                }
            };
            match ipmb::decode(&frame) {
                Ok(msg) if msg.is_response() => self.on_response(msg),
                Ok(msg) => self.on_request(msg, &ipmi),
                Err(e) => warn!("{}: dropping frame: {}", self.name(), e),
            }
        }
        debug!("{}: rx loop exit", self.name());
    }

    fn on_request(self: &Arc<Self>, mut msg: IpmiMsg, ipmi: &EventQueue<IpmiEvent>) {
        msg.seq_source = msg.seq;
        msg.inf_source = self.config.channel;
        debug!(
            "{}: request netfn {:#04x} cmd {:#04x} seq {}",
            self.name(),
            msg.netfn,
            msg.cmd,
            msg.seq
        );
        if ipmi
            .enqueue(IpmiEvent::Request(msg, ReplyRoute::Ipmb(self.clone())))
            .is_err()
        {
            warn!("{}: IPMI dispatcher gone, request dropped", self.name());
        }
    }

    fn on_response(&self, mut resp: IpmiMsg) {
        let entry = {
            let mut pending = lock(&self.pending);
            let Some(pos) = pending.iter().position(|p| {
                p.netfn + 1 == resp.netfn && p.cmd == resp.cmd && p.seq_target == resp.seq
            }) else {
                debug!(
                    "{}: unexpected response netfn {:#04x} cmd {:#04x} seq {}",
                    self.name(),
                    resp.netfn,
                    resp.cmd,
                    resp.seq
                );
                return;
            };
            pending.remove(pos)
        };
        let Some(entry) = entry else {
            return;
        };
        resp.seq_target = entry.seq_target;
        resp.seq_source = entry.seq_source;
        resp.inf_source = entry.inf_source;
        resp.inf_target = entry.inf_target;

        match entry.reply {
            PendingReply::Waiter(tx) => {
                if tx.send(resp).is_err() {
                    debug!("{}: waiter for seq {} already gone", self.name(), entry.seq_target);
                }
            }
            PendingReply::Relay(route) => {
                let mut back = IpmiMsg::request(resp.netfn - 1, resp.cmd, &resp.data);
                back.completion_code = resp.completion_code;
                back.seq = entry.seq_source;
                back.inf_source = entry.inf_source;
                if let Err(e) = route.reply(&back) {
                    warn!(
                        "{}: relaying response to {} failed: {}",
                        self.name(),
                        route.describe(),
                        e
                    );
                }
            }
            PendingReply::Bridge(route) => {
                let back = self.wrap_msg_out(&resp, entry.seq_source, entry.inf_source);
                if let Err(e) = route.reply(&back) {
                    warn!(
                        "{}: bridged response to {} failed: {}",
                        self.name(),
                        route.describe(),
                        e
                    );
                }
            }
        }
    }

    /// Packs a bridged target's response into the MSG_OUT response:
    /// `[iana(3), channel, netfn, cmd, cc, data..]`.
    fn wrap_msg_out(&self, resp: &IpmiMsg, seq_source: u8, inf_source: u8) -> IpmiMsg {
        let mut data = iana_bytes().to_vec();
        data.extend_from_slice(&[
            self.config.channel,
            resp.netfn,
            resp.cmd,
            resp.completion_code,
        ]);
        data.extend_from_slice(&resp.data);
        let mut msg = IpmiMsg::request(NETFN_OEM_1S_REQ, Oem1sCmd::MsgOut.into(), &data);
        msg.set_cc(CompletionCode::Success);
        msg.seq = seq_source;
        msg.inf_source = inf_source;
        msg
    }
}

/// Every configured IPMB channel, looked up by interface number.
#[derive(Default)]
pub struct ChannelRouter {
    channels: Vec<Arc<IpmbChannel>>,
}

impl ChannelRouter {
    pub fn new(channels: Vec<Arc<IpmbChannel>>) -> Self {
        ChannelRouter { channels }
    }

    pub fn get(&self, channel: u8) -> Option<Arc<IpmbChannel>> {
        self.channels
            .iter()
            .find(|c| c.channel() == channel)
            .cloned()
    }

    pub fn channels(&self) -> &[Arc<IpmbChannel>] {
        &self.channels
    }

    pub fn start(&self, ipmi: &EventQueue<IpmiEvent>) {
        for channel in &self.channels {
            channel.start(ipmi.clone());
        }
    }

    pub fn stop(&self) {
        for channel in &self.channels {
            channel.stop();
        }
    }
}
