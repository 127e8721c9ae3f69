// Licensed under the Apache-2.0 license

//! MCTP endpoint over one SMBus port.
//!
//! Each instance runs a tx thread that packetizes queued messages and an rx
//! thread that reassembles incoming packets. Packets addressed to another
//! endpoint are forwarded untouched through the endpoint resolver, which is
//! how the BIC bridges between its ports.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::JoinHandle;
use std::time::Duration;

use bic_sensor::lock;
use log::{debug, error, info, warn};
use mctp_common::packet::{Packetizer, Reassembler, TagAllocator};
use mctp_common::protocol::{
    ExtParams, MctpHeader, MediumType, MessageType, MCTP_BROADCAST_EID, MCTP_HDR_SIZE,
    MCTP_HDR_VERSION, MCTP_MSG_ASSEMBLY_MAX, MCTP_NULL_EID, MCTP_TX_UNIT,
};
use mctp_common::smbus::{self, SMBUS_FRAME_HDR_LEN, SMBUS_PEC_LEN};
use mctp_common::MctpError;

use crate::error::{Result, ServiceError};
use crate::transport::SmbusTransport;

const MCTP_RX_POLL: Duration = Duration::from_millis(50);
const MCTP_PKT_MAX: usize = MCTP_HDR_SIZE + MCTP_TX_UNIT;
const MCTP_FRAME_MAX: usize = SMBUS_FRAME_HDR_LEN + MCTP_PKT_MAX + SMBUS_PEC_LEN;

static NEXT_INSTANCE_ID: AtomicUsize = AtomicUsize::new(0);

/// Receives every complete message an instance reassembles.
pub trait RxHandler: Send + Sync {
    fn on_message(&self, inst: &MctpInstance, msg: &[u8], ext: ExtParams);
}

enum TxItem {
    Message { buf: Vec<u8>, ext: ExtParams },
    Bridge { pkt: Vec<u8>, addr: u8 },
}

struct Inner {
    id: usize,
    name: String,
    transport: Arc<dyn SmbusTransport>,
    own_addr: u8,
    eid: AtomicU8,
    tx: Mutex<Option<Sender<TxItem>>>,
    running: AtomicBool,
    threads: Mutex<Vec<JoinHandle<()>>>,
    tx_errors: AtomicUsize,
}

#[derive(Clone)]
pub struct MctpInstance {
    inner: Arc<Inner>,
}

impl core::fmt::Debug for MctpInstance {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MctpInstance")
            .field("name", &self.inner.name)
            .field("eid", &self.eid())
            .field("own_addr", &self.inner.own_addr)
            .finish()
    }
}

impl MctpInstance {
    pub fn new(name: &str, transport: Arc<dyn SmbusTransport>, own_addr: u8, eid: u8) -> Self {
        MctpInstance {
            inner: Arc::new(Inner {
                id: NEXT_INSTANCE_ID.fetch_add(1, Ordering::SeqCst),
                name: name.to_string(),
                transport,
                own_addr,
                eid: AtomicU8::new(eid),
                tx: Mutex::new(None),
                running: AtomicBool::new(false),
                threads: Mutex::new(Vec::new()),
                tx_errors: AtomicUsize::new(0),
            }),
        }
    }

    /// Process-unique id, used to key per-instance state in the services.
    pub fn id(&self) -> usize {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn eid(&self) -> u8 {
        self.inner.eid.load(Ordering::SeqCst)
    }

    pub fn set_endpoint(&self, eid: u8) {
        info!("{}: endpoint id set to {:#04x}", self.inner.name, eid);
        self.inner.eid.store(eid, Ordering::SeqCst);
    }

    pub fn own_addr(&self) -> u8 {
        self.inner.own_addr
    }

    pub fn tx_errors(&self) -> usize {
        self.inner.tx_errors.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    pub fn start(&self, handler: Arc<dyn RxHandler>, resolver: Arc<EndpointResolver>) {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            warn!("{}: already running", self.inner.name);
            return;
        }
        let (tx, rx) = mpsc::channel();
        *lock(&self.inner.tx) = Some(tx);

        let tx_inst = self.clone();
        let tx_handle = std::thread::spawn(move || tx_inst.tx_loop(rx));
        let rx_inst = self.clone();
        let rx_handle = std::thread::spawn(move || rx_inst.rx_loop(handler, resolver));
        lock(&self.inner.threads).extend([tx_handle, rx_handle]);
        info!(
            "{}: MCTP instance running, eid {:#04x} addr {:#04x}",
            self.inner.name,
            self.eid(),
            self.inner.own_addr
        );
    }

    pub fn stop(&self) {
        self.inner.running.store(false, Ordering::SeqCst);
        lock(&self.inner.tx).take();
        let handles: Vec<JoinHandle<()>> = lock(&self.inner.threads).drain(..).collect();
        let me = std::thread::current().id();
        for handle in handles {
            if handle.thread().id() == me {
                continue;
            }
            if handle.join().is_err() {
                error!("{}: MCTP thread panicked", self.inner.name);
            }
        }
    }

    /// Queues a message for transmission to `ext.ep` at SMBus address
    /// `ext.addr`.
    pub fn send_msg(&self, msg: &[u8], ext: ExtParams) -> Result<()> {
        if msg.is_empty() {
            return Err(MctpError::EmptyMessage.into());
        }
        if msg.len() > MCTP_MSG_ASSEMBLY_MAX {
            return Err(MctpError::MessageTooLarge.into());
        }
        self.push(TxItem::Message {
            buf: msg.to_vec(),
            ext,
        })
    }

    /// Forwards a packet received on another port without repacketizing.
    pub fn bridge_packet(&self, pkt: &[u8], addr: u8) -> Result<()> {
        self.push(TxItem::Bridge {
            pkt: pkt.to_vec(),
            addr,
        })
    }

    fn push(&self, item: TxItem) -> Result<()> {
        let tx = lock(&self.inner.tx);
        let sender = tx.as_ref().ok_or(ServiceError::ChannelClosed)?;
        sender.send(item).map_err(|_| ServiceError::ChannelClosed)
    }

    fn tx_loop(&self, rx: Receiver<TxItem>) {
        let mut tags = TagAllocator::default();
        for item in rx {
            let res = match item {
                TxItem::Message { buf, ext } => self.transmit(&mut tags, &buf, &ext),
                TxItem::Bridge { pkt, addr } => self.write_packet(&pkt, addr),
            };
            if let Err(e) = res {
                self.inner.tx_errors.fetch_add(1, Ordering::SeqCst);
                error!("{}: MCTP send failed: {}", self.inner.name, e);
            }
        }
        debug!("{}: tx loop exit", self.inner.name);
    }

    fn transmit(&self, tags: &mut TagAllocator, msg: &[u8], ext: &ExtParams) -> Result<()> {
        let tag = tags.next_tag(ext);
        let mut pkt_buf = [0u8; MCTP_PKT_MAX];
        for pkt in Packetizer::new(msg, MCTP_TX_UNIT, self.eid(), ext, tag)? {
            let len = pkt.write_to(&mut pkt_buf)?;
            self.write_packet(&pkt_buf[..len], ext.addr)?;
        }
        Ok(())
    }

    fn write_packet(&self, pkt: &[u8], addr: u8) -> Result<()> {
        let mut frame = [0u8; MCTP_FRAME_MAX];
        let len = smbus::encode_frame(addr, self.inner.own_addr, pkt, &mut frame)?;
        self.inner.transport.write(addr, &frame[..len])
    }

    fn rx_loop(&self, handler: Arc<dyn RxHandler>, resolver: Arc<EndpointResolver>) {
        let mut reassembler = Reassembler::new();
        while self.is_running() {
            let frame = match self.inner.transport.read(MCTP_RX_POLL) {
                Ok(Some(frame)) => frame,
                Ok(None) => continue,
                Err(e) => {
                    error!("{}: SMBus read failed: {}", self.inner.name, e);
                    break;
                }
            };
            if let Err(e) = self.receive(&frame, &mut reassembler, handler.as_ref(), &resolver) {
                warn!("{}: dropping packet: {}", self.inner.name, e);
            }
        }
        debug!("{}: rx loop exit", self.inner.name);
    }

    fn receive(
        &self,
        frame: &[u8],
        reassembler: &mut Reassembler,
        handler: &dyn RxHandler,
        resolver: &EndpointResolver,
    ) -> Result<()> {
        let (src_addr, pkt) = smbus::decode_frame(self.inner.own_addr, frame)?;
        if pkt.len() < MCTP_HDR_SIZE {
            return Err(MctpError::InvalidLength.into());
        }
        let mut raw = [0u8; MCTP_HDR_SIZE];
        raw.copy_from_slice(&pkt[..MCTP_HDR_SIZE]);
        let hdr = MctpHeader(raw);
        if hdr.hdr_version() != MCTP_HDR_VERSION {
            return Err(MctpError::InvalidHeaderVersion(hdr.hdr_version()).into());
        }

        let dest = hdr.dest_eid();
        if dest != self.eid() && dest != MCTP_NULL_EID && dest != MCTP_BROADCAST_EID {
            let (target, addr) = resolver
                .resolve(dest)
                .ok_or(ServiceError::UnknownEndpoint(dest))?;
            debug!(
                "{}: bridging packet for {:#04x} to {}",
                self.inner.name, dest, target.inner.name
            );
            return target.bridge_packet(pkt, addr);
        }

        if let Some(msg) = reassembler.push(&hdr, &pkt[MCTP_HDR_SIZE..])? {
            let ext = ExtParams {
                msg_tag: hdr.msg_tag(),
                tag_owner: hdr.is_tag_owner(),
                ep: hdr.src_eid(),
                medium: MediumType::Smbus,
                addr: src_addr,
            };
            handler.on_message(self, &msg, ext);
        }
        Ok(())
    }
}

struct Route {
    eid: u8,
    inst: MctpInstance,
    addr: u8,
}

/// Routing table from remote endpoint id to the port and SMBus address
/// it is reached through.
#[derive(Default)]
pub struct EndpointResolver {
    routes: RwLock<Vec<Route>>,
}

impl EndpointResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the route to `eid`.
    pub fn add_route(&self, eid: u8, inst: &MctpInstance, addr: u8) {
        let mut routes = self.routes.write().unwrap_or_else(|e| e.into_inner());
        routes.retain(|r| r.eid != eid);
        routes.push(Route {
            eid,
            inst: inst.clone(),
            addr,
        });
    }

    pub fn resolve(&self, eid: u8) -> Option<(MctpInstance, u8)> {
        self.routes
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|r| r.eid == eid)
            .map(|r| (r.inst.clone(), r.addr))
    }

    pub fn clear(&self) {
        self.routes.write().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

/// Hands each message to the service registered for its MCTP message type.
#[derive(Default)]
pub struct MessageRouter {
    handlers: RwLock<HashMap<u8, Arc<dyn RxHandler>>>,
}

impl MessageRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, msg_type: MessageType, handler: Arc<dyn RxHandler>) {
        self.handlers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(msg_type as u8, handler);
    }

    pub fn clear(&self) {
        self.handlers.write().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

impl RxHandler for MessageRouter {
    fn on_message(&self, inst: &MctpInstance, msg: &[u8], ext: ExtParams) {
        let Some(first) = msg.first() else {
            return;
        };
        let msg_type = first & 0x7F;
        let handler = self
            .handlers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&msg_type)
            .cloned();
        match handler {
            Some(handler) => handler.on_message(inst, msg, ext),
            None => debug!("No handler for MCTP message type {:#04x}", msg_type),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::transport::MockSmbusBus;

    struct Collect(Mutex<Sender<(Vec<u8>, ExtParams)>>);

    impl RxHandler for Collect {
        fn on_message(&self, _inst: &MctpInstance, msg: &[u8], ext: ExtParams) {
            let _ = lock(&self.0).send((msg.to_vec(), ext));
        }
    }

    fn collector() -> (Arc<Collect>, Receiver<(Vec<u8>, ExtParams)>) {
        let (tx, rx) = mpsc::channel();
        (Arc::new(Collect(Mutex::new(tx))), rx)
    }

    #[test]
    fn test_multi_packet_message() {
        let bus = MockSmbusBus::new();
        let a = MctpInstance::new("a", Arc::new(bus.attach(0x20)), 0x20, 0x0A);
        let b = MctpInstance::new("b", Arc::new(bus.attach(0x10)), 0x10, 0x08);
        let (sink_a, _rx_a) = collector();
        let (sink_b, rx_b) = collector();
        let resolver = Arc::new(EndpointResolver::new());
        a.start(sink_a, resolver.clone());
        b.start(sink_b, resolver);

        let msg: Vec<u8> = (0..150u8).collect();
        let ext = ExtParams {
            tag_owner: true,
            ..ExtParams::smbus(0x08, 0x10)
        };
        a.send_msg(&msg, ext).unwrap();

        let (got, from) = rx_b.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(got, msg);
        assert_eq!(from.ep, 0x0A);
        assert_eq!(from.addr, 0x20);
        assert!(from.tag_owner);
        assert_eq!(from.medium, MediumType::Smbus);

        assert!(matches!(
            a.send_msg(&[], ext),
            Err(ServiceError::Mctp(MctpError::EmptyMessage))
        ));
        assert!(matches!(
            a.send_msg(&[0u8; MCTP_MSG_ASSEMBLY_MAX + 1], ext),
            Err(ServiceError::Mctp(MctpError::MessageTooLarge))
        ));

        a.stop();
        b.stop();
        assert!(matches!(a.send_msg(&msg, ext), Err(ServiceError::ChannelClosed)));
    }

    #[test]
    fn test_foreign_packets_are_bridged() {
        let bus1 = MockSmbusBus::new();
        let bus2 = MockSmbusBus::new();
        let host = MctpInstance::new("host", Arc::new(bus1.attach(0x40)), 0x40, 0x10);
        let bic_up = MctpInstance::new("bic-up", Arc::new(bus1.attach(0x20)), 0x20, 0x0A);
        let bic_down = MctpInstance::new("bic-down", Arc::new(bus2.attach(0x21)), 0x21, 0x0A);
        let dev = MctpInstance::new("dev", Arc::new(bus2.attach(0x50)), 0x50, 0x30);

        let resolver = Arc::new(EndpointResolver::new());
        resolver.add_route(0x30, &bic_down, 0x50);
        resolver.add_route(0x10, &bic_up, 0x40);
        let (sink, _unused) = collector();
        let (dev_sink, dev_rx) = collector();
        bic_up.start(sink.clone(), resolver.clone());
        bic_down.start(sink.clone(), resolver.clone());
        dev.start(dev_sink, Arc::new(EndpointResolver::new()));
        host.start(sink, Arc::new(EndpointResolver::new()));

        let msg = [0x01, 0x80, 0x02, 0x02];
        host.send_msg(
            &msg,
            ExtParams {
                tag_owner: true,
                ..ExtParams::smbus(0x30, 0x20)
            },
        )
        .unwrap();

        let (got, from) = dev_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(got, msg);
        assert_eq!(from.ep, 0x10);
        assert_eq!(from.addr, 0x21);

        for inst in [host, bic_up, bic_down, dev] {
            inst.stop();
        }
    }

    #[test]
    fn test_router_dispatches_by_type() {
        let router = MessageRouter::new();
        let (pldm, pldm_rx) = collector();
        router.register(MessageType::Pldm, pldm);
        let bus = MockSmbusBus::new();
        let inst = MctpInstance::new("x", Arc::new(bus.attach(0x20)), 0x20, 0x0A);

        router.on_message(&inst, &[0x00, 0x80, 0x02], ExtParams::default());
        router.on_message(&inst, &[0x81, 0x80, 0x02], ExtParams::default());
        router.on_message(&inst, &[], ExtParams::default());
        let (got, _) = pldm_rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(got, vec![0x81, 0x80, 0x02]);
        assert!(pldm_rx.try_recv().is_err());
    }
}
