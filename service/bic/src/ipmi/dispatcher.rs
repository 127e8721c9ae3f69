// Licensed under the Apache-2.0 license

use std::sync::Arc;
use std::thread::JoinHandle;

use ipmi_common::protocol::{
    iana_bytes, iana_matches, is_not_return_cmd, Channel, CompletionCode, IpmiMsg, OemCmd,
    IANA_LEN, NETFN_APP_REQ, NETFN_CHASSIS_REQ, NETFN_OEM_1S_REQ, NETFN_OEM_REQ,
    NETFN_SENSOR_REQ, NETFN_STORAGE_REQ,
};
use log::{debug, error, info, warn};

use crate::error::Result;
use crate::event_queue::EventQueue;
use crate::ipmb::PendingReply;
use crate::ipmi::{
    app, oem, oem_1s, sensor, storage, IpmiContext, IpmiEvent, IpmiResult, ReplyRoute,
};

/// Runs every IPMI request through its command handler on one worker thread
/// and delivers the response along the request's [`ReplyRoute`].
pub struct IpmiDispatcher {
    handle: Option<JoinHandle<()>>,
    queue: Option<EventQueue<IpmiEvent>>,
}

impl IpmiDispatcher {
    pub fn run(ctx: Arc<IpmiContext>) -> Self {
        let queue = EventQueue::<IpmiEvent>::new();
        let sender = queue.clone();
        let handle = std::thread::spawn(move || Self::event_loop(ctx, queue));
        info!("IPMI dispatcher running");
        IpmiDispatcher {
            handle: Some(handle),
            queue: Some(sender),
        }
    }

    /// Handle for posting requests from other threads.
    pub fn queue(&self) -> Option<EventQueue<IpmiEvent>> {
        self.queue.clone()
    }

    pub fn submit(&self, msg: IpmiMsg, route: ReplyRoute) -> Result<()> {
        match &self.queue {
            Some(queue) => queue.enqueue(IpmiEvent::Request(msg, route)),
            None => Err(crate::error::ServiceError::ChannelClosed),
        }
    }

    pub fn stop(&mut self) {
        if let Some(queue) = self.queue.take() {
            let _ = queue.enqueue(IpmiEvent::Stop);
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("IPMI dispatcher panicked");
            }
        }
    }

    fn event_loop(ctx: Arc<IpmiContext>, queue: EventQueue<IpmiEvent>) {
        while let Some(ev) = queue.dequeue() {
            match ev {
                IpmiEvent::Request(mut msg, route) => {
                    debug!(
                        "IPMI request netfn {:#04x} cmd {:#04x} from {}",
                        msg.netfn,
                        msg.cmd,
                        route.describe()
                    );
                    if relay_from_me(&ctx, &msg, &route) {
                        continue;
                    }
                    if dispatch(&ctx, &mut msg, &route) {
                        if let Err(e) = route.reply(&msg) {
                            warn!(
                                "IPMI response netfn {:#04x} cmd {:#04x} to {} failed: {}",
                                msg.netfn,
                                msg.cmd,
                                route.describe(),
                                e
                            );
                        }
                    }
                }
                IpmiEvent::Stop => break,
            }
        }
        info!("IPMI dispatcher stopped");
    }
}

impl Drop for IpmiDispatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The ME talks standard IPMI to the BMC through us. Everything it sends
/// except the NM sensor read is passed straight on.
fn relay_from_me(ctx: &IpmiContext, msg: &IpmiMsg, route: &ReplyRoute) -> bool {
    if msg.source() != Some(Channel::MeIpmb) {
        return false;
    }
    if msg.netfn == NETFN_OEM_REQ && msg.cmd == u8::from(OemCmd::NmSensorRead) {
        return false;
    }
    let Some(bmc) = ctx.channels.get(Channel::BmcIpmb.into()) else {
        return false;
    };
    let mut fwd = IpmiMsg::request(msg.netfn, msg.cmd, &msg.data);
    fwd.seq_source = msg.seq;
    fwd.inf_source = msg.inf_source;
    fwd.inf_target = Channel::BmcIpmb.into();
    if let Err(e) = bmc.send_request(fwd, PendingReply::Relay(route.clone())) {
        warn!("Relaying ME request to the BMC failed: {}", e);
        let mut resp = msg.clone();
        resp.set_cc(CompletionCode::Timeout);
        resp.data.clear();
        if let Err(e) = route.reply(&resp) {
            warn!("ME response failed: {}", e);
        }
    }
    true
}

/// Runs `msg` through its command handler, leaving the completion code and
/// response data in it. Returns false when no response must be sent.
pub fn dispatch(ctx: &IpmiContext, msg: &mut IpmiMsg, route: &ReplyRoute) -> bool {
    let no_return = is_not_return_cmd(msg.netfn, msg.cmd);
    let result: IpmiResult = match msg.netfn {
        NETFN_CHASSIS_REQ => Err(CompletionCode::InvalidCmd),
        NETFN_SENSOR_REQ => sensor::handle(ctx, msg),
        NETFN_APP_REQ => app::handle(ctx, msg),
        NETFN_STORAGE_REQ => storage::handle(ctx, msg),
        NETFN_OEM_REQ => oem::handle(ctx, msg),
        NETFN_OEM_1S_REQ => {
            if iana_matches(&msg.data) {
                let body = msg.data[IANA_LEN..].to_vec();
                msg.set_data(&body);
                oem_1s::handle(ctx, msg, route)
            } else {
                Err(CompletionCode::InvalidIana)
            }
        }
        _ => {
            warn!("Invalid IPMI netfn {:#04x} cmd {:#04x}", msg.netfn, msg.cmd);
            Err(CompletionCode::InvalidCmd)
        }
    };

    match result {
        // The bridged target answers these.
        Ok(_) if no_return => false,
        Ok(data) => {
            msg.completion_code = CompletionCode::Success.into();
            if msg.netfn == NETFN_OEM_1S_REQ {
                let mut prefixed = iana_bytes().to_vec();
                prefixed.extend_from_slice(&data);
                msg.set_data(&prefixed);
            } else {
                msg.set_data(&data);
            }
            true
        }
        Err(cc) => {
            msg.set_cc(cc);
            msg.data.clear();
            true
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ipmi::test_util::{fixture, request};
    use ipmi_common::protocol::{AppCmd, Oem1sCmd};
    use std::sync::mpsc;
    use std::time::Duration;

    fn local() -> (ReplyRoute, mpsc::Receiver<IpmiMsg>) {
        let (tx, rx) = mpsc::channel();
        (ReplyRoute::Local(tx), rx)
    }

    #[test]
    fn test_unknown_netfn_and_chassis() {
        let f = fixture();
        let (route, _rx) = local();
        for netfn in [NETFN_CHASSIS_REQ, 0x2C, 0x3E] {
            let mut msg = request(netfn, 0x01, &[1, 2]);
            assert!(dispatch(&f.ctx, &mut msg, &route));
            assert_eq!(msg.completion_code, 0xC1);
            assert!(msg.data.is_empty());
        }
    }

    #[test]
    fn test_oem_1s_iana_handling() {
        let f = fixture();
        let (route, _rx) = local();

        let mut msg = request(NETFN_OEM_1S_REQ, Oem1sCmd::GetBicStatus.into(), &[0x15, 0xA0, 0x00]);
        assert!(dispatch(&f.ctx, &mut msg, &route));
        assert_eq!(msg.completion_code, 0);
        assert_eq!(
            msg.data.as_slice(),
            &[0x15, 0xA0, 0x00, f.ctx.device.fw_rev1, f.ctx.device.fw_rev2]
        );

        let mut msg = request(NETFN_OEM_1S_REQ, Oem1sCmd::GetBicStatus.into(), &[0x15, 0xA0]);
        assert!(dispatch(&f.ctx, &mut msg, &route));
        assert_eq!(msg.completion_code, u8::from(CompletionCode::InvalidIana));
        assert!(msg.data.is_empty());

        // Failures are not prefixed.
        let mut msg = request(
            NETFN_OEM_1S_REQ,
            Oem1sCmd::GetBicStatus.into(),
            &[0x15, 0xA0, 0x00, 1],
        );
        assert!(dispatch(&f.ctx, &mut msg, &route));
        assert_eq!(msg.completion_code, u8::from(CompletionCode::InvalidLength));
        assert!(msg.data.is_empty());
    }

    #[test]
    fn test_msg_in_is_not_answered() {
        let f = fixture();
        let (route, _rx) = local();
        let mut msg = request(NETFN_OEM_1S_REQ, Oem1sCmd::MsgIn.into(), &[0x15, 0xA0, 0x00, 1]);
        assert!(!dispatch(&f.ctx, &mut msg, &route));
    }

    #[test]
    fn test_dispatcher_thread_replies() {
        let f = fixture();
        let mut dispatcher = IpmiDispatcher::run(Arc::new(f.ctx));
        let (route, rx) = local();
        dispatcher
            .submit(request(NETFN_APP_REQ, AppCmd::GetDeviceId.into(), &[]), route)
            .unwrap();
        let resp = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(resp.completion_code, 0);
        assert_eq!(resp.data.len(), 15);

        dispatcher.stop();
        let (route, _rx) = local();
        assert!(dispatcher.submit(request(NETFN_APP_REQ, 0x01, &[]), route).is_err());
    }
}
