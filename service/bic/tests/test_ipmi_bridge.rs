// Licensed under the Apache-2.0 license


use std::sync::mpsc;
use std::thread;

use bic_service::ipmi::ReplyRoute;
use bic_service::pldm::pldm_send_ipmi_request;
use bic_service::transport::SmbusTransport;
use ipmi_common::ipmb;
use ipmi_common::protocol::{iana_bytes, IpmiMsg, NETFN_APP_REQ, NETFN_OEM_1S_REQ};
use mock_peer::{Bench, PEER_EID, TIMEOUT};
use pldm_common::message::oem::{IpmiBridgeRequest, IpmiBridgeResponse};
use pldm_common::protocol::base::PldmMsgHeader;

const CMD_GET_DEVICE_ID: u8 = 0x01;
const CMD_GET_BIC_STATUS: u8 = 0x31;

/// Sends a request frame from the BMC node and returns the decoded reply.
fn ipmb_request(bench: &Bench, netfn: u8, cmd: u8, seq: u8, data: &[u8]) -> IpmiMsg {
    let req = IpmiMsg {
        dest_addr: bench.config.ipmb.self_addr << 1,
        src_addr: bench.config.ipmb.channel[0].target_addr << 1,
        seq,
        ..IpmiMsg::request(netfn, cmd, data)
    };
    let mut frame = [0u8; ipmb::IPMB_FRAME_MAX];
    let len = ipmb::encode(&req, &mut frame).unwrap();
    bench
        .ipmb
        .write(bench.config.ipmb.self_addr, &frame[..len])
        .unwrap();
    let reply = bench.ipmb.read(TIMEOUT).unwrap().expect("no IPMB reply");
    ipmb::decode(&reply).unwrap()
}

#[test]
fn test_get_device_id_over_ipmb() {
    let bench = Bench::start();

    let resp = ipmb_request(&bench, NETFN_APP_REQ, CMD_GET_DEVICE_ID, 3, &[]);
    assert_eq!(resp.netfn, NETFN_APP_REQ + 1);
    assert_eq!(resp.cmd, CMD_GET_DEVICE_ID);
    assert_eq!(resp.seq, 3);
    assert_eq!(resp.completion_code, 0);
    assert_eq!(resp.data[0], bench.config.device.device_id);
    assert_eq!(&resp.data[6..9], &iana_bytes());

    // Unknown netfn.
    let resp = ipmb_request(&bench, 0x3E, 0x01, 4, &[]);
    assert_eq!(resp.completion_code, 0xC1);

    bench.stop();
}

#[test]
fn test_oem_1s_over_ipmb() {
    let bench = Bench::start();

    let resp = ipmb_request(&bench, NETFN_OEM_1S_REQ, CMD_GET_BIC_STATUS, 5, &iana_bytes());
    assert_eq!(resp.completion_code, 0);
    assert_eq!(&resp.data[..3], &iana_bytes());

    bench.stop();
}

#[test]
fn test_get_device_id_over_pldm() {
    let bench = Bench::start();

    let mut buf = [0u8; 32];
    let len = IpmiBridgeRequest::new(9, NETFN_APP_REQ, CMD_GET_DEVICE_ID, &[])
        .encode(&mut buf)
        .unwrap();
    let raw = bench.peer.request(&buf[..len]);
    let resp = IpmiBridgeResponse::decode(&raw).unwrap();
    assert_eq!(resp.hdr.instance_id(), 9);
    assert_eq!(resp.completion_code, 0);
    assert_eq!(resp.netfn, NETFN_APP_REQ + 1);
    assert_eq!(resp.cmd, CMD_GET_DEVICE_ID);
    assert_eq!(resp.ipmi_completion_code, 0);
    assert_eq!(resp.data[0], bench.config.device.device_id);

    bench.stop();
}

#[test]
fn test_bic_sends_ipmi_over_pldm() {
    let bench = Bench::start();

    let service = bench.daemon.pldm().clone();
    let (tx, rx) = mpsc::channel();
    let requester = thread::spawn(move || {
        let msg = IpmiMsg::request(NETFN_APP_REQ, CMD_GET_DEVICE_ID, &[]);
        let _ = tx.send(pldm_send_ipmi_request(&service, PEER_EID, &msg));
    });

    let (req, ext) = bench.peer.recv(TIMEOUT).expect("no bridged request");
    let bridged = IpmiBridgeRequest::decode(&req).unwrap();
    assert_eq!(bridged.netfn, NETFN_APP_REQ);
    assert_eq!(bridged.cmd, CMD_GET_DEVICE_ID);

    let hdr = PldmMsgHeader::decode(&req).unwrap();
    let mut buf = [0u8; 32];
    let len = IpmiBridgeResponse::new(
        hdr.instance_id(),
        NETFN_APP_REQ,
        CMD_GET_DEVICE_ID,
        0,
        &[0xAB],
    )
    .encode(&mut buf)
    .unwrap();
    bench.peer.respond(ext, &buf[..len]);

    let resp = rx.recv_timeout(TIMEOUT).unwrap().unwrap();
    requester.join().unwrap();
    assert_eq!(resp.netfn, NETFN_APP_REQ + 1);
    assert_eq!(resp.completion_code, 0);
    assert_eq!(resp.data.as_slice(), &[0xAB]);

    bench.stop();
}

#[test]
fn test_submit_to_local_route() {
    let bench = Bench::start();

    let (tx, rx) = mpsc::channel();
    bench
        .daemon
        .submit_ipmi(
            IpmiMsg::request(NETFN_APP_REQ, CMD_GET_DEVICE_ID, &[]),
            ReplyRoute::Local(tx),
        )
        .unwrap();
    let resp = rx.recv_timeout(TIMEOUT).unwrap();
    assert_eq!(resp.completion_code, 0);
    assert_eq!(resp.data[0], bench.config.device.device_id);

    bench.stop();
}
