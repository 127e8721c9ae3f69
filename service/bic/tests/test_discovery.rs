// Licensed under the Apache-2.0 license


use mock_peer::Bench;
use pldm_common::codec::PldmCodec;
use pldm_common::message::control::*;
use pldm_common::protocol::base::{
    PldmBaseCompletionCode, PldmControlCmd, PldmSupportedType, TransferOperationFlag,
};
use pldm_common::protocol::firmware_update::FwUpdateCmd;

const COMPLETION_CODE_SUCCESSFUL: u8 = 0x00;

#[test]
fn test_get_tid_and_types() {
    let bench = Bench::start();

    let resp = GetTidResponse::decode(&bench.peer.request_msg(GetTidRequest::new(1))).unwrap();
    assert_eq!(resp.completion_code, COMPLETION_CODE_SUCCESSFUL);
    assert_eq!(resp.tid, bench.config.pldm.tid);
    assert_eq!(resp.hdr.instance_id(), 1);

    let resp = GetPldmTypesResponse::decode(&bench.peer.request_msg(GetPldmTypesRequest::new(2)))
        .unwrap();
    assert_eq!(resp.completion_code, COMPLETION_CODE_SUCCESSFUL);
    for pldm_type in [
        PldmSupportedType::Base,
        PldmSupportedType::Smbios,
        PldmSupportedType::Platform,
        PldmSupportedType::FwUpdate,
        PldmSupportedType::Oem,
    ] {
        assert!(resp.supports(pldm_type), "{:?} missing", pldm_type);
    }

    bench.stop();
}

#[test]
fn test_set_tid_sticks() {
    let bench = Bench::start();

    let resp = bench.peer.request_msg(SetTidRequest::new(3, 0x42));
    assert_eq!(resp[3], COMPLETION_CODE_SUCCESSFUL);
    let resp = GetTidResponse::decode(&bench.peer.request_msg(GetTidRequest::new(4))).unwrap();
    assert_eq!(resp.tid, 0x42);
    assert_eq!(bench.daemon.pldm().tid(), 0x42);

    bench.stop();
}

#[test]
fn test_get_commands_and_versions() {
    let bench = Bench::start();

    let resp = GetPldmCommandsResponse::decode(&bench.peer.request_msg(
        GetPldmCommandsRequest::new(5, PldmSupportedType::Base as u8, 0),
    ))
    .unwrap();
    assert_eq!(resp.completion_code, COMPLETION_CODE_SUCCESSFUL);
    assert!(resp.supports(PldmControlCmd::GetTid as u8));
    assert!(resp.supports(PldmControlCmd::GetPldmVersion as u8));

    // Firmware data is requested by the BIC, never served by it.
    let resp = GetPldmCommandsResponse::decode(&bench.peer.request_msg(
        GetPldmCommandsRequest::new(6, PldmSupportedType::FwUpdate as u8, 0),
    ))
    .unwrap();
    assert!(resp.supports(FwUpdateCmd::RequestUpdate as u8));
    assert!(resp.supports(FwUpdateCmd::ActivateFirmware as u8));
    assert!(!resp.supports(FwUpdateCmd::RequestFirmwareData as u8));

    let resp = GetPldmVersionResponse::decode(&bench.peer.request_msg(GetPldmVersionRequest::new(
        7,
        0,
        TransferOperationFlag::GetFirstPart,
        PldmSupportedType::Base,
    )))
    .unwrap();
    assert_eq!(resp.completion_code, COMPLETION_CODE_SUCCESSFUL);

    bench.stop();
}

#[test]
fn test_unsupported_command() {
    let bench = Bench::start();

    let mut req = [0u8; 3];
    GetTidRequest::new(8).encode(&mut req).unwrap();
    // No type 0 command uses 0x7F.
    req[2] = 0x7F;
    let resp = bench.peer.request(&req);
    assert_eq!(resp[3], PldmBaseCompletionCode::UnsupportedPldmCmd as u8);

    bench.stop();
}
