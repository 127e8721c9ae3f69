// Licensed under the Apache-2.0 license

//! Firmware device side of PLDM firmware update (type 5).
//!
//! The update agent walks the device through RequestUpdate,
//! PassComponentTable and UpdateComponent. UpdateComponent starts a worker
//! that pulls the image with RequestFirmwareData and reports the
//! transfer, verify and apply results back to the agent.

use std::sync::{Arc, Mutex, Weak};
use std::thread;
use std::time::Duration;

use bic_sensor::lock;
use log::{error, info, warn};
use mctp_common::protocol::ExtParams;
use pldm_common::codec::PldmCodec;
use pldm_common::error::PldmError;
use pldm_common::message::firmware_update::activate_fw::{
    ActivateFirmwareRequest, ActivateFirmwareResponse, SelfContainedActivationRequest,
};
use pldm_common::message::firmware_update::apply_complete::{ApplyCompleteRequest, ApplyResult};
use pldm_common::message::firmware_update::cancel_update::CancelUpdateResponse;
use pldm_common::message::firmware_update::get_status::{
    GetStatusResponse, PROGRESS_PERCENT_NOT_SUPPORTED,
};
use pldm_common::message::firmware_update::pass_component::{
    PassComponentTableRequest, PassComponentTableResponse,
};
use pldm_common::message::firmware_update::request_fw_data::RequestFirmwareDataRequest;
use pldm_common::message::firmware_update::request_update::{
    RequestUpdateRequest, RequestUpdateResponse,
};
use pldm_common::message::firmware_update::transfer_complete::TransferCompleteRequest;
use pldm_common::message::firmware_update::update_component::{
    UpdateComponentRequest, UpdateComponentResponse,
};
use pldm_common::message::firmware_update::verify_complete::{VerifyCompleteRequest, VerifyResult};
use pldm_common::protocol::base::{
    PldmBaseCompletionCode, PldmSupportedType, PldmVersion, TransferRespFlag,
};
use pldm_common::protocol::firmware_update::{
    AuxState, ComponentClassification, FirmwareDeviceState, FwUpdateCmd, FwUpdateCompletionCode,
    GetStatusReasonCode, TransferResult, DOWNSTREAM_COMPONENT_ID_MAX, FW_UPDATE_CHUNK_SIZE,
    FW_UPDATE_SECTOR_SIZE, PLDM_FW_UPDATE_GENERIC_ERROR,
};

use crate::error::{Result, ServiceError};
use crate::mctp::MctpInstance;
use crate::platform::Platform;
use crate::pldm::service::{
    respond, respond_cc, HandlerResult, PldmContext, PldmHeader, PldmResponder, PldmService,
};

pub const PLDM_FW_UPDATE_VERSION: PldmVersion = PldmVersion::new(1, 1, Some(0));

/// Delay between answering UpdateComponent and the first
/// RequestFirmwareData, reported to the agent in seconds.
const UPDATE_START_DELAY_SECS: u16 = 1;
const WARM_RESET_DELAY: Duration = Duration::from_secs(1);

mod sm {
    use smlang::statemachine;

    statemachine! {
        derive_states: [Debug, Clone, Copy],
        derive_events: [Debug, Clone, Copy],
        transitions: {
            *Idle + RequestUpdate = LearnComponents,
            LearnComponents + PassComponentTable = ReadyXfer,
            ReadyXfer + PassComponentTable = ReadyXfer,
            LearnComponents + UpdateComponent = Download,
            ReadyXfer + UpdateComponent = Download,
            Download + TransferDone = Verify,
            Verify + VerifyDone = Apply,
            Apply + ApplyDone = ReadyXfer,
            Download + Fail = Idle,
            Verify + Fail = Idle,
            Apply + Fail = Idle,
            ReadyXfer + Activate = Activate,
            LearnComponents + Cancel = Idle,
            ReadyXfer + Cancel = Idle,
            Download + Cancel = Idle,
            Verify + Cancel = Idle,
            Apply + Cancel = Idle,
            Activate + Cancel = Idle,
        }
    }

    pub struct UpdateContext;

    impl StateMachineContext for UpdateContext {}
}

use sm::{Events, States, UpdateContext};

fn device_state(state: States) -> FirmwareDeviceState {
    match state {
        States::Idle => FirmwareDeviceState::Idle,
        States::LearnComponents => FirmwareDeviceState::LearnComponents,
        States::ReadyXfer => FirmwareDeviceState::ReadyXfer,
        States::Download => FirmwareDeviceState::Download,
        States::Verify => FirmwareDeviceState::Verify,
        States::Apply => FirmwareDeviceState::Apply,
        States::Activate => FirmwareDeviceState::Activate,
    }
}

/// Length of the chunk to request at `offset`: at most
/// `FW_UPDATE_CHUNK_SIZE` bytes, never past the image end and never across
/// a flash sector boundary.
pub fn chunk_len(offset: u32, image_size: u32) -> u32 {
    let to_sector_end = FW_UPDATE_SECTOR_SIZE - offset % FW_UPDATE_SECTOR_SIZE;
    FW_UPDATE_CHUNK_SIZE
        .min(image_size.saturating_sub(offset))
        .min(to_sector_end)
}

struct UpdateState {
    sm: sm::StateMachine<UpdateContext>,
    previous: FirmwareDeviceState,
    reason: GetStatusReasonCode,
    image_size: u32,
    transferred: u32,
    option_flags: u32,
    /// Bumped on cancel so a running worker notices it is stale.
    generation: u64,
}

impl UpdateState {
    fn current(&self) -> States {
        *self.sm.state()
    }

    fn fire(&mut self, ev: Events) -> bool {
        let before = self.current();
        if self.sm.process_event(ev).is_err() {
            warn!("Firmware update: {:?} not allowed in {:?}", ev, before);
            return false;
        }
        self.previous = device_state(before);
        info!("Firmware update: {:?} -> {:?}", before, self.current());
        true
    }
}

pub struct FwUpdateResponder {
    me: Weak<FwUpdateResponder>,
    platform: Arc<dyn Platform>,
    state: Mutex<UpdateState>,
}

impl FwUpdateResponder {
    pub fn new(platform: Arc<dyn Platform>) -> Arc<Self> {
        Arc::new_cyclic(|me| FwUpdateResponder {
            me: me.clone(),
            platform,
            state: Mutex::new(UpdateState {
                sm: sm::StateMachine::new(UpdateContext),
                previous: FirmwareDeviceState::Idle,
                reason: GetStatusReasonCode::Initialization,
                image_size: 0,
                transferred: 0,
                option_flags: 0,
                generation: 0,
            }),
        })
    }

    pub fn current_state(&self) -> FirmwareDeviceState {
        device_state(lock(&self.state).current())
    }

    fn request_update(
        &self,
        hdr: &PldmHeader,
        req: &[u8],
        resp: &mut [u8],
    ) -> Result<HandlerResult> {
        let inst = hdr.instance_id();
        let update = match RequestUpdateRequest::decode(req) {
            Ok(update) if update.version(req).is_some() => update,
            _ => return respond_cc(hdr, PldmBaseCompletionCode::InvalidLength as u8, resp),
        };
        let mut state = lock(&self.state);
        if state.current() != States::Idle {
            return respond_cc(hdr, FwUpdateCompletionCode::AlreadyInUpdateMode as u8, resp);
        }

        info!(
            "Update requested: max transfer {}, {} component(s), package data {} bytes, \
             image set version {:?}",
            { update.max_transfer_size },
            { update.num_of_comp },
            { update.pkg_data_len },
            String::from_utf8_lossy(update.version(req).unwrap_or_default())
        );
        state.fire(Events::RequestUpdate);
        respond(
            RequestUpdateResponse::new(
                inst,
                PldmBaseCompletionCode::Success as u8,
                0,
                { update.pkg_data_len } != 0,
            ),
            resp,
        )
    }

    /// Only a single downstream device component is accepted.
    fn check_component(classification: u16, identifier: u16, index: u8) -> bool {
        if classification != ComponentClassification::Downstream as u16 {
            error!("Invalid component classification {:#06x}", classification);
            return false;
        }
        if identifier > DOWNSTREAM_COMPONENT_ID_MAX {
            error!("Invalid component identifier {:#06x}", identifier);
            return false;
        }
        if index != 0 {
            error!("Only one device can be updated, got index {}", index);
            return false;
        }
        true
    }

    fn pass_component_table(
        &self,
        hdr: &PldmHeader,
        req: &[u8],
        resp: &mut [u8],
    ) -> Result<HandlerResult> {
        let pass = match PassComponentTableRequest::decode(req) {
            Ok(pass) if pass.version(req).is_some() => pass,
            _ => return respond_cc(hdr, PldmBaseCompletionCode::InvalidLength as u8, resp),
        };
        let mut state = lock(&self.state);
        if state.current() == States::Idle {
            return respond_cc(hdr, FwUpdateCompletionCode::NotInUpdateMode as u8, resp);
        }
        if pass.transfer_flag != TransferRespFlag::StartAndEnd as u8
            || !Self::check_component(
                pass.comp_classification,
                pass.comp_identifier,
                pass.comp_classification_index,
            )
        {
            return respond_cc(hdr, PldmBaseCompletionCode::InvalidData as u8, resp);
        }
        if !state.fire(Events::PassComponentTable) {
            return respond_cc(hdr, FwUpdateCompletionCode::InvalidStateForCommand as u8, resp);
        }
        info!(
            "Component version {:?}",
            String::from_utf8_lossy(pass.version(req).unwrap_or_default())
        );
        respond(
            PassComponentTableResponse::new(
                hdr.instance_id(),
                PldmBaseCompletionCode::Success as u8,
                0,
                0,
            ),
            resp,
        )
    }

    fn update_component(
        &self,
        ctx: &PldmContext,
        req: &[u8],
        resp: &mut [u8],
    ) -> Result<HandlerResult> {
        let hdr = &ctx.hdr;
        let update = match UpdateComponentRequest::decode(req) {
            Ok(update) if update.version(req).is_some() => update,
            _ => return respond_cc(hdr, PldmBaseCompletionCode::InvalidLength as u8, resp),
        };
        let mut state = lock(&self.state);
        if state.current() == States::Idle {
            return respond_cc(hdr, FwUpdateCompletionCode::NotInUpdateMode as u8, resp);
        }
        if !Self::check_component(
            update.comp_classification,
            update.comp_identifier,
            update.comp_classification_index,
        ) {
            return respond_cc(hdr, PldmBaseCompletionCode::InvalidData as u8, resp);
        }
        if !state.fire(Events::UpdateComponent) {
            return respond_cc(hdr, FwUpdateCompletionCode::InvalidStateForCommand as u8, resp);
        }

        state.image_size = update.comp_image_size;
        state.transferred = 0;
        state.option_flags = update.update_option_flags;
        info!("Update image size {:#x}", state.image_size);

        let Some(me) = self.me.upgrade() else {
            return Err(ServiceError::ChannelClosed);
        };
        let service = ctx.service.clone();
        let inst = ctx.inst.clone();
        let ext = ctx.ext;
        let generation = state.generation;
        thread::Builder::new()
            .name("pldm-fw-update".into())
            .spawn(move || {
                thread::sleep(Duration::from_secs(UPDATE_START_DELAY_SECS as u64));
                me.run_update(&service, &inst, ext, generation);
            })?;

        respond(
            UpdateComponentResponse::new(
                hdr.instance_id(),
                PldmBaseCompletionCode::Success as u8,
                update.update_option_flags,
                UPDATE_START_DELAY_SECS,
            ),
            resp,
        )
    }

    fn activate_firmware(
        &self,
        hdr: &PldmHeader,
        req: &[u8],
        resp: &mut [u8],
    ) -> Result<HandlerResult> {
        if req.len() != core::mem::size_of::<ActivateFirmwareRequest>() {
            return respond_cc(hdr, PldmBaseCompletionCode::InvalidLength as u8, resp);
        }
        let activate = ActivateFirmwareRequest::decode(req)?;
        let mut state = lock(&self.state);
        match state.current() {
            States::Idle => {
                return respond_cc(hdr, FwUpdateCompletionCode::NotInUpdateMode as u8, resp)
            }
            States::ReadyXfer => {}
            _ => {
                return respond_cc(hdr, FwUpdateCompletionCode::InvalidStateForCommand as u8, resp)
            }
        }
        if activate.self_contained_activation_req
            != SelfContainedActivationRequest::NotActivateSelfContainedComponents as u8
        {
            return respond_cc(hdr, PldmBaseCompletionCode::InvalidData as u8, resp);
        }

        info!("Activate firmware");
        state.fire(Events::Activate);
        state.reason = GetStatusReasonCode::ActivateFw;
        let platform = self.platform.clone();
        thread::Builder::new()
            .name("pldm-fw-activate".into())
            .spawn(move || {
                thread::sleep(WARM_RESET_DELAY);
                platform.warm_reset();
            })?;
        respond(
            ActivateFirmwareResponse::new(
                hdr.instance_id(),
                PldmBaseCompletionCode::Success as u8,
                0,
            ),
            resp,
        )
    }

    fn get_status(&self, hdr: &PldmHeader, resp: &mut [u8]) -> Result<HandlerResult> {
        let state = lock(&self.state);
        let current = state.current();
        let aux = match current {
            States::Idle | States::LearnComponents | States::ReadyXfer => {
                AuxState::IdleLearnComponentsReadXfer
            }
            States::Download | States::Verify | States::Apply => AuxState::OperationInProgress,
            States::Activate => AuxState::OperationSuccessful,
        };
        let progress = match current {
            States::Download if state.image_size != 0 => {
                (state.transferred as u64 * 100 / state.image_size as u64) as u8
            }
            _ => PROGRESS_PERCENT_NOT_SUPPORTED,
        };
        respond(
            GetStatusResponse::new(
                hdr.instance_id(),
                PldmBaseCompletionCode::Success as u8,
                device_state(current),
                state.previous,
                aux,
                progress,
                state.reason,
                state.option_flags,
            ),
            resp,
        )
    }

    fn cancel_update(&self, hdr: &PldmHeader, resp: &mut [u8]) -> Result<HandlerResult> {
        let mut state = lock(&self.state);
        if state.current() == States::Idle {
            return respond_cc(hdr, FwUpdateCompletionCode::NotInUpdateMode as u8, resp);
        }
        state.generation += 1;
        state.fire(Events::Cancel);
        state.reason = GetStatusReasonCode::CancelUpdate;
        state.image_size = 0;
        respond(
            CancelUpdateResponse::new(hdr.instance_id(), PldmBaseCompletionCode::Success as u8),
            resp,
        )
    }

    /// Fires `ev` unless the update was cancelled since the worker started.
    fn advance(&self, generation: u64, ev: Events) -> Result<()> {
        let mut state = lock(&self.state);
        if state.generation != generation {
            return Err(ServiceError::UpdateCancelled);
        }
        state.fire(ev);
        Ok(())
    }

    fn run_update(
        &self,
        service: &PldmService,
        inst: &MctpInstance,
        ext: ExtParams,
        generation: u64,
    ) {
        match self.download(service, inst, ext, generation) {
            Ok(()) => {
                let mut state = lock(&self.state);
                state.image_size = 0;
                info!("Firmware update finished");
            }
            Err(ServiceError::UpdateCancelled) => info!("Firmware update worker stopped by cancel"),
            Err(e) => {
                error!("Firmware update failed: {}", e);
                self.report_failure(service, inst, ext, generation);
            }
        }
    }

    fn download(
        &self,
        service: &PldmService,
        inst: &MctpInstance,
        ext: ExtParams,
        generation: u64,
    ) -> Result<()> {
        let image_size = lock(&self.state).image_size;
        let mut offset = 0u32;
        while offset < image_size {
            let len = chunk_len(offset, image_size);
            let req = encode(RequestFirmwareDataRequest::new(0, offset, len))?;
            let data = service.read_via(inst, ext, &req)?;
            // Completion code plus the requested bytes.
            if data.len() != len as usize + 1 {
                error!(
                    "Firmware data at {:#x}: asked {} bytes, got {}",
                    offset,
                    len,
                    data.len()
                );
                return Err(PldmError::InvalidLength.into());
            }
            if data[0] != PldmBaseCompletionCode::Success as u8 {
                return Err(ServiceError::CompletionCode(data[0]));
            }
            self.platform
                .firmware()
                .write_chunk(offset, &data[1..], offset + len == image_size)?;
            offset += len;

            let mut state = lock(&self.state);
            if state.generation != generation {
                return Err(ServiceError::UpdateCancelled);
            }
            state.transferred = offset;
        }
        info!("Transfer completed");

        let transfer = TransferCompleteRequest::new(0, TransferResult::TransferSuccess as u8);
        send_complete(service, inst, ext, &encode(transfer)?)?;
        self.advance(generation, Events::TransferDone)?;

        let verified = encode(VerifyCompleteRequest::new(0, VerifyResult::VerifySuccess))?;
        send_complete(service, inst, ext, &verified)?;
        info!("Verify completed");
        self.advance(generation, Events::VerifyDone)?;

        let applied = encode(ApplyCompleteRequest::new(0, ApplyResult::ApplySuccess, 0))?;
        send_complete(service, inst, ext, &applied)?;
        info!("Apply completed");
        self.advance(generation, Events::ApplyDone)
    }

    /// Tells the agent which step failed, then drops back to Idle.
    fn report_failure(
        &self,
        service: &PldmService,
        inst: &MctpInstance,
        ext: ExtParams,
        generation: u64,
    ) {
        let current = {
            let state = lock(&self.state);
            if state.generation != generation {
                return;
            }
            state.current()
        };
        let req = match current {
            States::Download => {
                encode(TransferCompleteRequest::new(0, PLDM_FW_UPDATE_GENERIC_ERROR))
            }
            States::Verify => encode(VerifyCompleteRequest::new(0, VerifyResult::GenericError)),
            States::Apply => {
                encode(ApplyCompleteRequest::new(0, ApplyResult::ApplyGenericError, 0))
            }
            _ => return,
        };
        match req.and_then(|req| send_complete(service, inst, ext, &req)) {
            Ok(()) => {}
            Err(e) => error!("Failed to report {:?} failure: {}", current, e),
        }

        let mut state = lock(&self.state);
        if state.generation == generation {
            state.fire(Events::Fail);
            state.image_size = 0;
        }
    }
}

fn encode<T: PldmCodec>(msg: T) -> Result<Vec<u8>> {
    let mut buf = [0u8; 64];
    let len = msg.encode(&mut buf)?;
    Ok(buf[..len].to_vec())
}

/// Sends one of the *Complete requests and requires a bare success reply.
fn send_complete(
    service: &PldmService,
    inst: &MctpInstance,
    ext: ExtParams,
    req: &[u8],
) -> Result<()> {
    match service.read_via(inst, ext, req)?.as_slice() {
        [cc] if *cc == PldmBaseCompletionCode::Success as u8 => Ok(()),
        [cc, ..] => Err(ServiceError::CompletionCode(*cc)),
        [] => Err(PldmError::InvalidLength.into()),
    }
}

impl PldmResponder for FwUpdateResponder {
    fn pldm_type(&self) -> PldmSupportedType {
        PldmSupportedType::FwUpdate
    }

    fn supports(&self, cmd: u8) -> bool {
        matches!(
            FwUpdateCmd::try_from(cmd),
            Ok(FwUpdateCmd::RequestUpdate
                | FwUpdateCmd::PassComponentTable
                | FwUpdateCmd::UpdateComponent
                | FwUpdateCmd::ActivateFirmware
                | FwUpdateCmd::GetStatus
                | FwUpdateCmd::CancelUpdate)
        )
    }

    fn version(&self) -> Option<PldmVersion> {
        Some(PLDM_FW_UPDATE_VERSION)
    }

    fn handle(&self, ctx: &PldmContext, req: &[u8], resp: &mut [u8]) -> Result<HandlerResult> {
        let hdr = &ctx.hdr;
        match FwUpdateCmd::try_from(hdr.cmd_code()) {
            Ok(FwUpdateCmd::RequestUpdate) => self.request_update(hdr, req, resp),
            Ok(FwUpdateCmd::PassComponentTable) => self.pass_component_table(hdr, req, resp),
            Ok(FwUpdateCmd::UpdateComponent) => self.update_component(ctx, req, resp),
            Ok(FwUpdateCmd::ActivateFirmware) => self.activate_firmware(hdr, req, resp),
            Ok(FwUpdateCmd::GetStatus) => self.get_status(hdr, resp),
            Ok(FwUpdateCmd::CancelUpdate) => self.cancel_update(hdr, resp),
            _ => respond_cc(hdr, PldmBaseCompletionCode::UnsupportedPldmCmd as u8, resp),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::platform::SimulatedPlatform;
    use crate::pldm::test_util::context;
    use pldm_common::message::firmware_update::get_status::GetStatusRequest;
    use pldm_common::message::firmware_update::cancel_update::CancelUpdateRequest;
    use pldm_common::protocol::firmware_update::VersionStringType;

    fn call(responder: &FwUpdateResponder, req: &[u8]) -> Vec<u8> {
        let mut ctx = context();
        ctx.hdr = PldmHeader::decode(req).unwrap();
        let mut resp = [0u8; 64];
        match responder.handle(&ctx, req, &mut resp).unwrap() {
            HandlerResult::Respond(len) => resp[..len].to_vec(),
            HandlerResult::Later => panic!("no immediate response"),
        }
    }

    fn request_update(pkg_data_len: u16) -> Vec<u8> {
        let mut buf = [0u8; 64];
        let req = RequestUpdateRequest::new(
            1,
            224,
            1,
            1,
            pkg_data_len,
            VersionStringType::Ascii,
            b"v1.2",
        );
        let len = req.encode_with_version(b"v1.2", &mut buf).unwrap();
        buf[..len].to_vec()
    }

    fn pass_component(classification: ComponentClassification, id: u16) -> Vec<u8> {
        let mut buf = [0u8; 64];
        let req = PassComponentTableRequest::new(
            2,
            TransferRespFlag::StartAndEnd,
            classification,
            id,
            0,
            0,
            VersionStringType::Ascii,
            b"bic",
        );
        let len = req.encode_with_version(b"bic", &mut buf).unwrap();
        buf[..len].to_vec()
    }

    fn activate() -> Vec<u8> {
        encode(ActivateFirmwareRequest::new(
            3,
            SelfContainedActivationRequest::NotActivateSelfContainedComponents,
        ))
        .unwrap()
    }

    #[test]
    fn test_chunk_len() {
        assert_eq!(chunk_len(0, 1000), 224);
        assert_eq!(chunk_len(896, 1000), 104);
        assert_eq!(chunk_len(1000, 1000), 0);
        // 0xFF40 + 224 would cross into the next sector.
        assert_eq!(chunk_len(0xFF40, 0x20000), 0xC0);
        assert_eq!(chunk_len(0x10000, 0x20000), 224);
    }

    #[test]
    fn test_update_flow_states() {
        let platform = Arc::new(SimulatedPlatform::new(0));
        let responder = FwUpdateResponder::new(platform.clone());

        // Nothing works before RequestUpdate.
        let pass = pass_component(ComponentClassification::Downstream, 1);
        assert_eq!(call(&responder, &pass)[3], 0x80);
        assert_eq!(call(&responder, &activate())[3], 0x80);

        let resp = RequestUpdateResponse::decode(&call(&responder, &request_update(16))).unwrap();
        assert_eq!(resp.completion_code, 0);
        assert_eq!(resp.fd_will_send_pkg_data, 1);
        assert_eq!(responder.current_state(), FirmwareDeviceState::LearnComponents);
        assert_eq!(call(&responder, &request_update(0))[3], 0x81);

        // Activate only from ReadyXfer.
        assert_eq!(call(&responder, &activate())[3], 0x84);

        assert_eq!(
            call(&responder, &pass_component(ComponentClassification::Firmware, 1))[3],
            PldmBaseCompletionCode::InvalidData as u8
        );
        assert_eq!(
            call(&responder, &pass_component(ComponentClassification::Downstream, 0x1000))[3],
            PldmBaseCompletionCode::InvalidData as u8
        );
        assert_eq!(call(&responder, &pass_component(ComponentClassification::Downstream, 1))[3], 0);
        assert_eq!(responder.current_state(), FirmwareDeviceState::ReadyXfer);

        let resp = call(&responder, &activate());
        assert_eq!(resp[3], 0);
        assert_eq!(responder.current_state(), FirmwareDeviceState::Activate);
        thread::sleep(WARM_RESET_DELAY + Duration::from_millis(500));
        assert_eq!(platform.warm_resets(), 1);
    }

    #[test]
    fn test_bad_lengths() {
        let responder = FwUpdateResponder::new(Arc::new(SimulatedPlatform::new(0)));
        let mut req = request_update(0);
        req.push(0);
        assert_eq!(call(&responder, &req)[3], PldmBaseCompletionCode::InvalidLength as u8);
        assert_eq!(responder.current_state(), FirmwareDeviceState::Idle);

        let mut req = activate();
        req.pop();
        assert_eq!(call(&responder, &req)[3], PldmBaseCompletionCode::InvalidLength as u8);
    }

    #[test]
    fn test_status_and_cancel() {
        let responder = FwUpdateResponder::new(Arc::new(SimulatedPlatform::new(0)));
        assert_eq!(
            call(&responder, &encode(CancelUpdateRequest::new(1)).unwrap())[3],
            FwUpdateCompletionCode::NotInUpdateMode as u8
        );

        call(&responder, &request_update(0));
        let raw = call(&responder, &encode(GetStatusRequest::new(1)).unwrap());
        let status = GetStatusResponse::decode(&raw).unwrap();
        assert_eq!(status.current_state, FirmwareDeviceState::LearnComponents as u8);
        assert_eq!(status.previous_state, FirmwareDeviceState::Idle as u8);
        assert_eq!(status.progress_percent, PROGRESS_PERCENT_NOT_SUPPORTED);

        assert_eq!(call(&responder, &encode(CancelUpdateRequest::new(2)).unwrap())[3], 0);
        let raw = call(&responder, &encode(GetStatusRequest::new(3)).unwrap());
        let status = GetStatusResponse::decode(&raw).unwrap();
        assert_eq!(status.current_state, FirmwareDeviceState::Idle as u8);
        assert_eq!(status.previous_state, FirmwareDeviceState::LearnComponents as u8);
        assert_eq!(status.reason_code, GetStatusReasonCode::CancelUpdate as u8);
    }

    #[test]
    fn test_worker_failure_returns_to_idle() {
        let responder = FwUpdateResponder::new(Arc::new(SimulatedPlatform::new(0)));
        call(&responder, &request_update(0));
        call(&responder, &pass_component(ComponentClassification::Downstream, 1));

        let mut buf = [0u8; 64];
        let req = UpdateComponentRequest::new(
            4,
            ComponentClassification::Downstream,
            1,
            0,
            0,
            512,
            0x1,
            VersionStringType::Ascii,
            b"bic",
        );
        let len = req.encode_with_version(b"bic", &mut buf).unwrap();
        let resp = UpdateComponentResponse::decode(&call(&responder, &buf[..len])).unwrap();
        assert_eq!(resp.completion_code, 0);
        assert_eq!({ resp.update_option_flags_enabled }, 0x1);
        assert_eq!({ resp.time_before_req_fw_data }, UPDATE_START_DELAY_SECS);
        assert_eq!(responder.current_state(), FirmwareDeviceState::Download);

        // The test context's MCTP instance is not running, so the first
        // RequestFirmwareData fails.
        thread::sleep(
            Duration::from_secs(UPDATE_START_DELAY_SECS as u64) + Duration::from_millis(800),
        );
        assert_eq!(responder.current_state(), FirmwareDeviceState::Idle);
    }
}
