// Licensed under the Apache-2.0 license

//! Platform monitoring and control (PLDM type 2): sensor readings, GPIO
//! state effecters and platform event delivery to the event receiver.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, Weak};

use bic_sensor::lock;
use bic_sensor::table::{ReadMode, SensorStatus, SensorTable};
use log::{debug, error, info, warn};
use mctp_common::protocol::ExtParams;
use pldm_common::codec::PldmCodec;
use pldm_common::error::PldmError;
use pldm_common::message::platform::effecter::{
    GetEffecterStateField, GetStateEffecterStatesRequest, GetStateEffecterStatesResponse,
    SetEffecterStateField, SetStateEffecterStatesRequest,
};
use pldm_common::message::platform::event::{
    EventData, PlatformEventMessageRequest, SetEventReceiverRequest,
};
use pldm_common::message::platform::sensor_reading::{
    GetSensorReadingRequest, GetSensorReadingResponse,
};
use pldm_common::protocol::base::{
    PldmBaseCompletionCode, PldmSupportedType, PldmVersion, PLDM_MSG_HEADER_LEN,
};
use pldm_common::protocol::platform::*;

use crate::error::{Result, ServiceError};
use crate::mctp::MctpInstance;
use crate::platform::{GpioDirection, Platform};
use crate::pldm::sensor::PldmSensorList;
use crate::pldm::service::{
    respond, respond_cc, HandlerResult, PldmContext, PldmHeader, PldmResponder, PldmService,
};
use crate::ticker::Ticker;

pub const PLDM_MONITOR_VERSION: PldmVersion = PldmVersion::new(1, 2, Some(0));

/// Sensor ids above this do not map onto the one-byte sensor table.
const SENSOR_ID_MAX: u16 = 0xFF;

const EVENT_DRAIN_INTERVAL: std::time::Duration = std::time::Duration::from_millis(1000);

#[derive(Debug, Clone)]
struct QueuedEvent {
    class: EventClass,
    id: u16,
    data: EventData,
}

/// Delivers PlatformEventMessage requests to whoever registered through
/// SetEventReceiver, queueing them until then.
pub struct PlatformEvents {
    me: Weak<PlatformEvents>,
    service: Weak<PldmService>,
    receiver: Mutex<Option<(MctpInstance, ExtParams)>>,
    queue: Mutex<VecDeque<QueuedEvent>>,
    drain: Mutex<Option<Ticker>>,
}

impl PlatformEvents {
    pub fn new(service: &Arc<PldmService>) -> Arc<Self> {
        Arc::new_cyclic(|me| PlatformEvents {
            me: me.clone(),
            service: Arc::downgrade(service),
            receiver: Mutex::new(None),
            queue: Mutex::new(VecDeque::new()),
            drain: Mutex::new(None),
        })
    }

    pub fn receiver(&self) -> Option<(MctpInstance, ExtParams)> {
        lock(&self.receiver).clone()
    }

    pub fn queued(&self) -> usize {
        lock(&self.queue).len()
    }

    /// Reports a sensor or effecter event to the event receiver.
    ///
    /// Without a receiver the event is queued, and the drain loop sends one
    /// queued event per second once SetEventReceiver arrives. With a receiver
    /// the event is sent right away and must come back logged. That blocks
    /// until the receiver answers, so it must not run on an MCTP receive
    /// thread.
    pub fn send_platform_event(
        &self,
        class: EventClass,
        id: u16,
        ext_class: u8,
        data: &[u8],
    ) -> Result<()> {
        if data.len() > PLDM_EVENT_DATA_MAX_LEN {
            return Err(PldmError::InvalidLength.into());
        }
        let event_data = match class {
            EventClass::Sensor => {
                let ext_class = SensorEventClass::try_from(ext_class)
                    .map_err(|_| PldmError::InvalidEventClass)?;
                EventData::sensor(id, ext_class, data)?
            }
            EventClass::Effecter => {
                let ext_class = EffecterEventClass::try_from(ext_class)
                    .map_err(|_| PldmError::InvalidEventClass)?;
                EventData::effecter(id, ext_class, data)?
            }
        };
        let event = QueuedEvent {
            class,
            id,
            data: event_data,
        };

        match self.receiver() {
            Some((inst, ext)) => self.deliver(&inst, ext, event),
            None => {
                let mut queue = lock(&self.queue);
                if queue.len() >= PLDM_EVENT_QUEUE_DEPTH {
                    warn!("Event queue full, dropping event for id {:#06x}", id);
                    return Err(ServiceError::EventQueueFull);
                }
                debug!("No event receiver yet, queued event for id {:#06x}", id);
                queue.push_back(event);
                Ok(())
            }
        }
    }

    fn deliver(&self, inst: &MctpInstance, ext: ExtParams, event: QueuedEvent) -> Result<()> {
        let service = self.service.upgrade().ok_or(ServiceError::ChannelClosed)?;
        let req = PlatformEventMessageRequest::new(0, service.tid(), event.class, event.data);
        let mut buf = [0u8; 32];
        let len = req.encode(&mut buf)?;

        let resp = service.read_via(inst, ext, &buf[..len])?;
        match resp.as_slice() {
            [cc, ..] if *cc != PldmBaseCompletionCode::Success as u8 => {
                Err(ServiceError::CompletionCode(*cc))
            }
            [_, status, ..] if *status == PlatformEventStatus::Logged as u8 => Ok(()),
            [_, status, ..] => Err(ServiceError::EventNotLogged(*status)),
            _ => Err(PldmError::InvalidLength.into()),
        }
    }

    fn set_receiver(&self, inst: MctpInstance, ext: ExtParams) {
        info!("Event receiver set to EID {:#04x}", ext.ep);
        *lock(&self.receiver) = Some((inst, ext));

        let mut drain = lock(&self.drain);
        if drain.is_none() {
            let weak = self.me.clone();
            *drain = Some(Ticker::spawn("pldm-events", EVENT_DRAIN_INTERVAL, move || {
                if let Some(events) = weak.upgrade() {
                    events.drain_one();
                }
            }));
        }
    }

    fn drain_one(&self) {
        let Some((inst, ext)) = self.receiver() else {
            return;
        };
        let Some(event) = lock(&self.queue).pop_front() else {
            return;
        };
        let id = event.id;
        match self.deliver(&inst, ext, event) {
            Ok(()) => debug!("Queued event for id {:#06x} delivered", id),
            Err(e) => error!("Failed to send event for id {:#06x}: {}", id, e),
        }
    }

    pub fn stop(&self) {
        if let Some(mut ticker) = lock(&self.drain).take() {
            ticker.stop();
        }
    }
}

pub struct MonitorResponder {
    sensors: Arc<Mutex<SensorTable>>,
    pldm_sensors: Option<Arc<Mutex<PldmSensorList>>>,
    platform: Arc<dyn Platform>,
    events: Arc<PlatformEvents>,
}

impl MonitorResponder {
    pub fn new(
        sensors: Arc<Mutex<SensorTable>>,
        platform: Arc<dyn Platform>,
        events: Arc<PlatformEvents>,
    ) -> Self {
        MonitorResponder {
            sensors,
            pldm_sensors: None,
            platform,
            events,
        }
    }

    /// Serves GetSensorReading for the PLDM numeric sensors ahead of the
    /// sensor table.
    pub fn with_pldm_sensors(mut self, sensors: Arc<Mutex<PldmSensorList>>) -> Self {
        self.pldm_sensors = Some(sensors);
        self
    }

    fn is_pldm_sensor(&self, sensor_id: u16) -> bool {
        self.pldm_sensors
            .as_ref()
            .is_some_and(|sensors| lock(sensors).contains(sensor_id))
    }

    fn pldm_sensor_reading(&self, sensor_id: u16) -> (u8, SensorOperationalState, i32) {
        let Some(sensors) = self.pldm_sensors.as_ref() else {
            return (PLDM_PLATFORM_INVALID_SENSOR_ID, SensorOperationalState::StatusUnknown, 0);
        };
        match lock(sensors).get_reading_from_cache(sensor_id) {
            Ok((op_state, reading)) => (PldmBaseCompletionCode::Success as u8, op_state, reading),
            Err(cc) => (cc, SensorOperationalState::StatusUnknown, 0),
        }
    }

    fn get_sensor_reading(
        &self,
        hdr: &PldmHeader,
        req: &[u8],
        resp: &mut [u8],
    ) -> Result<HandlerResult> {
        let get = if req.len() == core::mem::size_of::<GetSensorReadingRequest>() {
            GetSensorReadingRequest::decode(req).ok()
        } else {
            None
        };
        let (cc, op_state, reading) = match get {
            None => (
                PldmBaseCompletionCode::InvalidLength as u8,
                SensorOperationalState::StatusUnknown,
                0,
            ),
            Some(get) if self.is_pldm_sensor(get.sensor_id) => {
                self.pldm_sensor_reading(get.sensor_id)
            }
            Some(get) if { get.sensor_id } > SENSOR_ID_MAX => (
                PLDM_PLATFORM_INVALID_SENSOR_ID,
                SensorOperationalState::StatusUnknown,
                0,
            ),
            Some(get) => {
                let num = get.sensor_id as u8;
                let (status, reading) =
                    lock(&self.sensors).get_sensor_reading(num, ReadMode::Cache);
                let success = PldmBaseCompletionCode::Success as u8;
                let (cc, op_state) = match status {
                    s if s.is_success() => (success, SensorOperationalState::Enabled),
                    SensorStatus::NotAccessible | SensorStatus::InitStatus => {
                        (success, SensorOperationalState::Initializing)
                    }
                    SensorStatus::PollingDisable => {
                        (success, SensorOperationalState::StatusUnknown)
                    }
                    SensorStatus::NotFound => {
                        (PLDM_PLATFORM_INVALID_SENSOR_ID, SensorOperationalState::StatusUnknown)
                    }
                    _ => (success, SensorOperationalState::Failed),
                };
                (cc, op_state, reading)
            }
        };

        let ok = cc == PldmBaseCompletionCode::Success as u8;
        let state = if ok {
            SensorState::Normal
        } else {
            SensorState::Unknown
        };
        let reading = if ok && op_state == SensorOperationalState::Enabled {
            reading
        } else {
            -1
        };
        respond(GetSensorReadingResponse::new(hdr, cc, op_state, state, reading), resp)
    }

    fn set_event_receiver(
        &self,
        ctx: &PldmContext,
        req: &[u8],
        resp: &mut [u8],
    ) -> Result<HandlerResult> {
        let hdr = &ctx.hdr;
        if req.len() != core::mem::size_of::<SetEventReceiverRequest>() {
            return respond_cc(hdr, PldmBaseCompletionCode::InvalidLength as u8, resp);
        }
        let set = SetEventReceiverRequest::decode(req)?;
        if EventMessageGlobalEnable::try_from(set.event_message_global_enable).is_err() {
            return respond_cc(hdr, PldmBaseCompletionCode::InvalidData as u8, resp);
        }
        if set.transport_protocol_type != TransportProtocolType::Mctp as u8 {
            return respond_cc(hdr, PLDM_PLATFORM_INVALID_PROTOCOL_TYPE, resp);
        }
        if set.event_receiver_address_info != ctx.ext.ep {
            warn!(
                "Event receiver address {:#04x} does not match sender {:#04x}",
                set.event_receiver_address_info, ctx.ext.ep
            );
            return respond_cc(hdr, PldmBaseCompletionCode::InvalidData as u8, resp);
        }

        self.events.set_receiver(ctx.inst.clone(), ctx.ext);
        respond_cc(hdr, PldmBaseCompletionCode::Success as u8, resp)
    }

    fn set_gpio_effecter(&self, pin: u8, fields: &[SetEffecterStateField]) -> u8 {
        if pin as u16 > PLDM_MAX_GPIO_PIN {
            return PLDM_PLATFORM_INVALID_EFFECTER_STATE_ID;
        }
        let [dir, val] = fields else {
            return PldmBaseCompletionCode::InvalidData as u8;
        };
        if dir.set_request != EffecterSetRequest::NoChange as u8
            || EffecterSetRequest::try_from(val.set_request).is_err()
        {
            return PLDM_PLATFORM_UNSUPPORTED_EFFECTERSTATE;
        }
        if GpioDirectionState::try_from(dir.effecter_state).is_err() {
            return PLDM_PLATFORM_INVALID_STATE_VALUE;
        }
        let Ok(value) = GpioValueState::try_from(val.effecter_state) else {
            return PLDM_PLATFORM_INVALID_STATE_VALUE;
        };
        if val.set_request == EffecterSetRequest::NoChange as u8 {
            return PldmBaseCompletionCode::Success as u8;
        }
        if self.platform.gpio_direction(pin) == Some(GpioDirection::Input) {
            debug!("GPIO {} is an input, refusing to drive it", pin);
            return PLDM_PLATFORM_SET_EFFECTER_UNSUPPORTED_SENSORSTATE;
        }
        let high = match value {
            GpioValueState::Low => false,
            GpioValueState::High => true,
            GpioValueState::Unknown => return PLDM_PLATFORM_SET_EFFECTER_UNSUPPORTED_SENSORSTATE,
        };
        match self.platform.gpio_set(pin, high) {
            Ok(()) => PldmBaseCompletionCode::Success as u8,
            Err(e) => {
                error!("GPIO {} set failed: {}", pin, e);
                PldmBaseCompletionCode::Error as u8
            }
        }
    }

    fn set_state_effecter_states(
        &self,
        hdr: &PldmHeader,
        req: &[u8],
        resp: &mut [u8],
    ) -> Result<HandlerResult> {
        let Ok(set) = SetStateEffecterStatesRequest::decode(req) else {
            return respond_cc(hdr, PldmBaseCompletionCode::InvalidLength as u8, resp);
        };
        let count = set.comp_effecter_count;
        if count == 0 || count > PLDM_STATE_EFFECTER_MAX_COMPOSITE {
            return respond_cc(hdr, PldmBaseCompletionCode::InvalidData as u8, resp);
        }
        if req.len() != SetStateEffecterStatesRequest::FIXED_LEN + count as usize * 2 {
            return respond_cc(hdr, PldmBaseCompletionCode::InvalidLength as u8, resp);
        }

        let [pin, effecter_type] = set.effecter_id.to_le_bytes();
        let cc = match effecter_type {
            PLDM_EFFECTER_TYPE_GPIO => self.set_gpio_effecter(pin, set.fields()),
            _ => PLDM_PLATFORM_INVALID_EFFECTER_ID,
        };
        respond_cc(hdr, cc, resp)
    }

    fn get_state_effecter_states(
        &self,
        hdr: &PldmHeader,
        req: &[u8],
        resp: &mut [u8],
    ) -> Result<HandlerResult> {
        if req.len() != PLDM_MSG_HEADER_LEN + 2 {
            return respond_cc(hdr, PldmBaseCompletionCode::InvalidLength as u8, resp);
        }
        let get = GetStateEffecterStatesRequest::decode(req)?;
        let [pin, effecter_type] = { get.effecter_id }.to_le_bytes();
        if effecter_type != PLDM_EFFECTER_TYPE_GPIO {
            return respond_cc(hdr, PLDM_PLATFORM_INVALID_EFFECTER_ID, resp);
        }
        if pin as u16 > PLDM_MAX_GPIO_PIN {
            return respond_cc(hdr, PLDM_PLATFORM_INVALID_EFFECTER_STATE_ID, resp);
        }

        let fields = match (self.platform.gpio_direction(pin), self.platform.gpio_get(pin)) {
            (Some(dir), Some(high)) => {
                let op = EffecterOperationalState::EnabledNoUpdatePending as u8;
                let dir = u8::from(match dir {
                    GpioDirection::Input => GpioDirectionState::Input,
                    GpioDirection::Output => GpioDirectionState::Output,
                });
                let val = u8::from(if high {
                    GpioValueState::High
                } else {
                    GpioValueState::Low
                });
                [
                    GetEffecterStateField {
                        effecter_op_state: op,
                        pending_state: dir,
                        present_state: dir,
                    },
                    GetEffecterStateField {
                        effecter_op_state: op,
                        pending_state: val,
                        present_state: val,
                    },
                ]
            }
            _ => {
                let unknown = GetEffecterStateField {
                    effecter_op_state: EffecterOperationalState::Disabled as u8,
                    pending_state: GpioValueState::Unknown as u8,
                    present_state: GpioValueState::Unknown as u8,
                };
                [unknown, unknown]
            }
        };
        respond(
            GetStateEffecterStatesResponse::new(
                hdr,
                PldmBaseCompletionCode::Success as u8,
                &fields,
            ),
            resp,
        )
    }
}

impl PldmResponder for MonitorResponder {
    fn pldm_type(&self) -> PldmSupportedType {
        PldmSupportedType::Platform
    }

    fn supports(&self, cmd: u8) -> bool {
        // PlatformEventMessage is only ever sent, never answered.
        matches!(
            PlatformCmd::try_from(cmd),
            Ok(PlatformCmd::SetEventReceiver
                | PlatformCmd::GetSensorReading
                | PlatformCmd::SetStateEffecterStates
                | PlatformCmd::GetStateEffecterStates)
        )
    }

    fn version(&self) -> Option<PldmVersion> {
        Some(PLDM_MONITOR_VERSION)
    }

    fn handle(&self, ctx: &PldmContext, req: &[u8], resp: &mut [u8]) -> Result<HandlerResult> {
        let hdr = &ctx.hdr;
        match PlatformCmd::try_from(hdr.cmd_code()) {
            Ok(PlatformCmd::GetSensorReading) => self.get_sensor_reading(hdr, req, resp),
            Ok(PlatformCmd::SetEventReceiver) => self.set_event_receiver(ctx, req, resp),
            Ok(PlatformCmd::SetStateEffecterStates) => {
                self.set_state_effecter_states(hdr, req, resp)
            }
            Ok(PlatformCmd::GetStateEffecterStates) => {
                self.get_state_effecter_states(hdr, req, resp)
            }
            _ => respond_cc(hdr, PldmBaseCompletionCode::UnsupportedPldmCmd as u8, resp),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::platform::SimulatedPlatform;
    use crate::pldm::test_util::{context, encode};
    use bic_sensor::access::{AccessChecker, PowerState};
    use bic_sensor::dev::SensorTarget;
    use bic_sensor::table::SensorConfig;
    use crate::pldm::sensor::NumericSensorPdr;

    struct Fixture {
        responder: MonitorResponder,
        platform: Arc<SimulatedPlatform>,
        events: Arc<PlatformEvents>,
        ctx: PldmContext,
    }

    fn fixture() -> Fixture {
        let mut table = SensorTable::new(Arc::new(PowerState::new()), 4);
        let mut cfg = SensorConfig::new(0x10, SensorTarget::new(0, 0x4C, 0), AccessChecker::Stby);
        cfg.cache = 0x0032_0019;
        cfg.cache_status = SensorStatus::FourByteAcurSuccess;
        table.add_sensor_config(cfg);
        table.add_sensor_config(SensorConfig::new(
            0x11,
            SensorTarget::new(0, 0x4D, 0),
            AccessChecker::Stby,
        ));

        let ctx = context();
        let platform = Arc::new(SimulatedPlatform::new(0));
        let events = PlatformEvents::new(&ctx.service);
        Fixture {
            responder: MonitorResponder::new(
                Arc::new(Mutex::new(table)),
                platform.clone(),
                events.clone(),
            ),
            platform,
            events,
            ctx,
        }
    }

    fn call(f: &Fixture, req: &[u8]) -> Vec<u8> {
        let mut ctx = f.ctx.clone();
        ctx.hdr = PldmHeader::decode(req).unwrap();
        let mut resp = [0u8; 64];
        match f.responder.handle(&ctx, req, &mut resp).unwrap() {
            HandlerResult::Respond(len) => resp[..len].to_vec(),
            HandlerResult::Later => panic!("no immediate response"),
        }
    }

    #[test]
    fn test_get_sensor_reading() {
        let f = fixture();
        let resp = call(&f, &encode(GetSensorReadingRequest::new(1, 0x10, false)));
        let resp = GetSensorReadingResponse::decode(&resp).unwrap();
        assert_eq!(resp.completion_code, 0);
        assert_eq!(resp.sensor_operational_state, SensorOperationalState::Enabled as u8);
        assert_eq!(resp.present_state, SensorState::Normal as u8);
        assert_eq!({ resp.present_reading }, 0x0032_0019);

        // Never polled yet.
        let resp = call(&f, &encode(GetSensorReadingRequest::new(1, 0x11, false)));
        let resp = GetSensorReadingResponse::decode(&resp).unwrap();
        assert_eq!(resp.completion_code, 0);
        assert_eq!(resp.sensor_operational_state, SensorOperationalState::Initializing as u8);
        assert_eq!({ resp.present_reading }, -1);

        let resp = call(&f, &encode(GetSensorReadingRequest::new(1, 0x20, false)));
        let resp = GetSensorReadingResponse::decode(&resp).unwrap();
        assert_eq!(resp.completion_code, PLDM_PLATFORM_INVALID_SENSOR_ID);
        assert_eq!(resp.present_state, SensorState::Unknown as u8);

        let resp = call(&f, &encode(GetSensorReadingRequest::new(1, 0x0110, false)));
        assert_eq!(resp[3], PLDM_PLATFORM_INVALID_SENSOR_ID);

        let mut short = encode(GetSensorReadingRequest::new(1, 0x10, false));
        short.pop();
        let resp = call(&f, &short);
        assert_eq!(resp[3], PldmBaseCompletionCode::InvalidLength as u8);
        assert_eq!(resp[5], SensorOperationalState::StatusUnknown as u8);
    }

    #[test]
    fn test_get_pldm_sensor_reading() {
        let cfg = || SensorConfig::new(0, SensorTarget::new(0, 0x40, 0), AccessChecker::Stby);
        let mut broken = NumericSensorPdr::new(0x0121);
        broken.resolution = 0.0;
        let list = PldmSensorList::new(
            Arc::new(PowerState::new()),
            vec![(NumericSensorPdr::new(0x0120), cfg()), (broken, cfg())],
        );
        let list = Arc::new(Mutex::new(list));
        let f = fixture();
        let responder = MonitorResponder::new(
            Arc::new(Mutex::new(SensorTable::new(Arc::new(PowerState::new()), 0))),
            f.platform.clone(),
            f.events.clone(),
        )
        .with_pldm_sensors(list.clone());
        let f = Fixture { responder, ..f };

        let resp = call(&f, &encode(GetSensorReadingRequest::new(1, 0x0120, false)));
        let resp = GetSensorReadingResponse::decode(&resp).unwrap();
        assert_eq!(resp.completion_code, 0);
        assert_eq!(resp.sensor_operational_state, SensorOperationalState::Initializing as u8);
        assert_eq!({ resp.present_reading }, -1);

        // No driver behind it.
        lock(&list).poll_once(std::time::Instant::now());
        let resp = call(&f, &encode(GetSensorReadingRequest::new(1, 0x0120, false)));
        assert_eq!(resp[5], SensorOperationalState::Disabled as u8);

        let resp = call(&f, &encode(GetSensorReadingRequest::new(1, 0x0121, false)));
        assert_eq!(resp[3], PldmBaseCompletionCode::InvalidData as u8);
        let resp = call(&f, &encode(GetSensorReadingRequest::new(1, 0x0122, false)));
        assert_eq!(resp[3], PLDM_PLATFORM_INVALID_SENSOR_ID);
    }

    #[test]
    fn test_set_event_receiver_checks() {
        let f = fixture();
        let ep = f.ctx.ext.ep;
        let cases = [
            (
                SetEventReceiverRequest::new(0, 4, 0, ep, 0),
                PldmBaseCompletionCode::InvalidData as u8,
            ),
            (SetEventReceiverRequest::new(0, 1, 1, ep, 0), PLDM_PLATFORM_INVALID_PROTOCOL_TYPE),
            (
                SetEventReceiverRequest::new(0, 1, 0, ep + 1, 0),
                PldmBaseCompletionCode::InvalidData as u8,
            ),
        ];
        for (req, cc) in cases {
            assert_eq!(call(&f, &encode(req))[3], cc);
        }
        assert!(f.events.receiver().is_none());

        let resp = call(&f, &encode(SetEventReceiverRequest::new(0, 1, 0, ep, 0)));
        assert_eq!(resp[3], 0);
        assert_eq!(f.events.receiver().unwrap().1.ep, ep);
        f.events.stop();
    }

    #[test]
    fn test_events_queue_until_receiver_set() {
        let f = fixture();
        assert!(matches!(
            f.events.send_platform_event(EventClass::Sensor, 1, 2, &[0; 8]),
            Err(ServiceError::Pldm(PldmError::InvalidLength))
        ));
        assert!(matches!(
            f.events.send_platform_event(EventClass::Sensor, 1, 9, &[1, 2]),
            Err(ServiceError::Pldm(PldmError::InvalidEventClass))
        ));
        // An op state event carries exactly two bytes.
        assert!(f.events.send_platform_event(EventClass::Sensor, 1, 0, &[1, 2, 3]).is_err());
        assert_eq!(f.events.queued(), 0);

        for _ in 0..PLDM_EVENT_QUEUE_DEPTH {
            f.events.send_platform_event(EventClass::Sensor, 1, 1, &[1, 2, 3]).unwrap();
        }
        assert!(matches!(
            f.events.send_platform_event(EventClass::Sensor, 1, 1, &[1, 2, 3]),
            Err(ServiceError::EventQueueFull)
        ));
        assert_eq!(f.events.queued(), PLDM_EVENT_QUEUE_DEPTH);

        // With a receiver the event goes straight out, here onto a port that
        // was never started.
        let ep = f.ctx.ext.ep;
        assert_eq!(call(&f, &encode(SetEventReceiverRequest::new(0, 1, 0, ep, 0)))[3], 0);
        let res = f.events.send_platform_event(EventClass::Effecter, 3, 0, &[1, 0]);
        assert!(res.is_err());
        assert!(!matches!(res, Err(ServiceError::EventQueueFull)));
        f.events.stop();
    }

    fn gpio_req(pin: u8, dir: (u8, u8), val: (u8, u8)) -> Vec<u8> {
        encode(SetStateEffecterStatesRequest::new(
            1,
            u16::from_le_bytes([pin, PLDM_EFFECTER_TYPE_GPIO]),
            &[
                SetEffecterStateField {
                    set_request: dir.0,
                    effecter_state: dir.1,
                },
                SetEffecterStateField {
                    set_request: val.0,
                    effecter_state: val.1,
                },
            ],
        ))
    }

    #[test]
    fn test_set_gpio_effecter() {
        let f = fixture();
        assert_eq!(call(&f, &gpio_req(12, (0, 0), (1, 2)))[3], 0);
        assert_eq!(f.platform.gpio_get(12), Some(true));

        assert_eq!(
            call(&f, &gpio_req(200, (0, 0), (1, 2)))[3],
            PLDM_PLATFORM_INVALID_EFFECTER_STATE_ID
        );
        assert_eq!(
            call(&f, &gpio_req(12, (1, 1), (1, 2)))[3],
            PLDM_PLATFORM_UNSUPPORTED_EFFECTERSTATE
        );
        assert_eq!(call(&f, &gpio_req(12, (0, 3), (1, 2)))[3], PLDM_PLATFORM_INVALID_STATE_VALUE);
        assert_eq!(
            call(&f, &gpio_req(12, (0, 0), (1, 0)))[3],
            PLDM_PLATFORM_SET_EFFECTER_UNSUPPORTED_SENSORSTATE
        );

        f.platform.gpio_config(13, GpioDirection::Input).unwrap();
        assert_eq!(
            call(&f, &gpio_req(13, (0, 0), (1, 1)))[3],
            PLDM_PLATFORM_SET_EFFECTER_UNSUPPORTED_SENSORSTATE
        );

        let one_field = encode(SetStateEffecterStatesRequest::new(
            1,
            u16::from_le_bytes([12, PLDM_EFFECTER_TYPE_GPIO]),
            &[SetEffecterStateField::default()],
        ));
        assert_eq!(call(&f, &one_field)[3], PldmBaseCompletionCode::InvalidData as u8);

        let other_type = encode(SetStateEffecterStatesRequest::new(
            1,
            0x0112,
            &[SetEffecterStateField::default(); 2],
        ));
        assert_eq!(call(&f, &other_type)[3], PLDM_PLATFORM_INVALID_EFFECTER_ID);
    }

    #[test]
    fn test_get_gpio_effecter() {
        let f = fixture();
        let id = u16::from_le_bytes([5, PLDM_EFFECTER_TYPE_GPIO]);

        let resp = call(&f, &encode(GetStateEffecterStatesRequest::new(1, id)));
        let resp = GetStateEffecterStatesResponse::decode(&resp).unwrap();
        assert_eq!(resp.fields()[0].effecter_op_state, EffecterOperationalState::Disabled as u8);

        f.platform.gpio_set(5, true).unwrap();
        let resp = call(&f, &encode(GetStateEffecterStatesRequest::new(1, id)));
        let resp = GetStateEffecterStatesResponse::decode(&resp).unwrap();
        assert_eq!(
            resp.fields(),
            &[
                GetEffecterStateField {
                    effecter_op_state: EffecterOperationalState::EnabledNoUpdatePending as u8,
                    pending_state: GpioDirectionState::Output as u8,
                    present_state: GpioDirectionState::Output as u8,
                },
                GetEffecterStateField {
                    effecter_op_state: EffecterOperationalState::EnabledNoUpdatePending as u8,
                    pending_state: GpioValueState::High as u8,
                    present_state: GpioValueState::High as u8,
                },
            ]
        );

        let resp = call(&f, &encode(GetStateEffecterStatesRequest::new(1, 0x00A8 | 0xFF00)));
        assert_eq!(resp[3], PLDM_PLATFORM_INVALID_EFFECTER_STATE_ID);
        let resp = call(&f, &encode(GetStateEffecterStatesRequest::new(1, 0x0105)));
        assert_eq!(resp[3], PLDM_PLATFORM_INVALID_EFFECTER_ID);
    }
}
