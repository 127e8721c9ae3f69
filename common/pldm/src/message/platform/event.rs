// Licensed under the Apache-2.0 license

use crate::codec::{impl_fixed_size_codec, PldmCodec, PldmCodecError};
use crate::error::PldmError;
use crate::protocol::base::{
    InstanceId, PldmMsgHeader, PldmMsgType, PldmSupportedType, PLDM_MSG_HEADER_LEN,
};
use crate::protocol::platform::{
    EffecterEventClass, EventClass, PlatformCmd, SensorEventClass, PLDM_EVENT_DATA_MAX_LEN,
    PLDM_PLATFORM_EVENT_FORMAT_VERSION,
};
use zerocopy::{FromBytes, Immutable, IntoBytes};

/// Sensor or effecter id, class byte, then up to `PLDM_EVENT_DATA_MAX_LEN`
/// bytes of class specific data.
pub const PLDM_PLATFORM_EVENT_DATA_MAX: usize = 3 + PLDM_EVENT_DATA_MAX_LEN;

const SENSOR_OP_STATE_DATA_LEN: usize = 2;
const STATE_SENSOR_STATE_DATA_LEN: usize = 3;
const NUMERIC_SENSOR_STATE_DATA_MIN: usize = 4;
const NUMERIC_SENSOR_STATE_DATA_MAX: usize = 7;
const EFFECTER_OP_STATE_DATA_LEN: usize = 2;

#[derive(Debug, Clone, FromBytes, IntoBytes, Immutable, PartialEq)]
#[repr(C, packed)]
pub struct SetEventReceiverRequest {
    pub hdr: PldmMsgHeader<[u8; PLDM_MSG_HEADER_LEN]>,
    pub event_message_global_enable: u8,
    pub transport_protocol_type: u8,
    pub event_receiver_address_info: u8,
    pub heartbeat_timer: u16,
}

impl SetEventReceiverRequest {
    pub fn new(
        instance_id: InstanceId,
        event_message_global_enable: u8,
        transport_protocol_type: u8,
        event_receiver_address_info: u8,
        heartbeat_timer: u16,
    ) -> Self {
        SetEventReceiverRequest {
            hdr: PldmMsgHeader::new(
                instance_id,
                PldmMsgType::Request,
                PldmSupportedType::Platform,
                PlatformCmd::SetEventReceiver as u8,
            ),
            event_message_global_enable,
            transport_protocol_type,
            event_receiver_address_info,
            heartbeat_timer,
        }
    }
}

/// Event data of a sensor or effecter event, as carried inside
/// PlatformEventMessage.
#[derive(Debug, Clone, PartialEq)]
pub struct EventData {
    pub buf: [u8; PLDM_PLATFORM_EVENT_DATA_MAX],
    pub len: usize,
}

impl EventData {
    fn with_id(id: u16, class: u8, data: &[u8]) -> Self {
        let mut buf = [0u8; PLDM_PLATFORM_EVENT_DATA_MAX];
        buf[..2].copy_from_slice(&id.to_le_bytes());
        buf[2] = class;
        buf[3..3 + data.len()].copy_from_slice(data);
        EventData {
            buf,
            len: 3 + data.len(),
        }
    }

    /// Sensor event data. The length of `data` must fit the event class.
    pub fn sensor(sensor_id: u16, class: SensorEventClass, data: &[u8]) -> Result<Self, PldmError> {
        let valid = match class {
            SensorEventClass::OpState => data.len() == SENSOR_OP_STATE_DATA_LEN,
            SensorEventClass::StateSensor => data.len() == STATE_SENSOR_STATE_DATA_LEN,
            SensorEventClass::NumericSensor => {
                (NUMERIC_SENSOR_STATE_DATA_MIN..=NUMERIC_SENSOR_STATE_DATA_MAX)
                    .contains(&data.len())
            }
        };
        if !valid {
            return Err(PldmError::InvalidLength);
        }
        Ok(Self::with_id(sensor_id, class as u8, data))
    }

    pub fn effecter(
        effecter_id: u16,
        class: EffecterEventClass,
        data: &[u8],
    ) -> Result<Self, PldmError> {
        match class {
            EffecterEventClass::OpState if data.len() == EFFECTER_OP_STATE_DATA_LEN => {
                Ok(Self::with_id(effecter_id, class as u8, data))
            }
            _ => Err(PldmError::InvalidLength),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlatformEventMessageRequest {
    pub hdr: PldmMsgHeader<[u8; PLDM_MSG_HEADER_LEN]>,
    pub format_version: u8,
    pub tid: u8,
    pub event_class: u8,
    pub event_data: EventData,
}

impl PlatformEventMessageRequest {
    pub fn new(
        instance_id: InstanceId,
        tid: u8,
        event_class: EventClass,
        event_data: EventData,
    ) -> Self {
        PlatformEventMessageRequest {
            hdr: PldmMsgHeader::new(
                instance_id,
                PldmMsgType::Request,
                PldmSupportedType::Platform,
                PlatformCmd::PlatformEventMessage as u8,
            ),
            format_version: PLDM_PLATFORM_EVENT_FORMAT_VERSION,
            tid,
            event_class: event_class as u8,
            event_data,
        }
    }

    const FIXED_LEN: usize = PLDM_MSG_HEADER_LEN + 3;
}

impl PldmCodec for PlatformEventMessageRequest {
    fn encode(&self, buffer: &mut [u8]) -> Result<usize, PldmCodecError> {
        let bytes = Self::FIXED_LEN + self.event_data.len;
        if buffer.len() < bytes {
            return Err(PldmCodecError::BufferTooShort);
        }
        buffer[..PLDM_MSG_HEADER_LEN].copy_from_slice(&self.hdr.0);
        buffer[PLDM_MSG_HEADER_LEN] = self.format_version;
        buffer[PLDM_MSG_HEADER_LEN + 1] = self.tid;
        buffer[PLDM_MSG_HEADER_LEN + 2] = self.event_class;
        buffer[Self::FIXED_LEN..bytes].copy_from_slice(self.event_data.as_bytes());
        Ok(bytes)
    }

    fn decode(buffer: &[u8]) -> Result<Self, PldmCodecError> {
        if buffer.len() < Self::FIXED_LEN {
            return Err(PldmCodecError::BufferTooShort);
        }
        let data = &buffer[Self::FIXED_LEN..];
        if data.len() > PLDM_PLATFORM_EVENT_DATA_MAX {
            return Err(PldmCodecError::Unsupported);
        }
        let mut event_data = EventData {
            buf: [0u8; PLDM_PLATFORM_EVENT_DATA_MAX],
            len: data.len(),
        };
        event_data.buf[..data.len()].copy_from_slice(data);
        Ok(PlatformEventMessageRequest {
            hdr: PldmMsgHeader([buffer[0], buffer[1], buffer[2]]),
            format_version: buffer[PLDM_MSG_HEADER_LEN],
            tid: buffer[PLDM_MSG_HEADER_LEN + 1],
            event_class: buffer[PLDM_MSG_HEADER_LEN + 2],
            event_data,
        })
    }
}

#[derive(Debug, Clone, FromBytes, IntoBytes, Immutable, PartialEq)]
#[repr(C, packed)]
pub struct PlatformEventMessageResponse {
    pub hdr: PldmMsgHeader<[u8; PLDM_MSG_HEADER_LEN]>,
    pub completion_code: u8,
    pub platform_event_status: u8,
}

impl PlatformEventMessageResponse {
    pub fn new(instance_id: InstanceId, completion_code: u8, platform_event_status: u8) -> Self {
        PlatformEventMessageResponse {
            hdr: PldmMsgHeader::new(
                instance_id,
                PldmMsgType::Response,
                PldmSupportedType::Platform,
                PlatformCmd::PlatformEventMessage as u8,
            ),
            completion_code,
            platform_event_status,
        }
    }
}

impl_fixed_size_codec!(SetEventReceiverRequest, PlatformEventMessageResponse);

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_sensor_event_length_rules() {
        assert!(EventData::sensor(1, SensorEventClass::OpState, &[0, 1]).is_ok());
        assert!(EventData::sensor(1, SensorEventClass::OpState, &[0]).is_err());
        assert!(EventData::sensor(1, SensorEventClass::StateSensor, &[0, 1, 2]).is_ok());
        assert!(EventData::sensor(1, SensorEventClass::NumericSensor, &[0; 3]).is_err());
        assert!(EventData::sensor(1, SensorEventClass::NumericSensor, &[0; 7]).is_ok());
        assert!(EventData::sensor(1, SensorEventClass::NumericSensor, &[0; 8]).is_err());
        assert!(EventData::effecter(1, EffecterEventClass::OpState, &[1, 2]).is_ok());
        assert!(EventData::effecter(1, EffecterEventClass::OpState, &[1, 2, 3]).is_err());
    }

    #[test]
    fn test_platform_event_message_encode() {
        let data = EventData::sensor(0x0105, SensorEventClass::StateSensor, &[1, 2, 3]).unwrap();
        let req = PlatformEventMessageRequest::new(4, 0x01, EventClass::Sensor, data);
        let mut buffer = [0u8; 32];
        let len = req.encode(&mut buffer).unwrap();
        assert_eq!(
            &buffer[..len],
            &[0x84, 0x02, 0x0A, 0x01, 0x01, 0x00, 0x05, 0x01, 0x01, 0x01, 0x02, 0x03]
        );
        assert_eq!(PlatformEventMessageRequest::decode(&buffer[..len]).unwrap(), req);
    }
}
