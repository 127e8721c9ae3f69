// Licensed under the Apache-2.0 license

use crate::codec::impl_fixed_size_codec;
use crate::protocol::base::{
    InstanceId, PldmMsgHeader, PldmMsgType, PldmSupportedType, PLDM_MSG_HEADER_LEN,
};
use crate::protocol::platform::{
    PlatformCmd, SensorDataSize, SensorEventMessageEnable, SensorOperationalState, SensorState,
};
use zerocopy::{FromBytes, Immutable, IntoBytes};

#[derive(Debug, Clone, FromBytes, IntoBytes, Immutable, PartialEq)]
#[repr(C, packed)]
pub struct GetSensorReadingRequest {
    pub hdr: PldmMsgHeader<[u8; PLDM_MSG_HEADER_LEN]>,
    pub sensor_id: u16,
    pub rearm_event_state: u8,
}

impl GetSensorReadingRequest {
    pub fn new(instance_id: InstanceId, sensor_id: u16, rearm_event_state: bool) -> Self {
        GetSensorReadingRequest {
            hdr: PldmMsgHeader::new(
                instance_id,
                PldmMsgType::Request,
                PldmSupportedType::Platform,
                PlatformCmd::GetSensorReading as u8,
            ),
            sensor_id,
            rearm_event_state: rearm_event_state as u8,
        }
    }
}

/// GetSensorReading response for a `uint32` sized reading.
#[derive(Debug, Clone, FromBytes, IntoBytes, Immutable, PartialEq)]
#[repr(C, packed)]
pub struct GetSensorReadingResponse {
    pub hdr: PldmMsgHeader<[u8; PLDM_MSG_HEADER_LEN]>,
    pub completion_code: u8,
    pub sensor_data_size: u8,
    pub sensor_operational_state: u8,
    pub sensor_event_message_enable: u8,
    pub present_state: u8,
    pub previous_state: u8,
    pub event_state: u8,
    pub present_reading: i32,
}

impl GetSensorReadingResponse {
    pub fn new(
        req_hdr: &PldmMsgHeader<[u8; PLDM_MSG_HEADER_LEN]>,
        completion_code: u8,
        op_state: SensorOperationalState,
        state: SensorState,
        present_reading: i32,
    ) -> Self {
        GetSensorReadingResponse {
            hdr: req_hdr.into_response(),
            completion_code,
            sensor_data_size: SensorDataSize::Uint32 as u8,
            sensor_operational_state: op_state as u8,
            sensor_event_message_enable: SensorEventMessageEnable::EventsDisabled as u8,
            present_state: state as u8,
            previous_state: state as u8,
            event_state: state as u8,
            present_reading,
        }
    }
}

impl_fixed_size_codec!(GetSensorReadingRequest, GetSensorReadingResponse);
