// Licensed under the Apache-2.0 license

use num_enum::{IntoPrimitive, TryFromPrimitive};

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum PlatformCmd {
    SetEventReceiver = 0x04,
    PlatformEventMessage = 0x0A,
    GetSensorReading = 0x11,
    SetStateEffecterStates = 0x39,
    GetStateEffecterStates = 0x3A,
}

pub const PLDM_PLATFORM_INVALID_SENSOR_ID: u8 = 0x80;
pub const PLDM_PLATFORM_REARM_UNAVAILABLE_IN_PRESENT_STATE: u8 = 0x81;

pub const PLDM_PLATFORM_INVALID_EFFECTER_ID: u8 = 0x80;
pub const PLDM_PLATFORM_INVALID_STATE_VALUE: u8 = 0x81;
pub const PLDM_PLATFORM_UNSUPPORTED_EFFECTERSTATE: u8 = 0x82;
pub const PLDM_PLATFORM_INVALID_EFFECTER_STATE_ID: u8 = 0x83;
pub const PLDM_PLATFORM_SET_EFFECTER_UNSUPPORTED_SENSORSTATE: u8 = 0x85;

pub const PLDM_PLATFORM_INVALID_PROTOCOL_TYPE: u8 = 0x80;

pub const PLDM_PLATFORM_EVENT_FORMAT_VERSION: u8 = 0x01;
pub const PLDM_EVENT_DATA_MAX_LEN: usize = 7;
pub const PLDM_EVENT_QUEUE_DEPTH: usize = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum SensorDataSize {
    Uint8 = 0,
    Sint8 = 1,
    Uint16 = 2,
    Sint16 = 3,
    Uint32 = 4,
    Sint32 = 5,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum SensorOperationalState {
    Enabled = 0,
    Disabled = 1,
    Unavailable = 2,
    StatusUnknown = 3,
    Failed = 4,
    Initializing = 5,
    ShuttingDown = 6,
    InTest = 7,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum SensorEventMessageEnable {
    NoEventGeneration = 0,
    EventsDisabled = 1,
    EventsEnabled = 2,
    OpEventsOnlyEnabled = 3,
    StateEventsOnlyEnabled = 4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum SensorState {
    Unknown = 0,
    Normal = 1,
    Warning = 2,
    Critical = 3,
    Fatal = 4,
    LowerWarning = 5,
    LowerCritical = 6,
    LowerFatal = 7,
    UpperWarning = 8,
    UpperCritical = 9,
    UpperFatal = 10,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum EventMessageGlobalEnable {
    Disable = 0,
    EnableAsync = 1,
    EnablePolling = 2,
    EnableAsyncKeepAlive = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum TransportProtocolType {
    Mctp = 0,
    NcSi = 1,
    Vendor = 0xFF,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum EventClass {
    Sensor = 0x00,
    Effecter = 0x01,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum SensorEventClass {
    OpState = 0x00,
    StateSensor = 0x01,
    NumericSensor = 0x02,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum EffecterEventClass {
    OpState = 0x00,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum PlatformEventStatus {
    NoLogging = 0,
    LoggingDisabled = 1,
    LogFull = 2,
    AcceptedForLogging = 3,
    Logged = 4,
    LoggingRejected = 5,
}

/// Effecter ids carry their type in the high byte.
pub const PLDM_EFFECTER_TYPE_GPIO: u8 = 0xFF;
pub const PLDM_GPIO_EFFECTER_STATE_FIELD_COUNT: u8 = 2;
pub const PLDM_STATE_EFFECTER_MAX_COMPOSITE: u8 = 8;
pub const PLDM_MAX_GPIO_PIN: u16 = 167;

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum EffecterSetRequest {
    NoChange = 0,
    RequestSet = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum EffecterOperationalState {
    EnabledUpdatePending = 0,
    EnabledNoUpdatePending = 1,
    Disabled = 2,
    Unavailable = 3,
    StatusUnknown = 4,
    Failed = 5,
    Initializing = 6,
    ShuttingDown = 7,
    InTest = 8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum GpioDirectionState {
    Unknown = 0,
    Input = 1,
    Output = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum GpioValueState {
    Unknown = 0,
    Low = 1,
    High = 2,
}
