// Licensed under the Apache-2.0 license

use heapless::Vec;
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// IANA enterprise number carried in front of OEM payloads (little-endian).
pub const IANA_ID: u32 = 0x00A015;
pub const IANA_LEN: usize = 3;

pub const IPMI_DATA_MAX_LENGTH: usize = 520;
pub const IPMB_REQ_HEADER_LENGTH: usize = 6;
pub const IPMB_RESP_HEADER_LENGTH: usize = 7;

pub const IPMB_NETFN_MASK: u8 = 0xFC;
pub const IPMB_LUN_MASK: u8 = 0x03;
pub const IPMB_SEQ_NUM: u8 = 64;
pub const IPMB_SEQ_MASK: u8 = 0x3F;
pub const IPMB_MAX_PENDING: usize = 15;
pub const IPMB_TX_RETRY_TIME: u8 = 5;
pub const IPMB_RETRY_DELAY_MS: u64 = 500;
pub const IPMB_SEQ_TIMEOUT_MS: u64 = 1000;

pub type IpmiData = Vec<u8, IPMI_DATA_MAX_LENGTH>;

pub fn iana_bytes() -> [u8; IANA_LEN] {
    let b = IANA_ID.to_le_bytes();
    [b[0], b[1], b[2]]
}

pub fn iana_matches(buf: &[u8]) -> bool {
    buf.len() >= IANA_LEN && buf[..IANA_LEN] == iana_bytes()
}

// Network function codes. Responses are the request code + 1.
pub const NETFN_CHASSIS_REQ: u8 = 0x00;
pub const NETFN_BRIDGE_REQ: u8 = 0x02;
pub const NETFN_SENSOR_REQ: u8 = 0x04;
pub const NETFN_APP_REQ: u8 = 0x06;
pub const NETFN_FIRMWARE_REQ: u8 = 0x08;
pub const NETFN_STORAGE_REQ: u8 = 0x0A;
pub const NETFN_TRANSPORT_REQ: u8 = 0x0C;
pub const NETFN_DCMI_REQ: u8 = 0x2C;
pub const NETFN_NM_REQ: u8 = 0x2E;
pub const NETFN_OEM_REQ: u8 = 0x30;
pub const NETFN_OEM_1S_REQ: u8 = 0x38;

pub fn is_response(netfn: u8) -> bool {
    netfn & 0x01 != 0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum CompletionCode {
    Success = 0x00,
    InvalidParam = 0x80,
    FruDevBusy = 0x81,
    BridgeMsgErr = 0x82,
    I2cBusError = 0x83,
    InvalidIana = 0x84,
    NodeBusy = 0xC0,
    InvalidCmd = 0xC1,
    InvalidLun = 0xC2,
    Timeout = 0xC3,
    OutOfSpace = 0xC4,
    InvalidReservation = 0xC5,
    DataTruncated = 0xC6,
    InvalidLength = 0xC7,
    LengthExceeded = 0xC8,
    ParamOutOfRange = 0xC9,
    SensorNotPresent = 0xCB,
    InvalidDataField = 0xCC,
    CanNotRespond = 0xCE,
    NotSuppInCurrState = 0xD5,
    UnspecifiedError = 0xFF,
}

/// Interfaces a message can come from or be bridged to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum Channel {
    /// Requests issued by the BIC itself.
    Local = 0x00,
    MeIpmb = 0x01,
    BmcIpmb = 0x02,
    HostKcs = 0x03,
    ServerIpmb = 0x04,
    Exp1Ipmb = 0x05,
    Slot1Bic = 0x07,
    Slot3Bic = 0x08,
    BbIpmb = 0x10,
    Exp2Ipmb = 0x15,
    ClBicIpmb = 0x16,
    PeerBmcIpmb = 0x1A,
    BmcUsb = 0x20,
    Pldm = 0x40,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum AppCmd {
    GetDeviceId = 0x01,
    ColdReset = 0x02,
    WarmReset = 0x03,
    GetSelftestResults = 0x04,
    SetAcpiPower = 0x06,
    ClearMessageFlags = 0x30,
    GetBmcGlobalEnables = 0x2F,
    GetSystemGuid = 0x37,
    GetChannelInfo = 0x42,
    MasterWriteRead = 0x52,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum SensorCmd {
    GetSensorReading = 0x2D,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum StorageCmd {
    GetFruidInfo = 0x10,
    ReadFruidData = 0x11,
    WriteFruidData = 0x12,
    RsvSdr = 0x22,
    GetSdr = 0x23,
    GetSelInfo = 0x40,
    RsvSel = 0x42,
    GetSel = 0x43,
    AddSel = 0x44,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum OemCmd {
    NmSensorRead = 0xE2,
    SetSystemGuid = 0xEF,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum Oem1sCmd {
    MsgIn = 0x01,
    MsgOut = 0x02,
    GetGpio = 0x03,
    SetGpio = 0x04,
    GetFwVersion = 0x0B,
    SetVrMonitorStatus = 0x14,
    GetVrMonitorStatus = 0x15,
    AccuracySensorReading = 0x23,
    SensorPollEn = 0x30,
    GetBicStatus = 0x31,
    ResetBic = 0x32,
    GetSetGpio = 0x41,
}

/// MSG_IN/MSG_OUT are answered by the bridged target, not by the dispatcher.
pub fn is_not_return_cmd(netfn: u8, cmd: u8) -> bool {
    netfn == NETFN_OEM_1S_REQ
        && (cmd == u8::from(Oem1sCmd::MsgOut) || cmd == u8::from(Oem1sCmd::MsgIn))
}

/// One IPMI message as it moves between interfaces.
///
/// `dest_addr` and `src_addr` are 8-bit slave addresses as they appear in
/// the IPMB frame. `seq_source` and `seq_target` keep the sequence numbers
/// on either side of a bridge; `inf_source` and `inf_target` are raw
/// [`Channel`] values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IpmiMsg {
    pub dest_addr: u8,
    pub netfn: u8,
    pub dest_lun: u8,
    pub src_addr: u8,
    pub seq: u8,
    pub src_lun: u8,
    pub cmd: u8,
    pub completion_code: u8,
    pub seq_source: u8,
    pub seq_target: u8,
    pub inf_source: u8,
    pub inf_target: u8,
    pub data: IpmiData,
}

impl IpmiMsg {
    pub fn request(netfn: u8, cmd: u8, data: &[u8]) -> Self {
        let mut msg = IpmiMsg {
            netfn,
            cmd,
            ..Default::default()
        };
        msg.set_data(data);
        msg
    }

    pub fn is_response(&self) -> bool {
        is_response(self.netfn)
    }

    pub fn set_cc(&mut self, cc: CompletionCode) {
        self.completion_code = cc.into();
    }

    /// Replaces the payload, truncating to the IPMI data limit.
    pub fn set_data(&mut self, data: &[u8]) {
        self.data.clear();
        let len = data.len().min(IPMI_DATA_MAX_LENGTH);
        // Cannot fail after truncation.
        let _ = self.data.extend_from_slice(&data[..len]);
    }

    pub fn source(&self) -> Option<Channel> {
        Channel::try_from(self.inf_source).ok()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_not_return_cmds() {
        assert!(is_not_return_cmd(NETFN_OEM_1S_REQ, 0x01));
        assert!(is_not_return_cmd(NETFN_OEM_1S_REQ, 0x02));
        assert!(!is_not_return_cmd(NETFN_OEM_1S_REQ, 0x31));
        assert!(!is_not_return_cmd(NETFN_APP_REQ, 0x02));
    }

    #[test]
    fn test_set_data_truncates() {
        let mut msg = IpmiMsg::request(NETFN_APP_REQ, 0x01, &[]);
        msg.set_data(&[0xAA; IPMI_DATA_MAX_LENGTH + 10]);
        assert_eq!(msg.data.len(), IPMI_DATA_MAX_LENGTH);
        assert!(!msg.is_response());
        assert_eq!(iana_bytes(), [0x15, 0xA0, 0x00]);
        assert!(iana_matches(&[0x15, 0xA0, 0x00, 0x01]));
        assert!(!iana_matches(&[0x15, 0xA0]));
    }
}
