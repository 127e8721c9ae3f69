// Licensed under the Apache-2.0 license

//! Service configuration, read from a TOML file.
//!
//! Every field has a default so an empty file yields a working single-port
//! BIC talking to a BMC.

use std::path::Path;

use ipmi_common::protocol::Channel;
use log::LevelFilter;
use mctp_common::protocol::MCTP_DEFAULT_EID;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ServiceError};

pub const DEFAULT_PLDM_TID: u8 = 0x01;
pub const DEFAULT_PLDM_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_PLDM_RETRIES: u8 = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub log_level: String,
    pub mctp: MctpConfig,
    pub pldm: PldmConfig,
    pub ipmb: IpmbConfig,
    pub sensor: SensorPollConfig,
    pub device: DeviceConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            log_level: "info".into(),
            mctp: MctpConfig::default(),
            pldm: PldmConfig::default(),
            ipmb: IpmbConfig::default(),
            sensor: SensorPollConfig::default(),
            device: DeviceConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MctpConfig {
    pub eid: u8,
    pub port: Vec<PortConfig>,
    pub route: Vec<RouteConfig>,
}

impl Default for MctpConfig {
    fn default() -> Self {
        MctpConfig {
            eid: MCTP_DEFAULT_EID,
            port: vec![PortConfig::default()],
            route: Vec::new(),
        }
    }
}

/// One SMBus port the BIC owns an MCTP instance on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortConfig {
    pub name: String,
    pub bus: u8,
    /// Own 7-bit address on this bus.
    pub addr: u8,
    /// IPMI channel of the peer, used when bridging IPMI over PLDM.
    pub channel_target: u8,
    pub medium: String,
}

impl Default for PortConfig {
    fn default() -> Self {
        PortConfig {
            name: "bmc".into(),
            bus: 0,
            addr: 0x20,
            channel_target: Channel::BmcIpmb.into(),
            medium: "smbus".into(),
        }
    }
}

/// Static route to a remote endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteConfig {
    pub eid: u8,
    pub port: String,
    pub addr: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PldmConfig {
    pub tid: u8,
    pub response_timeout_ms: u64,
    pub retries: u8,
}

impl Default for PldmConfig {
    fn default() -> Self {
        PldmConfig {
            tid: DEFAULT_PLDM_TID,
            response_timeout_ms: DEFAULT_PLDM_TIMEOUT_MS,
            retries: DEFAULT_PLDM_RETRIES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IpmbConfig {
    /// Own 7-bit address on every IPMB bus.
    pub self_addr: u8,
    pub retries: u8,
    pub retry_delay_ms: u64,
    pub seq_timeout_ms: u64,
    pub channel: Vec<IpmbChannelConfig>,
}

impl Default for IpmbConfig {
    fn default() -> Self {
        IpmbConfig {
            self_addr: 0x20,
            retries: ipmi_common::protocol::IPMB_TX_RETRY_TIME,
            retry_delay_ms: ipmi_common::protocol::IPMB_RETRY_DELAY_MS,
            seq_timeout_ms: ipmi_common::protocol::IPMB_SEQ_TIMEOUT_MS,
            channel: vec![IpmbChannelConfig::default()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IpmbChannelConfig {
    pub name: String,
    pub channel: u8,
    pub bus: u8,
    /// 7-bit address of the device at the other end.
    pub target_addr: u8,
}

impl Default for IpmbChannelConfig {
    fn default() -> Self {
        IpmbChannelConfig {
            name: "bmc".into(),
            channel: Channel::BmcIpmb.into(),
            bus: 7,
            target_addr: 0x10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorPollConfig {
    pub interval_ms: u64,
    pub start_delay_ms: u64,
    pub poll_enable: bool,
    /// Sensor answered by the NM sensor read OEM command.
    pub host_power_sensor: Option<u8>,
}

impl Default for SensorPollConfig {
    fn default() -> Self {
        SensorPollConfig {
            interval_ms: bic_sensor::poller::SENSOR_POLL_INTERVAL_MS,
            start_delay_ms: bic_sensor::poller::SENSOR_POLL_START_DELAY_MS,
            poll_enable: true,
            host_power_sensor: None,
        }
    }
}

/// Identity reported by GetDeviceId, GetSystemGuid and GetFwVersion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub device_id: u8,
    pub device_rev: u8,
    pub fw_rev1: u8,
    pub fw_rev2: u8,
    pub ipmi_version: u8,
    pub additional_support: u8,
    pub product_id: u16,
    pub aux_fw_rev: u32,
    pub system_guid: [u8; 16],
    pub fw_year: u16,
    pub fw_week: u8,
    pub fw_version: u8,
    pub fw_platform: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            device_id: 0x00,
            device_rev: 0x80,
            fw_rev1: 0x01,
            fw_rev2: 0x00,
            ipmi_version: 0x02,
            additional_support: 0xBF,
            product_id: 0x0000,
            aux_fw_rev: 0x0000_0000,
            system_guid: [0; 16],
            fw_year: 2024,
            fw_week: 1,
            fw_version: 1,
            fw_platform: "bic".into(),
        }
    }
}

impl ServiceConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ServiceError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: ServiceConfig =
            toml::from_str(text).map_err(|e| ServiceError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| ServiceError::Config(e.to_string()))
    }

    pub fn log_level(&self) -> Result<LevelFilter> {
        self.log_level
            .parse()
            .map_err(|_| ServiceError::Config(format!("unknown log level {}", self.log_level)))
    }

    fn validate(&self) -> Result<()> {
        self.log_level()?;
        for port in &self.mctp.port {
            if port.medium != "smbus" {
                return Err(ServiceError::Config(format!(
                    "port {}: unsupported medium {}",
                    port.name, port.medium
                )));
            }
        }
        for route in &self.mctp.route {
            if !self.mctp.port.iter().any(|p| p.name == route.port) {
                return Err(ServiceError::Config(format!(
                    "route to {:#04x}: unknown port {}",
                    route.eid, route.port
                )));
            }
        }
        for ch in &self.ipmb.channel {
            if Channel::try_from(ch.channel).is_err() {
                return Err(ServiceError::Config(format!(
                    "ipmb channel {}: unknown channel {:#04x}",
                    ch.name, ch.channel
                )));
            }
        }
        Ok(())
    }
}
