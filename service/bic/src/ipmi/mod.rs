// Licensed under the Apache-2.0 license

//! IPMI command handling.
//!
//! Requests reach the dispatcher from the IPMB channels and from the PLDM
//! OEM bridge. Each request travels with a [`ReplyRoute`] telling the
//! dispatcher where its answer goes.

pub mod app;
pub mod dispatcher;
pub mod oem;
pub mod oem_1s;
pub mod sensor;
pub mod storage;

use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};

use bic_sensor::{lock, PollControl, PowerState, SdrRepository, SensorTable};
use ipmi_common::protocol::{CompletionCode, IpmiMsg};
use log::warn;

use crate::config::DeviceConfig;
use crate::error::{Result, ServiceError};
use crate::ipmb::{ChannelRouter, IpmbChannel};
use crate::platform::Platform;
use crate::pldm::service::PldmContext;

pub use dispatcher::{dispatch, IpmiDispatcher};

/// What a command handler produces: the response data, or the completion
/// code of a failed command.
pub type IpmiResult = core::result::Result<Vec<u8>, CompletionCode>;

/// Where the response to a request is delivered.
#[derive(Clone)]
pub enum ReplyRoute {
    /// Back out of the IPMB channel the request arrived on.
    Ipmb(Arc<IpmbChannel>),
    /// As the response to a PLDM OEM IPMI bridge request.
    Pldm(PldmContext),
    /// To a caller inside the service.
    Local(Sender<IpmiMsg>),
}

impl ReplyRoute {
    /// Delivers `resp`, which still carries the request's netfn.
    pub fn reply(&self, resp: &IpmiMsg) -> Result<()> {
        match self {
            ReplyRoute::Ipmb(channel) => channel.send_response(resp),
            ReplyRoute::Pldm(ctx) => crate::pldm::oem::send_ipmi_bridge_response(ctx, resp),
            ReplyRoute::Local(tx) => tx.send(resp.clone()).map_err(|_| ServiceError::ChannelClosed),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            ReplyRoute::Ipmb(channel) => format!("ipmb {}", channel.name()),
            ReplyRoute::Pldm(ctx) => format!("pldm {:#04x}", ctx.ext.ep),
            ReplyRoute::Local(_) => "local".into(),
        }
    }
}

#[derive(Clone, Default)]
pub enum IpmiEvent {
    #[default]
    Stop,
    Request(IpmiMsg, ReplyRoute),
}

/// State shared by every command handler.
pub struct IpmiContext {
    pub device: DeviceConfig,
    pub system_guid: Mutex<[u8; 16]>,
    pub platform: Arc<dyn Platform>,
    pub sensors: Arc<Mutex<SensorTable>>,
    pub sdr: Arc<Mutex<SdrRepository>>,
    pub poll: Arc<PollControl>,
    pub channels: Arc<ChannelRouter>,
    pub host_power_sensor: Option<u8>,
}

impl IpmiContext {
    pub fn new(
        device: DeviceConfig,
        platform: Arc<dyn Platform>,
        sensors: Arc<Mutex<SensorTable>>,
        sdr: Arc<Mutex<SdrRepository>>,
        poll: Arc<PollControl>,
        channels: Arc<ChannelRouter>,
    ) -> Self {
        IpmiContext {
            system_guid: Mutex::new(device.system_guid),
            device,
            platform,
            sensors,
            sdr,
            poll,
            channels,
            host_power_sensor: None,
        }
    }

    pub fn with_host_power_sensor(mut self, sensor: Option<u8>) -> Self {
        self.host_power_sensor = sensor;
        self
    }

    pub fn power(&self) -> Arc<PowerState> {
        lock(&self.sensors).power().clone()
    }
}

/// Fails with `InvalidLength` unless the request carries no data.
pub(crate) fn expect_empty(msg: &IpmiMsg) -> core::result::Result<(), CompletionCode> {
    if msg.data.is_empty() {
        Ok(())
    } else {
        Err(CompletionCode::InvalidLength)
    }
}

pub(crate) fn expect_len(msg: &IpmiMsg, len: usize) -> core::result::Result<(), CompletionCode> {
    if msg.data.len() == len {
        Ok(())
    } else {
        Err(CompletionCode::InvalidLength)
    }
}

pub(crate) fn invalid_cmd(msg: &IpmiMsg) -> IpmiResult {
    warn!("Invalid IPMI command netfn {:#04x} cmd {:#04x}", msg.netfn, msg.cmd);
    Err(CompletionCode::InvalidCmd)
}

#[cfg(test)]
pub(crate) mod test_util {
    use super::*;
    use crate::config::ServiceConfig;
    use crate::platform::SimulatedPlatform;
    use bic_sensor::access::AccessChecker;
    use bic_sensor::dev::SensorTarget;
    use bic_sensor::table::{SensorConfig, SensorStatus};
    use bic_sensor::{SdrFullSensor, SensorVal};

    pub struct Fixture {
        pub ctx: IpmiContext,
        pub platform: Arc<SimulatedPlatform>,
    }

    /// Context with sensors 0x10 (temperature, 25.5) and 0x11 (still
    /// initialising), both with SDRs, and no IPMB channels.
    pub fn fixture() -> Fixture {
        let power = Arc::new(PowerState::new());
        let mut table = SensorTable::new(power, 4);
        let mut cfg = SensorConfig::new(0x10, SensorTarget::new(0, 0x4C, 0), AccessChecker::Stby);
        cfg.cache = SensorVal::new(25, 500).to_reading();
        cfg.cache_status = SensorStatus::FourByteAcurSuccess;
        table.add_sensor_config(cfg);
        table.add_sensor_config(SensorConfig::new(
            0x11,
            SensorTarget::new(0, 0x4D, 0),
            AccessChecker::Stby,
        ));
        let sdr = SdrRepository::new(vec![
            SdrFullSensor::new(0x10, 0x01).with_id_str("MB_INLET_TEMP"),
            SdrFullSensor::new(0x11, 0x01).with_id_str("MB_OUTLET_TEMP"),
        ]);

        let platform = Arc::new(SimulatedPlatform::new(2));
        let config = ServiceConfig::default();
        let ctx = IpmiContext::new(
            config.device,
            platform.clone(),
            Arc::new(Mutex::new(table)),
            Arc::new(Mutex::new(sdr)),
            Arc::new(PollControl::new(true)),
            Arc::new(ChannelRouter::new(Vec::new())),
        );
        Fixture { ctx, platform }
    }

    pub fn request(netfn: u8, cmd: u8, data: &[u8]) -> IpmiMsg {
        IpmiMsg::request(netfn, cmd, data)
    }
}
