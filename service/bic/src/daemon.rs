// Licensed under the Apache-2.0 license

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bic_sensor::{
    lock, PollControl, PowerState, SdrFullSensor, SdrRepository, SensorConfig, SensorPoller,
    SensorTable,
};
use ipmi_common::protocol::IpmiMsg;
use log::{error, info};
use mctp_common::protocol::MessageType;

use crate::config::ServiceConfig;
use crate::error::{Result, ServiceError};
use crate::event_queue::EventQueue;
use crate::ipmb::{ChannelRouter, IpmbChannel};
use crate::ipmi::{IpmiContext, IpmiDispatcher, IpmiEvent, ReplyRoute};
use crate::mctp::{EndpointResolver, MctpInstance, MessageRouter};
use crate::mctp_ctrl::MctpCtrlService;
use crate::platform::Platform;
use crate::pldm::sensor::{spawn_sensor_monitor, PLDM_SENSOR_POLL_INTERVAL};
use crate::pldm::{
    BaseResponder, FwUpdateResponder, MonitorResponder, NumericSensorPdr, OemResponder,
    PlatformEvents, PldmSensorList, PldmService, SmbiosResponder, SmbiosTable,
};
use crate::ticker::Ticker;
use crate::transport::SmbusTransport;

/// SMBus transports by bus number. Each bus carries either MCTP or IPMB,
/// never both.
#[derive(Default, Clone)]
pub struct Transports {
    buses: HashMap<u8, Arc<dyn SmbusTransport>>,
}

impl Transports {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bus(mut self, bus: u8, transport: Arc<dyn SmbusTransport>) -> Self {
        self.buses.insert(bus, transport);
        self
    }

    fn claim(&mut self, bus: u8, user: &str) -> Result<Arc<dyn SmbusTransport>> {
        self.buses.remove(&bus).ok_or_else(|| {
            ServiceError::Config(format!("{}: bus {} missing or already in use", user, bus))
        })
    }
}

/// Board sensors. Each sensor config should have a matching SDR record,
/// otherwise the poller is not started. PLDM numeric sensors are polled
/// separately and report op state changes as platform events.
#[derive(Default)]
pub struct Options {
    pub sensors: Vec<SensorConfig>,
    pub sdr: Vec<SdrFullSensor>,
    pub pldm_sensors: Vec<(NumericSensorPdr, SensorConfig)>,
}

/// `BicDaemon` owns every service thread of the BIC: the MCTP ports with
/// the control and PLDM services above them, the IPMB channels, the IPMI
/// dispatcher and the sensor poller.
pub struct BicDaemon {
    instances: Vec<MctpInstance>,
    ctrl: Arc<MctpCtrlService>,
    pldm: Arc<PldmService>,
    events: Arc<PlatformEvents>,
    smbios: Arc<SmbiosTable>,
    pldm_sensors: Arc<Mutex<PldmSensorList>>,
    sensor_monitor: Option<Ticker>,
    channels: Arc<ChannelRouter>,
    dispatcher: IpmiDispatcher,
    ipmi_queue: EventQueue<IpmiEvent>,
    ipmi: Arc<IpmiContext>,
    poller: SensorPoller,
    running: bool,
}

impl BicDaemon {
    /// Builds and starts every service described by `config`.
    ///
    /// Fails without starting anything when the configuration names a bus
    /// that `transports` does not provide.
    pub fn run(
        config: &ServiceConfig,
        mut transports: Transports,
        platform: Arc<dyn Platform>,
        opts: Options,
    ) -> Result<Self> {
        info!("BicDaemon is starting...");

        // Claim every bus up front so a bad config starts nothing.
        let mut ports = Vec::new();
        for port in &config.mctp.port {
            let transport = transports.claim(port.bus, &port.name)?;
            ports.push(MctpInstance::new(&port.name, transport, port.addr, config.mctp.eid));
        }
        let mut ipmb = Vec::new();
        for ch in &config.ipmb.channel {
            let transport = transports.claim(ch.bus, &ch.name)?;
            ipmb.push(IpmbChannel::new(&config.ipmb, ch.clone(), transport));
        }

        let resolver = Arc::new(EndpointResolver::new());
        for route in &config.mctp.route {
            let inst = ports
                .iter()
                .find(|inst| inst.name() == route.port)
                .ok_or_else(|| {
                    ServiceError::Config(format!(
                        "route to {:#04x}: unknown port {}",
                        route.eid, route.port
                    ))
                })?;
            resolver.add_route(route.eid, inst, route.addr);
        }

        // Sensors.
        let power = Arc::new(PowerState::new());
        let sdr = SdrRepository::new(opts.sdr);
        let mut table = SensorTable::new(power.clone(), sdr.len());
        for sensor in opts.sensors {
            table.add_sensor_config(sensor);
        }
        table.init_drivers();
        let sensors = Arc::new(Mutex::new(table));
        let sdr = Arc::new(Mutex::new(sdr));
        let poll = Arc::new(PollControl::new(config.sensor.poll_enable));
        let poller = SensorPoller::spawn(
            sensors.clone(),
            sdr.clone(),
            poll.clone(),
            Duration::from_millis(config.sensor.interval_ms),
            Duration::from_millis(config.sensor.start_delay_ms),
        );

        // IPMI.
        let channels = Arc::new(ChannelRouter::new(ipmb));
        let ipmi = Arc::new(
            IpmiContext::new(
                config.device.clone(),
                platform.clone(),
                sensors.clone(),
                sdr,
                poll,
                channels.clone(),
            )
            .with_host_power_sensor(config.sensor.host_power_sensor),
        );
        let dispatcher = IpmiDispatcher::run(ipmi.clone());
        let ipmi_queue = dispatcher.queue().ok_or(ServiceError::ChannelClosed)?;

        // MCTP control and PLDM.
        let ctrl = MctpCtrlService::new(vec![MessageType::Control, MessageType::Pldm]);
        let pldm = PldmService::new(&config.pldm, resolver.clone());
        let events = PlatformEvents::new(&pldm);
        let smbios = Arc::new(SmbiosTable::new());
        let pldm_sensors = Arc::new(Mutex::new(PldmSensorList::new(power, opts.pldm_sensors)));
        pldm.register(Arc::new(BaseResponder));
        pldm.register(Arc::new(SmbiosResponder::new(smbios.clone())));
        pldm.register(Arc::new(
            MonitorResponder::new(sensors, platform.clone(), events.clone())
                .with_pldm_sensors(pldm_sensors.clone()),
        ));
        pldm.register(FwUpdateResponder::new(platform));
        pldm.register(Arc::new(OemResponder::new(ipmi_queue.clone())));

        let router = Arc::new(MessageRouter::new());
        router.register(MessageType::Control, ctrl.clone());
        router.register(MessageType::Pldm, pldm.clone());

        ctrl.start();
        pldm.start();
        channels.start(&ipmi_queue);
        for inst in &ports {
            ctrl.add_instance(inst);
            inst.start(router.clone(), resolver.clone());
        }
        let sensor_monitor = if lock(&pldm_sensors).is_empty() {
            None
        } else {
            Some(spawn_sensor_monitor(
                pldm_sensors.clone(),
                events.clone(),
                PLDM_SENSOR_POLL_INTERVAL,
            ))
        };
        info!(
            "BicDaemon running: {} MCTP port(s), {} IPMB channel(s), EID {:#04x}",
            ports.len(),
            channels.channels().len(),
            config.mctp.eid
        );

        Ok(BicDaemon {
            instances: ports,
            ctrl,
            pldm,
            events,
            smbios,
            pldm_sensors,
            sensor_monitor,
            channels,
            dispatcher,
            ipmi_queue,
            ipmi,
            poller,
            running: true,
        })
    }

    pub fn pldm(&self) -> &Arc<PldmService> {
        &self.pldm
    }

    pub fn events(&self) -> &Arc<PlatformEvents> {
        &self.events
    }

    /// SMBIOS structures served to the BMC, BIOS Information at handle 0.
    pub fn smbios(&self) -> &Arc<SmbiosTable> {
        &self.smbios
    }

    pub fn pldm_sensors(&self) -> &Arc<Mutex<PldmSensorList>> {
        &self.pldm_sensors
    }

    pub fn instances(&self) -> &[MctpInstance] {
        &self.instances
    }

    pub fn channels(&self) -> &Arc<ChannelRouter> {
        &self.channels
    }

    pub fn ipmi(&self) -> &Arc<IpmiContext> {
        &self.ipmi
    }

    pub fn is_polling(&self) -> bool {
        self.poller.is_running()
    }

    /// Runs `msg` through the IPMI dispatcher as if it arrived on the BIC
    /// itself. The response goes to `route`.
    pub fn submit_ipmi(&self, msg: IpmiMsg, route: ReplyRoute) -> Result<()> {
        self.ipmi_queue.enqueue(IpmiEvent::Request(msg, route))
    }

    /// Stops every service. Inbound traffic stops first so nothing new
    /// reaches the dispatcher while it shuts down.
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.running = false;
        for inst in &self.instances {
            inst.stop();
        }
        self.channels.stop();
        self.dispatcher.stop();
        if let Some(mut monitor) = self.sensor_monitor.take() {
            monitor.stop();
        }
        self.events.stop();
        self.pldm.stop();
        self.ctrl.stop();
        self.poller.stop();
        if self.channels.channels().iter().any(|c| c.is_running()) {
            error!("IPMB channel still running after stop");
        }
        info!("BicDaemon stopped");
    }
}

impl Drop for BicDaemon {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::platform::SimulatedPlatform;
    use crate::transport::MockSmbusBus;

    #[test]
    fn test_missing_bus_is_a_config_error() {
        let config = ServiceConfig::default();
        let platform = Arc::new(SimulatedPlatform::new(1));
        let res = BicDaemon::run(&config, Transports::new(), platform, Options::default());
        assert!(matches!(res, Err(ServiceError::Config(_))));
    }

    #[test]
    fn test_bus_cannot_carry_mctp_and_ipmb() {
        let mut config = ServiceConfig::default();
        config.ipmb.channel[0].bus = config.mctp.port[0].bus;
        let bus = MockSmbusBus::new();
        let transports = Transports::new().with_bus(0, Arc::new(bus.attach(0x20)));
        let platform = Arc::new(SimulatedPlatform::new(1));
        let res = BicDaemon::run(&config, transports, platform, Options::default());
        assert!(matches!(res, Err(ServiceError::Config(_))));
    }

    #[test]
    fn test_run_and_stop() {
        let config = ServiceConfig::default();
        let mctp = MockSmbusBus::new();
        let ipmb = MockSmbusBus::new();
        let transports = Transports::new()
            .with_bus(config.mctp.port[0].bus, Arc::new(mctp.attach(0x20)))
            .with_bus(config.ipmb.channel[0].bus, Arc::new(ipmb.attach(0x20)));
        let platform = Arc::new(SimulatedPlatform::new(1));

        let mut daemon = BicDaemon::run(&config, transports, platform, Options::default()).unwrap();
        assert_eq!(daemon.instances().len(), 1);
        assert!(daemon.instances()[0].is_running());
        assert!(daemon.channels().channels()[0].is_running());
        assert_eq!(daemon.pldm().tid(), config.pldm.tid);

        daemon.stop();
        assert!(!daemon.instances()[0].is_running());
        assert!(!daemon.channels().channels()[0].is_running());
        let (tx, _rx) = std::sync::mpsc::channel();
        assert!(daemon
            .submit_ipmi(IpmiMsg::request(0x06, 0x01, &[]), ReplyRoute::Local(tx))
            .is_err());
    }
}
