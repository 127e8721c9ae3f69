// Licensed under the Apache-2.0 license

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bic_sensor::dev::ina230::{INA230_BUS_VOL_OFFSET, INA230_PWR_OFFSET};
use bic_sensor::dev::nct214::{
    NCT214_CONFIG_READ_REG, NCT214_LOCAL_TEMP_REG, NCT214_OFFSET_LOCAL, NCT214_OFFSET_REMOTE,
    NCT214_REMOTE_TEMP_LOWER_REG, NCT214_REMOTE_TEMP_UPPER_REG,
};
use bic_sensor::dev::{Ina230, Ina230Config, Nct214, SensorTarget};
use bic_sensor::{AccessChecker, SdrFullSensor, SensorConfig};
use clap::Parser;
use log::{error, info, LevelFilter};
use simple_logger::SimpleLogger;

use bic_service::platform::SimulatedPlatform;
use bic_service::pldm::NumericSensorPdr;
use bic_service::transport::MockSmbusBus;
use bic_service::{BicDaemon, Options, ServiceConfig, Transports};

const SIM_I2C_BUSES: usize = 4;
const SENSOR_BUS: u8 = 0;
const NCT214_ADDR: u8 = 0x4C;
const INA230_ADDR: u8 = 0x45;
const SENSOR_TYPE_TEMP: u8 = 0x01;
const SENSOR_TYPE_VOLTAGE: u8 = 0x02;
const SENSOR_TYPE_POWER: u8 = 0x0B;
const PLDM_SENSOR_CPU_TEMP: u16 = 0x0102;

#[derive(Parser, Debug)]
#[command(
    name = "bic-service",
    author,
    version,
    about = "Bridge IC management services on a simulated board"
)]
struct Cli {
    /// TOML configuration file. Defaults apply when omitted.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Overrides the log level from the configuration
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<LevelFilter>,

    /// Overrides the MCTP endpoint id
    #[arg(long, value_parser = clap_num_u8)]
    eid: Option<u8>,

    /// Stops after this many seconds instead of running forever
    #[arg(long, value_name = "SECS")]
    run_for: Option<u64>,

    /// Prints the effective configuration and exits
    #[arg(long)]
    dry_run: bool,
}

/// Accepts decimal or 0x-prefixed hex.
fn clap_num_u8(s: &str) -> Result<u8, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("{}: {}", s, e))
}

/// Two temperatures and the host power rail, on registers preloaded with
/// plausible values.
fn simulated_sensors(platform: &SimulatedPlatform) -> Options {
    let Some(bus) = platform.bus(SENSOR_BUS) else {
        return Options::default();
    };
    bus.set_reg(NCT214_ADDR, NCT214_CONFIG_READ_REG, &[0x00]);
    bus.set_reg(NCT214_ADDR, NCT214_LOCAL_TEMP_REG, &[0x1E]);
    bus.set_reg(NCT214_ADDR, NCT214_REMOTE_TEMP_UPPER_REG, &[0x28]);
    bus.set_reg(NCT214_ADDR, NCT214_REMOTE_TEMP_LOWER_REG, &[0x80]);
    bus.set_reg_u16(INA230_ADDR, INA230_BUS_VOL_OFFSET, 0x2580);
    bus.set_reg_u16(INA230_ADDR, INA230_PWR_OFFSET, 0x0320);

    let ina = Ina230Config {
        r_shunt: 0.002,
        i_max: 10.0,
        ..Default::default()
    };
    let sensors = vec![
        SensorConfig::new(
            0x01,
            SensorTarget::new(SENSOR_BUS, NCT214_ADDR, NCT214_OFFSET_LOCAL),
            AccessChecker::Stby,
        )
        .with_driver(Box::new(Nct214::new(bus.clone(), false))),
        SensorConfig::new(
            0x02,
            SensorTarget::new(SENSOR_BUS, NCT214_ADDR, NCT214_OFFSET_REMOTE),
            AccessChecker::Stby,
        )
        .with_driver(Box::new(Nct214::new(bus.clone(), false))),
        SensorConfig::new(
            0x03,
            SensorTarget::new(SENSOR_BUS, INA230_ADDR, INA230_BUS_VOL_OFFSET as u16),
            AccessChecker::Stby,
        )
        .with_driver(Box::new(Ina230::new(bus.clone(), ina))),
        SensorConfig::new(
            0x04,
            SensorTarget::new(SENSOR_BUS, INA230_ADDR, INA230_PWR_OFFSET as u16),
            AccessChecker::Stby,
        )
        .with_driver(Box::new(Ina230::new(bus.clone(), ina))),
    ];
    let sdr = vec![
        SdrFullSensor::new(0x01, SENSOR_TYPE_TEMP).with_id_str("MB_INLET_TEMP"),
        SdrFullSensor::new(0x02, SENSOR_TYPE_TEMP).with_id_str("MB_CPU_TEMP"),
        SdrFullSensor::new(0x03, SENSOR_TYPE_VOLTAGE).with_id_str("MB_P12V_STBY"),
        SdrFullSensor::new(0x04, SENSOR_TYPE_POWER).with_id_str("MB_HSC_PWR"),
    ];
    // The CPU temperature again as a PLDM numeric sensor in millidegrees.
    // It needs DC power, so it turns unavailable whenever the host is off.
    let mut cpu_temp = NumericSensorPdr::new(PLDM_SENSOR_CPU_TEMP);
    cpu_temp.unit_modifier = -3;
    cpu_temp.update_interval = Duration::from_secs(2);
    let pldm_sensors = vec![(
        cpu_temp,
        SensorConfig::new(
            0,
            SensorTarget::new(SENSOR_BUS, NCT214_ADDR, NCT214_OFFSET_REMOTE),
            AccessChecker::Dc,
        )
        .with_driver(Box::new(Nct214::new(bus, false))),
    )];
    Options {
        sensors,
        sdr,
        pldm_sensors,
    }
}

/// One in-memory bus per configured MCTP port and IPMB channel, each with
/// the BIC attached at its own address.
fn simulated_transports(config: &ServiceConfig) -> Transports {
    let mut transports = Transports::new();
    for port in &config.mctp.port {
        let bus = MockSmbusBus::new();
        transports = transports.with_bus(port.bus, Arc::new(bus.attach(port.addr)));
    }
    for ch in &config.ipmb.channel {
        let bus = MockSmbusBus::new();
        transports = transports.with_bus(ch.bus, Arc::new(bus.attach(config.ipmb.self_addr)));
    }
    transports
}

fn main() {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => match ServiceConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load configuration: {}", e);
                std::process::exit(1);
            }
        },
        None => ServiceConfig::default(),
    };
    if let Some(eid) = cli.eid {
        config.mctp.eid = eid;
    }
    if let Some(level) = cli.log_level {
        config.log_level = level.to_string();
    }

    if cli.dry_run {
        match config.to_toml_string() {
            Ok(text) => print!("{}", text),
            Err(e) => {
                eprintln!("Failed to print configuration: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    let level = config.log_level().unwrap_or(LevelFilter::Info);
    if let Err(e) = SimpleLogger::new().with_level(level).init() {
        eprintln!("Failed to set up logging: {}", e);
    }

    let platform = Arc::new(SimulatedPlatform::new(SIM_I2C_BUSES));
    config.sensor.host_power_sensor.get_or_insert(0x04);
    let opts = simulated_sensors(&platform);
    let transports = simulated_transports(&config);

    let mut daemon = match BicDaemon::run(&config, transports, platform, opts) {
        Ok(daemon) => daemon,
        Err(e) => {
            error!("Failed to start: {}", e);
            std::process::exit(1);
        }
    };

    match cli.run_for {
        Some(secs) => std::thread::sleep(Duration::from_secs(secs)),
        None => loop {
            std::thread::park();
        },
    }
    info!("Shutting down");
    daemon.stop();
}
