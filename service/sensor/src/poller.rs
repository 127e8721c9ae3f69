// Licensed under the Apache-2.0 license

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use log::{debug, info, warn};

use crate::lock;
use crate::sdr::SdrRepository;
use crate::table::{ReadMode, SensorStatus, SensorTable};

pub const SENSOR_POLL_INTERVAL_MS: u64 = 1000;
pub const SENSOR_POLL_START_DELAY_MS: u64 = 1000;

/// Flags shared between the poller thread and the command handlers.
#[derive(Debug, Default)]
pub struct PollControl {
    enabled: AtomicBool,
    thread_running: AtomicBool,
    ready: AtomicBool,
}

impl PollControl {
    pub fn new(enabled: bool) -> Self {
        PollControl {
            enabled: AtomicBool::new(enabled),
            ..Default::default()
        }
    }

    pub fn enable_sensor_poll(&self) {
        self.enabled.store(true, Ordering::SeqCst);
    }

    pub fn disable_sensor_poll(&self) {
        self.enabled.store(false, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// True while a poller thread is running and polling is switched on.
    pub fn is_polling(&self) -> bool {
        self.thread_running.load(Ordering::SeqCst) && self.is_enabled()
    }

    /// Set after the first complete pass over the table.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

/// Background thread refreshing every sensor's cache.
pub struct SensorPoller {
    handle: Option<JoinHandle<()>>,
    stop_tx: Option<Sender<()>>,
    control: Arc<PollControl>,
}

impl SensorPoller {
    /// Starts polling. The thread is only started when every SDR record has a
    /// sensor configuration.
    pub fn spawn(
        table: Arc<Mutex<SensorTable>>,
        sdr: Arc<Mutex<SdrRepository>>,
        control: Arc<PollControl>,
        interval: Duration,
        start_delay: Duration,
    ) -> Self {
        let sensors = lock(&table).len();
        let records = lock(&sdr).len();
        if sensors != records {
            warn!(
                "Sensor poller not started: {} sensor configs for {} SDR records",
                sensors, records
            );
            return SensorPoller {
                handle: None,
                stop_tx: None,
                control,
            };
        }

        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        control.thread_running.store(true, Ordering::SeqCst);
        let thread_control = control.clone();
        let handle = std::thread::spawn(move || {
            let mut delay = start_delay;
            loop {
                match stop_rx.recv_timeout(delay) {
                    Err(RecvTimeoutError::Timeout) => {}
                    _ => break,
                }
                delay = interval;
                if !thread_control.is_enabled() {
                    continue;
                }
                poll_once(&table, &sdr, &thread_control);
                if !thread_control.ready.swap(true, Ordering::SeqCst) {
                    info!("Sensor poller ready");
                }
            }
            thread_control.thread_running.store(false, Ordering::SeqCst);
            info!("Sensor poller stopped");
        });

        SensorPoller {
            handle: Some(handle),
            stop_tx: Some(stop_tx),
            control,
        }
    }

    pub fn control(&self) -> &Arc<PollControl> {
        &self.control
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Sensor poller thread panicked");
            }
        }
    }
}

impl Drop for SensorPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

fn poll_once(table: &Mutex<SensorTable>, sdr: &Mutex<SdrRepository>, control: &PollControl) {
    let numbers = lock(table).sensor_numbers();
    for num in numbers {
        if !control.is_enabled() {
            debug!("Sensor polling disabled mid-pass");
            break;
        }
        let has_sdr = lock(sdr).find(num).is_some();
        let mut table = lock(table);
        let Some(cfg) = table.get(num) else {
            continue;
        };
        if cfg.cache_status == SensorStatus::NotPresent {
            continue;
        }
        if !cfg.polling_enabled {
            table.mark_polling_disabled(num);
            continue;
        }
        if !has_sdr {
            continue;
        }
        table.get_sensor_reading(num, ReadMode::Sensor);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::access::{AccessChecker, PowerState};
    use crate::dev::{Nct214, RegisterMapI2c, SensorTarget};
    use crate::sdr::SdrFullSensor;
    use crate::table::{SensorConfig, SensorVal};
    use log::LevelFilter;
    use simple_logger::SimpleLogger;
    use std::time::Instant;

    const ADDR: u8 = 0x4C;

    fn setup(bus: &RegisterMapI2c) -> (Arc<Mutex<SensorTable>>, Arc<Mutex<SdrRepository>>) {
        let _ = SimpleLogger::new().with_level(LevelFilter::Debug).init();
        bus.set_reg(ADDR, 0x03, &[0x00]);
        bus.set_reg(ADDR, 0x00, &[30]);
        let mut table = SensorTable::new(Arc::new(PowerState::new()), 2);
        table.add_sensor_config(
            SensorConfig::new(0x01, SensorTarget::new(0, ADDR, 0), AccessChecker::Stby)
                .with_driver(Box::new(Nct214::new(bus.clone(), false))),
        );
        table.add_sensor_config(SensorConfig::new(
            0x02,
            SensorTarget::new(0, ADDR, 1),
            AccessChecker::Stby,
        ));
        table.init_drivers();
        table.control_sensor_polling(0x02, false, SensorStatus::InitStatus);
        let sdr = SdrRepository::new(vec![
            SdrFullSensor::new(0x01, 0x01),
            SdrFullSensor::new(0x02, 0x01),
        ]);
        (Arc::new(Mutex::new(table)), Arc::new(Mutex::new(sdr)))
    }

    fn wait_ready(control: &PollControl) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if control.is_ready() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        false
    }

    #[test]
    fn test_poller_fills_cache() {
        let bus = RegisterMapI2c::new();
        let (table, sdr) = setup(&bus);
        let control = Arc::new(PollControl::new(true));
        let mut poller = SensorPoller::spawn(
            table.clone(),
            sdr,
            control.clone(),
            Duration::from_millis(20),
            Duration::from_millis(1),
        );
        assert!(poller.is_running());
        assert!(wait_ready(&control));
        assert!(control.is_polling());

        let (status, reading) = lock(&table).get_sensor_reading(0x01, ReadMode::Cache);
        assert_eq!(status, SensorStatus::FourByteAcurSuccess);
        assert_eq!(SensorVal::from_reading(reading), SensorVal::new(30, 0));
        assert_eq!(
            lock(&table).get_sensor_reading(0x02, ReadMode::Cache).0,
            SensorStatus::PollingDisable
        );

        poller.stop();
        assert!(!poller.is_running());
        assert!(!control.is_polling());
    }

    #[test]
    fn test_poller_needs_matching_sdr() {
        let bus = RegisterMapI2c::new();
        let (table, _) = setup(&bus);
        let sdr = Arc::new(Mutex::new(SdrRepository::new(vec![SdrFullSensor::new(
            0x01, 0x01,
        )])));
        let control = Arc::new(PollControl::new(true));
        let poller = SensorPoller::spawn(
            table,
            sdr,
            control.clone(),
            Duration::from_millis(20),
            Duration::from_millis(1),
        );
        assert!(!poller.is_running());
        assert!(!control.is_polling());
        assert!(control.is_enabled());
    }
}
