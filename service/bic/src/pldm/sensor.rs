// Licensed under the Apache-2.0 license

//! PLDM numeric sensors: sensors addressed by a 16-bit sensor id, described
//! by a numeric sensor PDR and polled on their own update interval.
//!
//! A change of operational state is reported to the event receiver as a
//! sensorOpState event.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use bic_sensor::lock;
use bic_sensor::{PowerState, ReadMode, SensorConfig, SensorStatus, SensorTable, SensorVal};
use log::{debug, error, info};
use pldm_common::protocol::base::PldmBaseCompletionCode;
use pldm_common::protocol::platform::{
    EventClass, SensorEventClass, SensorOperationalState, PLDM_PLATFORM_INVALID_SENSOR_ID,
};

use crate::pldm::monitor::PlatformEvents;
use crate::ticker::Ticker;

pub const PLDM_SENSOR_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// The numeric sensor PDR fields used to report a reading. The BMC converts
/// a reported value X back with `Y = (X * resolution + offset) * 10^unit_modifier`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumericSensorPdr {
    pub sensor_id: u16,
    pub resolution: f32,
    pub offset: f32,
    pub unit_modifier: i8,
    pub update_interval: Duration,
}

impl NumericSensorPdr {
    pub fn new(sensor_id: u16) -> Self {
        NumericSensorPdr {
            sensor_id,
            resolution: 1.0,
            offset: 0.0,
            unit_modifier: 0,
            update_interval: PLDM_SENSOR_POLL_INTERVAL,
        }
    }

    /// Converts a cached reading into the value reported over PLDM.
    pub fn convert(&self, val: SensorVal) -> Option<i32> {
        if self.resolution == 0.0 {
            return None;
        }
        let scaled = val.to_f64() * 10f64.powi(-(self.unit_modifier as i32));
        Some(((scaled - self.offset as f64) / self.resolution as f64) as i32)
    }
}

/// A sensor changed operational state during a poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpStateChange {
    pub sensor_id: u16,
    pub previous: SensorOperationalState,
    pub present: SensorOperationalState,
}

#[derive(Debug)]
struct Entry {
    pdr: NumericSensorPdr,
    num: u8,
    op_state: SensorOperationalState,
    last_update: Option<Instant>,
}

/// Every PLDM numeric sensor with its last reading and operational state.
///
/// Readings go through a [`SensorTable`] of their own, so access checks,
/// read hooks and retries behave as for the IPMI sensors. The sensor number
/// the hooks see is the position in the list.
pub struct PldmSensorList {
    table: SensorTable,
    entries: Vec<Entry>,
}

impl PldmSensorList {
    pub fn new(power: Arc<PowerState>, sensors: Vec<(NumericSensorPdr, SensorConfig)>) -> Self {
        let mut table = SensorTable::new(power, sensors.len());
        let mut entries: Vec<Entry> = Vec::with_capacity(sensors.len());
        for (pdr, mut config) in sensors {
            if entries.iter().any(|e| e.pdr.sensor_id == pdr.sensor_id) {
                error!("Duplicate PLDM sensor id {:#06x}, dropped", pdr.sensor_id);
                continue;
            }
            let Ok(num) = u8::try_from(entries.len()) else {
                error!("PLDM sensor list full, dropping {:#06x}", pdr.sensor_id);
                continue;
            };
            config.num = num;
            if table.add_sensor_config(config) {
                entries.push(Entry {
                    pdr,
                    num,
                    op_state: SensorOperationalState::Initializing,
                    last_update: None,
                });
            }
        }
        table.init_drivers();
        info!("{} PLDM numeric sensor(s)", entries.len());
        PldmSensorList { table, entries }
    }

    /// Host power state the access checks run against.
    pub fn power(&self) -> &Arc<PowerState> {
        self.table.power()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, sensor_id: u16) -> bool {
        self.entry(sensor_id).is_some()
    }

    pub fn op_state(&self, sensor_id: u16) -> Option<SensorOperationalState> {
        self.entry(sensor_id).map(|e| e.op_state)
    }

    fn entry(&self, sensor_id: u16) -> Option<&Entry> {
        self.entries.iter().find(|e| e.pdr.sensor_id == sensor_id)
    }

    /// Reads every sensor whose update interval has passed at `now` and
    /// returns the operational state changes.
    pub fn poll_once(&mut self, now: Instant) -> Vec<OpStateChange> {
        let mut changes = Vec::new();
        for entry in self.entries.iter_mut() {
            let due = entry
                .last_update
                .map_or(true, |t| now.saturating_duration_since(t) >= entry.pdr.update_interval);
            if !due {
                continue;
            }
            entry.last_update = Some(now);

            let (status, _) = self.table.get_sensor_reading(entry.num, ReadMode::Sensor);
            let present = match status {
                s if s.is_success() => SensorOperationalState::Enabled,
                SensorStatus::NotAccessible => SensorOperationalState::Unavailable,
                SensorStatus::ReadApiUnregister => SensorOperationalState::Disabled,
                // Still inside the read retries.
                SensorStatus::InitStatus => entry.op_state,
                _ => SensorOperationalState::Failed,
            };
            if present != entry.op_state {
                debug!(
                    "PLDM sensor {:#06x}: {:?} -> {:?}",
                    entry.pdr.sensor_id, entry.op_state, present
                );
                changes.push(OpStateChange {
                    sensor_id: entry.pdr.sensor_id,
                    previous: entry.op_state,
                    present,
                });
                entry.op_state = present;
            }
        }
        changes
    }

    /// The last reading of `sensor_id` scaled by its PDR, with the sensor's
    /// operational state. Fails with the completion code to report.
    pub fn get_reading_from_cache(
        &self,
        sensor_id: u16,
    ) -> core::result::Result<(SensorOperationalState, i32), u8> {
        let entry = self.entry(sensor_id).ok_or(PLDM_PLATFORM_INVALID_SENSOR_ID)?;
        let cache = self.table.get(entry.num).map(|c| c.cache).unwrap_or_default();
        let reading = entry
            .pdr
            .convert(SensorVal::from_reading(cache))
            .ok_or(PldmBaseCompletionCode::InvalidData as u8)?;
        Ok((entry.op_state, reading))
    }
}

/// Polls `sensors` on `interval` and reports every operational state change
/// through `events`.
pub fn spawn_sensor_monitor(
    sensors: Arc<Mutex<PldmSensorList>>,
    events: Arc<PlatformEvents>,
    interval: Duration,
) -> Ticker {
    Ticker::spawn("pldm-sensor", interval, move || {
        let changes = lock(&sensors).poll_once(Instant::now());
        for change in changes {
            let data = [change.present as u8, change.previous as u8];
            if let Err(e) = events.send_platform_event(
                EventClass::Sensor,
                change.sensor_id,
                SensorEventClass::OpState as u8,
                &data,
            ) {
                error!("PLDM sensor {:#06x} op state event failed: {}", change.sensor_id, e);
            }
        }
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use bic_sensor::dev::{SensorDriver, SensorTarget};
    use bic_sensor::{AccessChecker, DriverError};

    /// Returns whatever the test last stored, failing while it is `None`.
    struct SharedDriver(Arc<Mutex<Option<SensorVal>>>);

    impl SensorDriver for SharedDriver {
        fn init(&mut self, _target: &SensorTarget) -> Result<(), DriverError> {
            Ok(())
        }

        fn read(&mut self, _target: &SensorTarget) -> Result<SensorVal, DriverError> {
            lock(&self.0).ok_or(DriverError::Bus)
        }
    }

    fn sensor(
        pdr: NumericSensorPdr,
        access: AccessChecker,
        value: &Arc<Mutex<Option<SensorVal>>>,
    ) -> (NumericSensorPdr, SensorConfig) {
        let config = SensorConfig::new(0, SensorTarget::new(0, 0x40, 0), access)
            .with_driver(Box::new(SharedDriver(value.clone())));
        (pdr, config)
    }

    #[test]
    fn test_convert() {
        let mut pdr = NumericSensorPdr::new(1);
        pdr.unit_modifier = -3;
        assert_eq!(pdr.convert(SensorVal::new(25, 500)), Some(25_500));

        pdr.unit_modifier = 0;
        pdr.resolution = 0.5;
        pdr.offset = 1.0;
        assert_eq!(pdr.convert(SensorVal::new(25, 500)), Some(49));

        let pdr = NumericSensorPdr::new(1);
        assert_eq!(pdr.convert(SensorVal::new(-1, -500)), Some(-1));

        let mut pdr = NumericSensorPdr::new(1);
        pdr.resolution = 0.0;
        assert_eq!(pdr.convert(SensorVal::new(1, 0)), None);
    }

    #[test]
    fn test_reading_from_cache() {
        let value = Arc::new(Mutex::new(Some(SensorVal::new(12, 250))));
        let mut milli = NumericSensorPdr::new(0x0100);
        milli.unit_modifier = -3;
        let mut broken = NumericSensorPdr::new(0x0101);
        broken.resolution = 0.0;
        let mut list = PldmSensorList::new(
            Arc::new(PowerState::new()),
            vec![
                sensor(milli, AccessChecker::Stby, &value),
                sensor(broken, AccessChecker::Stby, &value),
            ],
        );
        assert_eq!(list.len(), 2);
        assert_eq!(
            list.get_reading_from_cache(0x0100).map(|(state, _)| state),
            Ok(SensorOperationalState::Initializing)
        );

        list.poll_once(Instant::now());
        assert_eq!(
            list.get_reading_from_cache(0x0100),
            Ok((SensorOperationalState::Enabled, 12_250))
        );
        assert_eq!(
            list.get_reading_from_cache(0x0101),
            Err(PldmBaseCompletionCode::InvalidData as u8)
        );
        assert_eq!(
            list.get_reading_from_cache(0x0102),
            Err(PLDM_PLATFORM_INVALID_SENSOR_ID)
        );
    }

    #[test]
    fn test_poll_reports_op_state_changes() {
        let value = Arc::new(Mutex::new(Some(SensorVal::new(40, 0))));
        let power = Arc::new(PowerState::new());
        let mut pdr = NumericSensorPdr::new(0x0200);
        pdr.update_interval = Duration::from_secs(5);
        let dc = NumericSensorPdr::new(0x0201);
        let mut list = PldmSensorList::new(
            power.clone(),
            vec![
                sensor(pdr, AccessChecker::Stby, &value),
                sensor(dc, AccessChecker::Dc, &value),
            ],
        );

        let start = Instant::now();
        let changes = list.poll_once(start);
        assert_eq!(
            changes,
            vec![
                OpStateChange {
                    sensor_id: 0x0200,
                    previous: SensorOperationalState::Initializing,
                    present: SensorOperationalState::Enabled,
                },
                OpStateChange {
                    sensor_id: 0x0201,
                    previous: SensorOperationalState::Initializing,
                    present: SensorOperationalState::Unavailable,
                },
            ]
        );
        assert!(list.poll_once(start).is_empty());

        // The 5 s sensor is not read again before its interval.
        power.set_dc_on(true);
        let changes = list.poll_once(start + Duration::from_secs(1));
        assert_eq!(
            changes,
            vec![OpStateChange {
                sensor_id: 0x0201,
                previous: SensorOperationalState::Unavailable,
                present: SensorOperationalState::Enabled,
            }]
        );

        // Failures show up once the retries are used up.
        *lock(&value) = None;
        let mut t = start + Duration::from_secs(5);
        let mut failed = Vec::new();
        for _ in 0..5 {
            failed.extend(list.poll_once(t));
            t += Duration::from_secs(5);
        }
        assert!(failed.contains(&OpStateChange {
            sensor_id: 0x0200,
            previous: SensorOperationalState::Enabled,
            present: SensorOperationalState::Failed,
        }));
    }
}
