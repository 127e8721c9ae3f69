// Licensed under the Apache-2.0 license

use std::sync::Arc;

use log::{debug, error, warn};
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::access::{AccessChecker, PowerState};
use crate::dev::{SensorDriver, SensorTarget};

/// Placeholder cached when a sensor has no valid reading.
pub const SENSOR_FAIL: i32 = 0xFF;
pub const SENSOR_READ_RETRY_MAX: u8 = 3;
pub const SAMPLE_COUNT_DEFAULT: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum SensorStatus {
    ReadSuccess = 0,
    ReadAcurSuccess = 1,
    NotFound = 2,
    NotAccessible = 3,
    FailToAccess = 4,
    InitStatus = 5,
    UnspecifiedError = 6,
    PollingDisable = 7,
    PreReadError = 8,
    PostReadError = 9,
    ReadApiUnregister = 10,
    FourByteAcurSuccess = 11,
    NotPresent = 12,
}

impl SensorStatus {
    pub fn is_success(self) -> bool {
        matches!(
            self,
            SensorStatus::ReadSuccess
                | SensorStatus::ReadAcurSuccess
                | SensorStatus::FourByteAcurSuccess
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum ReadMode {
    Cache = 0,
    Sensor = 1,
}

/// A reading split into an integer part and a fraction in thousandths.
///
/// Packed into an `i32` with the integer in the low half and the fraction in
/// the high half, which is the form kept in the sensor cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SensorVal {
    pub integer: i16,
    pub fraction: i16,
}

impl SensorVal {
    pub fn new(integer: i16, fraction: i16) -> Self {
        SensorVal { integer, fraction }
    }

    pub fn from_f64(val: f64) -> Self {
        let integer = val as i32 as i16;
        let fraction = ((val - integer as f64) * 1000.0) as i16;
        SensorVal { integer, fraction }
    }

    pub fn to_reading(self) -> i32 {
        ((self.integer as u16 as u32) | ((self.fraction as u16 as u32) << 16)) as i32
    }

    pub fn from_reading(reading: i32) -> Self {
        let raw = reading as u32;
        SensorVal {
            integer: (raw & 0xFFFF) as u16 as i16,
            fraction: (raw >> 16) as u16 as i16,
        }
    }

    pub fn to_f64(self) -> f64 {
        self.to_milli() as f64 / 1000.0
    }

    fn to_milli(self) -> i64 {
        self.integer as i64 * 1000 + self.fraction as i64
    }

    fn from_milli(milli: i64) -> Self {
        SensorVal {
            integer: (milli / 1000) as i16,
            fraction: (milli % 1000) as i16,
        }
    }
}

pub type PreReadHook = Box<dyn FnMut(u8) -> bool + Send>;
/// Called after every driver read. The reading is `None` when the read
/// failed so the hook can still release whatever the pre-read hook took.
pub type PostReadHook = Box<dyn FnMut(u8, Option<&mut i32>) -> bool + Send>;

pub struct SensorConfig {
    pub num: u8,
    pub target: SensorTarget,
    pub access: AccessChecker,
    sample_count: u8,
    pub polling_enabled: bool,
    pub pre_read: Option<PreReadHook>,
    pub post_read: Option<PostReadHook>,
    pub cache: i32,
    pub cache_status: SensorStatus,
    pub retry: u8,
    driver: Option<Box<dyn SensorDriver>>,
    initialized: bool,
}

impl core::fmt::Debug for SensorConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SensorConfig")
            .field("num", &self.num)
            .field("target", &self.target)
            .field("access", &self.access)
            .field("cache", &self.cache)
            .field("cache_status", &self.cache_status)
            .field("retry", &self.retry)
            .finish()
    }
}

impl SensorConfig {
    pub fn new(num: u8, target: SensorTarget, access: AccessChecker) -> Self {
        SensorConfig {
            num,
            target,
            access,
            sample_count: SAMPLE_COUNT_DEFAULT,
            polling_enabled: true,
            pre_read: None,
            post_read: None,
            cache: SENSOR_FAIL,
            cache_status: SensorStatus::InitStatus,
            retry: 0,
            driver: None,
            initialized: false,
        }
    }

    pub fn with_driver(mut self, driver: Box<dyn SensorDriver>) -> Self {
        self.driver = Some(driver);
        self
    }

    pub fn with_sample_count(mut self, count: u8) -> Self {
        self.sample_count = count.max(1);
        self
    }

    pub fn sample_count(&self) -> u8 {
        self.sample_count
    }

    pub fn with_pre_read(mut self, hook: PreReadHook) -> Self {
        self.pre_read = Some(hook);
        self
    }

    pub fn with_post_read(mut self, hook: PostReadHook) -> Self {
        self.post_read = Some(hook);
        self
    }

    fn clear_unaccessible_cache(&mut self) {
        if self.cache_status != SensorStatus::InitStatus {
            self.cache = SENSOR_FAIL;
            self.cache_status = SensorStatus::InitStatus;
        }
    }

    fn read_driver(&mut self) -> Result<SensorVal, SensorStatus> {
        let driver = match self.driver.as_mut() {
            Some(driver) if self.initialized => driver,
            _ => return Err(SensorStatus::ReadApiUnregister),
        };
        let samples = self.sample_count.max(1);
        let mut total = 0i64;
        for _ in 0..samples {
            total += driver.read(&self.target)?.to_milli();
        }
        Ok(SensorVal::from_milli(total / samples as i64))
    }
}

/// Every sensor the BIC monitors, with its last cached reading.
pub struct SensorTable {
    sensors: Vec<SensorConfig>,
    power: Arc<PowerState>,
    capacity: usize,
}

impl SensorTable {
    /// `capacity` bounds the table to the number of SDR records.
    pub fn new(power: Arc<PowerState>, capacity: usize) -> Self {
        SensorTable {
            sensors: Vec::with_capacity(capacity),
            power,
            capacity,
        }
    }

    pub fn power(&self) -> &Arc<PowerState> {
        &self.power
    }

    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }

    pub fn sensor_numbers(&self) -> Vec<u8> {
        self.sensors.iter().map(|s| s.num).collect()
    }

    pub fn contains(&self, num: u8) -> bool {
        self.get(num).is_some()
    }

    pub fn get(&self, num: u8) -> Option<&SensorConfig> {
        self.sensors.iter().find(|s| s.num == num)
    }

    fn get_mut(&mut self, num: u8) -> Option<&mut SensorConfig> {
        self.sensors.iter_mut().find(|s| s.num == num)
    }

    /// Replaces the entry with the same sensor number, or appends while
    /// there is room.
    pub fn add_sensor_config(&mut self, config: SensorConfig) -> bool {
        if let Some(existing) = self.get_mut(config.num) {
            *existing = config;
            return true;
        }
        if self.sensors.len() + 1 > self.capacity {
            error!(
                "Sensor table full, dropping sensor {:#04x} (capacity {})",
                config.num, self.capacity
            );
            return false;
        }
        self.sensors.push(config);
        true
    }

    /// Runs every driver's init once. A sensor whose init fails stays in the
    /// table but reports `ReadApiUnregister` on direct reads.
    pub fn init_drivers(&mut self) {
        for cfg in self.sensors.iter_mut() {
            let num = cfg.num;
            if let Some(hook) = cfg.pre_read.as_mut() {
                if !hook(num) {
                    warn!("Sensor {:#04x} pre-read hook failed during init", num);
                    continue;
                }
            }
            if let Some(driver) = cfg.driver.as_mut() {
                match driver.init(&cfg.target) {
                    Ok(()) => cfg.initialized = true,
                    Err(e) => error!("Sensor {:#04x} init failed: {}", num, e),
                }
            } else {
                warn!("Sensor {:#04x} has no driver", num);
            }
            if let Some(hook) = cfg.post_read.as_mut() {
                if !hook(num, None) {
                    warn!("Sensor {:#04x} post-read hook failed during init", num);
                }
            }
        }
    }

    /// Reads a sensor either from the device or from the cache.
    ///
    /// Returns the resulting status and the packed reading. A failed device
    /// read keeps reporting the previous status until it has failed
    /// `SENSOR_READ_RETRY_MAX` times in a row.
    pub fn get_sensor_reading(&mut self, num: u8, mode: ReadMode) -> (SensorStatus, i32) {
        let power = self.power.clone();
        let Some(cfg) = self.get_mut(num) else {
            debug!("Sensor {:#04x} not found", num);
            return (SensorStatus::NotFound, 0);
        };

        if !cfg.access.check(&power) {
            cfg.clear_unaccessible_cache();
            cfg.cache_status = SensorStatus::NotAccessible;
            return (cfg.cache_status, 0);
        }

        match mode {
            ReadMode::Sensor => {
                if let Some(hook) = cfg.pre_read.as_mut() {
                    if !hook(num) {
                        warn!("Sensor {:#04x} pre-read hook failed", num);
                        cfg.cache_status = SensorStatus::PreReadError;
                        return (cfg.cache_status, 0);
                    }
                    if cfg.cache_status == SensorStatus::NotPresent {
                        return (cfg.cache_status, 0);
                    }
                }

                match cfg.read_driver() {
                    Ok(val) => {
                        cfg.retry = 0;
                        let mut reading = val.to_reading();
                        let post_ok = cfg
                            .post_read
                            .as_mut()
                            .map(|hook| hook(num, Some(&mut reading)));
                        // Power may have dropped while the bus was busy.
                        if !cfg.access.check(&power) {
                            cfg.clear_unaccessible_cache();
                            cfg.cache_status = SensorStatus::NotAccessible;
                            return (cfg.cache_status, 0);
                        }
                        if post_ok == Some(false) {
                            warn!("Sensor {:#04x} post-read hook failed", num);
                            cfg.cache_status = SensorStatus::PostReadError;
                            return (cfg.cache_status, 0);
                        }
                        cfg.cache = reading;
                        cfg.cache_status = SensorStatus::FourByteAcurSuccess;
                        (cfg.cache_status, reading)
                    }
                    Err(status) => {
                        if let Some(hook) = cfg.post_read.as_mut() {
                            if !hook(num, None) {
                                warn!("Sensor {:#04x} post-read hook failed", num);
                            }
                        }
                        if cfg.retry >= SENSOR_READ_RETRY_MAX {
                            cfg.cache_status = status;
                        } else {
                            cfg.retry += 1;
                        }
                        (cfg.cache_status, 0)
                    }
                }
            }
            ReadMode::Cache => {
                if cfg.cache_status.is_success() {
                    let reading = cfg.cache;
                    if !cfg.access.check(&power) {
                        cfg.cache_status = SensorStatus::NotAccessible;
                    }
                    return (cfg.cache_status, reading);
                }
                if !matches!(
                    cfg.cache_status,
                    SensorStatus::InitStatus
                        | SensorStatus::NotPresent
                        | SensorStatus::NotAccessible
                ) {
                    debug!(
                        "Sensor {:#04x} cache status {:?}",
                        num, cfg.cache_status
                    );
                }
                cfg.cache = SENSOR_FAIL;
                (cfg.cache_status, 0)
            }
        }
    }

    /// Turns polling of one sensor on or off and forces its cache status.
    pub fn control_sensor_polling(&mut self, num: u8, enable: bool, status: SensorStatus) -> bool {
        match self.get_mut(num) {
            Some(cfg) => {
                cfg.polling_enabled = enable;
                cfg.cache_status = status;
                true
            }
            None => false,
        }
    }

    pub(crate) fn mark_polling_disabled(&mut self, num: u8) {
        if let Some(cfg) = self.get_mut(num) {
            cfg.cache = SENSOR_FAIL;
            cfg.cache_status = SensorStatus::PollingDisable;
        }
    }
}
