// Licensed under the Apache-2.0 license

//! INA230 power monitor. Registers are 16-bit big-endian.

use embedded_hal::i2c::I2c;
use log::{debug, error};

use super::{read_reg, write_reg, SensorDriver, SensorTarget};
use crate::error::DriverError;
use crate::table::SensorVal;

pub const INA230_CFG_OFFSET: u8 = 0x00;
pub const INA230_SHUNT_VOL_OFFSET: u8 = 0x01;
pub const INA230_BUS_VOL_OFFSET: u8 = 0x02;
pub const INA230_PWR_OFFSET: u8 = 0x03;
pub const INA230_CUR_OFFSET: u8 = 0x04;
pub const INA230_CAL_OFFSET: u8 = 0x05;
pub const INA230_MSK_OFFSET: u8 = 0x06;
pub const INA230_ALT_OFFSET: u8 = 0x07;

pub const INA230_BUS_VOL_LSB: f64 = 0.00125;
pub const INA230_SHUNT_VOL_LSB: f64 = 0.0000025;
const INA230_CAL_SCALING: f64 = 0.00512;
const INA230_PWR_TO_CUR_LSB: f64 = 25.0;
const INA230_CAL_OVERFLOW: u16 = 0x8000;
const INA230_ALERT_MASK: u16 = 0xF800;

/// Average 16 samples, 1.1 ms conversions, continuous shunt and bus.
pub const INA230_CFG_DEFAULT: u16 = 0x4527;

/// Alert functions of the mask/enable register. Only one may be active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Ina230Alert {
    ShuntOverVoltage = 0x8000,
    ShuntUnderVoltage = 0x4000,
    BusOverVoltage = 0x2000,
    BusUnderVoltage = 0x1000,
    PowerOverLimit = 0x0800,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ina230Config {
    pub config: u16,
    /// Shunt resistance in ohms.
    pub r_shunt: f64,
    /// Largest expected current in amperes.
    pub i_max: f64,
    pub alert: Option<(Ina230Alert, f64)>,
}

impl Default for Ina230Config {
    fn default() -> Self {
        Ina230Config {
            config: INA230_CFG_DEFAULT,
            r_shunt: 0.0,
            i_max: 0.0,
            alert: None,
        }
    }
}

pub struct Ina230<I> {
    i2c: I,
    cfg: Ina230Config,
    cur_lsb: f64,
    pwr_lsb: f64,
    initialized: bool,
}

impl<I: I2c> Ina230<I> {
    pub fn new(i2c: I, cfg: Ina230Config) -> Self {
        Ina230 {
            i2c,
            cfg,
            cur_lsb: 0.0,
            pwr_lsb: 0.0,
            initialized: false,
        }
    }

    fn write_u16(&mut self, addr: u8, reg: u8, val: u16) -> Result<(), DriverError> {
        let [hi, lo] = val.to_be_bytes();
        write_reg(&mut self.i2c, addr, &[reg, hi, lo])
    }

    fn read_u16(&mut self, addr: u8, reg: u8) -> Result<u16, DriverError> {
        let mut buf = [0u8; 2];
        read_reg(&mut self.i2c, addr, reg, &mut buf)?;
        Ok(u16::from_be_bytes(buf))
    }

    fn alert_register(&self, alert: Ina230Alert, value: f64) -> Result<u16, DriverError> {
        if value == 0.0 {
            return Err(DriverError::InvalidArgs);
        }
        let raw = match alert {
            Ina230Alert::ShuntOverVoltage | Ina230Alert::ShuntUnderVoltage => {
                (value / INA230_SHUNT_VOL_LSB) as i16 as u16
            }
            Ina230Alert::BusOverVoltage | Ina230Alert::BusUnderVoltage if value > 0.0 => {
                (value / INA230_BUS_VOL_LSB) as u16
            }
            Ina230Alert::PowerOverLimit if value > 0.0 => (value / self.pwr_lsb) as u16,
            _ => return Err(DriverError::InvalidArgs),
        };
        Ok(raw)
    }
}

impl<I: I2c + Send> SensorDriver for Ina230<I> {
    fn init(&mut self, target: &SensorTarget) -> Result<(), DriverError> {
        self.initialized = false;
        if self.cfg.r_shunt <= 0.0 || self.cfg.i_max <= 0.0 {
            error!(
                "INA230 {:#04x}: invalid shunt {} or max current {}",
                target.addr, self.cfg.r_shunt, self.cfg.i_max
            );
            return Err(DriverError::InvalidArgs);
        }

        self.write_u16(target.addr, INA230_CFG_OFFSET, self.cfg.config)?;

        self.cur_lsb = self.cfg.i_max / 32768.0;
        let cal = (INA230_CAL_SCALING / (self.cur_lsb * self.cfg.r_shunt)) as u16;
        if cal & INA230_CAL_OVERFLOW != 0 {
            error!("INA230 {:#04x}: calibration {:#06x} overflows", target.addr, cal);
            return Err(DriverError::CalibrationOverflow(cal));
        }
        self.write_u16(target.addr, INA230_CAL_OFFSET, cal)?;
        self.pwr_lsb = self.cur_lsb * INA230_PWR_TO_CUR_LSB;

        if let Some((alert, value)) = self.cfg.alert {
            let alt = self.alert_register(alert, value)?;
            self.write_u16(target.addr, INA230_ALT_OFFSET, alt)?;
            self.write_u16(
                target.addr,
                INA230_MSK_OFFSET,
                alert as u16 & INA230_ALERT_MASK,
            )?;
        }

        debug!(
            "INA230 {:#04x}: cal {:#06x} current lsb {}",
            target.addr, cal, self.cur_lsb
        );
        self.initialized = true;
        Ok(())
    }

    fn read(&mut self, target: &SensorTarget) -> Result<SensorVal, DriverError> {
        if !self.initialized {
            return Err(DriverError::NotInitialized);
        }
        let offset = u8::try_from(target.offset)
            .map_err(|_| DriverError::UnsupportedOffset(target.offset))?;
        let val = match offset {
            INA230_BUS_VOL_OFFSET => {
                self.read_u16(target.addr, offset)? as f64 * INA230_BUS_VOL_LSB
            }
            INA230_SHUNT_VOL_OFFSET => {
                self.read_u16(target.addr, offset)? as i16 as f64 * INA230_SHUNT_VOL_LSB
            }
            INA230_CUR_OFFSET => self.read_u16(target.addr, offset)? as i16 as f64 * self.cur_lsb,
            INA230_PWR_OFFSET => self.read_u16(target.addr, offset)? as f64 * self.pwr_lsb,
            _ => return Err(DriverError::UnsupportedOffset(target.offset)),
        };
        Ok(SensorVal::from_f64(val))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::dev::mock::RegisterMapI2c;

    const ADDR: u8 = 0x44;

    fn driver(bus: &RegisterMapI2c, cfg: Ina230Config) -> Ina230<RegisterMapI2c> {
        bus.add_device(ADDR);
        Ina230::new(bus.clone(), cfg)
    }

    #[test]
    fn test_init_programs_calibration() {
        let bus = RegisterMapI2c::new();
        let mut ina = driver(
            &bus,
            Ina230Config {
                r_shunt: 0.002,
                i_max: 16.384,
                ..Default::default()
            },
        );
        ina.init(&SensorTarget::new(0, ADDR, INA230_BUS_VOL_OFFSET as u16))
            .unwrap();
        assert_eq!(bus.reg_u16(ADDR, INA230_CFG_OFFSET), Some(INA230_CFG_DEFAULT));
        // current lsb = 0.5 mA, cal = 0.00512 / (0.0005 * 0.002)
        assert_eq!(bus.reg_u16(ADDR, INA230_CAL_OFFSET), Some(5120));
        assert_eq!(bus.reg_u16(ADDR, INA230_MSK_OFFSET), None);
    }

    #[test]
    fn test_init_rejects_bad_arguments() {
        let bus = RegisterMapI2c::new();
        let target = SensorTarget::new(0, ADDR, 0);
        let mut ina = driver(&bus, Ina230Config::default());
        assert_eq!(ina.init(&target), Err(DriverError::InvalidArgs));

        let mut ina = driver(
            &bus,
            Ina230Config {
                r_shunt: 0.00001,
                i_max: 0.001,
                ..Default::default()
            },
        );
        assert!(matches!(
            ina.init(&target),
            Err(DriverError::CalibrationOverflow(_))
        ));
        assert_eq!(ina.read(&target), Err(DriverError::NotInitialized));

        let mut ina = driver(
            &bus,
            Ina230Config {
                r_shunt: 0.002,
                i_max: 16.384,
                alert: Some((Ina230Alert::BusUnderVoltage, -1.0)),
                ..Default::default()
            },
        );
        assert_eq!(ina.init(&target), Err(DriverError::InvalidArgs));
    }

    #[test]
    fn test_alert_registers() {
        let bus = RegisterMapI2c::new();
        let mut ina = driver(
            &bus,
            Ina230Config {
                r_shunt: 0.002,
                i_max: 16.384,
                alert: Some((Ina230Alert::BusOverVoltage, 12.5)),
                ..Default::default()
            },
        );
        ina.init(&SensorTarget::new(0, ADDR, 0)).unwrap();
        assert_eq!(bus.reg_u16(ADDR, INA230_ALT_OFFSET), Some(10000));
        assert_eq!(bus.reg_u16(ADDR, INA230_MSK_OFFSET), Some(0x2000));
        let writes = bus.writes(ADDR);
        assert_eq!(writes[writes.len() - 2][0], INA230_ALT_OFFSET);
        assert_eq!(writes[writes.len() - 1][0], INA230_MSK_OFFSET);
    }

    #[test]
    fn test_read_values() {
        let bus = RegisterMapI2c::new();
        let mut ina = driver(
            &bus,
            Ina230Config {
                r_shunt: 0.002,
                i_max: 16.384,
                ..Default::default()
            },
        );
        let mut target = SensorTarget::new(0, ADDR, INA230_BUS_VOL_OFFSET as u16);
        ina.init(&target).unwrap();

        // 9800 * 1.25 mV = 12.25 V
        bus.set_reg_u16(ADDR, INA230_BUS_VOL_OFFSET, 9800);
        assert_eq!(ina.read(&target), Ok(SensorVal::new(12, 250)));

        // -2000 * 0.5 mA = -1 A
        bus.set_reg_u16(ADDR, INA230_CUR_OFFSET, (-2000i16) as u16);
        target.offset = INA230_CUR_OFFSET as u16;
        assert_eq!(ina.read(&target), Ok(SensorVal::new(-1, 0)));

        // 1000 * 12.5 mW = 12.5 W
        bus.set_reg_u16(ADDR, INA230_PWR_OFFSET, 1000);
        target.offset = INA230_PWR_OFFSET as u16;
        assert_eq!(ina.read(&target), Ok(SensorVal::new(12, 500)));

        target.offset = 0x06;
        assert_eq!(ina.read(&target), Err(DriverError::UnsupportedOffset(0x06)));

        bus.set_fail(true);
        target.offset = INA230_BUS_VOL_OFFSET as u16;
        assert_eq!(ina.read(&target), Err(DriverError::Bus));
    }
}
