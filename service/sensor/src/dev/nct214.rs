// Licensed under the Apache-2.0 license

//! NCT214 local/remote temperature sensor.

use embedded_hal::i2c::I2c;
use log::debug;

use super::{read_reg, write_reg, SensorDriver, SensorTarget};
use crate::error::DriverError;
use crate::table::SensorVal;

pub const NCT214_LOCAL_TEMP_REG: u8 = 0x00;
pub const NCT214_REMOTE_TEMP_UPPER_REG: u8 = 0x01;
pub const NCT214_CONFIG_READ_REG: u8 = 0x03;
pub const NCT214_CONFIG_WRITE_REG: u8 = 0x09;
pub const NCT214_REMOTE_TEMP_LOWER_REG: u8 = 0x10;

pub const NCT214_OFFSET_LOCAL: u16 = 0x00;
pub const NCT214_OFFSET_REMOTE: u16 = 0x01;

const NCT214_EXTENDED_RANGE: u8 = 0x04;
const NCT214_EXTENDED_OFFSET: i16 = 64;
const NCT214_FRACTION_STEP: i16 = 250;

pub struct Nct214<I> {
    i2c: I,
    want_extended: bool,
    extended: bool,
    initialized: bool,
}

impl<I: I2c> Nct214<I> {
    /// `extended` switches the part to the -64..191 range during init.
    pub fn new(i2c: I, extended: bool) -> Self {
        Nct214 {
            i2c,
            want_extended: extended,
            extended: false,
            initialized: false,
        }
    }

    fn read_u8(&mut self, addr: u8, reg: u8) -> Result<u8, DriverError> {
        let mut buf = [0u8; 1];
        read_reg(&mut self.i2c, addr, reg, &mut buf)?;
        Ok(buf[0])
    }

    /// The standard range is 0..255 and never negative.
    fn integer(&self, raw: u8) -> i16 {
        if self.extended {
            raw as i16 - NCT214_EXTENDED_OFFSET
        } else {
            raw as i16
        }
    }
}

impl<I: I2c + Send> SensorDriver for Nct214<I> {
    fn init(&mut self, target: &SensorTarget) -> Result<(), DriverError> {
        let mut config = self.read_u8(target.addr, NCT214_CONFIG_READ_REG)?;
        if self.want_extended && config & NCT214_EXTENDED_RANGE == 0 {
            config |= NCT214_EXTENDED_RANGE;
            write_reg(&mut self.i2c, target.addr, &[NCT214_CONFIG_WRITE_REG, config])?;
            debug!("NCT214 {:#04x}: extended range enabled", target.addr);
        }
        self.extended = config & NCT214_EXTENDED_RANGE != 0;
        self.initialized = true;
        Ok(())
    }

    fn read(&mut self, target: &SensorTarget) -> Result<SensorVal, DriverError> {
        if !self.initialized {
            return Err(DriverError::NotInitialized);
        }
        match target.offset {
            NCT214_OFFSET_LOCAL => {
                let raw = self.read_u8(target.addr, NCT214_LOCAL_TEMP_REG)?;
                Ok(SensorVal::new(self.integer(raw), 0))
            }
            NCT214_OFFSET_REMOTE => {
                let upper = self.read_u8(target.addr, NCT214_REMOTE_TEMP_UPPER_REG)?;
                let lower = self.read_u8(target.addr, NCT214_REMOTE_TEMP_LOWER_REG)?;
                let integer = self.integer(upper);
                let mut fraction = (lower >> 6) as i16 * NCT214_FRACTION_STEP;
                if integer < 0 {
                    fraction = -fraction;
                }
                Ok(SensorVal::new(integer, fraction))
            }
            other => Err(DriverError::UnsupportedOffset(other)),
        }
    }
}
