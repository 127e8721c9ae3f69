// Licensed under the Apache-2.0 license

//! Sensor device drivers.
//!
//! Every driver owns a handle to the I2C bus its device sits on. Handles are
//! expected to be cheap to clone so several drivers can share one bus.

pub mod ina230;
pub mod mock;
pub mod nct214;

use embedded_hal::i2c::I2c;

use crate::error::DriverError;
use crate::table::SensorVal;

pub use ina230::{Ina230, Ina230Alert, Ina230Config};
pub use mock::RegisterMapI2c;
pub use nct214::Nct214;

/// Where a sensor lives: bus index, 7-bit slave address and the driver
/// specific offset selecting which quantity to read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SensorTarget {
    pub port: u8,
    pub addr: u8,
    pub offset: u16,
}

impl SensorTarget {
    pub fn new(port: u8, addr: u8, offset: u16) -> Self {
        SensorTarget { port, addr, offset }
    }
}

pub trait SensorDriver: Send {
    /// One-time device setup. Called before the first read.
    fn init(&mut self, target: &SensorTarget) -> Result<(), DriverError>;

    fn read(&mut self, target: &SensorTarget) -> Result<SensorVal, DriverError>;
}

pub(crate) fn read_reg<I: I2c>(
    i2c: &mut I,
    addr: u8,
    reg: u8,
    buf: &mut [u8],
) -> Result<(), DriverError> {
    i2c.write_read(addr, &[reg], buf)
        .map_err(|_| DriverError::Bus)
}

pub(crate) fn write_reg<I: I2c>(i2c: &mut I, addr: u8, bytes: &[u8]) -> Result<(), DriverError> {
    i2c.write(addr, bytes).map_err(|_| DriverError::Bus)
}
