// Licensed under the Apache-2.0 license

use thiserror_no_std::Error;

use crate::table::SensorStatus;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverError {
    #[error("I2C transfer failed")]
    Bus,
    #[error("driver used before init")]
    NotInitialized,
    #[error("invalid driver arguments")]
    InvalidArgs,
    #[error("calibration value {0:#06x} overflows 15 bits")]
    CalibrationOverflow(u16),
    #[error("unsupported register offset {0:#04x}")]
    UnsupportedOffset(u16),
}

impl From<DriverError> for SensorStatus {
    fn from(err: DriverError) -> Self {
        match err {
            DriverError::Bus => SensorStatus::FailToAccess,
            DriverError::UnsupportedOffset(_) => SensorStatus::NotFound,
            _ => SensorStatus::UnspecifiedError,
        }
    }
}
