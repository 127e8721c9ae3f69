// Licensed under the Apache-2.0 license

//! Sensor subsystem of the BIC: the sensor table with its cached readings,
//! the background poller, the SDR repository and the I2C sensor drivers.

pub mod access;
pub mod dev;
pub mod error;
pub mod poller;
pub mod sdr;
pub mod table;

pub use access::{AccessChecker, PowerState};
pub use error::DriverError;
pub use poller::{PollControl, SensorPoller};
pub use sdr::{SdrFullSensor, SdrRepository};
pub use table::{ReadMode, SensorConfig, SensorStatus, SensorTable, SensorVal};

use std::sync::{Mutex, MutexGuard};

/// Locks `m`, carrying on with the inner value if a holder panicked.
pub fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}
