// Licensed under the Apache-2.0 license

pub mod effecter;
pub mod event;
pub mod sensor_reading;
