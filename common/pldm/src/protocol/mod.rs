// Licensed under the Apache-2.0 license

pub mod base;
pub mod firmware_update;
pub mod oem;
pub mod platform;
pub mod smbios;
