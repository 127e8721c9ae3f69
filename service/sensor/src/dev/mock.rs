// Licensed under the Apache-2.0 license

//! In-memory I2C bus of register-mapped devices.
//!
//! The first byte of every write selects a register. Any further bytes
//! replace that register's contents, and reads return the selected register.
//! Clones share the same devices so a test can keep a handle and inspect what
//! a driver wrote.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use embedded_hal::i2c::{ErrorKind, NoAcknowledgeSource, Operation, SevenBitAddress};

#[derive(Debug, Default)]
struct Device {
    regs: HashMap<u8, Vec<u8>>,
    pointer: u8,
    writes: Vec<Vec<u8>>,
}

#[derive(Debug, Default)]
struct Bus {
    devices: HashMap<u8, Device>,
    fail: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RegisterMapI2c {
    bus: Arc<Mutex<Bus>>,
}

impl RegisterMapI2c {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Bus> {
        self.bus.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Adds a device at `addr` if it is not there yet.
    pub fn add_device(&self, addr: u8) {
        self.lock().devices.entry(addr).or_default();
    }

    pub fn set_reg(&self, addr: u8, reg: u8, value: &[u8]) {
        self.lock()
            .devices
            .entry(addr)
            .or_default()
            .regs
            .insert(reg, value.to_vec());
    }

    pub fn set_reg_u16(&self, addr: u8, reg: u8, value: u16) {
        self.set_reg(addr, reg, &value.to_be_bytes());
    }

    pub fn reg(&self, addr: u8, reg: u8) -> Option<Vec<u8>> {
        self.lock()
            .devices
            .get(&addr)
            .and_then(|d| d.regs.get(&reg).cloned())
    }

    pub fn reg_u16(&self, addr: u8, reg: u8) -> Option<u16> {
        self.reg(addr, reg)
            .filter(|v| v.len() >= 2)
            .map(|v| u16::from_be_bytes([v[0], v[1]]))
    }

    /// Every write the device at `addr` has seen, in order.
    pub fn writes(&self, addr: u8) -> Vec<Vec<u8>> {
        self.lock()
            .devices
            .get(&addr)
            .map(|d| d.writes.clone())
            .unwrap_or_default()
    }

    /// Makes every following transfer fail until cleared.
    pub fn set_fail(&self, fail: bool) {
        self.lock().fail = fail;
    }

    fn with_device<R>(
        &self,
        addr: u8,
        f: impl FnOnce(&mut Device) -> R,
    ) -> Result<R, ErrorKind> {
        let mut bus = self.lock();
        if bus.fail {
            return Err(ErrorKind::Bus);
        }
        bus.devices
            .get_mut(&addr)
            .map(f)
            .ok_or(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address))
    }

    fn do_write(&self, addr: u8, bytes: &[u8]) -> Result<(), ErrorKind> {
        self.with_device(addr, |dev| {
            dev.writes.push(bytes.to_vec());
            if let Some((&reg, value)) = bytes.split_first() {
                dev.pointer = reg;
                if !value.is_empty() {
                    dev.regs.insert(reg, value.to_vec());
                }
            }
        })
    }

    fn do_read(&self, addr: u8, buffer: &mut [u8]) -> Result<(), ErrorKind> {
        self.with_device(addr, |dev| {
            buffer.fill(0);
            if let Some(value) = dev.regs.get(&dev.pointer) {
                let len = value.len().min(buffer.len());
                buffer[..len].copy_from_slice(&value[..len]);
            }
        })
    }
}

impl embedded_hal::i2c::ErrorType for RegisterMapI2c {
    type Error = ErrorKind;
}

impl embedded_hal::i2c::I2c for RegisterMapI2c {
    fn read(&mut self, addr: SevenBitAddress, buffer: &mut [u8]) -> Result<(), Self::Error> {
        self.do_read(addr, buffer)
    }

    fn write(&mut self, addr: SevenBitAddress, bytes: &[u8]) -> Result<(), Self::Error> {
        self.do_write(addr, bytes)
    }

    fn write_read(
        &mut self,
        addr: SevenBitAddress,
        bytes: &[u8],
        buffer: &mut [u8],
    ) -> Result<(), Self::Error> {
        self.do_write(addr, bytes)?;
        self.do_read(addr, buffer)
    }

    fn transaction(
        &mut self,
        addr: SevenBitAddress,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        for op in operations.iter_mut() {
            match op {
                Operation::Write(bytes) => self.do_write(addr, bytes)?,
                Operation::Read(buffer) => self.do_read(addr, buffer)?,
            }
        }
        Ok(())
    }
}
