// Licensed under the Apache-2.0 license

//! Board hooks the services call into: GPIO, resets, raw I2C, the FRU
//! store and the firmware image writer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use bic_sensor::dev::RegisterMapI2c;
use bic_sensor::lock;
use embedded_hal::i2c::I2c;
use log::{debug, info};

use crate::error::{Result, ServiceError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpioDirection {
    Input,
    Output,
}

pub trait FruStore: Send + Sync {
    /// Size of FRU `fru_id` in bytes, `None` if there is no such FRU.
    fn size(&self, fru_id: u8) -> Option<u16>;

    fn read(&self, fru_id: u8, offset: u16, len: usize) -> Result<Vec<u8>>;

    /// Returns the number of bytes written.
    fn write(&self, fru_id: u8, offset: u16, data: &[u8]) -> Result<usize>;
}

/// Destination of a firmware image received through PLDM update.
pub trait FirmwareWriter: Send + Sync {
    fn write_chunk(&self, offset: u32, data: &[u8], last: bool) -> Result<()>;
}

pub trait Platform: Send + Sync {
    /// Direction of `pin`, `None` if the pin was never configured.
    fn gpio_direction(&self, pin: u8) -> Option<GpioDirection>;
    fn gpio_get(&self, pin: u8) -> Option<bool>;
    fn gpio_set(&self, pin: u8, high: bool) -> Result<()>;
    fn gpio_config(&self, pin: u8, dir: GpioDirection) -> Result<()>;

    fn cold_reset(&self);
    fn warm_reset(&self);

    fn i2c_bus_count(&self) -> u8;
    /// Writes `tx` to `addr` on `bus`, then reads `rx_len` bytes back.
    fn i2c_write_read(&self, bus: u8, addr: u8, tx: &[u8], rx_len: usize) -> Result<Vec<u8>>;

    fn fru(&self) -> &dyn FruStore;
    fn firmware(&self) -> &dyn FirmwareWriter;
}

#[derive(Default)]
pub struct MemoryFru {
    frus: Mutex<HashMap<u8, Vec<u8>>>,
}

impl MemoryFru {
    pub fn add(&self, fru_id: u8, size: usize) {
        lock(&self.frus).insert(fru_id, vec![0xFF; size]);
    }
}

impl FruStore for MemoryFru {
    fn size(&self, fru_id: u8) -> Option<u16> {
        lock(&self.frus).get(&fru_id).map(|f| f.len() as u16)
    }

    fn read(&self, fru_id: u8, offset: u16, len: usize) -> Result<Vec<u8>> {
        let frus = lock(&self.frus);
        let fru = frus
            .get(&fru_id)
            .ok_or_else(|| ServiceError::Transport(format!("no FRU {}", fru_id)))?;
        let start = offset as usize;
        let end = (start + len).min(fru.len());
        Ok(fru.get(start..end).unwrap_or_default().to_vec())
    }

    fn write(&self, fru_id: u8, offset: u16, data: &[u8]) -> Result<usize> {
        let mut frus = lock(&self.frus);
        let fru = frus
            .get_mut(&fru_id)
            .ok_or_else(|| ServiceError::Transport(format!("no FRU {}", fru_id)))?;
        let start = offset as usize;
        if start >= fru.len() {
            return Ok(0);
        }
        let n = data.len().min(fru.len() - start);
        fru[start..start + n].copy_from_slice(&data[..n]);
        Ok(n)
    }
}

#[derive(Default)]
pub struct MemoryFirmware {
    image: Mutex<Vec<u8>>,
    complete: Mutex<bool>,
}

impl MemoryFirmware {
    pub fn image(&self) -> Vec<u8> {
        lock(&self.image).clone()
    }

    pub fn is_complete(&self) -> bool {
        *lock(&self.complete)
    }
}

impl FirmwareWriter for MemoryFirmware {
    fn write_chunk(&self, offset: u32, data: &[u8], last: bool) -> Result<()> {
        let mut image = lock(&self.image);
        if offset == 0 {
            image.clear();
            *lock(&self.complete) = false;
        }
        let start = offset as usize;
        if image.len() < start + data.len() {
            image.resize(start + data.len(), 0xFF);
        }
        image[start..start + data.len()].copy_from_slice(data);
        if last {
            info!("Firmware image complete, {} bytes", image.len());
            *lock(&self.complete) = true;
        }
        Ok(())
    }
}

/// In-memory board used by the binary and the tests.
pub struct SimulatedPlatform {
    gpios: Mutex<HashMap<u8, (GpioDirection, bool)>>,
    buses: Vec<RegisterMapI2c>,
    cold_resets: AtomicUsize,
    warm_resets: AtomicUsize,
    fru: MemoryFru,
    firmware: MemoryFirmware,
}

impl SimulatedPlatform {
    pub fn new(bus_count: usize) -> Self {
        SimulatedPlatform {
            gpios: Mutex::new(HashMap::new()),
            buses: (0..bus_count).map(|_| RegisterMapI2c::new()).collect(),
            cold_resets: AtomicUsize::new(0),
            warm_resets: AtomicUsize::new(0),
            fru: MemoryFru::default(),
            firmware: MemoryFirmware::default(),
        }
    }

    /// Shared handle to `bus`, for attaching sensor drivers or inspecting
    /// traffic.
    pub fn bus(&self, bus: u8) -> Option<RegisterMapI2c> {
        self.buses.get(bus as usize).cloned()
    }

    pub fn memory_fru(&self) -> &MemoryFru {
        &self.fru
    }

    pub fn memory_firmware(&self) -> &MemoryFirmware {
        &self.firmware
    }

    pub fn cold_resets(&self) -> usize {
        self.cold_resets.load(Ordering::SeqCst)
    }

    pub fn warm_resets(&self) -> usize {
        self.warm_resets.load(Ordering::SeqCst)
    }
}

impl Platform for SimulatedPlatform {
    fn gpio_direction(&self, pin: u8) -> Option<GpioDirection> {
        lock(&self.gpios).get(&pin).map(|(dir, _)| *dir)
    }

    fn gpio_get(&self, pin: u8) -> Option<bool> {
        lock(&self.gpios).get(&pin).map(|(_, val)| *val)
    }

    fn gpio_set(&self, pin: u8, high: bool) -> Result<()> {
        let mut gpios = lock(&self.gpios);
        let entry = gpios.entry(pin).or_insert((GpioDirection::Output, false));
        entry.1 = high;
        debug!("GPIO {} -> {}", pin, high as u8);
        Ok(())
    }

    fn gpio_config(&self, pin: u8, dir: GpioDirection) -> Result<()> {
        lock(&self.gpios).entry(pin).or_insert((dir, false)).0 = dir;
        Ok(())
    }

    fn cold_reset(&self) {
        info!("Cold reset requested");
        self.cold_resets.fetch_add(1, Ordering::SeqCst);
    }

    fn warm_reset(&self) {
        info!("Warm reset requested");
        self.warm_resets.fetch_add(1, Ordering::SeqCst);
    }

    fn i2c_bus_count(&self) -> u8 {
        self.buses.len() as u8
    }

    fn i2c_write_read(&self, bus: u8, addr: u8, tx: &[u8], rx_len: usize) -> Result<Vec<u8>> {
        let mut i2c = self
            .bus(bus)
            .ok_or_else(|| ServiceError::Transport(format!("no I2C bus {}", bus)))?;
        let mut rx = vec![0u8; rx_len];
        let res = if rx_len == 0 {
            i2c.write(addr, tx)
        } else {
            i2c.write_read(addr, tx, &mut rx)
        };
        res.map_err(|e| ServiceError::Transport(format!("I2C {}:{:#04x}: {:?}", bus, addr, e)))?;
        Ok(rx)
    }

    fn fru(&self) -> &dyn FruStore {
        &self.fru
    }

    fn firmware(&self) -> &dyn FirmwareWriter {
        &self.firmware
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_i2c_write_read() {
        let platform = SimulatedPlatform::new(2);
        let bus = platform.bus(1).unwrap();
        bus.set_reg(0x40, 0x02, &[0x12, 0x34]);

        assert_eq!(
            platform.i2c_write_read(1, 0x40, &[0x02], 2).unwrap(),
            vec![0x12, 0x34]
        );
        assert!(platform.i2c_write_read(5, 0x40, &[0x02], 2).is_err());
        assert!(platform.i2c_write_read(0, 0x40, &[0x02], 2).is_err());
    }

    #[test]
    fn test_fru_bounds() {
        let platform = SimulatedPlatform::new(0);
        platform.memory_fru().add(1, 8);
        let fru = platform.fru();
        assert_eq!(fru.size(1), Some(8));
        assert_eq!(fru.size(2), None);
        assert_eq!(fru.write(1, 6, &[1, 2, 3]).unwrap(), 2);
        assert_eq!(fru.read(1, 5, 8).unwrap(), vec![0xFF, 1, 2]);
        assert_eq!(fru.write(1, 9, &[1]).unwrap(), 0);
    }
}
