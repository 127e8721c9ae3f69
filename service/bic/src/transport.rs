// Licensed under the Apache-2.0 license

//! Raw access to an SMBus/I2C port.
//!
//! The same transport carries MCTP frames and IPMB frames; the layers above
//! only see complete frames addressed by 7-bit slave addresses.

use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bic_sensor::lock;
use log::trace;

use crate::error::{Result, ServiceError};

pub trait SmbusTransport: Send + Sync {
    /// Writes one frame to the slave at `dest_addr`.
    fn write(&self, dest_addr: u8, frame: &[u8]) -> Result<()>;

    /// Waits up to `timeout` for the next frame written to us.
    fn read(&self, timeout: Duration) -> Result<Option<Vec<u8>>>;
}

/// In-memory bus connecting any number of [`MockSmbus`] endpoints.
#[derive(Clone, Default)]
pub struct MockSmbusBus {
    nodes: Arc<Mutex<HashMap<u8, Sender<Vec<u8>>>>>,
}

impl MockSmbusBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node answering at `addr`. Attaching the same address again
    /// replaces the earlier node.
    pub fn attach(&self, addr: u8) -> MockSmbus {
        let (tx, rx) = mpsc::channel();
        lock(&self.nodes).insert(addr, tx);
        MockSmbus {
            addr,
            bus: self.clone(),
            rx: Mutex::new(rx),
        }
    }

    pub fn detach(&self, addr: u8) {
        lock(&self.nodes).remove(&addr);
    }
}

pub struct MockSmbus {
    addr: u8,
    bus: MockSmbusBus,
    rx: Mutex<Receiver<Vec<u8>>>,
}

impl MockSmbus {
    pub fn addr(&self) -> u8 {
        self.addr
    }
}

impl SmbusTransport for MockSmbus {
    fn write(&self, dest_addr: u8, frame: &[u8]) -> Result<()> {
        let nodes = lock(&self.bus.nodes);
        let node = nodes
            .get(&dest_addr)
            .ok_or_else(|| ServiceError::Transport(format!("no ack from {:#04x}", dest_addr)))?;
        trace!("{:#04x} -> {:#04x}: {:02x?}", self.addr, dest_addr, frame);
        node.send(frame.to_vec())
            .map_err(|_| ServiceError::Transport(format!("{:#04x} went away", dest_addr)))
    }

    fn read(&self, timeout: Duration) -> Result<Option<Vec<u8>>> {
        match lock(&self.rx).recv_timeout(timeout) {
            Ok(frame) => Ok(Some(frame)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(ServiceError::ChannelClosed),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_frames_reach_the_addressed_node() {
        let bus = MockSmbusBus::new();
        let a = bus.attach(0x20);
        let b = bus.attach(0x10);

        a.write(0x10, &[1, 2, 3]).unwrap();
        assert_eq!(b.read(Duration::from_millis(100)).unwrap(), Some(vec![1, 2, 3]));
        assert_eq!(a.read(Duration::from_millis(1)).unwrap(), None);

        assert!(matches!(a.write(0x30, &[0]), Err(ServiceError::Transport(_))));
        bus.detach(0x10);
        assert!(matches!(a.write(0x10, &[0]), Err(ServiceError::Transport(_))));
    }
}
