// Licensed under the Apache-2.0 license

//! MCTP wire formats shared by the BIC services: the transport header,
//! packetization and reassembly, the SMBus binding and the control protocol
//! messages.

pub mod control;
pub mod error;
pub mod packet;
pub mod protocol;
pub mod smbus;

pub use error::{MctpError, Result};
