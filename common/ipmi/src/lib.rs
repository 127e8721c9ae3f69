// Licensed under the Apache-2.0 license

//! IPMI definitions shared by the BIC services and the IPMB frame codec.

pub mod error;
pub mod ipmb;
pub mod protocol;

pub use error::{IpmbError, Result};
pub use protocol::IpmiMsg;
