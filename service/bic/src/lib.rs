// Licensed under the Apache-2.0 license

//! Management services of a bridge IC: MCTP over SMBus with its control
//! protocol, PLDM (base, platform monitoring, firmware update and OEM
//! bridging) and IPMI over IPMB.

pub mod config;
pub mod daemon;
pub mod error;
pub mod event_queue;
pub mod ipmb;
pub mod ipmi;
pub mod mctp;
pub mod mctp_ctrl;
pub mod pending;
pub mod platform;
pub mod pldm;
pub mod ticker;
pub mod transport;

pub use config::ServiceConfig;
pub use daemon::{BicDaemon, Options, Transports};
pub use error::{Result, ServiceError};
