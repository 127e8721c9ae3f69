// Licensed under the Apache-2.0 license

use ipmi_common::IpmbError;
use mctp_common::MctpError;
use pldm_common::codec::PldmCodecError;
use pldm_common::error::PldmError;
use thiserror_no_std::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("MCTP error: {0}")]
    Mctp(#[from] MctpError),
    #[error("IPMB error: {0}")]
    Ipmb(#[from] IpmbError),
    #[error("PLDM error: {0}")]
    Pldm(#[from] PldmError),
    #[error("PLDM codec error: {0}")]
    Codec(#[from] PldmCodecError),
    #[error("request timed out")]
    Timeout,
    #[error("no free instance id")]
    NoInstanceId,
    #[error("no route to endpoint {0:#04x}")]
    UnknownEndpoint(u8),
    #[error("channel closed")]
    ChannelClosed,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("peer answered with completion code {0:#04x}")]
    CompletionCode(u8),
    #[error("event queue full")]
    EventQueueFull,
    #[error("event receiver did not log the event (status {0:#04x})")]
    EventNotLogged(u8),
    #[error("invalid SMBIOS structure: {0}")]
    Smbios(&'static str),
    #[error("firmware update cancelled")]
    UpdateCancelled,
}

pub type Result<T> = core::result::Result<T, ServiceError>;
