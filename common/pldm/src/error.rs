// Licensed under the Apache-2.0 license

use thiserror_no_std::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PldmError {
    #[error("invalid PLDM header version")]
    InvalidHeaderVersion,
    #[error("invalid PLDM message type")]
    InvalidMsgType,
    #[error("unsupported PLDM type {0:#04x}")]
    InvalidPldmType(u8),
    #[error("unsupported PLDM command {0:#04x}")]
    UnsupportedCmd(u8),
    #[error("invalid completion code {0:#04x}")]
    InvalidCompletionCode(u8),
    #[error("invalid transfer flag")]
    InvalidTransferFlag,
    #[error("invalid verify result")]
    InvalidVerifyResult,
    #[error("invalid firmware update state")]
    InvalidFdState,
    #[error("invalid event class")]
    InvalidEventClass,
    #[error("invalid length")]
    InvalidLength,
    #[error("invalid data")]
    InvalidData,
}
