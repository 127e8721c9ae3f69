// Licensed under the Apache-2.0 license

use thiserror_no_std::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MctpError {
    #[error("buffer too short")]
    BufferTooShort,
    #[error("unsupported MCTP header version {0}")]
    InvalidHeaderVersion(u8),
    #[error("unexpected SMBus command code {0:#04x}")]
    InvalidCommand(u8),
    #[error("invalid length")]
    InvalidLength,
    #[error("PEC mismatch: expected {expected:#04x}, got {actual:#04x}")]
    PecMismatch { expected: u8, actual: u8 },
    #[error("message exceeds the assembly buffer")]
    MessageTooLarge,
    #[error("packet received without a preceding SOM")]
    MissingSom,
    #[error("empty message")]
    EmptyMessage,
}

pub type Result<T> = core::result::Result<T, MctpError>;
