// Licensed under the Apache-2.0 license

use thiserror_no_std::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpmbError {
    #[error("IPMB transfer failed")]
    Failure,
    #[error("IPMB request timed out")]
    Timeout,
    #[error("invalid IPMB request")]
    InvalidRequest,
    #[error("IPMB header checksum mismatch")]
    HeaderChecksum,
    #[error("IPMB message checksum mismatch")]
    MessageChecksum,
    #[error("IPMB queue full")]
    QueueFull,
    #[error("unknown IPMB error")]
    Unknown,
}

pub type Result<T> = core::result::Result<T, IpmbError>;
