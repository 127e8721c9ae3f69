// Licensed under the Apache-2.0 license

use num_enum::{IntoPrimitive, TryFromPrimitive};

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum FwUpdateCmd {
    QueryDeviceIdentifiers = 0x01,
    GetFirmwareParameters = 0x02,
    RequestUpdate = 0x10,
    PassComponentTable = 0x13,
    UpdateComponent = 0x14,
    RequestFirmwareData = 0x15,
    TransferComplete = 0x16,
    VerifyComplete = 0x17,
    ApplyComplete = 0x18,
    ActivateFirmware = 0x1A,
    GetStatus = 0x1B,
    CancelUpdateComponent = 0x1C,
    CancelUpdate = 0x1D,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum FwUpdateCompletionCode {
    NotInUpdateMode = 0x80,
    AlreadyInUpdateMode = 0x81,
    DataOutOfRange = 0x82,
    InvalidTransferLength = 0x83,
    InvalidStateForCommand = 0x84,
    IncompleteUpdate = 0x85,
    BusyInBackground = 0x86,
    CancelPending = 0x87,
    CommandNotExpected = 0x88,
    RetryRequestFwData = 0x89,
    UnableToInitiateUpdate = 0x8A,
    ActivationNotRequired = 0x8B,
    SelfContainedActivationNotPermitted = 0x8C,
    NoDeviceMetadata = 0x8D,
    RetryRequestUpdate = 0x8E,
    NoPackageData = 0x8F,
    InvalidTransferHandle = 0x90,
    InvalidTransferOperationFlag = 0x91,
    ActivatePendingImageNotPermitted = 0x92,
    PackageDataError = 0x93,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum FirmwareDeviceState {
    Idle = 0,
    LearnComponents = 1,
    ReadyXfer = 2,
    Download = 3,
    Verify = 4,
    Apply = 5,
    Activate = 6,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum AuxState {
    OperationInProgress = 0,
    OperationSuccessful = 1,
    OperationFailed = 2,
    IdleLearnComponentsReadXfer = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum GetStatusReasonCode {
    Initialization = 0,
    ActivateFw = 1,
    CancelUpdate = 2,
    LearnComponentTimeout = 3,
    ReadyXferTimeout = 4,
    DownloadTimeout = 5,
    VerifyTimeout = 6,
    ApplyTimeout = 7,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum TransferResult {
    TransferSuccess = 0x00,
    TransferErrorImageCorrupt = 0x01,
    TransferErrorVersionMismatch = 0x02,
    FdAbortedTransfer = 0x03,
    FdAbortedTransferLowPowerState = 0x0B,
    FdAbortedTransferResetNeeded = 0x0C,
    FdAbortedTransferStorageIssue = 0x0D,
}

/// Result code the device reports when a transfer, verify or apply step
/// fails for a reason not covered by a specific code.
pub const PLDM_FW_UPDATE_GENERIC_ERROR: u8 = 0x0A;

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u16)]
pub enum ComponentClassification {
    Unknown = 0x0000,
    Other = 0x0001,
    Firmware = 0x000A,
    Downstream = 0xFFFF,
}

/// Identifiers allowed for a downstream device component.
pub const DOWNSTREAM_COMPONENT_ID_MAX: u16 = 0x0FFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum ComponentResponse {
    CompCanBeUpdated = 0,
    CompMayBeUpdated = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum ComponentCompatibilityResponse {
    CompCanBeUpdated = 0,
    CompCannotBeUpdated = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum VersionStringType {
    Unspecified = 0,
    Ascii = 1,
    Utf8 = 2,
    Utf16 = 3,
    Utf16Le = 4,
    Utf16Be = 5,
}

/// Size of a firmware chunk requested from the update agent.
pub const FW_UPDATE_CHUNK_SIZE: u32 = 224;
/// Chunks never straddle a flash sector of this size.
pub const FW_UPDATE_SECTOR_SIZE: u32 = 0x10000;
