// Licensed under the Apache-2.0 license

//! SMBIOS transfer (PLDM type 1, DSP0246).

use num_enum::{IntoPrimitive, TryFromPrimitive};

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum SmbiosCmd {
    GetSmbiosStructureByType = 0x06,
}

pub const PLDM_SMBIOS_INVALID_DATA_TRANSFER_HANDLE: u8 = 0x80;
pub const PLDM_SMBIOS_INVALID_TRANSFER_OPERATION_FLAG: u8 = 0x81;
pub const PLDM_SMBIOS_INVALID_TRANSFER_FLAG: u8 = 0x82;
pub const PLDM_SMBIOS_NO_SMBIOS_STRUCTURES: u8 = 0x86;
pub const PLDM_SMBIOS_INVALID_SMBIOS_STRUCTURE_TYPE: u8 = 0x87;
pub const PLDM_SMBIOS_INVALID_SMBIOS_STRUCTURE_HANDLE: u8 = 0x88;
pub const PLDM_SMBIOS_INVALID_SMBIOS_STRUCTURE_INSTANCE_ID: u8 = 0x89;

/// Structure handles run from 0 to 0xFEFF.
pub const SMBIOS_HANDLE_MAX: u16 = 0xFEFF;
/// StructureInstanceID asking for every structure of the type.
pub const SMBIOS_ALL_INSTANCES: u16 = 0xFFFF;

/// Structure types the BIC can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum SmbiosStructureType {
    BiosInformation = 0,
}

/// Formatted area of a BIOS Information structure, SMBIOS 3.x layout.
pub const SMBIOS_BIOS_INFORMATION_LEN: u8 = 0x1A;
