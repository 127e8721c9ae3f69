// Licensed under the Apache-2.0 license

//! SMBIOS transfer (PLDM type 1): the structures the BIC holds for the host
//! and GetSMBIOSStructureByType to read them back.

use std::sync::{Arc, RwLock};

use log::{debug, info};
use pldm_common::codec::PldmCodec;
use pldm_common::message::smbios::{
    BiosInformation, GetSmbiosStructureByTypeRequest, GetSmbiosStructureByTypeResponse,
    SMBIOS_BY_TYPE_RESP_FIXED_LEN,
};
use pldm_common::protocol::base::{
    PldmBaseCompletionCode, PldmSupportedType, PldmVersion, TransferOperationFlag,
    TransferRespFlag,
};
use pldm_common::protocol::smbios::*;
use zerocopy::{FromBytes, IntoBytes};

use crate::error::{Result, ServiceError};
use crate::pldm::service::{respond_cc, HandlerResult, PldmContext, PldmResponder, PLDM_RESP_MAX};

pub const PLDM_SMBIOS_VERSION: PldmVersion = PldmVersion::new(1, 0, Some(0));

/// Default structure data per response: whatever fits in one PLDM response
/// next to the MCTP message type byte.
pub const SMBIOS_TRANSFER_MAX: usize = PLDM_RESP_MAX - 1 - SMBIOS_BY_TYPE_RESP_FIXED_LEN;

/// One SMBIOS structure: the formatted area followed by its text strings.
#[derive(Debug, Clone, PartialEq)]
pub struct SmbiosStructure {
    formatted: Vec<u8>,
    strings: Vec<String>,
}

impl SmbiosStructure {
    /// `formatted` starts with the type, length and handle header and its
    /// length byte must match. Strings are referenced from the formatted
    /// area by 1-based index and may be neither empty nor contain NUL.
    pub fn new(formatted: &[u8], strings: &[&str]) -> Result<Self> {
        if formatted.len() < 4 || formatted[1] as usize != formatted.len() {
            return Err(ServiceError::Smbios("formatted length mismatch"));
        }
        if u16::from_le_bytes([formatted[2], formatted[3]]) > SMBIOS_HANDLE_MAX {
            return Err(ServiceError::Smbios("handle out of range"));
        }
        if strings.iter().any(|s| s.is_empty() || s.contains('\0')) {
            return Err(ServiceError::Smbios("empty or NUL in text string"));
        }
        Ok(SmbiosStructure {
            formatted: formatted.to_vec(),
            strings: strings.iter().map(|s| s.to_string()).collect(),
        })
    }

    pub fn bios_information(info: &BiosInformation, strings: &[&str]) -> Result<Self> {
        Self::new(info.as_bytes(), strings)
    }

    pub fn structure_type(&self) -> u8 {
        self.formatted[0]
    }

    pub fn handle(&self) -> u16 {
        u16::from_le_bytes([self.formatted[2], self.formatted[3]])
    }

    /// String `index` counted from 1, as referenced by the formatted area.
    pub fn string(&self, index: u8) -> Option<&str> {
        let i = (index as usize).checked_sub(1)?;
        self.strings.get(i).map(String::as_str)
    }

    /// Size on the wire. A structure without strings still ends in two NULs.
    pub fn encoded_len(&self) -> usize {
        let strings: usize = self.strings.iter().map(|s| s.len() + 1).sum();
        self.formatted.len() + strings.max(1) + 1
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.formatted);
        if self.strings.is_empty() {
            out.push(0);
        }
        for s in &self.strings {
            out.extend_from_slice(s.as_bytes());
            out.push(0);
        }
        out.push(0);
    }
}

/// The SMBIOS structures the BIC serves, in insertion order. Starts with an
/// empty BIOS Information structure at handle 0.
pub struct SmbiosTable {
    structures: RwLock<Vec<SmbiosStructure>>,
}

impl Default for SmbiosTable {
    fn default() -> Self {
        let bios = SmbiosStructure {
            formatted: BiosInformation::new(0).as_bytes().to_vec(),
            strings: Vec::new(),
        };
        SmbiosTable {
            structures: RwLock::new(vec![bios]),
        }
    }
}

impl SmbiosTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.structures.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Adds `structure`, replacing any structure with the same handle.
    pub fn add_structure(&self, structure: SmbiosStructure) {
        let mut structures = self.structures.write().unwrap_or_else(|e| e.into_inner());
        match structures.iter_mut().find(|s| s.handle() == structure.handle()) {
            Some(existing) => *existing = structure,
            None => structures.push(structure),
        }
    }

    /// Replaces the BIOS Information structure, as the host does once it
    /// knows its own BIOS version.
    pub fn set_bios_information(
        &self,
        info: &BiosInformation,
        strings: &[&str],
    ) -> Result<()> {
        let structure = SmbiosStructure::bios_information(info, strings)?;
        let mut structures = self.structures.write().unwrap_or_else(|e| e.into_inner());
        let bios = SmbiosStructureType::BiosInformation as u8;
        structures.retain(|s| s.structure_type() != bios);
        structures.insert(0, structure);
        info!("SMBIOS BIOS information updated ({} strings)", strings.len());
        Ok(())
    }

    pub fn bios_version(&self) -> Option<String> {
        let structures = self.structures.read().unwrap_or_else(|e| e.into_inner());
        let bios = structures
            .iter()
            .find(|s| s.structure_type() == SmbiosStructureType::BiosInformation as u8)?;
        let info = BiosInformation::read_from_prefix(&bios.formatted).ok()?.0;
        bios.string(info.bios_version).map(str::to_string)
    }

    /// Runs GetSMBIOSStructureByType. Returns the next transfer handle, the
    /// transfer flag and the structure data, or the completion code.
    pub fn get_by_type(
        &self,
        req: &GetSmbiosStructureByTypeRequest,
        max_len: usize,
    ) -> core::result::Result<(u32, TransferRespFlag, Vec<u8>), u8> {
        let transfer_handle = req.data_transfer_handle;
        let instance_id = req.structure_instance_id;
        if transfer_handle > SMBIOS_HANDLE_MAX as u32 {
            return Err(PLDM_SMBIOS_INVALID_DATA_TRANSFER_HANDLE);
        }
        if instance_id > SMBIOS_HANDLE_MAX && instance_id != SMBIOS_ALL_INSTANCES {
            return Err(PLDM_SMBIOS_INVALID_SMBIOS_STRUCTURE_INSTANCE_ID);
        }

        let structures = self.structures.read().unwrap_or_else(|e| e.into_inner());
        let filtered: Vec<&SmbiosStructure> = structures
            .iter()
            .filter(|s| s.structure_type() == req.structure_type)
            .collect();
        let index_of = |handle: u16| filtered.iter().position(|s| s.handle() == handle);

        let (start, count) = if instance_id != SMBIOS_ALL_INSTANCES {
            (index_of(instance_id), 1)
        } else {
            let start = match TransferOperationFlag::try_from(req.transfer_operation_flag) {
                Ok(TransferOperationFlag::GetFirstPart) => Some(0),
                Ok(TransferOperationFlag::GetNextPart) => index_of(transfer_handle as u16),
                Err(_) => return Err(PLDM_SMBIOS_INVALID_TRANSFER_OPERATION_FLAG),
            };
            let mut total = 0;
            let count = filtered
                .iter()
                .skip(start.unwrap_or(0))
                .take_while(|s| {
                    total += s.encoded_len();
                    total <= max_len
                })
                .count();
            (start, count)
        };

        let Some(start) = start.filter(|&i| i < filtered.len()) else {
            return Err(PLDM_SMBIOS_NO_SMBIOS_STRUCTURES);
        };
        if count == 0 {
            debug!(
                "SMBIOS structure {:#06x} exceeds the transfer size",
                filtered[start].handle()
            );
            return Err(PldmBaseCompletionCode::InvalidLength as u8);
        }

        let end = start + count;
        let next = filtered.get(end).map(|s| s.handle() as u32).unwrap_or(0);
        let flag = match (start == 0, end >= filtered.len()) {
            (true, true) => TransferRespFlag::StartAndEnd,
            (true, false) => TransferRespFlag::Start,
            (false, true) => TransferRespFlag::End,
            (false, false) => TransferRespFlag::Middle,
        };
        let mut data = Vec::new();
        for s in &filtered[start..end] {
            s.encode_into(&mut data);
        }
        Ok((next, flag, data))
    }
}

pub struct SmbiosResponder {
    table: Arc<SmbiosTable>,
    transfer_max: usize,
}

impl SmbiosResponder {
    pub fn new(table: Arc<SmbiosTable>) -> Self {
        SmbiosResponder {
            table,
            transfer_max: SMBIOS_TRANSFER_MAX,
        }
    }

    /// Caps the structure data in one response below the default.
    pub fn with_transfer_max(mut self, transfer_max: usize) -> Self {
        self.transfer_max = transfer_max.min(SMBIOS_TRANSFER_MAX);
        self
    }
}

impl PldmResponder for SmbiosResponder {
    fn pldm_type(&self) -> PldmSupportedType {
        PldmSupportedType::Smbios
    }

    fn supports(&self, cmd: u8) -> bool {
        SmbiosCmd::try_from(cmd).is_ok()
    }

    fn version(&self) -> Option<PldmVersion> {
        Some(PLDM_SMBIOS_VERSION)
    }

    fn handle(&self, ctx: &PldmContext, req: &[u8], resp: &mut [u8]) -> Result<HandlerResult> {
        let hdr = &ctx.hdr;
        if SmbiosCmd::try_from(hdr.cmd_code()).is_err() {
            return respond_cc(hdr, PldmBaseCompletionCode::UnsupportedPldmCmd as u8, resp);
        }
        if req.len() != core::mem::size_of::<GetSmbiosStructureByTypeRequest>() {
            return respond_cc(hdr, PldmBaseCompletionCode::InvalidLength as u8, resp);
        }
        let get = GetSmbiosStructureByTypeRequest::decode(req)?;
        match self.table.get_by_type(&get, self.transfer_max) {
            Ok((next, flag, data)) => {
                let len =
                    GetSmbiosStructureByTypeResponse::new(hdr, next, flag, &data).encode(resp)?;
                Ok(HandlerResult::Respond(len))
            }
            Err(cc) => respond_cc(hdr, cc, resp),
        }
    }
}
