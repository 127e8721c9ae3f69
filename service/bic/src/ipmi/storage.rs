// Licensed under the Apache-2.0 license

//! Storage netfn commands: FRU access, the SDR repository and SEL
//! forwarding.

use bic_sensor::lock;
use ipmi_common::protocol::{
    Channel, CompletionCode, IpmiMsg, StorageCmd, IPMI_DATA_MAX_LENGTH, NETFN_STORAGE_REQ,
};
use log::warn;

use crate::ipmi::{expect_empty, expect_len, invalid_cmd, IpmiContext, IpmiResult};

/// IPMI limits FRU transfers to 32 bytes.
pub const FRU_TRANSFER_MAX: usize = 32;
pub const SEL_ENTRY_LEN: usize = 16;

const FRU_ACCESS_BYTES: u8 = 0;
const SDR_RSV_TABLE_DEFAULT: usize = 0;
const SDR_RSV_TABLE_SLOT3: usize = 1;
/// Next record id in front of the record bytes.
const GET_SDR_RESP_HDR: usize = 2;

pub fn handle(ctx: &IpmiContext, msg: &IpmiMsg) -> IpmiResult {
    let Ok(cmd) = StorageCmd::try_from(msg.cmd) else {
        return invalid_cmd(msg);
    };
    match cmd {
        StorageCmd::GetFruidInfo => get_fru_info(ctx, msg),
        StorageCmd::ReadFruidData => read_fru(ctx, msg),
        StorageCmd::WriteFruidData => write_fru(ctx, msg),
        StorageCmd::RsvSdr => reserve_sdr(ctx, msg),
        StorageCmd::GetSdr => get_sdr(ctx, msg),
        StorageCmd::AddSel => add_sel(ctx, msg),
        StorageCmd::GetSelInfo | StorageCmd::RsvSel | StorageCmd::GetSel => invalid_cmd(msg),
    }
}

fn get_fru_info(ctx: &IpmiContext, msg: &IpmiMsg) -> IpmiResult {
    expect_len(msg, 1)?;
    let size = ctx
        .platform
        .fru()
        .size(msg.data[0])
        .ok_or(CompletionCode::UnspecifiedError)?;
    let [lsb, msb] = size.to_le_bytes();
    Ok(vec![lsb, msb, FRU_ACCESS_BYTES])
}

/// Checks `fru_id` exists and `offset` lies inside it.
fn check_fru_range(ctx: &IpmiContext, fru_id: u8, offset: u16) -> Result<(), CompletionCode> {
    let size = ctx
        .platform
        .fru()
        .size(fru_id)
        .ok_or(CompletionCode::InvalidParam)?;
    if offset >= size {
        return Err(CompletionCode::ParamOutOfRange);
    }
    Ok(())
}

/// `[fru id, offset LE, count]`
fn read_fru(ctx: &IpmiContext, msg: &IpmiMsg) -> IpmiResult {
    expect_len(msg, 4)?;
    let fru_id = msg.data[0];
    let offset = u16::from_le_bytes([msg.data[1], msg.data[2]]);
    let len = msg.data[3] as usize;
    if len > FRU_TRANSFER_MAX {
        return Err(CompletionCode::LengthExceeded);
    }
    check_fru_range(ctx, fru_id, offset)?;
    let data = ctx.platform.fru().read(fru_id, offset, len).map_err(|e| {
        warn!("FRU {} read at {:#06x} failed: {}", fru_id, offset, e);
        CompletionCode::FruDevBusy
    })?;
    let mut resp = vec![data.len() as u8];
    resp.extend_from_slice(&data);
    Ok(resp)
}

/// `[fru id, offset LE, data..]`
fn write_fru(ctx: &IpmiContext, msg: &IpmiMsg) -> IpmiResult {
    if msg.data.len() < 4 {
        return Err(CompletionCode::InvalidLength);
    }
    let fru_id = msg.data[0];
    let offset = u16::from_le_bytes([msg.data[1], msg.data[2]]);
    let data = &msg.data[3..];
    if data.len() > FRU_TRANSFER_MAX {
        return Err(CompletionCode::LengthExceeded);
    }
    check_fru_range(ctx, fru_id, offset)?;
    let written = ctx.platform.fru().write(fru_id, offset, data).map_err(|e| {
        warn!("FRU {} write at {:#06x} failed: {}", fru_id, offset, e);
        CompletionCode::FruDevBusy
    })?;
    Ok(vec![written as u8])
}

/// Slot 1 and slot 3 BICs share the repository but hold separate
/// reservations.
fn rsv_table(msg: &IpmiMsg) -> usize {
    if msg.source() == Some(Channel::Slot3Bic) {
        SDR_RSV_TABLE_SLOT3
    } else {
        SDR_RSV_TABLE_DEFAULT
    }
}

fn reserve_sdr(ctx: &IpmiContext, msg: &IpmiMsg) -> IpmiResult {
    expect_empty(msg)?;
    let id = lock(&ctx.sdr)
        .reserve(rsv_table(msg))
        .ok_or(CompletionCode::UnspecifiedError)?;
    Ok(id.to_le_bytes().to_vec())
}

/// `[reservation LE, record id LE, offset, count]`
fn get_sdr(ctx: &IpmiContext, msg: &IpmiMsg) -> IpmiResult {
    expect_len(msg, 6)?;
    let rsv_id = u16::from_le_bytes([msg.data[0], msg.data[1]]);
    let record_id = u16::from_le_bytes([msg.data[2], msg.data[3]]);
    let offset = msg.data[4] as usize;
    let len = msg.data[5] as usize;

    let sdr = lock(&ctx.sdr);
    if !sdr.check_reservation(rsv_table(msg), rsv_id) {
        return Err(CompletionCode::InvalidReservation);
    }
    if !sdr.check_record_id(record_id) {
        return Err(CompletionCode::InvalidDataField);
    }
    if len + GET_SDR_RESP_HDR > IPMI_DATA_MAX_LENGTH {
        return Err(CompletionCode::LengthExceeded);
    }
    let bytes = sdr
        .record_bytes(record_id)
        .ok_or(CompletionCode::InvalidDataField)?;
    if offset + len > bytes.len() {
        return Err(CompletionCode::ParamOutOfRange);
    }

    let mut resp = sdr.get_record_id(record_id).to_le_bytes().to_vec();
    resp.extend_from_slice(&bytes[offset..offset + len]);
    Ok(resp)
}

/// Forwards a 16-byte SEL entry to the BMC.
fn add_sel(ctx: &IpmiContext, msg: &IpmiMsg) -> IpmiResult {
    expect_len(msg, SEL_ENTRY_LEN)?;
    let bmc = ctx
        .channels
        .get(Channel::BmcIpmb.into())
        .ok_or(CompletionCode::UnspecifiedError)?;
    let mut sel = IpmiMsg::request(NETFN_STORAGE_REQ, StorageCmd::AddSel.into(), &msg.data);
    sel.inf_source = Channel::Local.into();
    sel.inf_target = Channel::BmcIpmb.into();
    bmc.ipmb_read(sel).map_err(|e| {
        warn!("Add SEL to the BMC failed: {}", e);
        CompletionCode::UnspecifiedError
    })?;
    Ok(Vec::new())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ipmi::test_util::{fixture, request};

    fn run(ctx: &IpmiContext, cmd: StorageCmd, data: &[u8]) -> IpmiResult {
        handle(ctx, &request(NETFN_STORAGE_REQ, cmd.into(), data))
    }

    #[test]
    fn test_fru_info_read_write() {
        let f = fixture();
        f.platform.memory_fru().add(1, 256);

        assert_eq!(run(&f.ctx, StorageCmd::GetFruidInfo, &[1]), Ok(vec![0x00, 0x01, 0x00]));
        assert_eq!(
            run(&f.ctx, StorageCmd::GetFruidInfo, &[9]),
            Err(CompletionCode::UnspecifiedError)
        );
        assert_eq!(
            run(&f.ctx, StorageCmd::GetFruidInfo, &[1, 0]),
            Err(CompletionCode::InvalidLength)
        );

        assert_eq!(
            run(&f.ctx, StorageCmd::WriteFruidData, &[1, 0x10, 0x00, 0xDE, 0xAD]),
            Ok(vec![2])
        );
        assert_eq!(
            run(&f.ctx, StorageCmd::ReadFruidData, &[1, 0x10, 0x00, 3]),
            Ok(vec![3, 0xDE, 0xAD, 0xFF])
        );
        assert_eq!(
            run(&f.ctx, StorageCmd::ReadFruidData, &[1, 0x10, 0x00, 33]),
            Err(CompletionCode::LengthExceeded)
        );
        assert_eq!(
            run(&f.ctx, StorageCmd::ReadFruidData, &[1, 0x00, 0x01, 1]),
            Err(CompletionCode::ParamOutOfRange)
        );
        assert_eq!(
            run(&f.ctx, StorageCmd::ReadFruidData, &[2, 0x00, 0x00, 1]),
            Err(CompletionCode::InvalidParam)
        );
        let mut too_long = vec![1, 0, 0];
        too_long.extend_from_slice(&[0u8; 33]);
        assert_eq!(
            run(&f.ctx, StorageCmd::WriteFruidData, &too_long),
            Err(CompletionCode::LengthExceeded)
        );
    }

    #[test]
    fn test_reserve_and_get_sdr() {
        let f = fixture();
        let rsv = run(&f.ctx, StorageCmd::RsvSdr, &[]).unwrap();
        assert_eq!(rsv, vec![1, 0]);

        // Record 0 header: id LE, version 0x51, type 1, length.
        let resp = run(&f.ctx, StorageCmd::GetSdr, &[1, 0, 0, 0, 0, 5]).unwrap();
        assert_eq!(&resp[..2], &[1, 0]);
        assert_eq!(&resp[2..6], &[0, 0, 0x51, 0x01]);

        // The last record points at the end marker.
        let resp = run(&f.ctx, StorageCmd::GetSdr, &[1, 0, 1, 0, 0, 2]).unwrap();
        assert_eq!(&resp[..2], &[0xFF, 0xFF]);

        assert_eq!(
            run(&f.ctx, StorageCmd::GetSdr, &[2, 0, 0, 0, 0, 5]),
            Err(CompletionCode::InvalidReservation)
        );
        assert_eq!(
            run(&f.ctx, StorageCmd::GetSdr, &[1, 0, 7, 0, 0, 5]),
            Err(CompletionCode::InvalidDataField)
        );
        assert_eq!(
            run(&f.ctx, StorageCmd::GetSdr, &[1, 0, 0, 0, 0, 0xFF]),
            Err(CompletionCode::ParamOutOfRange)
        );
        assert_eq!(
            run(&f.ctx, StorageCmd::GetSdr, &[1, 0, 0, 0, 0]),
            Err(CompletionCode::InvalidLength)
        );
    }

    #[test]
    fn test_slot3_reservations_are_separate() {
        let f = fixture();
        let mut msg = request(NETFN_STORAGE_REQ, StorageCmd::RsvSdr.into(), &[]);
        msg.inf_source = Channel::Slot3Bic.into();
        assert_eq!(handle(&f.ctx, &msg), Ok(vec![1, 0]));
        assert_eq!(run(&f.ctx, StorageCmd::RsvSdr, &[]), Ok(vec![1, 0]));
        assert_eq!(run(&f.ctx, StorageCmd::RsvSdr, &[]), Ok(vec![2, 0]));
    }

    #[test]
    fn test_add_sel_without_bmc() {
        let f = fixture();
        assert_eq!(
            run(&f.ctx, StorageCmd::AddSel, &[0; 16]),
            Err(CompletionCode::UnspecifiedError)
        );
        assert_eq!(
            run(&f.ctx, StorageCmd::AddSel, &[0; 15]),
            Err(CompletionCode::InvalidLength)
        );
        assert_eq!(run(&f.ctx, StorageCmd::GetSel, &[]), Err(CompletionCode::InvalidCmd));
    }
}
