// Licensed under the Apache-2.0 license

//! Application netfn commands.

use bitfield::bitfield;
use bic_sensor::lock;
use ipmi_common::protocol::{iana_bytes, AppCmd, CompletionCode, IpmiMsg};
use log::{info, warn};

use crate::ipmi::{expect_empty, invalid_cmd, IpmiContext, IpmiResult};

const SELFTEST_NO_ERROR: u8 = 0x55;
const SELFTEST_ERROR: u8 = 0x57;
const SELFTEST_FRU_ID: u8 = 0;
const SELFTEST_FRU_HDR_LEN: usize = 8;

bitfield! {
    /// Second byte of the Get Self Test Results response.
    #[derive(Clone, Copy, Default)]
    pub struct SelfTestResult(u8);
    impl Debug;
    pub op_fw_corrupt, set_op_fw_corrupt: 0;
    pub update_fw_corrupt, set_update_fw_corrupt: 1;
    pub internal_corrupt, set_internal_corrupt: 2;
    pub sdr_repo_empty, set_sdr_repo_empty: 3;
    pub ipmb_dead, set_ipmb_dead: 4;
    pub bmc_fru_access, set_bmc_fru_access: 5;
    pub sdr_access, set_sdr_access: 6;
    pub sel_access, set_sel_access: 7;
}

pub fn handle(ctx: &IpmiContext, msg: &IpmiMsg) -> IpmiResult {
    let Ok(cmd) = AppCmd::try_from(msg.cmd) else {
        return invalid_cmd(msg);
    };
    match cmd {
        AppCmd::GetDeviceId => get_device_id(ctx, msg),
        AppCmd::ColdReset => {
            expect_empty(msg)?;
            info!("Cold reset over IPMI");
            ctx.platform.cold_reset();
            Ok(Vec::new())
        }
        AppCmd::WarmReset => {
            expect_empty(msg)?;
            info!("Warm reset over IPMI");
            ctx.platform.warm_reset();
            Ok(Vec::new())
        }
        AppCmd::GetSelftestResults => get_selftest_results(ctx, msg),
        AppCmd::GetSystemGuid => {
            expect_empty(msg)?;
            Ok(lock(&ctx.system_guid).to_vec())
        }
        AppCmd::MasterWriteRead => master_write_read(ctx, msg),
        AppCmd::SetAcpiPower
        | AppCmd::ClearMessageFlags
        | AppCmd::GetBmcGlobalEnables
        | AppCmd::GetChannelInfo => invalid_cmd(msg),
    }
}

fn get_device_id(ctx: &IpmiContext, msg: &IpmiMsg) -> IpmiResult {
    expect_empty(msg)?;
    let dev = &ctx.device;
    let mut data = vec![
        dev.device_id,
        dev.device_rev,
        dev.fw_rev1,
        dev.fw_rev2,
        dev.ipmi_version,
        dev.additional_support,
    ];
    data.extend_from_slice(&iana_bytes());
    data.extend_from_slice(&dev.product_id.to_le_bytes());
    data.extend_from_slice(&dev.aux_fw_rev.to_be_bytes());
    Ok(data)
}

fn get_selftest_results(ctx: &IpmiContext, msg: &IpmiMsg) -> IpmiResult {
    expect_empty(msg)?;
    let mut result = SelfTestResult::default();

    let fru_ok = ctx
        .platform
        .fru()
        .read(SELFTEST_FRU_ID, 0, SELFTEST_FRU_HDR_LEN)
        .ok()
        .filter(|hdr| hdr.len() == SELFTEST_FRU_HDR_LEN)
        .is_some_and(|hdr| hdr.iter().fold(0u8, |acc, b| acc.wrapping_add(*b)) == 0);
    if !fru_ok {
        warn!("Self test: FRU {} header checksum bad", SELFTEST_FRU_ID);
        result.set_internal_corrupt(true);
        result.set_bmc_fru_access(true);
    }
    if !lock(&ctx.sdr).is_initialized() {
        result.set_sdr_repo_empty(true);
    }

    let status = if result.0 == 0 {
        SELFTEST_NO_ERROR
    } else {
        SELFTEST_ERROR
    };
    Ok(vec![status, result.0])
}

/// `[bus << 1, addr << 1, read_len, write data..]`
fn master_write_read(ctx: &IpmiContext, msg: &IpmiMsg) -> IpmiResult {
    if msg.data.len() < 4 {
        return Err(CompletionCode::InvalidLength);
    }
    let bus = msg.data[0] >> 1;
    let addr = msg.data[1] >> 1;
    let rx_len = msg.data[2] as usize;
    let tx = &msg.data[3..];
    if bus >= ctx.platform.i2c_bus_count() {
        return Err(CompletionCode::ParamOutOfRange);
    }
    if tx.is_empty() {
        return Err(CompletionCode::InvalidDataField);
    }
    ctx.platform
        .i2c_write_read(bus, addr, tx, rx_len)
        .map_err(|e| {
            warn!("Master write-read {}:{:#04x} failed: {}", bus, addr, e);
            CompletionCode::I2cBusError
        })
}
