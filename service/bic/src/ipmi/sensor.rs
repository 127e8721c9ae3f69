// Licensed under the Apache-2.0 license

//! Sensor netfn commands and the reading-to-completion-code rules shared
//! with the OEM accurate reading.

use bic_sensor::{lock, ReadMode, SensorStatus, SensorVal};
use ipmi_common::protocol::{CompletionCode, IpmiMsg, SensorCmd};

use crate::ipmi::{expect_len, invalid_cmd, IpmiContext, IpmiResult};

/// Reading state bits of a sensor reading response.
pub const READING_EVENTS_ENABLED: u8 = 0x80;
pub const READING_SCANNING_ENABLED: u8 = 0x40;
pub const READING_UNAVAILABLE: u8 = 0x20;
/// No threshold crossed.
const READING_THRESHOLD_OK: u8 = 0xC0;

pub fn handle(ctx: &IpmiContext, msg: &IpmiMsg) -> IpmiResult {
    match SensorCmd::try_from(msg.cmd) {
        Ok(SensorCmd::GetSensorReading) => get_sensor_reading(ctx, msg),
        Err(_) => invalid_cmd(msg),
    }
}

/// Reads `num`, reporting a cache read as `PollingDisable` while polling is
/// switched off.
pub(crate) fn read_sensor(ctx: &IpmiContext, num: u8, mode: ReadMode) -> (SensorStatus, i32) {
    if mode == ReadMode::Cache && !ctx.poll.is_enabled() {
        return (SensorStatus::PollingDisable, 0);
    }
    lock(&ctx.sensors).get_sensor_reading(num, mode)
}

/// Status byte of a reading response before the unavailable bit.
pub(crate) fn reading_state(ctx: &IpmiContext) -> u8 {
    if ctx.poll.is_enabled() {
        READING_EVENTS_ENABLED | READING_SCANNING_ENABLED
    } else {
        READING_EVENTS_ENABLED
    }
}

/// Completion code for a read that returned neither a value nor an
/// unavailable reading.
pub(crate) fn status_to_cc(status: SensorStatus) -> CompletionCode {
    match status {
        SensorStatus::PollingDisable => CompletionCode::SensorNotPresent,
        SensorStatus::FailToAccess => CompletionCode::NodeBusy,
        SensorStatus::NotFound => CompletionCode::InvalidDataField,
        _ => CompletionCode::UnspecifiedError,
    }
}

/// `[raw reading, reading state, threshold state]`
fn get_sensor_reading(ctx: &IpmiContext, msg: &IpmiMsg) -> IpmiResult {
    expect_len(msg, 1)?;
    let num = msg.data[0];
    let (status, reading) = read_sensor(ctx, num, ReadMode::Cache);
    let state = reading_state(ctx);
    match status {
        s if s.is_success() => {
            let val = SensorVal::from_reading(reading);
            let raw = lock(&ctx.sdr)
                .calculate_mbr(num, val.integer as i64)
                .ok_or(CompletionCode::InvalidDataField)?;
            Ok(vec![raw as u8, state, READING_THRESHOLD_OK])
        }
        SensorStatus::NotAccessible | SensorStatus::InitStatus => {
            Ok(vec![0, state | READING_UNAVAILABLE, READING_THRESHOLD_OK])
        }
        s => Err(status_to_cc(s)),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ipmi::test_util::{fixture, request};
    use ipmi_common::protocol::NETFN_SENSOR_REQ;

    fn run(ctx: &IpmiContext, data: &[u8]) -> IpmiResult {
        handle(ctx, &request(NETFN_SENSOR_REQ, SensorCmd::GetSensorReading.into(), data))
    }

    #[test]
    fn test_get_sensor_reading() {
        let f = fixture();
        assert_eq!(run(&f.ctx, &[0x10]), Ok(vec![25, 0xC0, 0xC0]));
        assert_eq!(run(&f.ctx, &[0x11]), Ok(vec![0, 0xE0, 0xC0]));
        assert_eq!(run(&f.ctx, &[0x42]), Err(CompletionCode::InvalidDataField));
        assert_eq!(run(&f.ctx, &[]), Err(CompletionCode::InvalidLength));
    }

    #[test]
    fn test_reading_with_polling_off() {
        let f = fixture();
        f.ctx.poll.disable_sensor_poll();
        assert_eq!(run(&f.ctx, &[0x10]), Err(CompletionCode::SensorNotPresent));
    }

    #[test]
    fn test_unknown_sensor_command() {
        let f = fixture();
        assert_eq!(
            handle(&f.ctx, &request(NETFN_SENSOR_REQ, 0x2F, &[1])),
            Err(CompletionCode::InvalidCmd)
        );
    }
}
