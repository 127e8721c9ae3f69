// Licensed under the Apache-2.0 license

//! OEM_1S netfn (0x38) commands. The dispatcher strips the IANA prefix
//! before these run and puts it back on the response.

use bic_sensor::{ReadMode, SensorStatus};
use ipmi_common::protocol::{AppCmd, Channel, CompletionCode, IpmiMsg, Oem1sCmd, NETFN_APP_REQ};
use log::{info, warn};
use num_enum::TryFromPrimitive;

use crate::error::ServiceError;
use crate::ipmb::PendingReply;
use crate::ipmi::sensor::{read_sensor, reading_state, status_to_cc, READING_UNAVAILABLE};
use crate::ipmi::{expect_empty, expect_len, invalid_cmd, IpmiContext, IpmiResult, ReplyRoute};
use crate::platform::GpioDirection;

/// Pins reported by Get GPIO, rounded up to whole bytes.
pub const GPIO_COUNT: usize = 168;
const FW_PLATFORM_LEN: usize = 3;
/// Get Device ID response bytes needed for the ME version.
const ME_DEVICE_ID_MIN_LEN: usize = 14;

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum FwComponent {
    Cpld = 1,
    Bic = 2,
    Me = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum GpioOption {
    GetOutput = 0,
    SetOutput = 1,
    GetDirection = 2,
    SetDirection = 3,
}

pub fn handle(ctx: &IpmiContext, msg: &IpmiMsg, route: &ReplyRoute) -> IpmiResult {
    let Ok(cmd) = Oem1sCmd::try_from(msg.cmd) else {
        return invalid_cmd(msg);
    };
    match cmd {
        Oem1sCmd::MsgOut => msg_out(ctx, msg, route),
        // Nothing is bridged inwards.
        Oem1sCmd::MsgIn => Ok(Vec::new()),
        Oem1sCmd::GetGpio => get_gpio(ctx, msg),
        Oem1sCmd::SetGpio => invalid_cmd(msg),
        Oem1sCmd::GetFwVersion => get_fw_version(ctx, msg),
        Oem1sCmd::SetVrMonitorStatus => {
            expect_len(msg, 1)?;
            let enable = parse_bool(msg.data[0])?;
            ctx.power().set_vr_monitor(enable);
            Ok(Vec::new())
        }
        Oem1sCmd::GetVrMonitorStatus => {
            expect_empty(msg)?;
            Ok(vec![ctx.power().vr_monitor() as u8])
        }
        Oem1sCmd::AccuracySensorReading => accuracy_sensor_reading(ctx, msg),
        Oem1sCmd::SensorPollEn => {
            expect_len(msg, 1)?;
            if parse_bool(msg.data[0])? {
                ctx.poll.enable_sensor_poll();
            } else {
                ctx.poll.disable_sensor_poll();
            }
            info!("Sensor polling {}", if ctx.poll.is_enabled() { "enabled" } else { "disabled" });
            Ok(Vec::new())
        }
        Oem1sCmd::GetBicStatus => {
            expect_empty(msg)?;
            Ok(vec![ctx.device.fw_rev1, ctx.device.fw_rev2])
        }
        Oem1sCmd::ResetBic => {
            expect_empty(msg)?;
            ctx.platform.warm_reset();
            Ok(Vec::new())
        }
        Oem1sCmd::GetSetGpio => get_set_gpio(ctx, msg),
    }
}

fn parse_bool(val: u8) -> Result<bool, CompletionCode> {
    match val {
        0 => Ok(false),
        1 => Ok(true),
        _ => Err(CompletionCode::InvalidDataField),
    }
}

/// Bridges `[target channel, netfn << 2, cmd, data..]` to another IPMB
/// channel. The target's answer comes back later wrapped in a MSG_OUT
/// response, so success produces no response here.
fn msg_out(ctx: &IpmiContext, msg: &IpmiMsg, route: &ReplyRoute) -> IpmiResult {
    if msg.data.len() <= 2 {
        return Err(CompletionCode::InvalidLength);
    }
    let target = msg.data[0];
    let Some(channel) = ctx.channels.get(target) else {
        warn!("MSG_OUT to unconfigured interface {:#04x}", target);
        return Err(CompletionCode::NotSuppInCurrState);
    };
    let mut bridge = IpmiMsg::request(msg.data[1] >> 2, msg.data[2], &msg.data[3..]);
    bridge.seq_source = msg.seq_source;
    bridge.inf_source = msg.inf_source;
    bridge.inf_target = target;
    channel
        .send_request(bridge, PendingReply::Bridge(route.clone()))
        .map_err(|e| {
            warn!("MSG_OUT to {} failed: {}", channel.name(), e);
            CompletionCode::BridgeMsgErr
        })?;
    Ok(Vec::new())
}

fn get_gpio(ctx: &IpmiContext, msg: &IpmiMsg) -> IpmiResult {
    expect_empty(msg)?;
    let mut bitmap = vec![0u8; GPIO_COUNT.div_ceil(8)];
    for pin in 0..GPIO_COUNT {
        if ctx.platform.gpio_get(pin as u8) == Some(true) {
            bitmap[pin / 8] |= 1 << (pin % 8);
        }
    }
    Ok(bitmap)
}

fn bcd(val: u16) -> u8 {
    (((val / 10) % 10) << 4 | (val % 10)) as u8
}

fn get_fw_version(ctx: &IpmiContext, msg: &IpmiMsg) -> IpmiResult {
    expect_len(msg, 1)?;
    let Ok(component) = FwComponent::try_from(msg.data[0]) else {
        return Err(CompletionCode::InvalidDataField);
    };
    match component {
        FwComponent::Cpld => Err(CompletionCode::UnspecifiedError),
        FwComponent::Bic => {
            let dev = &ctx.device;
            let mut data = vec![
                bcd(dev.fw_year / 100),
                bcd(dev.fw_year % 100),
                dev.fw_week,
                dev.fw_version,
            ];
            let mut platform = [0u8; FW_PLATFORM_LEN];
            for (dst, src) in platform.iter_mut().zip(dev.fw_platform.bytes()) {
                *dst = src;
            }
            data.extend_from_slice(&platform);
            Ok(data)
        }
        FwComponent::Me => {
            let me = ctx
                .channels
                .get(Channel::MeIpmb.into())
                .ok_or(CompletionCode::BridgeMsgErr)?;
            let mut req = IpmiMsg::request(NETFN_APP_REQ, AppCmd::GetDeviceId.into(), &[]);
            req.inf_source = Channel::Local.into();
            req.inf_target = Channel::MeIpmb.into();
            let resp = me.ipmb_read(req).map_err(|e| {
                warn!("ME Get Device ID failed: {}", e);
                CompletionCode::BridgeMsgErr
            })?;
            let d = &resp.data;
            if resp.completion_code != 0 || d.len() < ME_DEVICE_ID_MIN_LEN {
                return Err(CompletionCode::BridgeMsgErr);
            }
            Ok(vec![d[2] & 0x7F, d[3] >> 4, d[3] & 0x0F, d[12], d[13] >> 4])
        }
    }
}

/// `[sensor number, option]`, answered with the packed reading and a
/// status byte.
fn accuracy_sensor_reading(ctx: &IpmiContext, msg: &IpmiMsg) -> IpmiResult {
    expect_len(msg, 2)?;
    let num = msg.data[0];
    let state = reading_state(ctx);
    let (status, reading) = match ReadMode::try_from(msg.data[1]) {
        Ok(mode) => read_sensor(ctx, num, mode),
        Err(_) => {
            warn!("Accurate reading option {} invalid", msg.data[1]);
            (SensorStatus::UnspecifiedError, 0)
        }
    };
    match status {
        s if s.is_success() => {
            let mut data = reading.to_le_bytes().to_vec();
            data.push(state);
            Ok(data)
        }
        SensorStatus::NotAccessible | SensorStatus::InitStatus => {
            Ok(vec![0, 0, 0, 0, state | READING_UNAVAILABLE])
        }
        s => Err(status_to_cc(s)),
    }
}

fn get_set_gpio(ctx: &IpmiContext, msg: &IpmiMsg) -> IpmiResult {
    if msg.data.len() < 2 {
        return Err(CompletionCode::InvalidLength);
    }
    let Ok(option) = GpioOption::try_from(msg.data[0]) else {
        return invalid_cmd(msg);
    };
    let pin = msg.data[1];
    let gpio_err = |e: ServiceError| {
        warn!("GPIO {} access failed: {}", pin, e);
        CompletionCode::UnspecifiedError
    };
    match option {
        GpioOption::GetOutput => {
            expect_len(msg, 2)?;
            Ok(vec![pin, ctx.platform.gpio_get(pin).unwrap_or(false) as u8])
        }
        GpioOption::SetOutput => {
            expect_len(msg, 3)?;
            ctx.platform
                .gpio_config(pin, GpioDirection::Output)
                .map_err(gpio_err)?;
            ctx.platform.gpio_set(pin, msg.data[2] != 0).map_err(gpio_err)?;
            Ok(vec![pin, ctx.platform.gpio_get(pin).unwrap_or(false) as u8])
        }
        GpioOption::GetDirection => Err(CompletionCode::NotSuppInCurrState),
        GpioOption::SetDirection => {
            expect_len(msg, 3)?;
            let dir = if msg.data[2] != 0 {
                GpioDirection::Output
            } else {
                GpioDirection::Input
            };
            ctx.platform.gpio_config(pin, dir).map_err(gpio_err)?;
            Ok(vec![pin, msg.data[2]])
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ipmi::test_util::{fixture, request};
    use crate::platform::Platform;
    use ipmi_common::protocol::NETFN_OEM_1S_REQ;
    use std::sync::mpsc;

    fn run(ctx: &IpmiContext, cmd: Oem1sCmd, data: &[u8]) -> IpmiResult {
        let (tx, _rx) = mpsc::channel();
        handle(ctx, &request(NETFN_OEM_1S_REQ, cmd.into(), data), &ReplyRoute::Local(tx))
    }

    #[test]
    fn test_accuracy_sensor_reading() {
        let f = fixture();
        // 25.500 packed as integer 25, fraction 500.
        assert_eq!(
            run(&f.ctx, Oem1sCmd::AccuracySensorReading, &[0x10, 0]),
            Ok(vec![25, 0, 0xF4, 0x01, 0xC0])
        );
        assert_eq!(
            run(&f.ctx, Oem1sCmd::AccuracySensorReading, &[0x11, 0]),
            Ok(vec![0, 0, 0, 0, 0xE0])
        );
        assert_eq!(
            run(&f.ctx, Oem1sCmd::AccuracySensorReading, &[0x42, 0]),
            Err(CompletionCode::InvalidDataField)
        );
        assert_eq!(
            run(&f.ctx, Oem1sCmd::AccuracySensorReading, &[0x10, 7]),
            Err(CompletionCode::UnspecifiedError)
        );
        assert_eq!(
            run(&f.ctx, Oem1sCmd::AccuracySensorReading, &[0x10]),
            Err(CompletionCode::InvalidLength)
        );

        assert_eq!(run(&f.ctx, Oem1sCmd::SensorPollEn, &[0]), Ok(vec![]));
        assert_eq!(
            run(&f.ctx, Oem1sCmd::AccuracySensorReading, &[0x10, 0]),
            Err(CompletionCode::SensorNotPresent)
        );
        assert_eq!(
            run(&f.ctx, Oem1sCmd::SensorPollEn, &[2]),
            Err(CompletionCode::InvalidDataField)
        );
        assert_eq!(run(&f.ctx, Oem1sCmd::SensorPollEn, &[1]), Ok(vec![]));
        assert!(f.ctx.poll.is_enabled());
    }

    #[test]
    fn test_fw_version() {
        let f = fixture();
        let mut expected = vec![0x20, 0x24, 1, 1];
        expected.extend_from_slice(b"bic");
        assert_eq!(run(&f.ctx, Oem1sCmd::GetFwVersion, &[2]), Ok(expected));
        assert_eq!(
            run(&f.ctx, Oem1sCmd::GetFwVersion, &[1]),
            Err(CompletionCode::UnspecifiedError)
        );
        // No ME channel configured.
        assert_eq!(run(&f.ctx, Oem1sCmd::GetFwVersion, &[3]), Err(CompletionCode::BridgeMsgErr));
        assert_eq!(
            run(&f.ctx, Oem1sCmd::GetFwVersion, &[9]),
            Err(CompletionCode::InvalidDataField)
        );
    }

    #[test]
    fn test_vr_monitor_and_status() {
        let f = fixture();
        assert_eq!(run(&f.ctx, Oem1sCmd::SetVrMonitorStatus, &[1]), Ok(vec![]));
        assert_eq!(run(&f.ctx, Oem1sCmd::GetVrMonitorStatus, &[]), Ok(vec![1]));
        assert_eq!(run(&f.ctx, Oem1sCmd::SetVrMonitorStatus, &[0]), Ok(vec![]));
        assert_eq!(run(&f.ctx, Oem1sCmd::GetVrMonitorStatus, &[]), Ok(vec![0]));
        assert_eq!(
            run(&f.ctx, Oem1sCmd::SetVrMonitorStatus, &[5]),
            Err(CompletionCode::InvalidDataField)
        );
        assert_eq!(run(&f.ctx, Oem1sCmd::GetBicStatus, &[]), Ok(vec![0x01, 0x00]));
        assert_eq!(run(&f.ctx, Oem1sCmd::ResetBic, &[]), Ok(vec![]));
        assert_eq!(f.platform.warm_resets(), 1);
    }

    #[test]
    fn test_gpio() {
        let f = fixture();
        assert_eq!(run(&f.ctx, Oem1sCmd::GetSetGpio, &[1, 9, 1]), Ok(vec![9, 1]));
        assert_eq!(f.platform.gpio_direction(9), Some(GpioDirection::Output));
        assert_eq!(run(&f.ctx, Oem1sCmd::GetSetGpio, &[0, 9]), Ok(vec![9, 1]));
        assert_eq!(run(&f.ctx, Oem1sCmd::GetSetGpio, &[3, 9, 0]), Ok(vec![9, 0]));
        assert_eq!(f.platform.gpio_direction(9), Some(GpioDirection::Input));
        assert_eq!(
            run(&f.ctx, Oem1sCmd::GetSetGpio, &[2, 9]),
            Err(CompletionCode::NotSuppInCurrState)
        );
        assert_eq!(
            run(&f.ctx, Oem1sCmd::GetSetGpio, &[0, 9, 1]),
            Err(CompletionCode::InvalidLength)
        );

        let bitmap = run(&f.ctx, Oem1sCmd::GetGpio, &[]).unwrap();
        assert_eq!(bitmap.len(), 21);
        assert_eq!(bitmap[1], 0x02);
    }

    #[test]
    fn test_msg_out_checks() {
        let f = fixture();
        assert_eq!(run(&f.ctx, Oem1sCmd::MsgOut, &[2, 0x18]), Err(CompletionCode::InvalidLength));
        assert_eq!(
            run(&f.ctx, Oem1sCmd::MsgOut, &[2, 0x18, 0x01]),
            Err(CompletionCode::NotSuppInCurrState)
        );
        assert_eq!(run(&f.ctx, Oem1sCmd::MsgIn, &[1]), Ok(vec![]));
    }
}
