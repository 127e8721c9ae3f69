// Licensed under the Apache-2.0 license

//! OEM netfn (0x30) commands.

use bic_sensor::{lock, ReadMode, SensorStatus, SensorVal};
use ipmi_common::protocol::{CompletionCode, IpmiMsg, OemCmd};
use log::info;

use crate::ipmi::sensor::read_sensor;
use crate::ipmi::{expect_len, invalid_cmd, IpmiContext, IpmiResult};

/// Intel NM platform power domain.
const NM_DOMAIN_PLATFORM: u8 = 0x00;

pub fn handle(ctx: &IpmiContext, msg: &IpmiMsg) -> IpmiResult {
    let Ok(cmd) = OemCmd::try_from(msg.cmd) else {
        return invalid_cmd(msg);
    };
    match cmd {
        OemCmd::NmSensorRead => nm_sensor_read(ctx, msg),
        OemCmd::SetSystemGuid => {
            expect_len(msg, 16)?;
            let mut guid = lock(&ctx.system_guid);
            guid.copy_from_slice(&msg.data);
            info!("System GUID updated");
            Ok(Vec::new())
        }
    }
}

/// Platform power for the ME, read from the host power sensor.
fn nm_sensor_read(ctx: &IpmiContext, msg: &IpmiMsg) -> IpmiResult {
    if msg.data.len() < 3 {
        return Err(CompletionCode::InvalidLength);
    }
    if msg.data[0] != NM_DOMAIN_PLATFORM {
        return Err(CompletionCode::InvalidDataField);
    }
    let (status, reading) = match ctx.host_power_sensor {
        Some(num) => read_sensor(ctx, num, ReadMode::Cache),
        None => (SensorStatus::NotFound, 0),
    };
    match status {
        s if s.is_success() => {
            let [lsb, msb] = SensorVal::from_reading(reading).integer.to_le_bytes();
            Ok(vec![0, lsb, msb])
        }
        SensorStatus::FailToAccess => Err(CompletionCode::NodeBusy),
        SensorStatus::NotAccessible => Err(CompletionCode::NotSuppInCurrState),
        SensorStatus::NotFound => Err(CompletionCode::InvalidDataField),
        _ => Err(CompletionCode::UnspecifiedError),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ipmi::test_util::{fixture, request};
    use ipmi_common::protocol::NETFN_OEM_REQ;

    #[test]
    fn test_set_system_guid() {
        let f = fixture();
        let guid: Vec<u8> = (1..=16).collect();
        let msg = request(NETFN_OEM_REQ, OemCmd::SetSystemGuid.into(), &guid);
        assert_eq!(handle(&f.ctx, &msg), Ok(vec![]));
        assert_eq!(lock(&f.ctx.system_guid).to_vec(), guid);

        let msg = request(NETFN_OEM_REQ, OemCmd::SetSystemGuid.into(), &guid[..15]);
        assert_eq!(handle(&f.ctx, &msg), Err(CompletionCode::InvalidLength));
    }

    #[test]
    fn test_nm_sensor_read() {
        let f = fixture();
        let read = |ctx: &IpmiContext, data: &[u8]| {
            handle(ctx, &request(NETFN_OEM_REQ, OemCmd::NmSensorRead.into(), data))
        };
        assert_eq!(read(&f.ctx, &[0, 0, 0]), Err(CompletionCode::InvalidDataField));

        let ctx = f.ctx.with_host_power_sensor(Some(0x10));
        assert_eq!(read(&ctx, &[0, 0, 0]), Ok(vec![0, 25, 0]));
        assert_eq!(read(&ctx, &[1, 0, 0]), Err(CompletionCode::InvalidDataField));
        assert_eq!(read(&ctx, &[0, 0]), Err(CompletionCode::InvalidLength));

        let ctx = ctx.with_host_power_sensor(Some(0x11));
        assert_eq!(read(&ctx, &[0, 0, 0]), Err(CompletionCode::UnspecifiedError));
    }
}
