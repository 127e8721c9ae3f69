// Licensed under the Apache-2.0 license

//! PLDM over MCTP: the request/response service and one responder per
//! supported PLDM type.

pub mod base;
pub mod fw_update;
pub mod monitor;
pub mod oem;
pub mod sensor;
pub mod service;
pub mod smbios;

pub use base::BaseResponder;
pub use fw_update::FwUpdateResponder;
pub use monitor::{MonitorResponder, PlatformEvents};
pub use oem::{pldm_send_ipmi_request, send_ipmi_bridge_response, OemResponder};
pub use sensor::{NumericSensorPdr, PldmSensorList};
pub use service::{HandlerResult, PldmContext, PldmResponder, PldmService};
pub use smbios::{SmbiosResponder, SmbiosTable};

use crate::error::Result;

/// Sends a platform monitoring request to `eid` and returns the response
/// after the PLDM header.
pub fn platform_monitor_read(service: &PldmService, eid: u8, req: &[u8]) -> Result<Vec<u8>> {
    service.read(eid, req)
}

/// Sends a firmware update request to `eid` and returns the response after
/// the PLDM header.
pub fn fw_update_read(service: &PldmService, eid: u8, req: &[u8]) -> Result<Vec<u8>> {
    service.read(eid, req)
}

#[cfg(test)]
pub(crate) mod test_util {
    use std::sync::Arc;

    use mctp_common::protocol::ExtParams;
    use pldm_common::codec::PldmCodec;
    use pldm_common::message::control::GetTidRequest;

    use crate::config::PldmConfig;
    use crate::mctp::{EndpointResolver, MctpInstance};
    use crate::pldm::service::{PldmContext, PldmHeader, PldmService};
    use crate::transport::MockSmbusBus;

    /// Request context on an MCTP instance that was never started, so
    /// anything sent through it fails with `ChannelClosed`.
    pub fn context() -> PldmContext {
        let service = PldmService::new(&PldmConfig::default(), Arc::new(EndpointResolver::new()));
        let bus = MockSmbusBus::new();
        let inst = MctpInstance::new("test", Arc::new(bus.attach(0x20)), 0x20, 0x0A);
        let req = encode(GetTidRequest::new(0));
        PldmContext {
            service,
            inst,
            ext: ExtParams::smbus(0x08, 0x10),
            hdr: PldmHeader::decode(&req).unwrap(),
        }
    }

    pub fn encode<T: PldmCodec>(msg: T) -> Vec<u8> {
        let mut buf = [0u8; 128];
        let len = msg.encode(&mut buf).unwrap();
        buf[..len].to_vec()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::PldmConfig;
    use crate::error::ServiceError;
    use crate::mctp::EndpointResolver;
    use pldm_common::message::platform::sensor_reading::GetSensorReadingRequest;
    use std::sync::Arc;

    #[test]
    fn test_requesters_need_a_route() {
        let service = PldmService::new(&PldmConfig::default(), Arc::new(EndpointResolver::new()));
        let req = test_util::encode(GetSensorReadingRequest::new(0, 1, false));
        assert!(matches!(
            platform_monitor_read(&service, 0x30, &req),
            Err(ServiceError::UnknownEndpoint(0x30))
        ));
        assert!(matches!(
            fw_update_read(&service, 0x31, &req),
            Err(ServiceError::UnknownEndpoint(0x31))
        ));
    }
}
