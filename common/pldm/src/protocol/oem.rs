// Licensed under the Apache-2.0 license

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// IANA enterprise number used to tag OEM messages, little-endian on the wire.
pub const OEM_IANA: u32 = 0x00A015;
pub const OEM_IANA_LEN: usize = 3;

pub const fn iana_bytes() -> [u8; OEM_IANA_LEN] {
    [
        (OEM_IANA & 0xFF) as u8,
        ((OEM_IANA >> 8) & 0xFF) as u8,
        ((OEM_IANA >> 16) & 0xFF) as u8,
    ]
}

pub fn iana_matches(buf: &[u8]) -> bool {
    buf.len() >= OEM_IANA_LEN && buf[..OEM_IANA_LEN] == iana_bytes()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum OemCmd {
    Echo = 0x00,
    IpmiBridge = 0x01,
}
